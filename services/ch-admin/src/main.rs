mod config;

use std::time::Duration;

use anyhow::Result;
use chkit::Client;
use clap::{Parser, Subcommand};
use prometheus::{Encoder, TextEncoder};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ch-admin")]
#[command(about = "Operate a ClickHouse cluster through the chkit client")]
struct Args {
    #[arg(short, long, default_value = "config/ch-admin.yaml")]
    config: String,

    /// Per-request timeout in seconds, overriding the config file
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Print Prometheus metrics after the command finishes
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured hosts with their priority and cooldown state
    Hosts,
    /// Run a statement on one healthy host and print the result
    Query {
        sql: String,
        /// Print lines as they arrive instead of buffering the response
        #[arg(long)]
        stream: bool,
    },
    /// Run a statement on every host
    Broadcast {
        sql: String,
        /// Abort on the first host that fails
        #[arg(long)]
        ensure: bool,
    },
    CreateDatabase,
    DropDatabase,
    /// Check which hosts answer
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load_config(&args.config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ch_admin={0},chkit={0}", config.observability.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let timeout = args.timeout.map(Duration::from_secs);
    let client = Client::new(config.cluster)?;
    info!(
        "Loaded {} hosts for database {}",
        client.hosts().len(),
        client.database()
    );

    run(&client, args.command, timeout).await?;

    if args.metrics {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        print!("{}", String::from_utf8(buffer)?);
    }
    Ok(())
}

async fn run(client: &Client, command: Command, timeout: Option<Duration>) -> Result<()> {
    match command {
        Command::Hosts => {
            for host in client.hosts().hosts_set() {
                let priority = client.hosts().priority_of(&host).unwrap_or_default();
                let state = if client.hosts().is_cooling_down(&host) {
                    "cooling down"
                } else {
                    "available"
                };
                println!("{}\tpriority={}\t{}", host, priority, state);
            }
        }
        Command::Query { sql, stream } => {
            let response = client.query(&sql, stream, timeout).await?;
            info!("Answered by {}", response.host());
            if stream {
                let mut lines = response.into_lines();
                while let Some(line) = lines.next_line().await? {
                    println!("{}", line);
                }
            } else {
                print!("{}", response.text().await?);
            }
        }
        Command::Broadcast { sql, ensure } => {
            let succeeded = client.broadcast(&sql, ensure, timeout).await?;
            println!("{}/{} hosts succeeded", succeeded, client.hosts().len());
        }
        Command::CreateDatabase => {
            client.create_database(timeout).await?;
            println!("Database {} created", client.database());
        }
        Command::DropDatabase => {
            client.drop_database(timeout).await?;
            println!("Database {} dropped", client.database());
        }
        Command::Ping => {
            let succeeded = client.broadcast("SELECT 1", false, timeout).await?;
            println!("{}/{} hosts answered", succeeded, client.hosts().len());
        }
    }
    Ok(())
}
