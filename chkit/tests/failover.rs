//! End-to-end checks of the HTTP transport against in-process mock servers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use chkit::{
    ClickHouseError, Client, ClusterConfig, Column, Engine, FieldType, Host, Model, Row, Tier,
    Topology, Value,
};

#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<Mutex<Vec<(HashMap<String, String>, String)>>>,
}

impl Recorder {
    fn bodies(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(_, b)| b.clone()).collect()
    }
}

async fn spawn_server(status: StatusCode, reply: &'static str) -> (String, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new()
        .route(
            "/",
            post(
                move |State(recorder): State<Recorder>,
                      Query(params): Query<HashMap<String, String>>,
                      body: String| async move {
                    recorder.requests.lock().push((params, body));
                    (status, reply)
                },
            ),
        )
        .with_state(recorder.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("127.0.0.1:{}", addr.port()), recorder)
}

/// An address nobody listens on.
async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("127.0.0.1:{}", port)
}

fn tiers(primary: &str, fallback: &str) -> Topology {
    Topology::Tiers(vec![
        Tier {
            priority: 1,
            hosts: vec![primary.to_string()],
        },
        Tier {
            priority: 2,
            hosts: vec![fallback.to_string()],
        },
    ])
}

#[derive(Debug, PartialEq)]
struct Event {
    id: u32,
    name: String,
}

impl Model for Event {
    fn table_name() -> String {
        "events".to_string()
    }

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", FieldType::UInt32),
            Column::new("name", FieldType::String),
        ]
    }

    fn engine() -> Engine {
        Engine::merge_tree("day", &["id"])
    }

    fn to_values(&self) -> Vec<Value> {
        vec![self.id.into(), self.name.clone().into()]
    }

    fn from_row(row: &Row) -> chkit::Result<Self> {
        Ok(Self {
            id: row.get_as("id")?,
            name: row.get_as("name")?,
        })
    }
}

#[tokio::test]
async fn dead_primary_fails_over_to_fallback() {
    let dead = dead_address().await;
    let (live, recorder) = spawn_server(StatusCode::OK, "1\n").await;
    let client = Client::new(ClusterConfig::new(tiers(&dead, &live), "default")).unwrap();

    let response = client.query("SELECT 1", false, None).await.unwrap();
    assert_eq!(response.host(), &Host::new(&live));
    assert_eq!(response.text().await.unwrap(), "1\n");
    assert_eq!(recorder.bodies(), vec!["SELECT 1"]);
    assert!(client.hosts().is_cooling_down(&Host::new(&dead)));
}

#[tokio::test]
async fn server_error_is_reported_after_exhaustion() {
    let (broken, _) = spawn_server(StatusCode::INTERNAL_SERVER_ERROR, "Code: 60. Unknown table").await;
    let dead = dead_address().await;
    let client = Client::new(ClusterConfig::new(tiers(&broken, &dead), "default")).unwrap();

    let err = client.query("SELECT * FROM t", false, None).await.unwrap_err();
    assert!(matches!(err, ClickHouseError::NoAvailableHosts(2)));
}

#[tokio::test]
async fn credentials_are_sent_as_query_parameters() {
    let (live, recorder) = spawn_server(StatusCode::OK, "").await;
    let mut config = ClusterConfig::new(Topology::Single(live), "default");
    config.username = Some("reader".to_string());
    config.password = Some("s3cret".to_string());
    let client = Client::new(config).unwrap();

    client.query("SELECT 1", false, None).await.unwrap();
    let requests = recorder.requests.lock();
    let params = &requests[0].0;
    assert_eq!(params.get("user").map(String::as_str), Some("reader"));
    assert_eq!(params.get("password").map(String::as_str), Some("s3cret"));
}

#[tokio::test]
async fn select_streams_typed_rows() {
    let (live, recorder) = spawn_server(
        StatusCode::OK,
        "id\tname\nUInt32\tString\n1\tfirst\n2\tsecond\\tpart\n",
    )
    .await;
    let client = Client::new(ClusterConfig::new(Topology::Single(live), "analytics")).unwrap();

    let events = client
        .select::<Event>("SELECT id, name FROM $table ORDER BY id")
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(
        events,
        vec![
            Event { id: 1, name: "first".into() },
            Event { id: 2, name: "second\tpart".into() },
        ]
    );
    assert_eq!(
        recorder.bodies(),
        vec!["SELECT id, name FROM `analytics`.`events` ORDER BY id FORMAT TabSeparatedWithNamesAndTypes"]
    );
}

#[tokio::test]
async fn connect_creates_database_everywhere() {
    let (first, first_rec) = spawn_server(StatusCode::OK, "").await;
    let (second, second_rec) = spawn_server(StatusCode::OK, "").await;
    let config = ClusterConfig::new(Topology::List(vec![first, second]), "analytics");

    let client = Client::connect(config).await.unwrap();
    assert_eq!(client.database(), "analytics");
    for recorder in [first_rec, second_rec] {
        assert_eq!(recorder.bodies(), vec!["CREATE DATABASE IF NOT EXISTS `analytics`"]);
    }
}

#[tokio::test]
async fn broadcast_skips_broken_hosts_unless_ensured() {
    let (ok, _) = spawn_server(StatusCode::OK, "").await;
    let (broken, _) = spawn_server(StatusCode::INTERNAL_SERVER_ERROR, "Code: 81").await;
    let dead = dead_address().await;
    let topology = Topology::List(vec![ok, broken.clone(), dead]);
    let client = Client::new(ClusterConfig::new(topology, "default")).unwrap();

    assert_eq!(client.broadcast("SYSTEM FLUSH LOGS", false, None).await.unwrap(), 1);

    match client.broadcast("SYSTEM FLUSH LOGS", true, None).await {
        Err(ClickHouseError::BroadcastError { host, .. }) => assert_eq!(host, Host::new(&broken)),
        other => panic!("expected broadcast error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn buffered_insert_reaches_server_on_flush() {
    let (live, recorder) = spawn_server(StatusCode::OK, "").await;
    let mut config = ClusterConfig::new(Topology::Single(live), "analytics");
    config.buffer_size = 100;
    let client = Client::new(config).unwrap();

    client
        .insert(&[
            Event { id: 1, name: "a".into() },
            Event { id: 2, name: "b".into() },
        ])
        .await
        .unwrap();
    assert!(recorder.bodies().is_empty());

    client.flush().await.unwrap();
    assert_eq!(
        recorder.bodies(),
        vec!["INSERT INTO `analytics`.`events` FORMAT TabSeparated\n1\ta\n2\tb"]
    );
}
