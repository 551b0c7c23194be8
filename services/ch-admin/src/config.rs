use anyhow::Result;
use chkit::{ClusterConfig, ObservabilityConfig};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn environment() -> Environment {
    Environment::with_prefix("CH_ADMIN").separator("__")
}

pub fn load_config(path: &str) -> Result<AdminConfig> {
    let config = Config::builder()
        .add_source(File::with_name(path))
        .add_source(environment())
        .build()?;

    let config: AdminConfig = config.try_deserialize()?;
    config.cluster.validate()?;
    Ok(config)
}

#[cfg(test)]
pub fn parse_config(yaml: &str) -> Result<AdminConfig> {
    let config = Config::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()?;
    let config: AdminConfig = config.try_deserialize()?;
    config.cluster.validate()?;
    Ok(config)
}
