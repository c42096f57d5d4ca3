use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub source: RawConnection,
    pub destination: RawConnection,
    #[serde(default)]
    pub replica: Option<RawReplica>,
    #[serde(default)]
    pub jobs: HashMap<String, RawJob>,
    #[serde(default)]
    pub processing: RawProcessing,
    #[serde(default)]
    pub safety: RawSafety,
    #[serde(default)]
    pub verification: RawVerification,
    #[serde(default)]
    pub logging: RawLogging,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub tls: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub max_idle_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReplica {
    #[serde(default)]
    pub enabled: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub lag_threshold_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProcessing {
    pub batch_size: Option<u64>,
    pub batch_delete_size: Option<u64>,
    pub sleep_seconds: Option<f64>,
    pub discovery_chunk_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSafety {
    #[serde(default)]
    pub allow_delete_triggers: bool,
    #[serde(default)]
    pub allow_cascade: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVerification {
    pub method: Option<String>,
    pub skip_verification: Option<bool>,
    pub chunk_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLogging {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for RawLogging {
    fn default() -> Self {
        RawLogging {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJob {
    pub root_table: String,
    pub primary_key: String,
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub relations: Vec<RawRelation>,
    #[serde(default)]
    pub processing: RawProcessing,
    #[serde(default)]
    pub verification: RawVerification,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRelation {
    pub table: String,
    pub primary_key: Option<String>,
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub dependency_type: Option<String>,
    #[serde(default)]
    pub relations: Vec<RawRelation>,
}
