//! Loads and validates the YAML job configuration described in spec.md §6.
//!
//! [`Config::load`] reads the file, performs `${VAR}`/`$VAR` environment
//! interpolation, parses the YAML, and validates every field, collecting
//! *all* problems into a single [`ConfigError::Invalid`] rather than
//! stopping at the first one.

mod interpolate;
mod raw;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use dbarchiver_errors::{ConfigError, ConfigFieldError};
use dbarchiver_graph::RelationSpec;

pub use raw::{RawConfig, RawConnection, RawJob, RawRelation};

/// `tls` modes accepted for `source`/`destination`/`replica` connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Disable,
    Preferred,
    Required,
}

impl Default for TlsMode {
    fn default() -> Self {
        TlsMode::Preferred
    }
}

impl TlsMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "disable" => Some(TlsMode::Disable),
            "preferred" => Some(TlsMode::Preferred),
            "required" => Some(TlsMode::Required),
            _ => None,
        }
    }
}

/// A validated `source`/`destination`/`replica` connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub tls: TlsMode,
    pub max_connections: u32,
    pub max_idle_connections: u32,
}

/// The optional replica used by the lag monitor.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub lag_threshold_seconds: f64,
}

/// Verification strategy, validated from `verification.method` +
/// `verification.skip_verification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMethodConfig {
    Count,
    Sha256,
    Skip,
}

/// A single validated job definition.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub name: String,
    pub root_table: String,
    pub primary_key: String,
    pub predicate: Option<String>,
    pub relations: Vec<RelationSpec>,
    pub batch_size: u64,
    pub batch_delete_size: u64,
    pub sleep_seconds: f64,
    pub discovery_chunk_size: u64,
    pub verification_chunk_size: u64,
    pub verification_method: VerificationMethodConfig,
}

/// Global defaults applied when a job doesn't override them.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingDefaults {
    pub batch_size: u64,
    pub batch_delete_size: u64,
    pub sleep_seconds: f64,
    pub discovery_chunk_size: u64,
}

impl Default for ProcessingDefaults {
    fn default() -> Self {
        ProcessingDefaults {
            batch_size: 1000,
            batch_delete_size: 500,
            sleep_seconds: 0.0,
            discovery_chunk_size: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub allow_delete_triggers: bool,
    pub allow_cascade: bool,
}

/// The fully validated configuration for one run of the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    pub source: ConnectionConfig,
    pub destination: ConnectionConfig,
    pub replica: Option<ReplicaConfig>,
    pub jobs: HashMap<String, JobConfig>,
    pub logging: LoggingConfig,
    pub safety: SafetyConfig,
}

/// CLI flags that override configuration fields. Only `Some`/non-zero
/// fields take effect, per spec.md §6 ("CLI flags override non-zero fields
/// only").
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub batch_size: Option<u64>,
    pub batch_delete_size: Option<u64>,
    pub sleep_seconds: Option<f64>,
    pub skip_verify: bool,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl Config {
    /// Read `path`, interpolate environment variables, parse and validate.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_str(&text, &path.display().to_string())
    }

    /// Parse and validate an already-read configuration document. Exposed
    /// separately from [`Self::load`] so tests don't need a filesystem.
    pub fn from_str(text: &str, source_name: &str) -> Result<Config, ConfigError> {
        let interpolated = interpolate::interpolate_env(text);
        let raw: RawConfig =
            serde_yaml_ng::from_str(&interpolated).map_err(|e| ConfigError::Parse {
                path: source_name.to_string(),
                message: e.to_string(),
            })?;
        validate(raw)
    }

    pub fn job(&self, name: &str) -> Result<&JobConfig, ConfigError> {
        self.jobs
            .get(name)
            .ok_or_else(|| ConfigError::UnknownJob(name.to_string()))
    }

    /// Apply CLI overrides to every job in place. Only non-default values
    /// in `overrides` take effect.
    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) {
        for job in self.jobs.values_mut() {
            if let Some(v) = overrides.batch_size {
                if v > 0 {
                    job.batch_size = v;
                }
            }
            if let Some(v) = overrides.batch_delete_size {
                if v > 0 {
                    job.batch_delete_size = v;
                }
            }
            if let Some(v) = overrides.sleep_seconds {
                if v > 0.0 {
                    job.sleep_seconds = v;
                }
            }
            if overrides.skip_verify {
                job.verification_method = VerificationMethodConfig::Skip;
            }
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = &overrides.log_format {
            self.logging.format = format.clone();
        }
    }
}

fn validate(raw: RawConfig) -> Result<Config, ConfigError> {
    let mut errors: Vec<ConfigFieldError> = Vec::new();

    let source = validate_connection(&raw.source, "source", &mut errors);
    let destination = validate_connection(&raw.destination, "destination", &mut errors);
    let replica = raw.replica.as_ref().and_then(|r| {
        if !r.enabled {
            return None;
        }
        let host = require(r.host.clone(), "replica.host", &mut errors);
        let port = r.port.unwrap_or(0);
        if r.port.is_none() {
            errors.push(ConfigFieldError {
                field_path: "replica.port".into(),
                message: "required when replica.enabled is true".into(),
            });
        }
        let user = require(r.user.clone(), "replica.user", &mut errors);
        Some(ReplicaConfig {
            host: host.unwrap_or_default(),
            port,
            user: user.unwrap_or_default(),
            password: r.password.clone().unwrap_or_default(),
            lag_threshold_seconds: r.lag_threshold_seconds.unwrap_or(1.0),
        })
    });

    if raw.jobs.is_empty() {
        errors.push(ConfigFieldError {
            field_path: "jobs".into(),
            message: "at least one job must be defined".into(),
        });
    }

    let processing_defaults = ProcessingDefaults {
        batch_size: raw.processing.batch_size.unwrap_or(1000),
        batch_delete_size: raw.processing.batch_delete_size.unwrap_or(500),
        sleep_seconds: raw.processing.sleep_seconds.unwrap_or(0.0),
        discovery_chunk_size: raw.processing.discovery_chunk_size.unwrap_or(1000),
    };
    let verification_default_method = raw
        .verification
        .method
        .clone()
        .unwrap_or_else(|| "count".to_string());
    let verification_default_skip = raw.verification.skip_verification.unwrap_or(false);

    let mut jobs = HashMap::new();
    for (name, raw_job) in &raw.jobs {
        match validate_job(name, raw_job, processing_defaults, &verification_default_method, verification_default_skip)
        {
            Ok(job) => {
                jobs.insert(name.clone(), job);
            }
            Err(mut job_errors) => errors.append(&mut job_errors),
        }
    }

    let logging = LoggingConfig {
        level: raw.logging.level.clone(),
        format: raw.logging.format.clone(),
    };
    if !matches!(logging.level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ConfigFieldError {
            field_path: "logging.level".into(),
            message: format!("unknown log level `{}`", logging.level),
        });
    }
    if !matches!(logging.format.as_str(), "pretty" | "json") {
        errors.push(ConfigFieldError {
            field_path: "logging.format".into(),
            message: format!("unknown log format `{}`", logging.format),
        });
    }

    let safety = SafetyConfig {
        allow_delete_triggers: raw.safety.allow_delete_triggers,
        allow_cascade: raw.safety.allow_cascade,
    };

    if !errors.is_empty() {
        return Err(ConfigError::Invalid(errors));
    }

    Ok(Config {
        source: source.expect("validated with no errors"),
        destination: destination.expect("validated with no errors"),
        replica,
        jobs,
        logging,
        safety,
    })
}

fn require(value: Option<String>, field_path: &str, errors: &mut Vec<ConfigFieldError>) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            errors.push(ConfigFieldError {
                field_path: field_path.to_string(),
                message: "required field is missing or empty".into(),
            });
            None
        }
    }
}

fn validate_connection(
    raw: &RawConnection,
    prefix: &str,
    errors: &mut Vec<ConfigFieldError>,
) -> Option<ConnectionConfig> {
    let mut ok = true;
    if raw.host.trim().is_empty() {
        errors.push(ConfigFieldError {
            field_path: format!("{prefix}.host"),
            message: "required field is missing or empty".into(),
        });
        ok = false;
    }
    if raw.port == 0 {
        errors.push(ConfigFieldError {
            field_path: format!("{prefix}.port"),
            message: "port must be between 1 and 65535".into(),
        });
        ok = false;
    }
    if raw.user.trim().is_empty() {
        errors.push(ConfigFieldError {
            field_path: format!("{prefix}.user"),
            message: "required field is missing or empty".into(),
        });
        ok = false;
    }
    if raw.database.trim().is_empty() {
        errors.push(ConfigFieldError {
            field_path: format!("{prefix}.database"),
            message: "required field is missing or empty".into(),
        });
        ok = false;
    }
    let tls = match raw.tls.as_deref() {
        None => TlsMode::default(),
        Some(s) => match TlsMode::parse(s) {
            Some(mode) => mode,
            None => {
                errors.push(ConfigFieldError {
                    field_path: format!("{prefix}.tls"),
                    message: format!("unknown tls mode `{s}` (expected disable, preferred or required)"),
                });
                ok = false;
                TlsMode::default()
            }
        },
    };

    if !ok {
        return None;
    }

    Some(ConnectionConfig {
        host: raw.host.clone(),
        port: raw.port,
        user: raw.user.clone(),
        password: raw.password.clone(),
        database: raw.database.clone(),
        tls,
        max_connections: raw.max_connections.unwrap_or(10),
        max_idle_connections: raw.max_idle_connections.unwrap_or(5),
    })
}

fn validate_job(
    name: &str,
    raw: &RawJob,
    defaults: ProcessingDefaults,
    default_method: &str,
    default_skip: bool,
) -> Result<JobConfig, Vec<ConfigFieldError>> {
    let mut errors = Vec::new();
    let prefix = format!("jobs.{name}");

    if raw.root_table.trim().is_empty() {
        errors.push(ConfigFieldError {
            field_path: format!("{prefix}.root_table"),
            message: "required field is missing or empty".into(),
        });
    }
    if raw.primary_key.trim().is_empty() {
        errors.push(ConfigFieldError {
            field_path: format!("{prefix}.primary_key"),
            message: "required field is missing or empty".into(),
        });
    }
    if let Some(predicate) = &raw.where_clause {
        if let Err(msg) = validate_predicate(predicate) {
            errors.push(ConfigFieldError {
                field_path: format!("{prefix}.where"),
                message: msg,
            });
        }
    }

    let mut relations = Vec::new();
    for rel in &raw.relations {
        match to_relation_spec(&prefix, rel, &mut errors) {
            Some(spec) => relations.push(spec),
            None => {}
        }
    }

    let method_str = raw
        .verification
        .method
        .clone()
        .unwrap_or_else(|| default_method.to_string());
    let skip = raw.verification.skip_verification.unwrap_or(default_skip);
    let verification_method = if skip {
        VerificationMethodConfig::Skip
    } else {
        match method_str.as_str() {
            "count" => VerificationMethodConfig::Count,
            "sha256" => VerificationMethodConfig::Sha256,
            other => {
                errors.push(ConfigFieldError {
                    field_path: format!("{prefix}.verification.method"),
                    message: format!("unknown verification method `{other}` (expected count or sha256)"),
                });
                VerificationMethodConfig::Count
            }
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(JobConfig {
        name: name.to_string(),
        root_table: raw.root_table.clone(),
        primary_key: raw.primary_key.clone(),
        predicate: raw.where_clause.clone(),
        relations,
        batch_size: raw.processing.batch_size.unwrap_or(defaults.batch_size),
        batch_delete_size: raw
            .processing
            .batch_delete_size
            .unwrap_or(defaults.batch_delete_size),
        sleep_seconds: raw.processing.sleep_seconds.unwrap_or(defaults.sleep_seconds),
        discovery_chunk_size: raw
            .processing
            .discovery_chunk_size
            .unwrap_or(defaults.discovery_chunk_size),
        verification_chunk_size: raw.verification.chunk_size.unwrap_or(1000),
        verification_method,
    })
}

fn to_relation_spec(
    prefix: &str,
    raw: &RawRelation,
    errors: &mut Vec<ConfigFieldError>,
) -> Option<RelationSpec> {
    let mut ok = true;
    let pk = match &raw.primary_key {
        Some(pk) if !pk.trim().is_empty() => pk.clone(),
        _ => {
            errors.push(ConfigFieldError {
                field_path: format!("{prefix}.relations.{}.primary_key", raw.table),
                message: "required field is missing or empty".into(),
            });
            ok = false;
            String::new()
        }
    };
    let fk = match &raw.foreign_key {
        Some(fk) if !fk.trim().is_empty() => fk.clone(),
        _ => {
            errors.push(ConfigFieldError {
                field_path: format!("{prefix}.relations.{}.foreign_key", raw.table),
                message: "required field is missing or empty".into(),
            });
            ok = false;
            String::new()
        }
    };
    let dep_kind = match raw.dependency_type.as_deref() {
        None => None,
        Some("1-1") => Some("one-to-one".to_string()),
        Some("1-N") => Some("one-to-many".to_string()),
        Some(other) => {
            errors.push(ConfigFieldError {
                field_path: format!("{prefix}.relations.{}.dependency_type", raw.table),
                message: format!("unknown dependency_type `{other}` (expected 1-1 or 1-N)"),
            });
            ok = false;
            None
        }
    };

    if raw.table.trim().is_empty() {
        errors.push(ConfigFieldError {
            field_path: format!("{prefix}.relations.<unnamed>.table"),
            message: "required field is missing or empty".into(),
        });
        ok = false;
    }

    let mut children = Vec::new();
    for child in &raw.relations {
        if let Some(spec) = to_relation_spec(&format!("{prefix}.relations.{}", raw.table), child, errors) {
            children.push(spec);
        } else {
            ok = false;
        }
    }

    if !ok {
        return None;
    }

    Some(RelationSpec {
        table: raw.table.clone(),
        primary_key: pk,
        foreign_key: fk,
        dep_kind,
        children,
    })
}

/// Reject predicates containing statement terminators (`;`) or comment
/// introducers, per spec.md §9's "treat as trusted operator input, but
/// refuse predicates containing statement terminators" guidance.
fn validate_predicate(predicate: &str) -> Result<(), String> {
    if predicate.trim().is_empty() {
        return Err("where clause must not be empty".to_string());
    }
    if predicate.contains(';') {
        return Err("where clause must not contain a statement terminator (`;`)".to_string());
    }
    if predicate.contains("--") || predicate.contains("/*") {
        return Err("where clause must not contain a comment introducer".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> String {
        r#"
source:
  host: src.example.com
  port: 3306
  user: root
  password: secret
  database: app
destination:
  host: dst.example.com
  port: 3306
  user: root
  password: secret
  database: app_archive
jobs:
  cleanup:
    root_table: users
    primary_key: id
    where: "created_at < '2020-01-01'"
    relations:
      - table: orders
        primary_key: id
        foreign_key: user_id
        dependency_type: 1-N
"#
        .to_string()
    }

    #[test]
    fn loads_a_minimal_valid_config() {
        let config = Config::from_str(&minimal_yaml(), "test").unwrap();
        assert_eq!(config.jobs.len(), 1);
        let job = config.job("cleanup").unwrap();
        assert_eq!(job.root_table, "users");
        assert_eq!(job.relations.len(), 1);
        assert_eq!(job.relations[0].dep_kind.as_deref(), Some("one-to-many"));
        assert_eq!(job.batch_size, 1000);
    }

    #[test]
    fn rejects_empty_job_list() {
        let yaml = r#"
source: {host: h, port: 3306, user: u, database: d}
destination: {host: h, port: 3306, user: u, database: d}
jobs: {}
"#;
        let err = Config::from_str(yaml, "test").unwrap_err();
        match err {
            ConfigError::Invalid(fields) => {
                assert!(fields.iter().any(|f| f.field_path == "jobs"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_relation_primary_key() {
        let yaml = format!(
            "{}\n",
            r#"
source: {host: h, port: 3306, user: u, database: d}
destination: {host: h, port: 3306, user: u, database: d}
jobs:
  j:
    root_table: users
    primary_key: id
    relations:
      - table: orders
        foreign_key: user_id
"#
        );
        let err = Config::from_str(&yaml, "test").unwrap_err();
        match err {
            ConfigError::Invalid(fields) => {
                assert!(fields
                    .iter()
                    .any(|f| f.field_path.contains("primary_key")));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_tls_mode() {
        let yaml = r#"
source: {host: h, port: 3306, user: u, database: d, tls: maybe}
destination: {host: h, port: 3306, user: u, database: d}
jobs:
  j:
    root_table: users
    primary_key: id
"#;
        let err = Config::from_str(yaml, "test").unwrap_err();
        match err {
            ConfigError::Invalid(fields) => {
                assert!(fields.iter().any(|f| f.field_path == "source.tls"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn env_interpolation_resolves_password_from_environment() {
        std::env::set_var("DBARCHIVER_TEST_PW", "hunter2");
        let yaml = r#"
source: {host: h, port: 3306, user: u, database: d, password: "${DBARCHIVER_TEST_PW}"}
destination: {host: h, port: 3306, user: u, database: d}
jobs:
  j:
    root_table: users
    primary_key: id
"#;
        let config = Config::from_str(yaml, "test").unwrap();
        assert_eq!(config.source.password, "hunter2");
        std::env::remove_var("DBARCHIVER_TEST_PW");
    }

    #[test]
    fn rejects_predicate_with_statement_terminator() {
        let yaml = r#"
source: {host: h, port: 3306, user: u, database: d}
destination: {host: h, port: 3306, user: u, database: d}
jobs:
  j:
    root_table: users
    primary_key: id
    where: "id = 1; DROP TABLE users"
"#;
        let err = Config::from_str(yaml, "test").unwrap_err();
        match err {
            ConfigError::Invalid(fields) => {
                assert!(fields.iter().any(|f| f.field_path == "jobs.j.where"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }
}
