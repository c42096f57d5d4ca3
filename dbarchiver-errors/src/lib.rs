//! Error taxonomy shared across all dbarchiver crates.
//!
//! Every fallible boundary in this workspace returns (or wraps) one of the
//! variants below. Crates closer to the database own their own leaf error
//! types and fold them into [`ArchiverError`] at the point where a phase or
//! the orchestrator needs a single type to propagate.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// One node name in a [`Graph`](../dbarchiver_graph/struct.Graph.html).
pub type TableName = String;

/// Diagnostic payload attached to [`GraphError::Cycle`].
///
/// Only one concrete cycle path is reported even when multiple independent
/// cycles exist in the graph; `participants` is still the full set of nodes
/// that lie on *some* cycle, closed under the graph's edges restricted to
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleInfo {
    /// Total number of nodes in the graph.
    pub total_nodes: usize,
    /// Number of nodes Kahn's algorithm was able to process before stalling.
    pub processed: usize,
    /// Nodes left over after Kahn's algorithm stalled.
    pub unprocessed: Vec<TableName>,
    /// Subset of `unprocessed` that is self-reachable within the unprocessed
    /// set — i.e. actually sits on a cycle, as opposed to being blocked by
    /// one.
    pub on_cycle: Vec<TableName>,
    /// One concrete cycle, `path[0] == path[path.len() - 1]`.
    pub cycle_path: Vec<TableName>,
}

impl fmt::Display for CycleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle detected among {} of {} nodes: {}",
            self.on_cycle.len(),
            self.total_nodes,
            self.cycle_path.join(" -> ")
        )
    }
}

/// Errors raised while building or ordering a [`Graph`](../dbarchiver_graph/struct.Graph.html).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("table name must not be empty")]
    EmptyTableName,

    #[error("table `{0}` is declared more than once")]
    DuplicateTable(TableName),

    #[error("relation `{0}` has no primary_key declared")]
    MissingPrimaryKey(TableName),

    #[error("relation `{0}` has no foreign_key declared")]
    MissingForeignKey(TableName),

    #[error("relation `{table}` has unknown dependency_type `{value}` (expected one-to-one or one-to-many)")]
    InvalidDependencyType { table: TableName, value: String },

    #[error("unknown table `{0}` referenced by relation")]
    UnknownTable(TableName),

    #[error("{0}")]
    Cycle(CycleInfo),
}

/// A single field-level configuration problem, used to build
/// [`ConfigError::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFieldError {
    pub field_path: String,
    pub message: String,
}

impl fmt::Display for ConfigFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field_path, self.message)
    }
}

/// Errors raised while loading or validating the YAML configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse config file `{path}`: {message}")]
    Parse { path: String, message: String },

    #[error("{} configuration error(s): {}", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<ConfigFieldError>),

    #[error("unknown job `{0}`")]
    UnknownJob(TableName),

    #[error("no jobs defined in configuration")]
    NoJobs,
}

/// Per-table readiness failure surfaced by `PreflightChecker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightFinding {
    pub table: TableName,
    pub problem: String,
}

impl fmt::Display for PreflightFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.table, self.problem)
    }
}

/// Errors raised by the `PreflightChecker`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreflightError {
    #[error("{} preflight check(s) failed: {}", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Failed(Vec<PreflightFinding>),
}

/// Errors raised by `AdvisoryLock`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("job `{job}` is already locked by another process (waited {waited:?})")]
    Timeout { job: TableName, waited: Duration },

    #[error("failed to acquire lock for job `{job}`: {message}")]
    Backend { job: TableName, message: String },
}

/// A database error that the connection layer decided was worth retrying
/// and ultimately could not recover from. `attempts` is always >= 1.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transient database error after {attempts} attempt(s): {message}")]
pub struct TransientDbError {
    pub attempts: u32,
    pub message: String,
}

/// Which phase of a batch a [`PhaseError`] occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Discovery,
    Copy,
    Verify,
    Delete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Discovery => "discovery",
            Phase::Copy => "copy",
            Phase::Verify => "verify",
            Phase::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A fatal failure of one of the per-batch phases. Always aborts the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{phase} failed for table `{table}`: {message}")]
pub struct PhaseError {
    pub phase: Phase,
    pub table: TableName,
    pub message: String,
}

/// Verification method used to produce a [`VerificationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMethod {
    Count,
    Sha256,
    Skip,
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerificationMethod::Count => "count",
            VerificationMethod::Sha256 => "sha256",
            VerificationMethod::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Outcome of verifying a single table between source and destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub table: TableName,
    pub method: VerificationMethod,
    pub source_count: u64,
    pub dest_count: u64,
    pub source_digest: Option<String>,
    pub dest_digest: Option<String>,
    pub is_match: bool,
    pub error: Option<String>,
}

/// Raised when `Verifier::verify` finds at least one mismatched table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("verification mismatch in {} table(s)", .0.iter().filter(|r| !r.is_match).count())]
pub struct VerificationMismatch(pub Vec<VerificationResult>);

/// The single top-level error type returned from the orchestrator and the
/// CLI. Every leaf error type above folds into this one via `#[from]`.
#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Transient(#[from] TransientDbError),

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error(transparent)]
    Verification(#[from] VerificationMismatch),

    #[error("database error: {0}")]
    Database(#[from] mysql_async::Error),

    /// Cooperative shutdown. Not treated as a run failure: the orchestrator
    /// reports "cancelled" and exits 0.
    #[error("run cancelled")]
    Cancelled,
}

impl ArchiverError {
    /// True for [`ArchiverError::Cancelled`], which the CLI reports as a
    /// successful (exit code 0) cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ArchiverError::Cancelled)
    }
}
