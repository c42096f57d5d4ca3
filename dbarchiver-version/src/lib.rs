//! A single place to read the crate version from, so the CLI's `version`
//! subcommand and its `--version` clap output never drift from each other.

/// The crate version, as declared in this crate's `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A longer, human-oriented version string including the target triple the
/// binary was built for.
pub fn version_string() -> String {
    format!("dbarchiver {VERSION} ({})", std::env::consts::ARCH)
}
