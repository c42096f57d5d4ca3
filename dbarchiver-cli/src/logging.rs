use dbarchiver_config::LoggingConfig;
use tracing_subscriber::filter::EnvFilter;

/// Initialize `tracing-subscriber` from the resolved `logging` config (CLI
/// flags already applied on top of YAML by `Config::apply_cli_overrides`).
/// `format: json` selects structured output; anything else falls back to
/// the human-oriented `fmt` layer.
pub fn init(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
