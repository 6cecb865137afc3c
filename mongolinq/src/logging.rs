use std::env;
use tracing::Level;
use tracing_subscriber::filter::EnvFilter;

/// Installs a fmt subscriber filtered by the `LOG_LEVEL` environment variable
/// (default `info`). Calling it again after a subscriber is installed does
/// nothing.
pub fn init_logger() {
    let log_level_str = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let log_level = log_level_str.parse::<Level>().unwrap_or(Level::INFO);
    let env_filter = EnvFilter::new(log_level_str);

    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_ok()
    {
        tracing::info!("Logger initialized with level: {}", log_level);
    }
}
