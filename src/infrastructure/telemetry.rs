use crate::infrastructure::config::CalendarConfig;
use crate::infrastructure::error::CalendarError;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber for hosts that do not bring their own, using the
/// `logFilter` from `calendar.json`.
pub fn init_tracing_from_config(config: &CalendarConfig) -> Result<(), CalendarError> {
    init_tracing(&config.log_filter)
}

/// `RUST_LOG` wins over `default_filter`. Fails instead of panicking when a
/// global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), CalendarError> {
    let filter = resolve_filter(std::env::var("RUST_LOG").ok().as_deref(), default_filter)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|error| CalendarError::InvalidConfig(format!("tracing subscriber already installed: {error}")))
}

fn resolve_filter(env_filter: Option<&str>, default_filter: &str) -> Result<EnvFilter, CalendarError> {
    if let Some(filter) = env_filter.and_then(|value| EnvFilter::try_new(value).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(default_filter).map_err(|error| {
        CalendarError::InvalidConfig(format!("invalid log filter '{default_filter}': {error}"))
    })
}
