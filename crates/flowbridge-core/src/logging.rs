use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "FLOWBRIDGE_LOG";

const DEFAULT_FILTER: &str = "info";

/// Installs the global fmt subscriber. `FLOWBRIDGE_LOG` wins over
/// `configured`, which wins over `info`. Returns `false` when a subscriber was
/// already installed.
pub fn init_tracing(configured: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(resolve_filter(configured))
        .with_target(false)
        .try_init()
        .is_ok()
}

fn resolve_filter(configured: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV_VAR) {
        return filter;
    }
    configured
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
