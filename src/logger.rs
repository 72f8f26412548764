//! Tracing setup for the server.
//!
//! Precedence: a CLI `-v` level, then the config `log_level` (already merged
//! with `AI_AGENT_LOG_LEVEL`). `RUST_LOG` is only the fallback when that
//! level is blank or not a valid directive.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Install the global subscriber, writing to stderr. Call once.
///
/// `level` is a plain level (`"info"`) or a full directive such as
/// `"ai_agent=debug,reqwest=warn"`.
pub fn init(level: &str) -> Result<(), AppError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = select_filter(level, rust_log.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

fn select_filter(level: &str, rust_log: Option<&str>) -> Result<EnvFilter, AppError> {
    let configured = match level.trim() {
        "" => Err("log level is empty".to_string()),
        l => EnvFilter::try_new(l).map_err(|e| format!("invalid log level '{l}': {e}")),
    };
    configured.or_else(|first| match rust_log.map(str::trim) {
        Some(d) if !d.is_empty() => EnvFilter::try_new(d)
            .map_err(|e| AppError::Logger(format!("{first}; invalid RUST_LOG '{d}': {e}"))),
        _ => Err(AppError::Logger(format!("{first}; RUST_LOG not set"))),
    })
}

/// Strict check of a bare level name. Config loading uses it so a typo such
/// as `"verbose"` fails at startup instead of silently filtering everything.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}
