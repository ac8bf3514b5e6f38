//! Tracing setup shared by the binaries.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::AegisResult;

/// Initialize the global tracing subscriber. `RUST_LOG` overrides the
/// configured level. Safe to call once per process.
pub fn init(config: &LoggingConfig) -> AegisResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    if config.json_format {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }
    Ok(())
}
