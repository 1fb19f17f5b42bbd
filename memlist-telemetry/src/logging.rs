//! ## memlist-telemetry::logging
//! **`tracing` subscriber set-up**
//!
//! `RUST_LOG` takes precedence over the configured level.

use memlist_config::TelemetryConfig;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct Logger;

impl Logger {
    /// Installs the global subscriber. Returns `false` if one was already
    /// installed, in which case the existing subscriber stays in place.
    pub fn init(config: &TelemetryConfig) -> bool {
        let builder = fmt()
            .with_env_filter(Self::filter(config))
            .with_thread_names(true);

        let installed = if config.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        installed.is_ok()
    }

    fn filter(config: &TelemetryConfig) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_keeps_first_subscriber() {
        let config = TelemetryConfig::default();
        Logger::init(&config);
        assert!(!Logger::init(&TelemetryConfig {
            json: true,
            ..config
        }));
        tracing::info!("subscriber installed");
    }
}
