//! # memlist Configuration System
//!
//! Hierarchical configuration for the allocator, the stress workload and
//! telemetry.
//!
//! Hierarchy:
//! 1. Default values
//! 2. `config/memlist.yaml`, if present
//! 3. `MEMLIST_*` environment variables (`__` separates nested keys, e.g.
//!    `MEMLIST_ALLOCATOR__CAPACITY=4096`)

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod allocator;
mod error;
mod stress;
mod telemetry;
mod validation;

pub use allocator::AllocatorConfig;
pub use error::ConfigError;
pub use stress::StressConfig;
pub use telemetry::TelemetryConfig;
pub use validation::LOG_LEVELS;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/memlist.yaml";

const ENV_PREFIX: &str = "MEMLIST_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct MemlistConfig {
    /// Arena parameters.
    #[validate(nested)]
    #[serde(default)]
    pub allocator: AllocatorConfig,

    /// Concurrent stress workload.
    #[validate(nested)]
    #[serde(default)]
    pub stress: StressConfig,

    /// Logging output.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl MemlistConfig {
    /// Load configuration from the default file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(MemlistConfig::default()));
        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_PATH));
        }
        Self::finish(figment)
    }

    /// Load configuration from a specific file, then the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment =
            Figment::from(Serialized::defaults(MemlistConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    /// Checks that `threads * inserts_per_thread` nodes of `node_size`
    /// bytes fit in the arena, and that each insert can carry its own value
    /// out of `distinct_values` possible payloads.
    pub fn validate_fit(
        &self,
        node_size: usize,
        distinct_values: usize,
    ) -> Result<(), ConfigError> {
        let inserts = self.stress.total_inserts();
        if inserts > distinct_values {
            return Err(ConfigError::TooManyInserts {
                inserts,
                distinct: distinct_values,
            });
        }

        let required = inserts.saturating_mul(node_size);
        if required > self.allocator.capacity {
            return Err(ConfigError::WorkloadTooLarge {
                required,
                capacity: self.allocator.capacity,
            });
        }
        Ok(())
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }
}
