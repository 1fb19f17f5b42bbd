//! Concurrent stress workload parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StressConfig {
    /// Number of inserting threads.
    #[serde(default = "default_threads")]
    #[validate(range(min = 1, max = 256))]
    pub threads: usize,

    /// Inserts performed by each thread.
    #[serde(default = "default_inserts")]
    #[validate(range(min = 1, max = 1000000))]
    pub inserts_per_thread: usize,
}

fn default_threads() -> usize {
    4
}

fn default_inserts() -> usize {
    256
}

impl StressConfig {
    /// Nodes the workload leaves in the list.
    pub fn total_inserts(&self) -> usize {
        self.threads.saturating_mul(self.inserts_per_thread)
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            inserts_per_thread: default_inserts(),
        }
    }
}
