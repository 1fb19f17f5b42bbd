//! Arena sizing.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Allocator configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct AllocatorConfig {
    /// Arena capacity in bytes.
    #[serde(default = "default_capacity")]
    #[validate(range(min = 16, max = 1073741824))]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    65536
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}
