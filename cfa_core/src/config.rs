//! Construction settings for compressed arrays

use serde::{Deserialize, Serialize};

/// Rate used when none is configured, in bits per value.
pub const DEFAULT_RATE: f64 = 16.0;

/// Array construction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    /// Requested rate in bits per value; the achieved rate may be higher
    pub rate: f64,
    /// Cache size in bytes (0 = derived from the block count)
    pub cache_size: usize,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            cache_size: 0,
        }
    }
}

impl ArrayConfig {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            ..Self::default()
        }
    }

    pub fn with_cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = bytes;
        self
    }
}
