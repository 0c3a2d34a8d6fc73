//! Engine tuning knobs.

use serde::Deserialize;

/// Configuration for one [`crate::AcquisitionEngine`].
///
/// Every field has a default matching long-standing production values;
/// the pool ceiling in particular trades memory headroom for fast
/// startup and is deliberately far below what the driver could address.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Bounded frame-queue depth between EOF callback and writer
    /// thread (default: 64). A full queue drops the newest frame.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Writer-thread wait timeout in milliseconds (default: 5000).
    #[serde(default = "default_writer_timeout_ms")]
    pub writer_timeout_ms: u64,

    /// Consecutive writer timeouts before the session is flagged as
    /// stalled (default: 3).
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: u32,

    /// Frames pre-constructed per session (default: 8).
    #[serde(default = "default_pool_initial")]
    pub pool_initial: usize,

    /// Expected frame-pool growth ceiling (default: 1000).
    #[serde(default = "default_pool_ceiling")]
    pub pool_ceiling: usize,

    /// Worker threads for parallel pixel work and bulk copies
    /// (default: 4).
    #[serde(default = "default_copy_threads")]
    pub copy_threads: usize,
}

fn default_queue_capacity() -> usize {
    64
}
fn default_writer_timeout_ms() -> u64 {
    5000
}
fn default_stall_threshold() -> u32 {
    3
}
fn default_pool_initial() -> usize {
    8
}
fn default_pool_ceiling() -> usize {
    cam_core::buffer::DEFAULT_POOL_CEILING
}
fn default_copy_threads() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            writer_timeout_ms: 5000,
            stall_threshold: 3,
            pool_initial: 8,
            pool_ceiling: cam_core::buffer::DEFAULT_POOL_CEILING,
            copy_threads: 4,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.queue_capacity, 64);
        assert_eq!(cfg.writer_timeout_ms, 5000);
        assert_eq!(cfg.stall_threshold, 3);
        assert_eq!(cfg.pool_ceiling, 1000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = EngineConfig::from_toml_str("queue_capacity = 16\ncopy_threads = 2\n").unwrap();
        assert_eq!(cfg.queue_capacity, 16);
        assert_eq!(cfg.copy_threads, 2);
        assert_eq!(cfg.writer_timeout_ms, 5000);
        assert_eq!(cfg.pool_initial, 8);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.pool_ceiling, EngineConfig::default().pool_ceiling);
    }
}
