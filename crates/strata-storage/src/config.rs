//! Storage Configuration
//!
//! This module defines configuration for the WAL channel and the read path.
//!
//! ## WalChannelConfig
//!
//! - **recovery_mode**: Reopen an existing WAL and trust its on-disk size and header (default: false)
//! - **direct_io**: Open the device with `O_DIRECT` (default: true, Linux only)
//! - **init_staging_buffer_size**: Initial per-worker staging buffer, 0 allocates on demand (default: 0)
//! - **max_staging_buffer_size**: Upper bound for a staging buffer, 0 means unlimited (default: 0)
//!
//! ## InflightReadConfig
//!
//! - **max_inflight_read_bytes**: Raw inflight read budget (default: 256MB)
//! - **max_merge_read_sparsity_rate**: Fraction of merged reads expected to be
//!   padding; the effective budget is scaled by `1 - rate` (default: 0.5)
//!
//! ## Usage
//!
//! ```ignore
//! use strata_storage::StorageConfig;
//!
//! // Production: block device, direct I/O
//! let config = StorageConfig::default();
//!
//! // Tests on tmpfs: no O_DIRECT, small budget
//! let config: StorageConfig = serde_json::from_str(r#"{
//!     "wal": { "direct_io": false },
//!     "inflight_read": { "max_inflight_read_bytes": 1048576 }
//! }"#)?;
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// WAL device channel configuration
    #[serde(default)]
    pub wal: WalChannelConfig,

    /// Inflight read admission configuration
    #[serde(default)]
    pub inflight_read: InflightReadConfig,

    /// Object key prefix for stream data objects (default: "data")
    #[serde(default = "default_object_key_prefix")]
    pub object_key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalChannelConfig {
    /// Open an existing WAL instead of initializing a new one
    #[serde(default)]
    pub recovery_mode: bool,

    /// Use O_DIRECT for device I/O
    #[serde(default = "default_direct_io")]
    pub direct_io: bool,

    /// Initial staging buffer size in bytes (0 = allocate on demand)
    #[serde(default)]
    pub init_staging_buffer_size: u64,

    /// Maximum staging buffer size in bytes (0 = no limit)
    #[serde(default)]
    pub max_staging_buffer_size: u64,
}

impl Default for WalChannelConfig {
    fn default() -> Self {
        Self {
            recovery_mode: false,
            direct_io: default_direct_io(),
            init_staging_buffer_size: 0,
            max_staging_buffer_size: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflightReadConfig {
    /// Raw inflight read budget in bytes (default: 256MB)
    #[serde(default = "default_max_inflight_read_bytes")]
    pub max_inflight_read_bytes: u64,

    /// Expected padding ratio of merged reads (default: 0.5)
    #[serde(default = "default_max_merge_read_sparsity_rate")]
    pub max_merge_read_sparsity_rate: f64,
}

impl InflightReadConfig {
    /// Budget actually enforced by the throttle.
    pub fn effective_max_bytes(&self) -> u64 {
        let rate = self.max_merge_read_sparsity_rate.clamp(0.0, 1.0);
        (self.max_inflight_read_bytes as f64 * (1.0 - rate)) as u64
    }
}

impl Default for InflightReadConfig {
    fn default() -> Self {
        Self {
            max_inflight_read_bytes: default_max_inflight_read_bytes(),
            max_merge_read_sparsity_rate: default_max_merge_read_sparsity_rate(),
        }
    }
}

fn default_object_key_prefix() -> String {
    "data".to_string()
}

fn default_direct_io() -> bool {
    true
}

fn default_max_inflight_read_bytes() -> u64 {
    256 * 1024 * 1024 // 256MB
}

fn default_max_merge_read_sparsity_rate() -> f64 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert!(!config.wal.recovery_mode);
        assert!(config.wal.direct_io);
        assert_eq!(config.wal.max_staging_buffer_size, 0);
        assert_eq!(config.inflight_read.max_inflight_read_bytes, 256 * 1024 * 1024);
    }

    #[test]
    fn test_effective_budget_scaled_by_sparsity() {
        let config = InflightReadConfig::default();
        assert_eq!(config.effective_max_bytes(), 128 * 1024 * 1024);

        let dense = InflightReadConfig {
            max_inflight_read_bytes: 1000,
            max_merge_read_sparsity_rate: 0.0,
        };
        assert_eq!(dense.effective_max_bytes(), 1000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StorageConfig = serde_json::from_str(
            r#"{"wal": {"direct_io": false}, "inflight_read": {"max_inflight_read_bytes": 4096}}"#,
        )
        .unwrap();
        assert!(!config.wal.direct_io);
        assert_eq!(config.wal.init_staging_buffer_size, 0);
        assert_eq!(config.inflight_read.max_inflight_read_bytes, 4096);
        assert_eq!(config.inflight_read.max_merge_read_sparsity_rate, 0.5);
        assert_eq!(config.object_key_prefix, "data");
    }
}
