//! Driver configuration
//!
//! Defaults match the behavior of the remote file API's standard tier. A YAML
//! file may override any field; CLI flags override the file.

use crate::controlplane::capacity::MIN_VOLUME_SIZE_BYTES;
use crate::error::{Error, Result};
use crate::network::allocation::DEFAULT_BLOCK_PREFIX_LEN;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Provisioning mode embedded in volume ids for one-share-per-instance volumes
pub const MODE_INSTANCE: &str = "modeInstance";

/// Share name given to the single share of a new instance
pub const NEW_INSTANCE_VOLUME: &str = "vol1";

pub const DEFAULT_TIER: &str = "standard";
pub const DEFAULT_NETWORK: &str = "default";

/// Configuration for the provisioning controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverConfig {
    /// Name the driver registers under
    pub driver_name: String,
    /// Version reported alongside the driver name
    pub driver_version: String,
    /// Project the driver provisions into
    pub project: String,
    /// Zone used when a request has no location parameter
    pub zone: String,
    /// Tier used when a request has no tier parameter
    pub default_tier: String,
    /// Network used when a request has no network parameter
    pub default_network: String,
    /// Capacity floor applied to requests
    pub min_volume_size_bytes: u64,
    /// Prefix length of reserved address blocks
    pub reserved_block_prefix_len: u8,
    /// Provisioning mode written into new volume ids
    pub provisioning_mode: String,
    /// Share name for new instances
    pub share_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            driver_name: "filer.csi.billyronks.io".to_string(),
            driver_version: env!("CARGO_PKG_VERSION").to_string(),
            project: "default-project".to_string(),
            zone: "us-central1-a".to_string(),
            default_tier: DEFAULT_TIER.to_string(),
            default_network: DEFAULT_NETWORK.to_string(),
            min_volume_size_bytes: MIN_VOLUME_SIZE_BYTES,
            reserved_block_prefix_len: DEFAULT_BLOCK_PREFIX_LEN,
            provisioning_mode: MODE_INSTANCE.to_string(),
            share_name: NEW_INSTANCE_VOLUME.to_string(),
        }
    }
}

impl DriverConfig {
    /// Load configuration from a YAML file; missing fields take defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the controller relies on
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("driverName", &self.driver_name),
            ("driverVersion", &self.driver_version),
            ("project", &self.project),
            ("zone", &self.zone),
            ("defaultTier", &self.default_tier),
            ("defaultNetwork", &self.default_network),
            ("provisioningMode", &self.provisioning_mode),
            ("shareName", &self.share_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{} must not be empty", field)));
            }
            if value.contains('/') {
                return Err(Error::Configuration(format!(
                    "{} must not contain '/': {:?}",
                    field, value
                )));
            }
        }

        if self.min_volume_size_bytes == 0 {
            return Err(Error::Configuration(
                "minVolumeSizeBytes must be greater than zero".into(),
            ));
        }

        if !(1..=32).contains(&self.reserved_block_prefix_len) {
            return Err(Error::Configuration(format!(
                "reservedBlockPrefixLen must be within 1..=32, got {}",
                self.reserved_block_prefix_len
            )));
        }

        Ok(())
    }
}
