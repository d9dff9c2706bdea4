//! Collaborator Adapters
//!
//! Implementations of the domain ports usable without a cloud account:
//! - InMemoryFileService: file share instances kept in process memory
//! - StaticMetadata: project and zone taken from configuration

pub mod memory;

pub use memory::*;

use crate::config::DriverConfig;
use crate::domain::ports::MetadataService;

/// Metadata source returning fixed values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMetadata {
    project: String,
    zone: String,
}

impl StaticMetadata {
    pub fn new(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
        }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.project.clone(), config.zone.clone())
    }
}

impl MetadataService for StaticMetadata {
    fn project(&self) -> String {
        self.project.clone()
    }

    fn zone(&self) -> String {
        self.zone.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_metadata_from_config() {
        let config = DriverConfig::default();
        let metadata = StaticMetadata::from_config(&config);
        assert_eq!(metadata.project(), config.project);
        assert_eq!(metadata.zone(), "us-central1-a");
    }
}
