//! Domain Ports - Core types and collaborator traits for the provisioner
//!
//! The controller depends only on these traits. The remote file API and the
//! metadata source are adapters living behind them.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Backing Instance Types
// =============================================================================

/// Network attachment of a backing instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// VPC network name
    pub name: String,
    /// Address block reserved for the instance (e.g. `10.0.0.8/29`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_ip_range: Option<String>,
    /// Address clients mount from, assigned by the remote API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// File share exported by a backing instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileShare {
    /// Share name (the sub-volume)
    pub name: String,
    /// Share capacity in bytes
    pub size_bytes: u64,
}

/// A network file share instance as known to the remote API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub project: String,
    pub location: String,
    pub name: String,
    pub tier: String,
    pub network: Network,
    pub volume: FileShare,
}

impl ServiceInstance {
    /// Reference used to look this instance up
    pub fn instance_ref(&self) -> InstanceRef {
        InstanceRef {
            project: self.project.clone(),
            location: self.location.clone(),
            name: self.name.clone(),
        }
    }
}

/// Key of a single backing instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceRef {
    pub project: String,
    pub location: String,
    pub name: String,
}

impl std::fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/instances/{}",
            self.project, self.location, self.name
        )
    }
}

/// Filter for listing instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListScope {
    pub project: String,
    pub location: String,
}

// =============================================================================
// Volume Capabilities
// =============================================================================

/// Access mode requested for a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    SingleNodeWriter,
    SingleNodeReaderOnly,
    MultiNodeReaderOnly,
    MultiNodeSingleWriter,
    MultiNodeMultiWriter,
    Unknown,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::SingleNodeWriter => write!(f, "single-node-writer"),
            AccessMode::SingleNodeReaderOnly => write!(f, "single-node-reader-only"),
            AccessMode::MultiNodeReaderOnly => write!(f, "multi-node-reader-only"),
            AccessMode::MultiNodeSingleWriter => write!(f, "multi-node-single-writer"),
            AccessMode::MultiNodeMultiWriter => write!(f, "multi-node-multi-writer"),
            AccessMode::Unknown => write!(f, "unknown"),
        }
    }
}

/// How the volume is consumed by a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AccessType {
    #[serde(rename_all = "camelCase")]
    Mount {
        #[serde(default)]
        fs_type: String,
        #[serde(default)]
        mount_flags: Vec<String>,
    },
    Block,
}

impl Default for AccessType {
    fn default() -> Self {
        AccessType::Mount {
            fs_type: String::new(),
            mount_flags: Vec::new(),
        }
    }
}

/// A single requested capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeCapability {
    #[serde(default)]
    pub access_type: AccessType,
    pub access_mode: AccessMode,
}

impl VolumeCapability {
    /// Filesystem mount with the given access mode
    pub fn mount(access_mode: AccessMode) -> Self {
        Self {
            access_type: AccessType::default(),
            access_mode,
        }
    }
}

/// Capabilities advertised by the controller service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControllerCapability {
    CreateDeleteVolume,
}

// =============================================================================
// Requests / Responses
// =============================================================================

/// Requested capacity bounds. Zero means "not set".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityRange {
    #[serde(default)]
    pub required_bytes: u64,
    #[serde(default)]
    pub limit_bytes: u64,
}

/// Request to create (or idempotently re-create) a volume
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeRequest {
    pub name: String,
    #[serde(default)]
    pub capacity_range: Option<CapacityRange>,
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// A provisioned volume as returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub volume_id: String,
    pub capacity_bytes: u64,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVolumeRequest {
    pub volume_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateVolumeCapabilitiesRequest {
    pub volume_id: String,
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
}

/// Outcome of a capability check against an existing volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateVolumeCapabilitiesResponse {
    pub supported: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

// =============================================================================
// File Service Port
// =============================================================================

/// Port for the remote file share management API
///
/// Implementations report a missing instance with an error for which
/// [`crate::Error::is_not_found`] holds, and treat deleting a missing
/// instance as success.
#[async_trait]
pub trait FileService: Send + Sync {
    /// Fetch a single instance
    async fn get_instance(&self, instance: &InstanceRef) -> Result<ServiceInstance>;

    /// List every instance within a scope
    async fn list_instances(&self, scope: &ListScope) -> Result<Vec<ServiceInstance>>;

    /// Create an instance and wait for the operation to finish
    async fn create_instance(&self, instance: &ServiceInstance) -> Result<ServiceInstance>;

    /// Delete an instance
    async fn delete_instance(&self, instance: &InstanceRef) -> Result<()>;
}

// =============================================================================
// Metadata Port
// =============================================================================

/// Port for the environment the controller runs in
pub trait MetadataService: Send + Sync {
    fn project(&self) -> String;

    fn zone(&self) -> String;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type FileServiceRef = Arc<dyn FileService>;
pub type MetadataServiceRef = Arc<dyn MetadataService>;
