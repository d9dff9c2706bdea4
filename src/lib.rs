//! Filer Provisioner - Idempotent Control Plane for Network File Shares
//!
//! Creates and deletes network file share instances on behalf of a container
//! orchestrator. Every request may be retried, so create is idempotent per
//! name and delete treats a missing instance as success.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          REST API (axum)                                     │
//! │     /v1/volumes   /v1/volumes/delete   /v1/volumes/validate   /metrics       │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                      Provisioning Controller                                 │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │   Parameters    │  │    Capacity     │  │      Volume Id Codec        │  │
//! │  │   & Spec Check  │  │    Resolver     │  │  mode/location/name/share   │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────────┘  │
//! │                                │                                             │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │   IP Range Allocator  │                                │
//! │                    │ (pending /29 blocks)  │                                │
//! │                    └───────────────────────┘                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                          Domain Ports                                        │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────────┐   │
//! │  │        FileService          │  │          MetadataService            │   │
//! │  │  (remote file share API)    │  │        (project / zone)             │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Provisioning controller, REST API and adapters
//! - [`network`]: Address block allocation
//! - [`config`]: Driver configuration
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod network;

// Re-export commonly used types
pub use config::DriverConfig;

pub use controlplane::{
    ApiServer, ApiServerConfig, ControllerServer, InMemoryFileService, ResourceIdentity,
    RestRouter, StaticMetadata,
};

pub use domain::ports::{
    AccessMode, AccessType, CapacityRange, CreateVolumeRequest, DeleteVolumeRequest,
    FileService, MetadataService, ServiceInstance, ValidateVolumeCapabilitiesRequest,
    ValidateVolumeCapabilitiesResponse, Volume, VolumeCapability,
};

pub use error::{Code, Error, Result};

pub use network::{IpRangeAllocator, ReservedRange};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
