//! Provisioning Control Plane
//!
//! Decides whether a requested file share already exists, reserves address
//! blocks for new ones and encodes the volume ids handed back to callers.

pub mod api;
pub mod backends;
pub mod capabilities;
pub mod capacity;
pub mod controller;
pub mod metrics;
pub mod params;
pub mod volume_id;

pub use api::*;
pub use backends::*;
pub use controller::*;
pub use volume_id::ResourceIdentity;
