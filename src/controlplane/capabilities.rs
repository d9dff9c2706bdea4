//! Volume capability checks
//!
//! Shares are mounted over the network, so any access mode works but raw
//! block access does not.

use crate::domain::ports::{AccessMode, AccessType, ControllerCapability, VolumeCapability};
use crate::error::{Error, Result};

/// Access modes a network file share can serve
pub const SUPPORTED_ACCESS_MODES: [AccessMode; 5] = [
    AccessMode::SingleNodeWriter,
    AccessMode::SingleNodeReaderOnly,
    AccessMode::MultiNodeReaderOnly,
    AccessMode::MultiNodeSingleWriter,
    AccessMode::MultiNodeMultiWriter,
];

/// Capabilities advertised by the controller service
pub const CONTROLLER_CAPABILITIES: [ControllerCapability; 1] =
    [ControllerCapability::CreateDeleteVolume];

/// Reject any capability the driver cannot serve
pub fn validate_volume_capabilities(capabilities: &[VolumeCapability]) -> Result<()> {
    for capability in capabilities {
        if capability.access_type == AccessType::Block {
            return Err(Error::InvalidArgument(
                "driver does not support block volumes".into(),
            ));
        }
        if !SUPPORTED_ACCESS_MODES.contains(&capability.access_mode) {
            return Err(Error::InvalidArgument(format!(
                "driver does not support access mode {}",
                capability.access_mode
            )));
        }
    }
    Ok(())
}
