//! Volume Identifier Codec
//!
//! A volume id has the form `{provisioningMode}/{location}/{instanceName}/{volume}`.
//! Issued ids are persisted by callers, so the element order is fixed and new
//! elements may only be appended.

use crate::domain::ports::{InstanceRef, ServiceInstance};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const ID_SEPARATOR: &str = "/";

const ID_PROVISIONING_MODE: usize = 0;
const ID_LOCATION: usize = 1;
const ID_INSTANCE: usize = 2;
const ID_VOLUME: usize = 3;
/// Always last
const TOTAL_ID_ELEMENTS: usize = 4;

/// Decoded contents of a volume id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub provisioning_mode: String,
    pub location: String,
    pub name: String,
    pub sub_volume: String,
}

impl ResourceIdentity {
    /// Identity of the share exported by `instance`
    pub fn from_instance(instance: &ServiceInstance, mode: &str) -> Self {
        Self {
            provisioning_mode: mode.to_string(),
            location: instance.location.clone(),
            name: instance.name.clone(),
            sub_volume: instance.volume.name.clone(),
        }
    }

    /// Reference to the backing instance inside `project`
    pub fn instance_ref(&self, project: &str) -> InstanceRef {
        InstanceRef {
            project: project.to_string(),
            location: self.location.clone(),
            name: self.name.clone(),
        }
    }

    /// Encode into the opaque id string
    pub fn encode(&self) -> String {
        let mut elements = vec![""; TOTAL_ID_ELEMENTS];
        elements[ID_PROVISIONING_MODE] = self.provisioning_mode.as_str();
        elements[ID_LOCATION] = self.location.as_str();
        elements[ID_INSTANCE] = self.name.as_str();
        elements[ID_VOLUME] = self.sub_volume.as_str();
        elements.join(ID_SEPARATOR)
    }

    /// Decode an opaque id string.
    ///
    /// Only the element count is checked; empty elements are passed through.
    pub fn decode(id: &str) -> Result<Self> {
        let tokens: Vec<&str> = id.split(ID_SEPARATOR).collect();
        if tokens.len() != TOTAL_ID_ELEMENTS {
            return Err(Error::MalformedIdentifier {
                id: id.to_string(),
                tokens: tokens.len(),
            });
        }

        Ok(Self {
            provisioning_mode: tokens[ID_PROVISIONING_MODE].to_string(),
            location: tokens[ID_LOCATION].to_string(),
            name: tokens[ID_INSTANCE].to_string(),
            sub_volume: tokens[ID_VOLUME].to_string(),
        })
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}
