//! CreateVolume parameter handling
//!
//! Parameters are matched case-insensitively. Unknown keys are rejected so
//! that a typo in a storage class fails loudly instead of provisioning with
//! defaults.

use crate::config::DriverConfig;
use crate::controlplane::volume_id::ID_SEPARATOR;
use crate::domain::ports::{FileShare, InstanceRef, ListScope, Network, ServiceInstance};
use crate::error::{Error, Result};
use crate::network::allocation::parse_pool;
use ipnet::Ipv4Net;
use std::collections::BTreeMap;

pub const PARAM_TIER: &str = "tier";
pub const PARAM_LOCATION: &str = "location";
pub const PARAM_NETWORK: &str = "network";
pub const PARAM_RESERVED_IPV4_CIDR: &str = "reserved-ipv4-cidr";
pub const PARAM_RESERVED_ADDRESS_POOL: &str = "reserved-address-pool";

/// Provisioner secret references; consumed by the sidecar, ignored here
const PARAM_PROVISIONER_SECRET_NAME: &str = "csiprovisionersecretname";
const PARAM_PROVISIONER_SECRET_NAMESPACE: &str = "csiprovisionersecretnamespace";

/// Fully resolved description of the instance a request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpec {
    pub project: String,
    pub location: String,
    pub name: String,
    pub tier: String,
    pub network: String,
    pub share_name: String,
    pub size_bytes: u64,
    /// CIDR pool to carve the instance's address block from
    pub address_pool: Option<String>,
}

impl ResolvedSpec {
    /// Build the spec for `name` from request parameters, filling defaults
    /// from `config` and the current project/zone.
    pub fn from_parameters(
        name: &str,
        size_bytes: u64,
        params: &BTreeMap<String, String>,
        config: &DriverConfig,
        project: String,
        zone: String,
    ) -> Result<Self> {
        let mut spec = Self {
            project,
            location: zone,
            name: name.to_string(),
            tier: config.default_tier.clone(),
            network: config.default_network.clone(),
            share_name: config.share_name.clone(),
            size_bytes,
            address_pool: None,
        };

        for (key, value) in params {
            match key.to_lowercase().as_str() {
                // The remote API validates these
                PARAM_TIER => spec.tier = value.clone(),
                PARAM_LOCATION => spec.location = value.clone(),
                PARAM_NETWORK => spec.network = value.clone(),
                PARAM_RESERVED_IPV4_CIDR | PARAM_RESERVED_ADDRESS_POOL => {
                    parse_pool(value, config.reserved_block_prefix_len)?;
                    spec.address_pool = Some(value.clone());
                }
                PARAM_PROVISIONER_SECRET_NAME | PARAM_PROVISIONER_SECRET_NAMESPACE => {}
                _ => {
                    return Err(Error::InvalidArgument(format!("invalid parameter {:?}", key)));
                }
            }
        }

        // Both end up in the volume id; a separator or an empty value would
        // make the id undecodable and the instance undeletable.
        check_id_field("name", &spec.name)?;
        check_id_field(PARAM_LOCATION, &spec.location)?;

        Ok(spec)
    }

    pub fn instance_ref(&self) -> InstanceRef {
        InstanceRef {
            project: self.project.clone(),
            location: self.location.clone(),
            name: self.name.clone(),
        }
    }

    pub fn list_scope(&self) -> ListScope {
        ListScope {
            project: self.project.clone(),
            location: self.location.clone(),
        }
    }

    /// Instance to hand to the remote create call
    pub fn to_instance(&self, reserved_block: Option<Ipv4Net>) -> ServiceInstance {
        ServiceInstance {
            project: self.project.clone(),
            location: self.location.clone(),
            name: self.name.clone(),
            tier: self.tier.clone(),
            network: Network {
                name: self.network.clone(),
                reserved_ip_range: reserved_block.map(|b| b.to_string()),
                ip: None,
            },
            volume: FileShare {
                name: self.share_name.clone(),
                size_bytes: self.size_bytes,
            },
        }
    }

    /// Check that an existing instance satisfies this spec.
    ///
    /// The reserved block is not compared: it is chosen by the allocator and
    /// differs between otherwise identical requests.
    pub fn check_compatible(&self, existing: &ServiceInstance) -> Result<()> {
        let mut mismatches = Vec::new();

        if !self.tier.eq_ignore_ascii_case(&existing.tier) {
            mismatches.push(format!("tier {:?} != {:?}", existing.tier, self.tier));
        }
        if self.location != existing.location {
            mismatches.push(format!(
                "location {:?} != {:?}",
                existing.location, self.location
            ));
        }
        if self.network != existing.network.name {
            mismatches.push(format!(
                "network {:?} != {:?}",
                existing.network.name, self.network
            ));
        }
        if self.share_name != existing.volume.name {
            mismatches.push(format!(
                "volume name {:?} != {:?}",
                existing.volume.name, self.share_name
            ));
        }
        if self.size_bytes != existing.volume.size_bytes {
            mismatches.push(format!(
                "volume size {} != {}",
                existing.volume.size_bytes, self.size_bytes
            ));
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(Error::AlreadyExists(format!(
                "instance {} exists with incompatible spec: {}",
                self.name,
                mismatches.join(", ")
            )))
        }
    }
}

fn check_id_field(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", field)));
    }
    if value.contains(ID_SEPARATOR) {
        return Err(Error::InvalidArgument(format!(
            "{} {:?} must not contain {:?}",
            field, value, ID_SEPARATOR
        )));
    }
    Ok(())
}
