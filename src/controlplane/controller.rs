//! Provisioning Controller
//!
//! Handles create, delete and capability validation requests. The remote API
//! is the source of truth for which instances exist; the only in-process
//! shared state is the IP range allocator.
//!
//! Create is idempotent per name: a second request with a compatible spec
//! returns the existing instance, an incompatible one fails with
//! `AlreadyExists`. No call is retried here; the orchestrator retries.

use crate::config::DriverConfig;
use crate::controlplane::capabilities::{validate_volume_capabilities, CONTROLLER_CAPABILITIES};
use crate::controlplane::capacity::resolve_capacity;
use crate::controlplane::metrics::{ControllerMetrics, OUTCOME_EXISTING, OUTCOME_SUCCESS};
use crate::controlplane::params::ResolvedSpec;
use crate::controlplane::volume_id::ResourceIdentity;
use crate::domain::ports::{
    ControllerCapability, CreateVolumeRequest, DeleteVolumeRequest, FileServiceRef,
    MetadataServiceRef, ServiceInstance, ValidateVolumeCapabilitiesRequest,
    ValidateVolumeCapabilitiesResponse, Volume,
};
use crate::error::{Error, Result};
use crate::network::allocation::{IpRangeAllocator, ReservedRange};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Volume attribute keys handed to the node plugin
pub const ATTR_IP: &str = "ip";
pub const ATTR_VOLUME: &str = "volume";

const OP_CREATE_VOLUME: &str = "create_volume";
const OP_DELETE_VOLUME: &str = "delete_volume";
const OP_VALIDATE_VOLUME_CAPABILITIES: &str = "validate_volume_capabilities";

/// How a successful create was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provisioned {
    Created,
    Existing,
}

// =============================================================================
// Controller Server
// =============================================================================

/// Provisioning controller for network file share volumes
pub struct ControllerServer {
    config: DriverConfig,
    file_service: FileServiceRef,
    metadata: MetadataServiceRef,
    ip_allocator: Arc<IpRangeAllocator>,
    metrics: ControllerMetrics,
}

impl std::fmt::Debug for ControllerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerServer")
            .field("config", &self.config)
            .field("ip_allocator", &self.ip_allocator)
            .finish_non_exhaustive()
    }
}

impl ControllerServer {
    /// Create a controller. The allocator is shared by every request this
    /// controller serves.
    pub fn new(
        config: DriverConfig,
        file_service: FileServiceRef,
        metadata: MetadataServiceRef,
        ip_allocator: Arc<IpRangeAllocator>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        if ip_allocator.block_prefix_len() != config.reserved_block_prefix_len {
            return Err(Error::Configuration(format!(
                "allocator hands out /{} blocks but configuration expects /{}",
                ip_allocator.block_prefix_len(),
                config.reserved_block_prefix_len
            )));
        }

        Ok(Arc::new(Self {
            config,
            file_service,
            metadata,
            ip_allocator,
            metrics: ControllerMetrics::new()?,
        }))
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn ip_allocator(&self) -> &Arc<IpRangeAllocator> {
        &self.ip_allocator
    }

    pub fn metrics(&self) -> &ControllerMetrics {
        &self.metrics
    }

    /// Render controller metrics in the Prometheus text format
    pub fn render_metrics(&self) -> Result<String> {
        self.metrics
            .set_pending_ip_ranges(self.ip_allocator.pending_count());
        self.metrics.render()
    }

    // =========================================================================
    // CreateVolume
    // =========================================================================

    /// Create a volume, or return the existing one if an instance with the
    /// same name and a compatible spec already exists
    pub async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume> {
        info!("CreateVolume called for {:?}", req.name);

        let result = self.create_volume_inner(&req).await;
        match &result {
            Ok((volume, Provisioned::Created)) => {
                info!("Created volume {}", volume.volume_id);
                self.metrics.record_request(OP_CREATE_VOLUME, OUTCOME_SUCCESS);
            }
            Ok((volume, Provisioned::Existing)) => {
                info!("Volume {} already exists", volume.volume_id);
                self.metrics.record_request(OP_CREATE_VOLUME, OUTCOME_EXISTING);
            }
            Err(e) => {
                warn!("CreateVolume {:?} failed: {}", req.name, e);
                self.metrics
                    .record_request(OP_CREATE_VOLUME, &e.code().to_string());
            }
        }
        result.map(|(volume, _)| volume)
    }

    async fn create_volume_inner(&self, req: &CreateVolumeRequest) -> Result<(Volume, Provisioned)> {
        if req.name.is_empty() {
            return Err(Error::InvalidArgument(
                "CreateVolume name must be provided".into(),
            ));
        }
        validate_volume_capabilities(&req.volume_capabilities)?;

        let capacity_bytes =
            resolve_capacity(req.capacity_range.as_ref(), self.config.min_volume_size_bytes);
        debug!("Using capacity {} bytes for volume {:?}", capacity_bytes, req.name);

        let spec = ResolvedSpec::from_parameters(
            &req.name,
            capacity_bytes,
            &req.parameters,
            &self.config,
            self.metadata.project(),
            self.metadata.zone(),
        )?;

        match self.file_service.get_instance(&spec.instance_ref()).await {
            Ok(existing) => {
                spec.check_compatible(&existing)?;
                return Ok((self.to_volume(&existing), Provisioned::Existing));
            }
            Err(e) if e.is_not_found() => {
                debug!("Instance {} not found, creating it", spec.instance_ref());
            }
            Err(e) => return Err(e.into_internal()),
        }

        // Held until the create call settles: by then the remote API either
        // records the block against the new instance or the create failed and
        // the block is free again. A cancelled call releases it on drop.
        let reservation = match &spec.address_pool {
            Some(pool) => Some(self.reserve_ip_range(&spec, pool).await?),
            None => None,
        };

        let instance = spec.to_instance(reservation.as_ref().map(ReservedRange::block));
        let created = self.file_service.create_instance(&instance).await;
        if let Some(reservation) = reservation {
            reservation.release();
        }

        let created = created.map_err(|e| {
            error!("Create of instance {} failed: {}", instance.instance_ref(), e);
            e.into_internal()
        })?;

        Ok((self.to_volume(&created), Provisioned::Created))
    }

    /// Reserve a block from `pool` that no instance in the spec's location
    /// already uses
    async fn reserve_ip_range(&self, spec: &ResolvedSpec, pool: &str) -> Result<ReservedRange> {
        let cloud_reserved = self.cloud_reserved_ip_ranges(spec).await?;

        match self.ip_allocator.reserve(pool, &cloud_reserved) {
            Ok(reservation) => {
                self.metrics.record_ip_allocation("granted");
                Ok(reservation)
            }
            Err(e) => {
                let result = match e {
                    Error::PoolExhausted { .. } => "exhausted",
                    _ => "rejected",
                };
                self.metrics.record_ip_allocation(result);
                Err(e)
            }
        }
    }

    /// Ranges recorded against existing instances
    async fn cloud_reserved_ip_ranges(&self, spec: &ResolvedSpec) -> Result<HashSet<String>> {
        let instances = self
            .file_service
            .list_instances(&spec.list_scope())
            .await
            .map_err(|e| Error::Aborted(format!("failed to list reserved IP ranges: {}", e)))?;

        Ok(instances
            .into_iter()
            .filter_map(|instance| instance.network.reserved_ip_range)
            .collect())
    }

    // =========================================================================
    // DeleteVolume
    // =========================================================================

    /// Delete a volume. Unparseable ids and missing instances count as
    /// already deleted.
    pub async fn delete_volume(&self, req: DeleteVolumeRequest) -> Result<()> {
        info!("DeleteVolume called for {:?}", req.volume_id);

        let result = self.delete_volume_inner(&req).await;
        let outcome = match &result {
            Ok(()) => OUTCOME_SUCCESS.to_string(),
            Err(e) => {
                warn!("DeleteVolume {:?} failed: {}", req.volume_id, e);
                e.code().to_string()
            }
        };
        self.metrics.record_request(OP_DELETE_VOLUME, &outcome);
        result
    }

    async fn delete_volume_inner(&self, req: &DeleteVolumeRequest) -> Result<()> {
        if req.volume_id.is_empty() {
            return Err(Error::InvalidArgument("volume id is empty".into()));
        }

        let identity = match ResourceIdentity::decode(&req.volume_id) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Treating volume {:?} as deleted: {}", req.volume_id, e);
                return Ok(());
            }
        };

        let instance = identity.instance_ref(&self.metadata.project());
        match self.file_service.delete_instance(&instance).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Instance {} already deleted", instance);
                Ok(())
            }
            Err(e) => Err(e.into_internal()),
        }
    }

    // =========================================================================
    // ValidateVolumeCapabilities
    // =========================================================================

    /// Check requested capabilities against an existing volume.
    ///
    /// Unsupported capabilities yield `supported: false` with a message; the
    /// transport layer also reports them with an invalid-argument status.
    pub async fn validate_volume_capabilities(
        &self,
        req: ValidateVolumeCapabilitiesRequest,
    ) -> Result<ValidateVolumeCapabilitiesResponse> {
        let result = self.validate_volume_capabilities_inner(&req).await;
        let outcome = match &result {
            Ok(response) if response.supported => OUTCOME_SUCCESS.to_string(),
            Ok(_) => crate::error::Code::InvalidArgument.to_string(),
            Err(e) => e.code().to_string(),
        };
        self.metrics
            .record_request(OP_VALIDATE_VOLUME_CAPABILITIES, &outcome);
        result
    }

    async fn validate_volume_capabilities_inner(
        &self,
        req: &ValidateVolumeCapabilitiesRequest,
    ) -> Result<ValidateVolumeCapabilitiesResponse> {
        if req.volume_id.is_empty() {
            return Err(Error::InvalidArgument("volume id is empty".into()));
        }
        if req.volume_capabilities.is_empty() {
            return Err(Error::InvalidArgument("volume capabilities is empty".into()));
        }

        // An unparseable id cannot refer to an existing volume
        let identity = ResourceIdentity::decode(&req.volume_id)
            .map_err(|e| Error::NotFound(e.to_string()))?;

        let instance = identity.instance_ref(&self.metadata.project());
        match self.file_service.get_instance(&instance).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                return Err(Error::NotFound(format!(
                    "volume {} doesn't exist",
                    req.volume_id
                )));
            }
            Err(e) => return Err(e.into_internal()),
        }

        Ok(match validate_volume_capabilities(&req.volume_capabilities) {
            Ok(()) => ValidateVolumeCapabilitiesResponse {
                supported: true,
                message: String::new(),
            },
            Err(e) => ValidateVolumeCapabilitiesResponse {
                supported: false,
                message: e.to_string(),
            },
        })
    }

    // =========================================================================
    // ControllerGetCapabilities
    // =========================================================================

    pub fn controller_get_capabilities(&self) -> Vec<ControllerCapability> {
        CONTROLLER_CAPABILITIES.to_vec()
    }

    fn to_volume(&self, instance: &ServiceInstance) -> Volume {
        let identity = ResourceIdentity::from_instance(instance, &self.config.provisioning_mode);
        Volume {
            volume_id: identity.encode(),
            capacity_bytes: instance.volume.size_bytes,
            attributes: BTreeMap::from([
                (
                    ATTR_IP.to_string(),
                    instance.network.ip.clone().unwrap_or_default(),
                ),
                (ATTR_VOLUME.to_string(), instance.volume.name.clone()),
            ]),
        }
    }
}
