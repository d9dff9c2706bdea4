//! In-memory File Service
//!
//! Keeps instances in process memory. Used in standalone mode and as the
//! remote API double in tests; it counts calls and can be told to fail an
//! operation.

use crate::domain::ports::{FileService, InstanceRef, ListScope, ServiceInstance};
use crate::error::{Error, Result};
use async_trait::async_trait;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const OP_GET: &str = "get";
pub const OP_LIST: &str = "list";
pub const OP_CREATE: &str = "create";
pub const OP_DELETE: &str = "delete";

/// Base of the addresses given to instances without a reserved range
const UNRESERVED_IP_BASE: Ipv4Addr = Ipv4Addr::new(172, 31, 0, 0);

/// First host offset handed out within 172.31.0.0/16
const UNRESERVED_IP_FIRST: u32 = 2;

/// Addresses handed out before wrapping: 172.31.0.2 through 172.31.255.254
const UNRESERVED_IP_COUNT: u64 = (1 << 16) - 3;

// =============================================================================
// Call Counters
// =============================================================================

#[derive(Debug, Default)]
struct CallCounters {
    get: AtomicU64,
    list: AtomicU64,
    create: AtomicU64,
    delete: AtomicU64,
}

/// Snapshot of how often each operation was called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: u64,
    pub list: u64,
    pub create: u64,
    pub delete: u64,
}

impl CallCounts {
    pub fn total(&self) -> u64 {
        self.get + self.list + self.create + self.delete
    }
}

// =============================================================================
// In-memory File Service
// =============================================================================

/// File service backed by a map of instances
#[derive(Debug, Default)]
pub struct InMemoryFileService {
    instances: RwLock<BTreeMap<InstanceRef, ServiceInstance>>,
    calls: CallCounters,
    /// Operations forced to fail, with the reason reported
    failures: Mutex<HashMap<&'static str, String>>,
    next_ip: AtomicU64,
}

impl InMemoryFileService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an instance as if it had been created earlier
    pub async fn insert(&self, instance: ServiceInstance) {
        self.instances
            .write()
            .await
            .insert(instance.instance_ref(), instance);
    }

    /// Make every call of `operation` fail until cleared
    pub fn fail_operation(&self, operation: &'static str, reason: impl Into<String>) {
        self.failures.lock().insert(operation, reason.into());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            get: self.calls.get.load(Ordering::Relaxed),
            list: self.calls.list.load(Ordering::Relaxed),
            create: self.calls.create.load(Ordering::Relaxed),
            delete: self.calls.delete.load(Ordering::Relaxed),
        }
    }

    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }

    fn check_failure(&self, operation: &'static str) -> Result<()> {
        match self.failures.lock().get(operation) {
            Some(reason) => Err(Error::provider(operation, reason)),
            None => Ok(()),
        }
    }

    /// Address clients mount from: the second host of the reserved block,
    /// or the next address of a private range.
    fn assign_ip(&self, reserved_ip_range: Option<&str>) -> String {
        if let Some(block) = reserved_ip_range.and_then(|r| r.parse::<Ipv4Net>().ok()) {
            if let Some(ip) = block.hosts().nth(1) {
                return ip.to_string();
            }
        }
        let n = self.next_ip.fetch_add(1, Ordering::Relaxed) % UNRESERVED_IP_COUNT;
        // n < 2^16, so neither the conversion nor the addition can overflow
        let offset = UNRESERVED_IP_FIRST + n as u32;
        Ipv4Addr::from(u32::from(UNRESERVED_IP_BASE) + offset).to_string()
    }
}

#[async_trait]
impl FileService for InMemoryFileService {
    async fn get_instance(&self, instance: &InstanceRef) -> Result<ServiceInstance> {
        self.calls.get.fetch_add(1, Ordering::Relaxed);
        self.check_failure(OP_GET)?;

        self.instances
            .read()
            .await
            .get(instance)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "Instance".into(),
                name: instance.to_string(),
            })
    }

    async fn list_instances(&self, scope: &ListScope) -> Result<Vec<ServiceInstance>> {
        self.calls.list.fetch_add(1, Ordering::Relaxed);
        self.check_failure(OP_LIST)?;

        let instances = self.instances.read().await;
        Ok(instances
            .values()
            .filter(|i| i.project == scope.project && i.location == scope.location)
            .cloned()
            .collect())
    }

    async fn create_instance(&self, instance: &ServiceInstance) -> Result<ServiceInstance> {
        self.calls.create.fetch_add(1, Ordering::Relaxed);
        self.check_failure(OP_CREATE)?;

        let key = instance.instance_ref();
        let mut instances = self.instances.write().await;
        if instances.contains_key(&key) {
            return Err(Error::AlreadyExists(key.to_string()));
        }

        let mut created = instance.clone();
        created.network.ip = Some(self.assign_ip(instance.network.reserved_ip_range.as_deref()));
        instances.insert(key.clone(), created.clone());

        info!(
            "Created instance {} ({} bytes, ip {:?})",
            key, created.volume.size_bytes, created.network.ip
        );
        Ok(created)
    }

    async fn delete_instance(&self, instance: &InstanceRef) -> Result<()> {
        self.calls.delete.fetch_add(1, Ordering::Relaxed);
        self.check_failure(OP_DELETE)?;

        if self.instances.write().await.remove(instance).is_some() {
            info!("Deleted instance {}", instance);
        } else {
            debug!("Instance {} already absent", instance);
        }
        Ok(())
    }
}
