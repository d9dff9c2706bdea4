//! IP Range Allocator
//!
//! Carves fixed-size blocks out of a caller-supplied CIDR pool while keeping
//! track of blocks handed to requests that have not finished yet. The remote
//! API only lists blocks of instances whose create call was accepted, so
//! without the pending set two concurrent creates could pick the same block.

use super::reservation::ReservedRange;
use crate::error::{Error, Result};
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Constants
// =============================================================================

/// Prefix length of the blocks handed out (a /29 holds 8 addresses)
pub const DEFAULT_BLOCK_PREFIX_LEN: u8 = 29;

// =============================================================================
// IP Range Allocator
// =============================================================================

/// In-process allocator of address blocks
///
/// Constructed once per process and shared by reference. State is not
/// persisted: after a restart the remote API's own records are the only
/// reservations that matter.
#[derive(Debug)]
pub struct IpRangeAllocator {
    /// Prefix length of every handed-out block
    block_prefix_len: u8,
    /// Blocks held by in-flight requests
    pending: Mutex<BTreeSet<Ipv4Net>>,
}

impl IpRangeAllocator {
    /// Create an allocator handing out /29 blocks
    pub fn new() -> Arc<Self> {
        Self::with_block_prefix_len(DEFAULT_BLOCK_PREFIX_LEN)
    }

    /// Create an allocator handing out blocks of the given prefix length
    pub fn with_block_prefix_len(block_prefix_len: u8) -> Arc<Self> {
        Arc::new(Self {
            block_prefix_len,
            pending: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn block_prefix_len(&self) -> u8 {
        self.block_prefix_len
    }

    /// Pick the first block of `pool` that is neither pending nor overlapping
    /// any range in `externally_reserved`, and mark it pending.
    ///
    /// Candidates are visited in ascending address order. The returned block
    /// stays pending until [`release_ip_range`](Self::release_ip_range) is
    /// called for it.
    pub fn get_unreserved_ip_range(
        &self,
        pool: &str,
        externally_reserved: &HashSet<String>,
    ) -> Result<Ipv4Net> {
        let pool_net = parse_pool(pool, self.block_prefix_len)?.trunc();
        let external = parse_external(externally_reserved);

        let host_bits = 32u32
            .checked_sub(u32::from(self.block_prefix_len))
            .ok_or_else(|| {
                Error::Configuration(format!("invalid block prefix /{}", self.block_prefix_len))
            })?;
        let block_size = 1u64 << host_bits;
        let pool_end = u64::from(u32::from(pool_net.broadcast())) + 1;
        let mut next = u64::from(u32::from(pool_net.network()));

        // Scan and insert under a single lock so concurrent callers never
        // observe the same block as free.
        let mut pending = self.pending.lock();
        while next < pool_end {
            let candidate = block_at(next, self.block_prefix_len)?;

            // Every block up to the end of an overlapping range overlaps it
            // too, so resume at the first block past it.
            if let Some(reserved) = external.iter().find(|r| overlaps(r, &candidate)) {
                let reserved_end = u64::from(u32::from(reserved.broadcast())) + 1;
                next = align_up(reserved_end.max(next + block_size), block_size);
                continue;
            }
            if pending.contains(&candidate) {
                next += block_size;
                continue;
            }

            pending.insert(candidate);
            info!(
                "Reserved IP range {} from pool {} ({} pending)",
                candidate,
                pool_net,
                pending.len()
            );
            return Ok(candidate);
        }

        warn!("IP pool {} exhausted", pool_net);
        Err(Error::PoolExhausted {
            pool: pool.to_string(),
            prefix_len: self.block_prefix_len,
        })
    }

    /// Like [`get_unreserved_ip_range`](Self::get_unreserved_ip_range), but
    /// returns a handle that releases the block when dropped.
    pub fn reserve(
        self: &Arc<Self>,
        pool: &str,
        externally_reserved: &HashSet<String>,
    ) -> Result<ReservedRange> {
        let block = self.get_unreserved_ip_range(pool, externally_reserved)?;
        Ok(ReservedRange::new(Arc::clone(self), block))
    }

    /// Drop a block from the pending set. Releasing an unknown block is a
    /// no-op.
    pub fn release_ip_range(&self, block: &Ipv4Net) {
        let mut pending = self.pending.lock();
        if pending.remove(block) {
            debug!("Released IP range {} ({} pending)", block, pending.len());
        }
    }

    /// Number of blocks currently pending
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether a block is currently pending
    #[cfg(test)]
    pub(crate) fn is_pending(&self, block: &Ipv4Net) -> bool {
        self.pending.lock().contains(block)
    }
}

/// Parse a CIDR pool, requiring it to hold at least one block of
/// `block_prefix_len`
pub fn parse_pool(pool: &str, block_prefix_len: u8) -> Result<Ipv4Net> {
    let net: Ipv4Net = pool
        .trim()
        .parse()
        .map_err(|e| Error::InvalidArgument(format!("invalid IPv4 CIDR {:?}: {}", pool, e)))?;
    if net.prefix_len() > block_prefix_len {
        return Err(Error::InvalidArgument(format!(
            "cidr {} is smaller than a /{} block",
            net, block_prefix_len
        )));
    }
    Ok(net)
}

/// The block of `prefix_len` starting at address `start`
fn block_at(start: u64, prefix_len: u8) -> Result<Ipv4Net> {
    let addr = u32::try_from(start)
        .map_err(|_| Error::Internal(format!("address {} out of IPv4 range", start)))?;
    Ipv4Net::new(Ipv4Addr::from(addr), prefix_len)
        .map_err(|e| Error::InvalidArgument(format!("invalid block prefix /{}: {}", prefix_len, e)))
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Parse externally reserved ranges, skipping empty and malformed entries
fn parse_external(reserved: &HashSet<String>) -> Vec<Ipv4Net> {
    reserved
        .iter()
        .filter(|r| !r.trim().is_empty())
        .filter_map(|r| match r.trim().parse::<Ipv4Net>() {
            Ok(net) => Some(net),
            Err(e) => {
                warn!("Ignoring malformed reserved range {:?}: {}", r, e);
                None
            }
        })
        .collect()
}

/// Two CIDR blocks overlap iff one contains the other's network address
fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::future::join_all;

    fn reserved(ranges: &[&str]) -> HashSet<String> {
        ranges.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_first_block_in_order() {
        let allocator = IpRangeAllocator::new();
        let block = allocator
            .get_unreserved_ip_range("10.0.0.0/24", &HashSet::new())
            .unwrap();
        assert_eq!(block.to_string(), "10.0.0.0/29");

        let block = allocator
            .get_unreserved_ip_range("10.0.0.0/24", &HashSet::new())
            .unwrap();
        assert_eq!(block.to_string(), "10.0.0.8/29");
        assert_eq!(allocator.pending_count(), 2);
    }

    #[test]
    fn test_skips_externally_reserved() {
        let allocator = IpRangeAllocator::new();
        let block = allocator
            .get_unreserved_ip_range("10.0.0.0/24", &reserved(&["10.0.0.0/29", "10.0.0.8/29"]))
            .unwrap();
        assert_eq!(block.to_string(), "10.0.0.16/29");
    }

    #[test]
    fn test_skips_overlapping_external_range() {
        let allocator = IpRangeAllocator::new();
        // A /28 covers the first two /29 blocks
        let block = allocator
            .get_unreserved_ip_range("10.0.0.0/24", &reserved(&["10.0.0.0/28"]))
            .unwrap();
        assert_eq!(block.to_string(), "10.0.0.16/29");
    }

    #[test]
    fn test_ignores_empty_and_malformed_external_entries() {
        let allocator = IpRangeAllocator::new();
        let block = allocator
            .get_unreserved_ip_range("10.0.0.0/24", &reserved(&["", "not-a-cidr"]))
            .unwrap();
        assert_eq!(block.to_string(), "10.0.0.0/29");
    }

    #[test]
    fn test_unaligned_pool_is_truncated() {
        let allocator = IpRangeAllocator::new();
        let block = allocator
            .get_unreserved_ip_range("192.168.1.77/28", &HashSet::new())
            .unwrap();
        assert_eq!(block.to_string(), "192.168.1.64/29");
    }

    #[test]
    fn test_skips_past_small_external_range() {
        let allocator = IpRangeAllocator::new();
        // A /30 in the upper half of the first block still takes that block
        let block = allocator
            .get_unreserved_ip_range("10.0.0.0/24", &reserved(&["10.0.0.4/30"]))
            .unwrap();
        assert_eq!(block.to_string(), "10.0.0.8/29");
    }

    #[test]
    fn test_wide_pool_skips_large_external_range() {
        let allocator = IpRangeAllocator::new();
        let block = allocator
            .get_unreserved_ip_range("0.0.0.0/1", &reserved(&["0.0.0.0/2", "64.0.0.0/29"]))
            .unwrap();
        assert_eq!(block.to_string(), "64.0.0.8/29");

        let err = allocator
            .get_unreserved_ip_range("10.0.0.0/8", &reserved(&["10.0.0.0/8"]))
            .unwrap_err();
        assert_matches!(err, Error::PoolExhausted { .. });
    }

    #[test]
    fn test_last_block_of_address_space() {
        let allocator = IpRangeAllocator::new();
        let block = allocator
            .get_unreserved_ip_range("255.255.255.240/28", &reserved(&["255.255.255.240/29"]))
            .unwrap();
        assert_eq!(block.to_string(), "255.255.255.248/29");
        assert_matches!(
            allocator.get_unreserved_ip_range("255.255.255.240/28", &reserved(&["255.255.255.240/29"])),
            Err(Error::PoolExhausted { .. })
        );
    }

    #[test]
    fn test_pool_exhausted_by_external() {
        let allocator = IpRangeAllocator::new();
        // A /28 pool holds exactly two /29 blocks
        let err = allocator
            .get_unreserved_ip_range("10.0.0.0/28", &reserved(&["10.0.0.0/29", "10.0.0.8/29"]))
            .unwrap_err();
        assert_matches!(err, Error::PoolExhausted { prefix_len: 29, .. });
        assert_eq!(allocator.pending_count(), 0);
    }

    #[test]
    fn test_pool_exhausted_by_pending() {
        let allocator = IpRangeAllocator::new();
        allocator.get_unreserved_ip_range("10.0.0.0/29", &HashSet::new()).unwrap();
        let err = allocator
            .get_unreserved_ip_range("10.0.0.0/29", &HashSet::new())
            .unwrap_err();
        assert_matches!(err, Error::PoolExhausted { .. });
    }

    #[test]
    fn test_invalid_pool() {
        let allocator = IpRangeAllocator::new();
        assert_matches!(
            allocator.get_unreserved_ip_range("garbage", &HashSet::new()),
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(
            allocator.get_unreserved_ip_range("fd00::/64", &HashSet::new()),
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(
            allocator.get_unreserved_ip_range("10.0.0.0/30", &HashSet::new()),
            Err(Error::InvalidArgument(_))
        );
    }

    #[test]
    fn test_release_is_idempotent() {
        let allocator = IpRangeAllocator::new();
        let block = allocator
            .get_unreserved_ip_range("10.0.0.0/28", &HashSet::new())
            .unwrap();

        allocator.release_ip_range(&block);
        allocator.release_ip_range(&block);
        allocator.release_ip_range(&"172.16.0.0/29".parse().unwrap());
        assert_eq!(allocator.pending_count(), 0);

        // Released block is handed out again, followed by its neighbour
        let again = allocator
            .get_unreserved_ip_range("10.0.0.0/28", &HashSet::new())
            .unwrap();
        assert_eq!(again, block);
        let next = allocator
            .get_unreserved_ip_range("10.0.0.0/28", &HashSet::new())
            .unwrap();
        assert_eq!(next.to_string(), "10.0.0.8/29");
    }

    #[test]
    fn test_custom_block_size() {
        let allocator = IpRangeAllocator::with_block_prefix_len(28);
        let first = allocator.get_unreserved_ip_range("10.1.0.0/26", &HashSet::new()).unwrap();
        let second = allocator.get_unreserved_ip_range("10.1.0.0/26", &HashSet::new()).unwrap();
        assert_eq!(first.to_string(), "10.1.0.0/28");
        assert_eq!(second.to_string(), "10.1.0.16/28");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_are_distinct() {
        let allocator = IpRangeAllocator::new();
        // A /24 holds 32 /29 blocks
        let tasks = (0..32).map(|_| {
            let allocator = Arc::clone(&allocator);
            tokio::spawn(async move {
                allocator.get_unreserved_ip_range("10.10.0.0/24", &HashSet::new())
            })
        });

        let blocks: Vec<Ipv4Net> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let distinct: BTreeSet<_> = blocks.iter().collect();
        assert_eq!(distinct.len(), 32);
        assert_eq!(allocator.pending_count(), 32);
        assert_matches!(
            allocator.get_unreserved_ip_range("10.10.0.0/24", &HashSet::new()),
            Err(Error::PoolExhausted { .. })
        );
    }
}
