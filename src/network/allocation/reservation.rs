//! Scoped reservation handle
//!
//! A [`ReservedRange`] keeps its block pending in the allocator for as long as
//! it lives. Dropping it (on success, on error, or because the owning future
//! was cancelled) releases the block exactly once.

use super::allocator::IpRangeAllocator;
use ipnet::Ipv4Net;
use std::sync::Arc;

/// A block held in the allocator's pending set
#[derive(Debug)]
pub struct ReservedRange {
    allocator: Arc<IpRangeAllocator>,
    block: Ipv4Net,
    released: bool,
}

impl ReservedRange {
    pub(super) fn new(allocator: Arc<IpRangeAllocator>, block: Ipv4Net) -> Self {
        Self {
            allocator,
            block,
            released: false,
        }
    }

    /// The reserved block
    pub fn block(&self) -> Ipv4Net {
        self.block
    }

    /// Release the block now instead of at end of scope
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.allocator.release_ip_range(&self.block);
        }
    }
}

impl std::fmt::Display for ReservedRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.block)
    }
}

impl Drop for ReservedRange {
    fn drop(&mut self) {
        self.release_once();
    }
}
