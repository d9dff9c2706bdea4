//! Allocation Module
//!
//! Provides reservation of non-overlapping address blocks out of a CIDR pool.

pub mod allocator;
pub mod reservation;

pub use allocator::*;
pub use reservation::*;
