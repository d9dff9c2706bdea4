//! Network Module
//!
//! Address management for backing instances.

pub mod allocation;

pub use allocation::*;
