//! Domain layer - Core types and port definitions
//!
//! This module defines the traits (ports) that the remote file API and the
//! metadata source implement, following hexagonal architecture principles.

pub mod ports;

pub use ports::*;
