//! API Module
//!
//! REST transport for the provisioning controller, plus health and metrics
//! endpoints.

pub mod server;
pub mod rest;

pub use server::*;
pub use rest::*;
