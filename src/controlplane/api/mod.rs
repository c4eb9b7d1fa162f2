//! API Module
//!
//! Status REST API for the array control plane.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
