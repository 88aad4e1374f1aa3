//! Host network inspection
//!
//! Provides:
//! - Enumeration of IPv4/IPv6 addresses on host interfaces

pub mod ifaddr;

pub use ifaddr::{InterfaceAddr, enum_addrs};
