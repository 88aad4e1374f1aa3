//! Brig - typed FreeBSD jail parameters
//!
//! A parameter registry and codec, one-shot jail(2) transactions, and
//! lifecycle-checked jail handles built on top of them.

pub mod error;
pub mod helm;
pub mod jail;
pub mod manifest;
pub mod network;

pub use error::{Error, Result};
pub use jail::{Jail, JailConfig, Kernel, ParamValue, Syscall, Transaction};
