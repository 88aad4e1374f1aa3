//! Jail management module
//!
//! This module provides:
//! - A registry of jail parameter types
//! - A binary codec between typed values and kernel buffers
//! - Transactions of named bindings for jail_set/jail_get
//! - FFI bindings to FreeBSD jail syscalls
//! - State machine for jail lifecycle management
//! - Enumeration of running jails

pub mod codec;
pub mod cursor;
pub mod ffi;
pub mod registry;
pub mod state;
pub mod txn;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

// Re-exports
pub use cursor::{Cursor, enumerate};
pub use ffi::{Jid, JailFlags, Kernel, Operation, Syscall};
pub use registry::{Descriptor, Family, ParamType};
pub use state::{Jail, JailConfig, JailInfo, State};
pub use txn::{Binding, Direction, Transaction};
pub use types::{FromParam, ParamValue};
