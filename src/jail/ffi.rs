//! Kernel call bridge for FreeBSD jail syscalls
//!
//! The iovec construction is adapted from libjail-rs (https://github.com/fubarnetes/libjail-rs)
//! Original authors: Fabian Freyer <fabian.freyer@physik.tu-berlin.de>
//! License: BSD-3-Clause
//!
//! Copyright (c) 2018, Fabian Freyer <fabian.freyer@physik.tu-berlin.de>
//! All rights reserved.
//!
//! Redistribution and use in source and binary forms, with or without
//! modification, are permitted provided that the following conditions are met:
//!
//! 1. Redistributions of source code must retain the above copyright notice, this
//!    list of conditions and the following disclaimer.
//!
//! 2. Redistributions in binary form must reproduce the above copyright notice,
//!    this list of conditions and the following disclaimer in the documentation
//!    and/or other materials provided with the distribution.
//!
//! 3. Neither the name of the copyright holder nor the names of its
//!    contributors may be used to endorse or promote products derived from
//!    this software without specific prior written permission.

#[cfg(any(target_os = "freebsd", test))]
use super::registry::ParamType;
use super::txn::Transaction;
#[cfg(any(target_os = "freebsd", test))]
use super::txn::{Binding, Direction};
use crate::error::{Error, Result};
use bitflags::bitflags;
use nix::errno::Errno;
use std::fmt;
use tracing::debug;

/// Kernel-assigned jail identifier
pub type Jid = i32;

bitflags! {
    /// Flags for jail_set/jail_get syscalls
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct JailFlags: i32 {
        /// Create the jail if it doesn't exist
        const CREATE = 0x01;
        /// Update parameters of existing jail
        const UPDATE = 0x02;
        /// Attach to jail upon creation
        const ATTACH = 0x04;
        /// Allow getting a dying jail
        const DYING = 0x08;
    }
}

/// Kernel operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Get,
    Remove,
    Attach,
}

impl Operation {
    pub fn flags(self) -> JailFlags {
        match self {
            Operation::Create => JailFlags::CREATE,
            Operation::Update => JailFlags::UPDATE,
            Operation::Get | Operation::Remove | Operation::Attach => JailFlags::empty(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Get => write!(f, "get"),
            Operation::Remove => write!(f, "remove"),
            Operation::Attach => write!(f, "attach"),
        }
    }
}

/// The kernel side of a jail transaction
///
/// `call` performs exactly one blocking kernel call. On success, bindings may
/// have been overwritten in place with response data and truncated to the
/// length the kernel reported. Create, update and get return the jail's jid.
/// Remove and attach take the jid from the transaction's `jid` binding; attach
/// moves the calling process into the jail.
pub trait Kernel {
    fn call(&self, op: Operation, txn: &mut Transaction) -> Result<Jid>;
}

/// Direct jail(2) syscalls
#[derive(Debug, Clone, Copy, Default)]
pub struct Syscall;

impl Kernel for Syscall {
    fn call(&self, op: Operation, txn: &mut Transaction) -> Result<Jid> {
        debug!(%op, bindings = txn.len(), "jail syscall");

        let result = match op {
            Operation::Remove => {
                let jid = txn.grab::<Jid>("jid")?;
                sys::remove(jid).map(|()| jid)
            }
            Operation::Attach => {
                let jid = txn.grab::<Jid>("jid")?;
                sys::attach(jid).map(|()| jid)
            }
            _ => sys::params(op, txn),
        };

        match &result {
            Ok(jid) => debug!(%op, jid, "jail syscall succeeded"),
            Err(e) => debug!(%op, error = %e, "jail syscall failed"),
        }
        result
    }
}

/// Booleans travel as value-less flags: `name` for true, the `no` form for false
#[cfg(any(target_os = "freebsd", test))]
fn is_flag(binding: &Binding) -> bool {
    binding.kind() == ParamType::Boolean && binding.direction() == Direction::InputOutput
}

/// `persist` -> `nopersist`, `allow.mount` -> `allow.nomount`
#[cfg(any(target_os = "freebsd", test))]
fn no_name(name: &str) -> String {
    match name.rfind('.') {
        Some(i) => format!("{}no{}", &name[..=i], &name[i + 1..]),
        None => format!("no{}", name),
    }
}

#[cfg(any(target_os = "freebsd", test))]
fn wire_name(binding: &Binding) -> String {
    if is_flag(binding) && binding.value().iter().all(|&b| b == 0) {
        no_name(binding.name())
    } else {
        binding.name().to_string()
    }
}

pub(crate) fn failed(op: Operation, errno: Errno, message: impl Into<String>) -> Error {
    Error::KernelCallFailed {
        op,
        errno,
        message: message.into(),
    }
}

#[cfg(target_os = "freebsd")]
mod sys {
    use super::{Jid, Operation, failed, is_flag, wire_name};
    use crate::error::Result;
    use crate::jail::txn::Transaction;
    use nix::errno::Errno;
    use std::ffi::{CStr, CString};
    use std::ptr;

    const ERRMSG_LEN: usize = 256;

    /// Macro to construct iovec structures for jail syscalls
    macro_rules! iovec {
        ($key:expr => mut $value:expr) => {
            vec![iovec!($key), iovec!(mut $value)]
        };
        ($value:expr, $size:expr) => {
            libc::iovec {
                iov_base: $value as *mut libc::c_void,
                iov_len: $size,
            }
        };
        ($name:expr) => {
            iovec!($name.as_ptr(), $name.len())
        };
        (mut $name:expr) => {
            iovec!($name.as_mut_ptr(), $name.len())
        };
        () => {
            iovec!(ptr::null::<libc::c_void>(), 0)
        };
    }

    pub(super) fn params(op: Operation, txn: &mut Transaction) -> Result<Jid> {
        let names = txn
            .bindings()
            .iter()
            .map(|b| CString::new(wire_name(b)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut errmsg = [0u8; ERRMSG_LEN];
        let mut jiov: Vec<libc::iovec> = Vec::with_capacity(names.len() * 2 + 2);

        // jail_set(2) copies bytes verbatim, so raw and non-raw bindings are
        // sent the same way.
        for (name, binding) in names.iter().zip(txn.bindings_mut()) {
            jiov.push(iovec!(name.as_bytes_with_nul()));
            if is_flag(binding) || binding.is_empty() {
                jiov.push(iovec!());
            } else {
                let buf = binding.buffer_mut();
                jiov.push(iovec!(mut buf));
            }
        }
        jiov.extend(iovec!(b"errmsg\0" => mut errmsg));

        let jid = unsafe {
            match op {
                Operation::Get => libc::jail_get(
                    jiov.as_mut_ptr(),
                    jiov.len() as libc::c_uint,
                    op.flags().bits(),
                ),
                _ => libc::jail_set(
                    jiov.as_mut_ptr(),
                    jiov.len() as libc::c_uint,
                    op.flags().bits(),
                ),
            }
        };

        if jid < 0 {
            let errno = Errno::last();
            let message = CStr::from_bytes_until_nul(&errmsg)
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(failed(op, errno, message));
        }

        // The kernel rewrites iov_len with the size of each returned value
        for (i, binding) in txn.bindings_mut().iter_mut().enumerate() {
            if is_flag(binding) {
                continue;
            }
            let returned = jiov[2 * i + 1].iov_len;
            let buf = binding.buffer_mut();
            if returned < buf.len() {
                buf.truncate(returned);
            }
        }

        Ok(jid)
    }

    /// Remove a jail by its ID
    ///
    /// This kills every process in the jail without waiting for them.
    pub(super) fn remove(jid: Jid) -> Result<()> {
        let ret = unsafe { libc::jail_remove(jid) };
        match ret {
            0 => Ok(()),
            _ => Err(failed(Operation::Remove, Errno::last(), String::new())),
        }
    }

    pub(super) fn attach(jid: Jid) -> Result<()> {
        let ret = unsafe { libc::jail_attach(jid) };
        match ret {
            0 => Ok(()),
            _ => Err(failed(Operation::Attach, Errno::last(), String::new())),
        }
    }
}

#[cfg(not(target_os = "freebsd"))]
mod sys {
    use super::{Jid, Operation, failed};
    use crate::error::Result;
    use crate::jail::txn::Transaction;
    use nix::errno::Errno;

    const UNSUPPORTED: &str = "jail syscalls require FreeBSD";

    pub(super) fn params(op: Operation, _txn: &mut Transaction) -> Result<Jid> {
        Err(failed(op, Errno::ENOSYS, UNSUPPORTED))
    }

    pub(super) fn remove(_jid: Jid) -> Result<()> {
        Err(failed(Operation::Remove, Errno::ENOSYS, UNSUPPORTED))
    }

    pub(super) fn attach(_jid: Jid) -> Result<()> {
        Err(failed(Operation::Attach, Errno::ENOSYS, UNSUPPORTED))
    }
}
