//! Enumeration of running jails
//!
//! Jails are walked with repeated `jail_get` calls keyed on `lastjid`, the
//! jid returned by the previous call (0 to start). The kernel answers
//! `ENOENT` once no jail follows the bookmark. Nothing locks the jail list
//! between calls: jails created or removed during a scan may be missed, so
//! the result is a best-effort snapshot in the kernel's own order.

use nix::errno::Errno;
use tracing::debug;

use super::ffi::{Jid, Kernel, Operation};
use super::state::{Jail, JailInfo};
use super::txn::Transaction;
use crate::error::{Error, Result};

/// Iterator over all jails currently known to the kernel
///
/// Yields each jail with its snapshot already populated. After an error the
/// iterator yields that error once and then stops.
pub struct Cursor<K: Kernel + Clone> {
    kernel: K,
    lastjid: Jid,
    done: bool,
}

impl<K: Kernel + Clone> Cursor<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            lastjid: 0,
            done: false,
        }
    }

    /// Last jid returned by the kernel, 0 before the first step
    pub fn bookmark(&self) -> Jid {
        self.lastjid
    }

    fn step(&mut self) -> Result<Jail<K>> {
        let mut txn = Transaction::new();
        txn.bind_input("lastjid", self.lastjid)?;
        JailInfo::bind(&mut txn)?;

        let jid = match self.kernel.call(Operation::Get, &mut txn) {
            Ok(jid) => jid,
            Err(e) if e.errno() == Some(Errno::ENOENT) => return Err(Error::EnumerationExhausted),
            Err(e) => return Err(e),
        };
        self.lastjid = jid;

        let info = JailInfo::grab(&txn, jid)?;
        Jail::from_info(self.kernel.clone(), info)
    }

    /// Run the scan to the end, keeping what was collected before any error
    pub fn drain(self) -> (Vec<Jail<K>>, Option<Error>) {
        let mut jails = Vec::new();
        for item in self {
            match item {
                Ok(jail) => jails.push(jail),
                Err(e) => return (jails, Some(e)),
            }
        }
        (jails, None)
    }
}

impl<K: Kernel + Clone> Iterator for Cursor<K> {
    type Item = Result<Jail<K>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.step() {
            Ok(jail) => Some(Ok(jail)),
            Err(Error::EnumerationExhausted) => {
                debug!(lastjid = self.lastjid, "jail enumeration complete");
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// List every jail
///
/// A failure other than exhaustion stops the scan; the jails read before it
/// are returned alongside the error.
pub fn enumerate<K: Kernel + Clone>(kernel: K) -> (Vec<Jail<K>>, Option<Error>) {
    Cursor::new(kernel).drain()
}
