//! Jail handle and lifecycle state machine
//!
//! A [`Jail`] caches a snapshot of one kernel jail. The snapshot only changes
//! through an explicit refresh or update; nothing keeps it in sync with the
//! kernel in between. Lifecycle: Unbound -> Created -> Updated* -> Destroyed.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::process::Command;

use nix::errno::Errno;
use serde::Serialize;
use state_machines::state_machine;
use tracing::{info, warn};

use super::ffi::{Jid, Kernel, Operation};
use super::txn::Transaction;
use super::types::ParamValue;
use crate::error::{self, Error};

state_machine! {
    name: JailMachine,
    dynamic: true,
    initial: Unbound,
    states: [Unbound, Created, Updated, Destroyed],
    events {
        create {
            transition: { from: Unbound, to: Created }
        }
        update {
            transition: { from: [Created, Updated], to: Updated }
        }
        destroy {
            transition: { from: [Created, Updated], to: Destroyed }
        }
    }
}

/// Simple state enum for external use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum State {
    Unbound,
    Created,
    Updated,
    Destroyed,
}

impl State {
    /// Parse state from the machine's state name
    pub fn from_name(s: &str) -> Self {
        match s {
            "Created" => State::Created,
            "Updated" => State::Updated,
            "Destroyed" => State::Destroyed,
            _ => State::Unbound,
        }
    }
}

/// Parameters read on every refresh and enumeration step
pub const INFO_PARAMS: &[&str] = &[
    "parent",
    "name",
    "host.hostname",
    "path",
    "cpuset.id",
    "ip4.addr",
];

/// Cached snapshot of a jail's kernel state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JailInfo {
    pub jid: Jid,
    /// Parent jail, 0 when the parent is the host
    pub parent: Jid,
    pub name: String,
    pub hostname: String,
    pub path: PathBuf,
    pub cpuset_id: i32,
    pub ip4: Vec<Ipv4Addr>,
}

impl JailInfo {
    /// Bind every snapshot parameter not already bound as an output
    pub(crate) fn bind(txn: &mut Transaction) -> error::Result<()> {
        for name in INFO_PARAMS {
            if !txn.contains(name) {
                txn.bind_output(name)?;
            }
        }
        Ok(())
    }

    /// Decode a complete snapshot; any failure leaves nothing half-read
    pub(crate) fn grab(txn: &Transaction, jid: Jid) -> error::Result<Self> {
        Ok(Self {
            jid,
            parent: txn.grab("parent")?,
            name: txn.grab("name")?,
            hostname: txn.grab("host.hostname")?,
            path: PathBuf::from(txn.grab::<String>("path")?),
            cpuset_id: txn.grab("cpuset.id")?,
            ip4: txn.grab("ip4.addr")?,
        })
    }

    /// Overwrite the cached field for `name`, if it is one
    fn apply(&mut self, txn: &Transaction, name: &str) -> error::Result<()> {
        match name {
            "parent" => self.parent = txn.grab(name)?,
            "name" => self.name = txn.grab(name)?,
            "host.hostname" => self.hostname = txn.grab(name)?,
            "path" => self.path = PathBuf::from(txn.grab::<String>(name)?),
            "cpuset.id" => self.cpuset_id = txn.grab(name)?,
            "ip4.addr" => self.ip4 = txn.grab(name)?,
            _ => {}
        }
        Ok(())
    }
}

/// Settings for creating a persistent jail
#[derive(Debug, Clone)]
pub struct JailConfig {
    /// Unique name; the kernel names the jail after its jid when empty
    pub name: String,
    /// Path to the jail root filesystem
    pub path: PathBuf,
    /// Hostname, defaults to the name
    pub hostname: Option<String>,
    /// IP addresses assigned to the jail
    pub ips: Vec<IpAddr>,
    /// Extra parameters bound on create
    pub params: Vec<(String, ParamValue)>,
}

impl JailConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            hostname: None,
            ips: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn ip(mut self, addr: IpAddr) -> Self {
        self.ips.push(addr);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    fn transaction(&self) -> error::Result<Transaction> {
        let path = self.path.to_str().ok_or_else(|| Error::MalformedValue {
            name: "path".to_string(),
            reason: format!("{} is not valid UTF-8", self.path.display()),
        })?;

        let mut txn = Transaction::new();
        txn.bind_input("name", self.name.as_str())?;
        txn.bind_input(
            "host.hostname",
            self.hostname.as_deref().unwrap_or(&self.name),
        )?;
        txn.bind_input("path", path)?;
        txn.bind_input("persist", true)?;

        let ip4: Vec<Ipv4Addr> = self
            .ips
            .iter()
            .filter_map(|ip| match ip {
                IpAddr::V4(v4) => Some(*v4),
                IpAddr::V6(_) => None,
            })
            .collect();
        let ip6: Vec<Ipv6Addr> = self
            .ips
            .iter()
            .filter_map(|ip| match ip {
                IpAddr::V6(v6) => Some(*v6),
                IpAddr::V4(_) => None,
            })
            .collect();
        if !ip4.is_empty() {
            txn.bind_input("ip4.addr", ip4)?;
        }
        if !ip6.is_empty() {
            txn.bind_input("ip6.addr", ip6)?;
        }

        for (name, value) in &self.params {
            txn.bind_input(name, value.clone())?;
        }
        Ok(txn)
    }
}

/// Handle to one kernel jail
pub struct Jail<K: Kernel> {
    machine: DynamicJailMachine<()>,
    kernel: K,
    info: JailInfo,
}

impl<K: Kernel> Jail<K> {
    /// Wrap a snapshot read from the kernel
    pub(crate) fn from_info(kernel: K, info: JailInfo) -> error::Result<Self> {
        let mut machine = JailMachine::new(()).into_dynamic();
        machine
            .handle(JailMachineEvent::Create)
            .map_err(|_| Error::InvalidHandle(info.jid))?;

        Ok(Self {
            machine,
            kernel,
            info,
        })
    }

    /// Create a persistent jail and read back its full state
    ///
    /// No handle is returned unless both the create and the first refresh
    /// succeed.
    pub fn create(kernel: K, config: &JailConfig) -> error::Result<Self> {
        let mut txn = config.transaction()?;
        let jid = kernel.call(Operation::Create, &mut txn)?;
        txn.release();

        info!(jid, name = %config.name, "created jail");

        let info = JailInfo {
            jid,
            ..Default::default()
        };
        let mut jail = Self::from_info(kernel, info)?;
        if let Err(e) = jail.refresh() {
            warn!(jid, error = %e, "jail created but could not be read back");
            return Err(e);
        }
        Ok(jail)
    }

    /// Look up a jail by name, or by jid when `key` is numeric
    pub fn find(kernel: K, key: &str) -> error::Result<Self> {
        let mut txn = Transaction::new();
        match key.parse::<Jid>() {
            Ok(jid) => txn.bind_input("jid", jid)?,
            Err(_) => txn.bind_input("name", key)?,
        }
        JailInfo::bind(&mut txn)?;

        let jid = match kernel.call(Operation::Get, &mut txn) {
            Ok(jid) => jid,
            Err(e) if e.errno() == Some(Errno::ENOENT) => {
                return Err(Error::JailNotFound(key.to_string()));
            }
            Err(e) => return Err(e),
        };

        let info = JailInfo::grab(&txn, jid)?;
        Self::from_info(kernel, info)
    }

    fn ensure_live(&self) -> error::Result<()> {
        match self.state() {
            State::Destroyed => Err(Error::InvalidHandle(self.info.jid)),
            _ => Ok(()),
        }
    }

    fn jid_txn(&self) -> error::Result<Transaction> {
        let mut txn = Transaction::new();
        txn.bind_input("jid", self.info.jid)?;
        Ok(txn)
    }

    /// Replace the cached snapshot with the kernel's current values
    ///
    /// The cache is only replaced when every field decoded.
    pub fn refresh(&mut self) -> error::Result<()> {
        self.ensure_live()?;

        let mut txn = self.jid_txn()?;
        JailInfo::bind(&mut txn)?;
        let jid = self.kernel.call(Operation::Get, &mut txn)?;

        self.info = JailInfo::grab(&txn, jid)?;
        Ok(())
    }

    /// Update a single parameter
    ///
    /// Only the matching cached field changes; others stay as last known.
    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue>) -> error::Result<()> {
        self.ensure_live()?;

        let mut txn = self.jid_txn()?;
        txn.bind_input(name, value)?;
        self.kernel.call(Operation::Update, &mut txn)?;

        self.machine
            .handle(JailMachineEvent::Update)
            .map_err(|_| Error::InvalidHandle(self.info.jid))?;
        self.info.apply(&txn, name)
    }

    pub fn set_hostname(&mut self, hostname: &str) -> error::Result<()> {
        self.set_param("host.hostname", hostname)
    }

    /// Assign a cpuset; the id is passed through as-is
    pub fn set_cpuset_id(&mut self, id: i32) -> error::Result<()> {
        self.set_param("cpuset.id", id)
    }

    pub fn set_ip4_addrs(&mut self, addrs: Vec<Ipv4Addr>) -> error::Result<()> {
        self.set_param("ip4.addr", addrs)
    }

    /// Read one parameter straight from the kernel, bypassing the cache
    pub fn get_param(&self, name: &str) -> error::Result<ParamValue> {
        self.ensure_live()?;

        let mut txn = self.jid_txn()?;
        if !txn.contains(name) {
            txn.bind_output(name)?;
        }
        self.kernel.call(Operation::Get, &mut txn)?;
        txn.grab(name)
    }

    /// Remove the jail, killing everything inside it
    ///
    /// On failure the handle keeps its state; whether the jail still exists
    /// has to be checked with a refresh or an enumeration.
    pub fn destroy(&mut self) -> error::Result<()> {
        self.ensure_live()?;

        let mut txn = self.jid_txn()?;
        self.kernel.call(Operation::Remove, &mut txn)?;

        self.machine
            .handle(JailMachineEvent::Destroy)
            .map_err(|_| Error::InvalidHandle(self.info.jid))?;
        info!(jid = self.info.jid, name = %self.info.name, "destroyed jail");
        Ok(())
    }

    /// Move the calling process into the jail
    pub fn attach(&self) -> error::Result<()> {
        self.ensure_live()?;

        let mut txn = self.jid_txn()?;
        self.kernel.call(Operation::Attach, &mut txn)?;
        Ok(())
    }

    /// Build a `jexec` command running `cmd` inside the jail
    ///
    /// The command is not spawned; it starts as root inside the jail.
    pub fn exec(&self, cmd: &str, args: &[String]) -> error::Result<Command> {
        self.ensure_live()?;

        let mut command = Command::new("jexec");
        command.arg(self.info.jid.to_string()).arg(cmd).args(args);
        Ok(command)
    }

    /// Get current state as enum
    pub fn state(&self) -> State {
        State::from_name(self.machine.current_state())
    }

    pub fn jid(&self) -> Jid {
        self.info.jid
    }

    pub fn parent(&self) -> Jid {
        self.info.parent
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn hostname(&self) -> &str {
        &self.info.hostname
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    pub fn cpuset_id(&self) -> i32 {
        self.info.cpuset_id
    }

    pub fn ip4_addrs(&self) -> &[Ipv4Addr] {
        &self.info.ip4
    }

    pub fn info(&self) -> &JailInfo {
        &self.info
    }
}

impl<K: Kernel> fmt::Debug for Jail<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jail")
            .field("state", &self.state())
            .field("info", &self.info)
            .finish()
    }
}
