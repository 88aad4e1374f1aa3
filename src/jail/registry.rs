//! Jail parameter registry
//!
//! Static mapping from parameter name to its semantic type. The table is
//! built once on first use and is read-only afterwards.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::LazyLock;

/// Semantic type of a jail parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// C `int`
    Integer,
    /// NUL-terminated string
    String,
    /// Flag, zero is false
    Boolean,
    /// Single address, family taken from the parameter name
    IpAddress,
    /// Packed array of addresses, family taken from the parameter name
    IpAddressList,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Integer => write!(f, "an integer"),
            ParamType::String => write!(f, "a string"),
            ParamType::Boolean => write!(f, "a boolean"),
            ParamType::IpAddress => write!(f, "an IP address"),
            ParamType::IpAddressList => write!(f, "an IP address list"),
        }
    }
}

/// Address family of an IP-typed parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Bytes per address
    pub fn stride(self) -> usize {
        match self {
            Family::V4 => 4,
            Family::V6 => 16,
        }
    }
}

const INT_LEN: usize = mem::size_of::<libc::c_int>();
const MAXHOSTNAMELEN: usize = 256;
const MAXPATHLEN: usize = 1024;
const HOSTUUIDLEN: usize = 64;
const OSRELEASELEN: usize = 32;
const MAX_ADDRS: usize = 256;

/// Static type metadata for one parameter name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Kernel parameter name
    pub name: &'static str,
    /// Semantic type
    pub kind: ParamType,
    /// Size of the buffer allocated when the parameter is bound for output
    pub capacity: usize,
}

impl Descriptor {
    pub const fn new(name: &'static str, kind: ParamType, capacity: usize) -> Self {
        Self {
            name,
            kind,
            capacity,
        }
    }

    const fn int(name: &'static str) -> Self {
        Self::new(name, ParamType::Integer, INT_LEN)
    }

    const fn string(name: &'static str, capacity: usize) -> Self {
        Self::new(name, ParamType::String, capacity)
    }

    const fn boolean(name: &'static str) -> Self {
        Self::new(name, ParamType::Boolean, INT_LEN)
    }

    const fn addrs(name: &'static str, stride: usize) -> Self {
        Self::new(name, ParamType::IpAddressList, stride * MAX_ADDRS)
    }

    /// Address family, inferred from the `ip4`/`ip6` name prefix
    ///
    /// The width of the value itself never decides the family.
    pub fn family(&self) -> Option<Family> {
        if self.name.starts_with("ip4") {
            Some(Family::V4)
        } else if self.name.starts_with("ip6") {
            Some(Family::V6)
        } else {
            None
        }
    }
}

const PARAMS: &[Descriptor] = &[
    Descriptor::int("jid"),
    Descriptor::int("lastjid"),
    Descriptor::int("parent"),
    Descriptor::int("securelevel"),
    Descriptor::int("children.max"),
    Descriptor::int("children.cur"),
    Descriptor::int("cpuset.id"),
    Descriptor::int("devfs_ruleset"),
    Descriptor::int("enforce_statfs"),
    Descriptor::int("osreldate"),
    // jailsys parameters: disable / new / inherit
    Descriptor::int("ip4"),
    Descriptor::int("ip6"),
    Descriptor::int("host"),
    Descriptor::int("vnet"),
    Descriptor::string("name", MAXHOSTNAMELEN),
    Descriptor::string("path", MAXPATHLEN),
    Descriptor::string("host.hostname", MAXHOSTNAMELEN),
    Descriptor::string("host.domainname", MAXHOSTNAMELEN),
    Descriptor::string("host.hostuuid", HOSTUUIDLEN),
    Descriptor::string("osrelease", OSRELEASELEN),
    Descriptor::boolean("persist"),
    Descriptor::boolean("dying"),
    Descriptor::boolean("ip4.saddrsel"),
    Descriptor::boolean("ip6.saddrsel"),
    Descriptor::boolean("allow.set_hostname"),
    Descriptor::boolean("allow.sysvipc"),
    Descriptor::boolean("allow.raw_sockets"),
    Descriptor::boolean("allow.chflags"),
    Descriptor::boolean("allow.mount"),
    Descriptor::boolean("allow.quotas"),
    Descriptor::boolean("allow.socket_af"),
    Descriptor::addrs("ip4.addr", 4),
    Descriptor::addrs("ip6.addr", 16),
];

static REGISTRY: LazyLock<HashMap<&'static str, Descriptor>> =
    LazyLock::new(|| PARAMS.iter().map(|d| (d.name, *d)).collect());

/// Look up the descriptor for a parameter name
pub fn lookup(name: &str) -> Option<&'static Descriptor> {
    REGISTRY.get(name)
}

/// Look up a descriptor, treating absence as an error
pub fn descriptor(name: &str) -> Result<&'static Descriptor> {
    lookup(name).ok_or_else(|| Error::UnknownParameter(name.to_string()))
}

/// All known descriptors, in registration order
pub fn descriptors() -> impl Iterator<Item = &'static Descriptor> {
    PARAMS.iter()
}
