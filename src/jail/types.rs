//! Jail parameter values and typed extraction

use super::registry::{Descriptor, Family, ParamType};
use crate::error::{Error, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Jail parameter value types
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Integer value (maps to C int)
    Int(i32),
    /// String value
    String(String),
    /// Boolean value
    Bool(bool),
    /// List of IPv4 addresses
    Ipv4(Vec<Ipv4Addr>),
    /// List of IPv6 addresses
    Ipv6(Vec<Ipv6Addr>),
}

impl ParamValue {
    /// Short description of the value's shape, used in type errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "an integer",
            ParamValue::String(_) => "a string",
            ParamValue::Bool(_) => "a boolean",
            ParamValue::Ipv4(_) => "IPv4 addresses",
            ParamValue::Ipv6(_) => "IPv6 addresses",
        }
    }

    /// Parse the textual form of a value for the given parameter
    ///
    /// Address lists are comma separated; an empty string is an empty list.
    pub fn parse(desc: &Descriptor, text: &str) -> Result<Self> {
        let malformed = |reason: String| Error::MalformedValue {
            name: desc.name.to_string(),
            reason,
        };

        match desc.kind {
            ParamType::Integer => text
                .trim()
                .parse::<i32>()
                .map(ParamValue::Int)
                .map_err(|e| malformed(format!("'{}': {}", text, e))),
            ParamType::String => Ok(ParamValue::String(text.to_string())),
            ParamType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(ParamValue::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(ParamValue::Bool(false)),
                other => Err(malformed(format!("'{}' is not a boolean", other))),
            },
            ParamType::IpAddress | ParamType::IpAddressList => {
                let family = address_family(desc)?;
                let parts: Vec<&str> = text
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();

                if desc.kind == ParamType::IpAddress && parts.len() != 1 {
                    return Err(malformed(format!(
                        "expected exactly one address, got {}",
                        parts.len()
                    )));
                }

                match family {
                    Family::V4 => parts
                        .iter()
                        .map(|s| {
                            parse_v4(s).ok_or_else(|| {
                                malformed(format!("'{}' is not an IPv4 address", s))
                            })
                        })
                        .collect::<Result<Vec<_>>>()
                        .map(ParamValue::Ipv4),
                    Family::V6 => parts
                        .iter()
                        .map(|s| s.parse::<Ipv6Addr>())
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .map(ParamValue::Ipv6)
                        .map_err(|e| malformed(format!("'{}': {}", text, e))),
                }
            }
        }
    }

    /// Convert a TOML value to a value for the given parameter
    pub fn from_toml(desc: &Descriptor, value: &toml::Value) -> Result<Self> {
        match (desc.kind, value) {
            (ParamType::Integer, toml::Value::Integer(i)) => i32::try_from(*i)
                .map(ParamValue::Int)
                .map_err(|_| Error::MalformedValue {
                    name: desc.name.to_string(),
                    reason: format!("{} does not fit a C int", i),
                }),
            (ParamType::Boolean, toml::Value::Boolean(b)) => Ok(ParamValue::Bool(*b)),
            (ParamType::String, toml::Value::String(s)) => Ok(ParamValue::String(s.clone())),
            (ParamType::IpAddress | ParamType::IpAddressList, toml::Value::String(s)) => {
                Self::parse(desc, s)
            }
            (ParamType::IpAddressList, toml::Value::Array(items)) => {
                let mut joined = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        toml::Value::String(s) => joined.push(s.as_str()),
                        other => {
                            return Err(Error::ConfigValidation(format!(
                                "Parameter '{}' expects address strings, got {:?}",
                                desc.name, other
                            )));
                        }
                    }
                }
                Self::parse(desc, &joined.join(","))
            }
            (_, other) => Err(Error::ConfigValidation(format!(
                "Unsupported value for parameter '{}' ({}): {:?}",
                desc.name, desc.kind, other
            ))),
        }
    }
}

/// Dotted quad, or its v4-mapped IPv6 spelling (`::ffff:a.b.c.d`)
fn parse_v4(s: &str) -> Option<Ipv4Addr> {
    s.parse::<Ipv4Addr>()
        .ok()
        .or_else(|| s.parse::<Ipv6Addr>().ok()?.to_ipv4_mapped())
}

pub(crate) fn address_family(desc: &Descriptor) -> Result<Family> {
    desc.family().ok_or_else(|| Error::TypeMismatch {
        name: desc.name.to_string(),
        expected: desc.kind,
        found: "a parameter without an ip4/ip6 prefix",
    })
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, addrs: &[T]) -> fmt::Result {
            for (i, addr) in addrs.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", addr)?;
            }
            Ok(())
        }

        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::String(s) => write!(f, "{}", s),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Ipv4(addrs) => join(f, addrs),
            ParamValue::Ipv6(addrs) => join(f, addrs),
        }
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<Ipv4Addr> for ParamValue {
    fn from(v: Ipv4Addr) -> Self {
        ParamValue::Ipv4(vec![v])
    }
}

impl From<Vec<Ipv4Addr>> for ParamValue {
    fn from(v: Vec<Ipv4Addr>) -> Self {
        ParamValue::Ipv4(v)
    }
}

impl From<Ipv6Addr> for ParamValue {
    fn from(v: Ipv6Addr) -> Self {
        ParamValue::Ipv6(vec![v])
    }
}

impl From<Vec<Ipv6Addr>> for ParamValue {
    fn from(v: Vec<Ipv6Addr>) -> Self {
        ParamValue::Ipv6(v)
    }
}

/// Types a decoded parameter value can be extracted into
///
/// Scalar address targets take the first entry of a decoded list; list
/// targets always take the full set.
pub trait FromParam: Sized {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self>;
}

fn mismatch(desc: &Descriptor, found: &'static str) -> Error {
    Error::TypeMismatch {
        name: desc.name.to_string(),
        expected: desc.kind,
        found,
    }
}

fn first<T>(desc: &Descriptor, addrs: Vec<T>) -> Result<T> {
    addrs.into_iter().next().ok_or_else(|| Error::MalformedValue {
        name: desc.name.to_string(),
        reason: "no address present".to_string(),
    })
}

impl FromParam for ParamValue {
    fn from_param(_desc: &Descriptor, value: ParamValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromParam for i32 {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self> {
        match value {
            ParamValue::Int(v) => Ok(v),
            _ => Err(mismatch(desc, "an integer")),
        }
    }
}

impl FromParam for bool {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self> {
        match value {
            ParamValue::Bool(v) => Ok(v),
            _ => Err(mismatch(desc, "a boolean")),
        }
    }
}

impl FromParam for String {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self> {
        match value {
            ParamValue::String(v) => Ok(v),
            _ => Err(mismatch(desc, "a string")),
        }
    }
}

impl FromParam for Vec<Ipv4Addr> {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self> {
        match value {
            ParamValue::Ipv4(v) => Ok(v),
            _ => Err(mismatch(desc, "IPv4 addresses")),
        }
    }
}

impl FromParam for Vec<Ipv6Addr> {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self> {
        match value {
            ParamValue::Ipv6(v) => Ok(v),
            _ => Err(mismatch(desc, "IPv6 addresses")),
        }
    }
}

impl FromParam for Vec<IpAddr> {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self> {
        match value {
            ParamValue::Ipv4(v) => Ok(v.into_iter().map(IpAddr::V4).collect()),
            ParamValue::Ipv6(v) => Ok(v.into_iter().map(IpAddr::V6).collect()),
            _ => Err(mismatch(desc, "IP addresses")),
        }
    }
}

impl FromParam for Ipv4Addr {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self> {
        first(desc, Vec::<Ipv4Addr>::from_param(desc, value)?)
    }
}

impl FromParam for Ipv6Addr {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self> {
        first(desc, Vec::<Ipv6Addr>::from_param(desc, value)?)
    }
}

impl FromParam for IpAddr {
    fn from_param(desc: &Descriptor, value: ParamValue) -> Result<Self> {
        first(desc, Vec::<IpAddr>::from_param(desc, value)?)
    }
}
