//! Binary codec between typed parameter values and raw kernel buffers
//!
//! Each [`ParamType`] maps to one encoder and one decoder; dispatch is an
//! exhaustive match on the descriptor's type, never on the value.
//!
//! Wire forms:
//! - Integer: host-endian C `int`
//! - String: bytes plus one trailing NUL
//! - Boolean: one byte, zero is false
//! - IpAddress / IpAddressList: packed 4- or 16-byte entries, no count
//!   prefix, stride chosen by the `ip4`/`ip6` name prefix

use super::registry::{self, Descriptor, Family, ParamType};
use super::types::{ParamValue, address_family};
use crate::error::{Error, Result};
use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr};

const INT_LEN: usize = mem::size_of::<libc::c_int>();

/// Encode a value into the raw form its descriptor calls for
pub fn encode(desc: &Descriptor, value: &ParamValue) -> Result<Vec<u8>> {
    match desc.kind {
        ParamType::Integer => encode_int(desc, value),
        ParamType::String => encode_string(desc, value),
        ParamType::Boolean => encode_bool(desc, value),
        ParamType::IpAddress => encode_addrs(desc, value, true),
        ParamType::IpAddressList => encode_addrs(desc, value, false),
    }
}

/// Decode a raw kernel buffer according to its descriptor
pub fn decode(desc: &Descriptor, bytes: &[u8]) -> Result<ParamValue> {
    match desc.kind {
        ParamType::Integer => decode_int(desc, bytes),
        ParamType::String => decode_string(desc, bytes),
        ParamType::Boolean => decode_bool(desc, bytes),
        ParamType::IpAddress => decode_addrs(desc, bytes, true),
        ParamType::IpAddressList => decode_addrs(desc, bytes, false),
    }
}

/// Encode by parameter name, looking the descriptor up in the registry
pub fn encode_named(name: &str, value: &ParamValue) -> Result<Vec<u8>> {
    encode(registry::descriptor(name)?, value)
}

/// Decode by parameter name, looking the descriptor up in the registry
pub fn decode_named(name: &str, bytes: &[u8]) -> Result<ParamValue> {
    decode(registry::descriptor(name)?, bytes)
}

fn mismatch(desc: &Descriptor, value: &ParamValue) -> Error {
    Error::TypeMismatch {
        name: desc.name.to_string(),
        expected: desc.kind,
        found: value.kind_name(),
    }
}

fn malformed(desc: &Descriptor, reason: impl Into<String>) -> Error {
    Error::MalformedValue {
        name: desc.name.to_string(),
        reason: reason.into(),
    }
}

fn encode_int(desc: &Descriptor, value: &ParamValue) -> Result<Vec<u8>> {
    let ParamValue::Int(v) = value else {
        return Err(mismatch(desc, value));
    };

    let mut buf = Vec::with_capacity(INT_LEN);
    buf.write_i32::<NativeEndian>(*v)?;
    Ok(buf)
}

fn decode_int(desc: &Descriptor, bytes: &[u8]) -> Result<ParamValue> {
    if bytes.len() < INT_LEN {
        return Err(malformed(
            desc,
            format!("expected {} bytes, got {}", INT_LEN, bytes.len()),
        ));
    }

    let mut reader = &bytes[..INT_LEN];
    Ok(ParamValue::Int(reader.read_i32::<NativeEndian>()?))
}

fn encode_string(desc: &Descriptor, value: &ParamValue) -> Result<Vec<u8>> {
    let ParamValue::String(s) = value else {
        return Err(mismatch(desc, value));
    };

    // Embedded NULs pass through untouched; only one terminator is added.
    let mut buf = Vec::with_capacity(s.len() + 1);
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(buf)
}

fn decode_string(desc: &Descriptor, bytes: &[u8]) -> Result<ParamValue> {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);

    String::from_utf8(bytes[..end].to_vec())
        .map(ParamValue::String)
        .map_err(|e| malformed(desc, e.to_string()))
}

fn encode_bool(desc: &Descriptor, value: &ParamValue) -> Result<Vec<u8>> {
    match value {
        ParamValue::Bool(b) => Ok(vec![u8::from(*b)]),
        other => Err(mismatch(desc, other)),
    }
}

fn decode_bool(desc: &Descriptor, bytes: &[u8]) -> Result<ParamValue> {
    if bytes.is_empty() {
        return Err(malformed(desc, "empty buffer"));
    }
    // The kernel reports flags as a full C int; any set byte means true.
    Ok(ParamValue::Bool(bytes.iter().any(|&b| b != 0)))
}

fn encode_addrs(desc: &Descriptor, value: &ParamValue, single: bool) -> Result<Vec<u8>> {
    let family = address_family(desc)?;

    let count = match value {
        ParamValue::Ipv4(addrs) => addrs.len(),
        ParamValue::Ipv6(addrs) => addrs.len(),
        other => return Err(mismatch(desc, other)),
    };
    if single && count != 1 {
        return Err(malformed(
            desc,
            format!("expected exactly one address, got {}", count),
        ));
    }

    let mut buf = Vec::with_capacity(count * family.stride());
    match (family, value) {
        (Family::V4, ParamValue::Ipv4(addrs)) => {
            for addr in addrs {
                buf.extend_from_slice(&addr.octets());
            }
        }
        (Family::V4, ParamValue::Ipv6(addrs)) => {
            for addr in addrs {
                let v4 = addr.to_ipv4_mapped().ok_or_else(|| mismatch(desc, value))?;
                buf.extend_from_slice(&v4.octets());
            }
        }
        (Family::V6, ParamValue::Ipv4(addrs)) => {
            for addr in addrs {
                buf.extend_from_slice(&addr.to_ipv6_mapped().octets());
            }
        }
        (Family::V6, ParamValue::Ipv6(addrs)) => {
            for addr in addrs {
                buf.extend_from_slice(&addr.octets());
            }
        }
        _ => return Err(mismatch(desc, value)),
    }

    Ok(buf)
}

fn decode_addrs(desc: &Descriptor, bytes: &[u8], single: bool) -> Result<ParamValue> {
    let family = address_family(desc)?;
    let stride = family.stride();

    if bytes.len() % stride != 0 {
        return Err(malformed(
            desc,
            format!("{} bytes is not a multiple of {}", bytes.len(), stride),
        ));
    }
    if single && bytes.is_empty() {
        return Err(malformed(desc, "empty buffer"));
    }

    let take = if single { 1 } else { bytes.len() / stride };
    let chunks = bytes.chunks_exact(stride).take(take);

    Ok(match family {
        Family::V4 => ParamValue::Ipv4(
            chunks
                .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
                .collect(),
        ),
        Family::V6 => ParamValue::Ipv6(
            chunks
                .map(|c| {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(c);
                    Ipv6Addr::from(octets)
                })
                .collect(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jail::registry::lookup;

    fn roundtrip(name: &str, value: ParamValue) {
        let desc = lookup(name).unwrap();
        let bytes = encode(desc, &value).unwrap();
        assert_eq!(decode(desc, &bytes).unwrap(), value, "{}", name);
    }

    #[test]
    fn test_roundtrip_each_type() {
        roundtrip("securelevel", ParamValue::Int(42));
        roundtrip("persist", ParamValue::Bool(true));
        roundtrip("persist", ParamValue::Bool(false));
        roundtrip("host.hostname", ParamValue::String("example".into()));
        roundtrip(
            "ip4.addr",
            ParamValue::Ipv4(vec![Ipv4Addr::LOCALHOST, Ipv4Addr::new(10, 0, 0, 1)]),
        );

        let single = Descriptor::new("ip4.addr", ParamType::IpAddress, 4);
        let value = ParamValue::Ipv4(vec![Ipv4Addr::LOCALHOST]);
        let bytes = encode(&single, &value).unwrap();
        assert_eq!(bytes, vec![127, 0, 0, 1]);
        assert_eq!(decode(&single, &bytes).unwrap(), value);
    }

    #[test]
    fn test_int_is_host_endian_c_int() {
        let bytes = encode_named("jid", &ParamValue::Int(7)).unwrap();
        assert_eq!(bytes, 7i32.to_ne_bytes().to_vec());
        assert!(matches!(
            decode_named("jid", &[1, 2]),
            Err(Error::MalformedValue { .. })
        ));
    }

    #[test]
    fn test_string_terminator() {
        let bytes = encode_named("name", &ParamValue::String("t1".into())).unwrap();
        assert_eq!(bytes, b"t1\0".to_vec());

        // Kernel buffers may carry padding after the terminator
        assert_eq!(
            decode_named("name", b"t1\0\0\0\0").unwrap(),
            ParamValue::String("t1".into())
        );

        let embedded = encode_named("name", &ParamValue::String("a\0b".into())).unwrap();
        assert_eq!(embedded, b"a\0b\0".to_vec());
    }

    #[test]
    fn test_bool_wire_form() {
        assert_eq!(encode_named("persist", &ParamValue::Bool(true)).unwrap(), vec![1]);
        assert_eq!(encode_named("persist", &ParamValue::Bool(false)).unwrap(), vec![0]);
        assert_eq!(
            decode_named("persist", &1i32.to_ne_bytes()).unwrap(),
            ParamValue::Bool(true)
        );
        assert_eq!(
            decode_named("persist", &[0, 0, 0, 0]).unwrap(),
            ParamValue::Bool(false)
        );
        assert!(decode_named("persist", &[]).is_err());
    }

    #[test]
    fn test_empty_address_list_is_valid() {
        let bytes = encode_named("ip4.addr", &ParamValue::Ipv4(vec![])).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(
            decode_named("ip4.addr", &bytes).unwrap(),
            ParamValue::Ipv4(vec![])
        );
    }

    #[test]
    fn test_misaligned_address_list() {
        assert!(matches!(
            decode_named("ip4.addr", &[127, 0, 0, 1, 10]),
            Err(Error::MalformedValue { .. })
        ));
        assert!(matches!(
            decode_named("ip6.addr", &[0; 20]),
            Err(Error::MalformedValue { .. })
        ));
    }

    #[test]
    fn test_scalar_address_takes_first_entry() {
        let single = Descriptor::new("ip4.addr", ParamType::IpAddress, 4);
        let decoded = decode(&single, &[127, 0, 0, 1, 10, 0, 0, 1]).unwrap();
        assert_eq!(decoded, ParamValue::Ipv4(vec![Ipv4Addr::LOCALHOST]));
        assert!(decode(&single, &[]).is_err());
    }

    #[test]
    fn test_family_follows_name_prefix() {
        // A v4 value bound to an ip6 parameter is widened to a mapped address
        let bytes = encode_named("ip6.addr", &ParamValue::Ipv4(vec![Ipv4Addr::LOCALHOST])).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(
            decode_named("ip6.addr", &bytes).unwrap(),
            ParamValue::Ipv6(vec![Ipv4Addr::LOCALHOST.to_ipv6_mapped()])
        );

        // A native v6 address has no 4-byte form
        assert!(matches!(
            encode_named("ip4.addr", &ParamValue::Ipv6(vec![Ipv6Addr::LOCALHOST])),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        assert!(matches!(
            encode_named("jid", &ParamValue::String("1".into())),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            encode_named("host.hostname", &ParamValue::Int(1)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_parameter() {
        assert!(matches!(
            encode_named("bogus.param", &ParamValue::Int(1)),
            Err(Error::UnknownParameter(_))
        ));
        assert!(matches!(
            decode_named("bogus.param", &[0, 0, 0, 0]),
            Err(Error::UnknownParameter(_))
        ));
    }
}
