//! Configuration file parsing for Brig
//!
//! Parses `brig.toml` configuration files using serde

use crate::error::{Error, Result};
use crate::jail::codec;
use crate::jail::registry;
use crate::jail::{JailConfig, ParamValue};
use ipnet::IpNet;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Parameters bound by jail creation itself; they have dedicated fields
const RESERVED_PARAMS: &[&str] = &[
    "jid",
    "lastjid",
    "name",
    "path",
    "host.hostname",
    "persist",
    "ip4.addr",
    "ip6.addr",
];

/// Load configuration from a file
pub fn load(path: &Path) -> Result<BrigConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: BrigConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct BrigConfig {
    /// Global configuration settings
    #[serde(default)]
    pub config: GlobalConfig,

    /// Jail definitions
    #[serde(default)]
    pub jails: Vec<JailDef>,
}

impl BrigConfig {
    /// Validate the configuration
    ///
    /// Every jail definition is converted once, so bad addresses, unknown
    /// parameters and values of the wrong type are reported at load time.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for jail in &self.jails {
            if jail.name.is_empty() {
                return Err(Error::ConfigValidation("Jail name cannot be empty".into()));
            }
            if !names.insert(&jail.name) {
                return Err(Error::ConfigValidation(format!(
                    "Duplicate jail name: {}",
                    jail.name
                )));
            }

            jail.to_jail_config(&self.config)?;
        }

        Ok(())
    }

    /// Get a jail definition by name
    pub fn get_jail(&self, name: &str) -> Option<&JailDef> {
        self.jails.iter().find(|j| j.name == name)
    }
}

/// Global configuration settings
#[derive(Debug, Default, Deserialize)]
pub struct GlobalConfig {
    /// Directory holding jail roots; a jail without `path` uses `<jails_dir>/<name>`
    pub jails_dir: Option<PathBuf>,
}

/// Jail definition
#[derive(Debug, Clone, Deserialize)]
pub struct JailDef {
    /// Jail name
    pub name: String,

    /// Path to jail root (defaults to `jails_dir/name`)
    pub path: Option<PathBuf>,

    /// Jail hostname (defaults to the name)
    pub hostname: Option<String>,

    /// IPv4 addresses, bare or in CIDR form
    #[serde(default)]
    pub ip4: Vec<String>,

    /// IPv6 addresses, bare or in CIDR form
    #[serde(default)]
    pub ip6: Vec<String>,

    /// Cpuset to assign after creation
    pub cpuset: Option<i32>,

    /// Additional jail parameters
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
}

impl JailDef {
    /// Get the effective path for this jail
    pub fn effective_path(&self, global: &GlobalConfig) -> Result<PathBuf> {
        match (&self.path, &global.jails_dir) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(dir)) => Ok(dir.join(&self.name)),
            (None, None) => Err(Error::ConfigValidation(format!(
                "Jail '{}' has no path and no jails_dir is configured",
                self.name
            ))),
        }
    }

    /// All configured addresses, IPv4 first
    pub fn addresses(&self) -> Result<Vec<IpAddr>> {
        let mut addrs = Vec::with_capacity(self.ip4.len() + self.ip6.len());

        for s in &self.ip4 {
            match parse_addr(s)? {
                ip @ IpAddr::V4(_) => addrs.push(ip),
                IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                    Some(v4) => addrs.push(IpAddr::V4(v4)),
                    None => {
                        return Err(Error::ConfigValidation(format!(
                            "Jail '{}': '{}' is not an IPv4 address",
                            self.name, s
                        )));
                    }
                },
            }
        }
        for s in &self.ip6 {
            match parse_addr(s)? {
                ip @ IpAddr::V6(_) => addrs.push(ip),
                IpAddr::V4(_) => {
                    return Err(Error::ConfigValidation(format!(
                        "Jail '{}': '{}' is not an IPv6 address",
                        self.name, s
                    )));
                }
            }
        }

        Ok(addrs)
    }

    /// Build the creation settings for this jail
    pub fn to_jail_config(&self, global: &GlobalConfig) -> Result<JailConfig> {
        let mut config = JailConfig::new(&self.name, self.effective_path(global)?);
        if let Some(hostname) = &self.hostname {
            config = config.hostname(hostname);
        }
        for ip in self.addresses()? {
            config = config.ip(ip);
        }

        for (name, value) in &self.params {
            if RESERVED_PARAMS.contains(&name.as_str()) {
                return Err(Error::ConfigValidation(format!(
                    "Jail '{}': parameter '{}' is set by a dedicated field",
                    self.name, name
                )));
            }

            let desc = registry::descriptor(name)?;
            let value = ParamValue::from_toml(desc, value)?;
            codec::encode(desc, &value)?;
            config = config.param(name, value);
        }

        Ok(config)
    }
}

/// Parse `10.0.0.5` or `10.0.0.5/24`; the prefix length is dropped
pub fn parse_addr(s: &str) -> Result<IpAddr> {
    s.parse::<IpNet>()
        .map(|net| net.addr())
        .or_else(|_| s.parse::<IpAddr>())
        .map_err(|_| Error::ConfigValidation(format!("Invalid IP address: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[[jails]]
name = "test"
path = "/jails/test"
"#;

        let config: BrigConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.jails.len(), 1);
        assert_eq!(config.jails[0].name, "test");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[config]
jails_dir = "/usr/jails"

[[jails]]
name = "www"
hostname = "www.example.org"
ip4 = ["10.0.0.5", "10.0.0.6/24", "::ffff:10.0.0.7"]
ip6 = ["fd00::5"]
cpuset = 3

[jails.params]
"allow.raw_sockets" = true
securelevel = 2
"#;

        let config: BrigConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        let jail = config.get_jail("www").unwrap();
        assert_eq!(jail.cpuset, Some(3));
        assert_eq!(
            jail.effective_path(&config.config).unwrap(),
            PathBuf::from("/usr/jails/www")
        );

        let jc = jail.to_jail_config(&config.config).unwrap();
        assert_eq!(jc.hostname.as_deref(), Some("www.example.org"));
        assert_eq!(
            jc.ips,
            vec![
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6)),
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
                IpAddr::V6("fd00::5".parse::<Ipv6Addr>().unwrap()),
            ]
        );
        assert!(jc
            .params
            .contains(&("securelevel".to_string(), ParamValue::Int(2))));
        assert!(jc
            .params
            .contains(&("allow.raw_sockets".to_string(), ParamValue::Bool(true))));
    }

    #[test]
    fn test_duplicate_names() {
        let toml = r#"
[[jails]]
name = "a"
path = "/a"

[[jails]]
name = "a"
path = "/b"
"#;
        let config: BrigConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_missing_path() {
        let toml = r#"
[[jails]]
name = "a"
"#;
        let config: BrigConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_unknown_param() {
        let toml = r#"
[[jails]]
name = "a"
path = "/a"

[jails.params]
"bogus.param" = 1
"#;
        let config: BrigConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::UnknownParameter(_))));
    }

    #[test]
    fn test_wrong_param_type() {
        let toml = r#"
[[jails]]
name = "a"
path = "/a"

[jails.params]
securelevel = "high"
"#;
        let config: BrigConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reserved_param() {
        let toml = r#"
[[jails]]
name = "a"
path = "/a"

[jails.params]
persist = false
"#;
        let config: BrigConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_address_family_checked() {
        let toml = r#"
[[jails]]
name = "a"
path = "/a"
ip4 = ["fd00::1"]
"#;
        let config: BrigConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_parse_addr() {
        assert_eq!(
            parse_addr("10.0.0.6/24").unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 6))
        );
        assert_eq!(parse_addr("::1").unwrap(), IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert!(parse_addr("not-an-ip").is_err());
    }
}
