//! Command handlers
//!
//! The helm drives jails through a [`Kernel`]; the CLI hands it parsed
//! arguments and it prints results to stdout.

use crate::error::{Error, Result};
use crate::jail::registry;
use crate::jail::{Jail, JailConfig, JailInfo, Kernel, ParamValue, enumerate};
use crate::manifest::BrigConfig;
use crate::network::ifaddr;
use std::net::IpAddr;
use std::process::ExitStatus;
use tracing::{debug, warn};

/// Jail command handlers over one kernel bridge
pub struct Helm<K: Kernel + Clone> {
    kernel: K,
}

impl<K: Kernel + Clone> Helm<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }

    fn find(&self, key: &str) -> Result<Jail<K>> {
        Jail::find(self.kernel.clone(), key)
    }

    /// List running jails
    ///
    /// When the scan fails part way, the jails read so far are printed
    /// before the error is returned.
    pub fn ls(&self, json: bool) -> Result<()> {
        let (jails, err) = enumerate(self.kernel.clone());
        let infos: Vec<&JailInfo> = jails.iter().map(|j| j.info()).collect();

        if json {
            println!("{}", serde_json::to_string_pretty(&infos)?);
        } else {
            print!("{}", render_table(&infos));
        }

        match err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Show one jail
    pub fn show(&self, key: &str, json: bool) -> Result<()> {
        let jail = self.find(key)?;
        let info = jail.info();

        if json {
            println!("{}", serde_json::to_string_pretty(info)?);
        } else {
            println!("jid:       {}", info.jid);
            println!("name:      {}", info.name);
            println!("hostname:  {}", info.hostname);
            println!("path:      {}", info.path.display());
            println!("parent:    {}", info.parent);
            println!("cpuset.id: {}", info.cpuset_id);
            println!("ip4.addr:  {}", ParamValue::Ipv4(info.ip4.clone()));
        }
        Ok(())
    }

    /// Create a jail, then apply its cpuset if one is given
    pub fn create(&self, config: &JailConfig, cpuset: Option<i32>) -> Result<Jail<K>> {
        warn_unconfigured(&config.ips);

        let mut jail = Jail::create(self.kernel.clone(), config)?;
        if let Some(id) = cpuset {
            jail.set_cpuset_id(id)?;
        }

        println!("Created jail '{}' (jid {})", jail.name(), jail.jid());
        Ok(jail)
    }

    /// Create configured jails that are not already running
    pub fn up(&self, config: &BrigConfig, only: Option<&str>) -> Result<()> {
        let defs: Vec<_> = match only {
            Some(name) => vec![
                config
                    .get_jail(name)
                    .ok_or_else(|| Error::JailNotFound(name.to_string()))?,
            ],
            None => config.jails.iter().collect(),
        };

        for def in defs {
            match self.find(&def.name) {
                Ok(jail) => {
                    println!("Jail '{}' is already running (jid {})", def.name, jail.jid());
                    continue;
                }
                Err(Error::JailNotFound(_)) => {}
                Err(e) => return Err(e),
            }

            let jail_config = def.to_jail_config(&config.config)?;
            self.create(&jail_config, def.cpuset)?;
        }
        Ok(())
    }

    /// Read one parameter live from the kernel
    pub fn get(&self, key: &str, param: &str) -> Result<ParamValue> {
        self.find(key)?.get_param(param)
    }

    /// Update one parameter from its textual form
    pub fn set(&self, key: &str, param: &str, text: &str) -> Result<()> {
        let desc = registry::descriptor(param)?;
        let value = ParamValue::parse(desc, text)?;

        let mut jail = self.find(key)?;
        jail.set_param(param, value)?;
        debug!(jid = jail.jid(), param, "parameter updated");
        Ok(())
    }

    pub fn hostname(&self, key: &str, hostname: &str) -> Result<()> {
        let mut jail = self.find(key)?;
        jail.set_hostname(hostname)?;
        println!("{}: hostname set to {}", jail.name(), jail.hostname());
        Ok(())
    }

    pub fn cpuset(&self, key: &str, id: i32) -> Result<()> {
        let mut jail = self.find(key)?;
        jail.set_cpuset_id(id)?;
        println!("{}: cpuset.id set to {}", jail.name(), jail.cpuset_id());
        Ok(())
    }

    pub fn destroy(&self, key: &str) -> Result<()> {
        let mut jail = self.find(key)?;
        jail.destroy()?;
        println!("Destroyed jail '{}' (jid {})", jail.name(), jail.jid());
        Ok(())
    }

    /// Run a command inside a jail via jexec and wait for it
    pub fn exec(&self, key: &str, command: &[String]) -> Result<ExitStatus> {
        let (cmd, args) = command
            .split_first()
            .ok_or_else(|| Error::ConfigValidation("No command given".into()))?;

        let jail = self.find(key)?;
        Ok(jail.exec(cmd, args)?.status()?)
    }
}

/// Print the parameter registry
pub fn print_params() {
    println!("{:<22} {}", "PARAMETER", "TYPE");
    println!("{}", "-".repeat(42));
    for desc in registry::descriptors() {
        println!("{:<22} {}", desc.name, desc.kind);
    }
}

/// Print host interface addresses
pub fn print_addrs(json: bool) -> Result<()> {
    let addrs = ifaddr::enum_addrs()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&addrs)?);
    } else {
        println!("{:<12} {}", "INTERFACE", "ADDRESS");
        println!("{}", "-".repeat(42));
        for a in addrs {
            println!("{:<12} {}", a.interface, a.addr);
        }
    }
    Ok(())
}

/// Warn about jail addresses that no host interface carries
fn warn_unconfigured(ips: &[IpAddr]) {
    if ips.is_empty() {
        return;
    }

    match ifaddr::enum_addrs() {
        Ok(host) => {
            for ip in ifaddr::missing(&host, ips) {
                warn!(%ip, "address is not configured on any host interface");
            }
        }
        Err(e) => debug!(error = %e, "could not list host addresses"),
    }
}

fn render_table(jails: &[&JailInfo]) -> String {
    let mut out = format!(
        "{:>5} {:<20} {:<24} {}\n",
        "JID", "NAME", "HOSTNAME", "PATH"
    );
    out.push_str(&"-".repeat(64));
    out.push('\n');

    for info in jails {
        out.push_str(&format!(
            "{:>5} {:<20} {:<24} {}\n",
            info.jid,
            info.name,
            info.hostname,
            info.path.display()
        ));
    }
    out
}
