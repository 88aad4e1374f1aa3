//! Brig - FreeBSD jail parameter tool
//!
//! Command-line front end over the brig library.

mod cli;

use brig::error::Result;
use brig::helm::{Helm, print_addrs, print_params};
use brig::jail::{JailConfig, ParamValue, Syscall, registry};
use brig::manifest;
use cli::{Cli, Commands};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "brig=debug" } else { "brig=warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    let helm = Helm::new(Syscall);

    match cli.command {
        Commands::Ls { json } => helm.ls(json)?,
        Commands::Show { jail, json } => helm.show(&jail, json)?,
        Commands::Create {
            name,
            path,
            hostname,
            ips,
            params,
        } => {
            let mut config = JailConfig::new(name, path);
            if let Some(hostname) = hostname {
                config = config.hostname(hostname);
            }
            for ip in &ips {
                config = config.ip(manifest::parse_addr(ip)?);
            }
            for (name, text) in &params {
                let desc = registry::descriptor(name)?;
                config = config.param(name, ParamValue::parse(desc, text)?);
            }
            helm.create(&config, None)?;
        }
        Commands::Up { jail } => {
            let config = manifest::load(&cli.config)?;
            helm.up(&config, jail.as_deref())?;
        }
        Commands::Get { jail, param } => println!("{}", helm.get(&jail, &param)?),
        Commands::Set {
            jail,
            param: (name, value),
        } => helm.set(&jail, &name, &value)?,
        Commands::Hostname { jail, hostname } => helm.hostname(&jail, &hostname)?,
        Commands::Cpuset { jail, id } => helm.cpuset(&jail, id)?,
        Commands::Destroy { jail } => helm.destroy(&jail)?,
        Commands::Exec { jail, command } => {
            let status = helm.exec(&jail, &command)?;
            std::process::exit(status.code().unwrap_or(1));
        }
        Commands::Params => print_params(),
        Commands::Addrs { json } => print_addrs(json)?,
        Commands::Completion { shell } => Cli::generate_completion(shell),
    }

    Ok(())
}

