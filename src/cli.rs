//! Command-line interface for Brig
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Brig - FreeBSD jail parameter tool
#[derive(Parser)]
#[command(name = "brig")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "brig.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// List running jails
    Ls {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one jail
    Show {
        /// Jail name or ID
        jail: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Create a persistent jail
    Create {
        /// Jail name
        name: String,

        /// Jail root directory
        path: PathBuf,

        /// Hostname (defaults to the name)
        #[arg(long)]
        hostname: Option<String>,

        /// IP address to assign (repeatable)
        #[arg(long = "ip")]
        ips: Vec<String>,

        /// Extra parameter (NAME=VALUE, repeatable)
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },

    /// Create jails defined in the config file
    Up {
        /// Specific jail to create (all if omitted)
        jail: Option<String>,
    },

    /// Read a parameter from a running jail
    Get {
        /// Jail name or ID
        jail: String,

        /// Parameter name
        param: String,
    },

    /// Update a parameter on a running jail
    Set {
        /// Jail name or ID
        jail: String,

        /// NAME=VALUE
        #[arg(value_parser = parse_key_val)]
        param: (String, String),
    },

    /// Change a jail's hostname
    Hostname {
        /// Jail name or ID
        jail: String,

        /// New hostname
        hostname: String,
    },

    /// Assign a cpuset to a jail
    Cpuset {
        /// Jail name or ID
        jail: String,

        /// Cpuset ID
        id: i32,
    },

    /// Remove a jail, killing its processes
    Destroy {
        /// Jail name or ID
        jail: String,
    },

    /// Execute a command in a running jail
    Exec {
        /// Jail name or ID
        jail: String,

        /// Command to execute (use -- to separate from options)
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// List known jail parameters
    Params,

    /// List IP addresses configured on host interfaces
    Addrs {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse a key-value pair (KEY=VALUE)
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid NAME=VALUE: no `=` found in `{s}`"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "brig", &mut std::io::stdout());
    }
}
