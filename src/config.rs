//! Process configuration: command-line parsing and the settings derived
//! from it.
//!
//! The spec's CLI surface is a single optional positional port argument;
//! everything else here (log level, RPC timeout, maintenance interval) is
//! ambient and defaulted, following the usual `#[derive(Parser)]` +
//! `Config::load()` shape for a process entry point.

use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::maintenance;
use crate::peer;

/// Default TCP port when none is given on the command line.
pub const DEFAULT_PORT: u16 = 8008;

/// Default bind host: every local interface. Distinct from the announced
/// IP a node's identity and other peers use to reach it (§6.2) — peers
/// auto-detect their outbound IP and hash `announced_ip:port`, but the
/// listener itself binds wide so it's reachable regardless of which
/// interface the outbound route picked.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
struct Cli {
    /// TCP port this node listens on.
    port: Option<u16>,

    /// Log verbosity.
    #[arg(short = 'v', long, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_host: String,
    pub log_level: LogLevel,
    pub rpc_timeout: Duration,
    pub maintenance_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_host: DEFAULT_BIND_HOST.to_string(),
            log_level: LogLevel::default(),
            rpc_timeout: peer::DEFAULT_RPC_TIMEOUT,
            maintenance_interval: maintenance::DEFAULT_INTERVAL,
        }
    }
}

impl Config {
    /// Parses process arguments into a `Config`, falling back to defaults
    /// for everything the CLI doesn't expose.
    pub fn load() -> Self {
        let cli = Cli::parse();
        Self {
            port: cli.port.unwrap_or(DEFAULT_PORT),
            log_level: cli.log_level,
            ..Default::default()
        }
    }
}
