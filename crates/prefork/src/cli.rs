//! Command line options of a server binary.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use crate::{Address, Configuration};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Serve HTTP from a pool of preforked worker processes")]
pub struct Options {
    /// Number of worker processes
    #[arg(short, long, env = "WEB_CONCURRENCY", default_value_t = 1)]
    pub workers: usize,

    /// Address to listen on, `host:port` or `unix:/path`; may be repeated
    #[arg(short, long = "bind", value_name = "ADDRESS")]
    pub bind: Vec<Address>,

    /// Port of the default address `0.0.0.0:<port>`, used when nothing is bound explicitly
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Seconds a worker may stay silent before it is killed, 0 disables the check
    #[arg(short, long, default_value_t = 30)]
    pub timeout: u64,

    /// Maximum number of pending connections per listener
    #[arg(long, default_value_t = 2048)]
    pub backlog: i32,

    /// Seconds to wait for workers to finish on SIGTERM
    #[arg(long, default_value_t = 30)]
    pub graceful_timeout: u64,

    /// Directory for the worker heartbeat files
    #[arg(long, value_name = "DIR")]
    pub worker_tmp_dir: Option<PathBuf>,

    /// Detach from the terminal
    #[arg(short = 'D', long)]
    pub daemon: bool,

    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,
}

impl Options {
    pub fn addresses(&self) -> Vec<Address> {
        if self.bind.is_empty() { vec![Address::ip("0.0.0.0", self.port)] } else { self.bind.clone() }
    }

    pub fn configuration(&self) -> Configuration {
        let configuration = Configuration::new()
            .with_addresses(self.addresses())
            .with_timeout(self.timeout)
            .with_backlog(self.backlog)
            .with_graceful_timeout(self.graceful_timeout);

        match &self.worker_tmp_dir {
            Some(dir) => configuration.with_worker_tmp_dir(dir),
            None => configuration,
        }
    }
}
