use std::io;

use thiserror::Error;

use crate::Address;

/// Failures of the arbiter process.
///
/// Only startup failures are fatal; once workers run, the arbiter logs and
/// carries on.
#[derive(Error, Debug)]
pub enum ArbiterError {
    #[error("can't listen on {address}: {source}")]
    Bind { address: Address, source: io::Error },

    #[error("no address to listen on")]
    NoAddress,

    #[error("can't fork worker: {source}")]
    Spawn {
        #[from]
        source: nix::Error,
    },

    #[error("can't create heartbeat file: {source}")]
    Heartbeat { source: io::Error },

    #[error("can't set up signal channel: {source}")]
    SignalChannel { source: io::Error },

    #[error("can't daemonize: {source}")]
    Daemonize { source: io::Error },

    #[error("can't set up worker: {source}")]
    WorkerSetup { source: io::Error },
}

impl ArbiterError {
    pub fn bind<E: Into<io::Error>>(address: &Address, e: E) -> Self {
        Self::Bind { address: address.clone(), source: e.into() }
    }

    pub fn heartbeat<E: Into<io::Error>>(e: E) -> Self {
        Self::Heartbeat { source: e.into() }
    }

    pub fn signal_channel<E: Into<io::Error>>(e: E) -> Self {
        Self::SignalChannel { source: e.into() }
    }

    pub fn daemonize<E: Into<io::Error>>(e: E) -> Self {
        Self::Daemonize { source: e.into() }
    }

    pub fn worker_setup<E: Into<io::Error>>(e: E) -> Self {
        Self::WorkerSetup { source: e.into() }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("missing port in address {address}")]
    MissingPort { address: String },

    #[error("invalid port in address {address}")]
    InvalidPort { address: String },

    #[error("empty unix socket path")]
    EmptyPath,
}
