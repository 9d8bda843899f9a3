use prefork_http::handler::Handler;
use thiserror::Error;
use tracing::info;

use crate::arbiter::Arbiter;
use crate::cli::Options;
use crate::error::ArbiterError;
use crate::{Address, Configuration};

pub struct ServerBuilder<H> {
    configuration: Configuration,
    workers: usize,
    daemon: bool,
    handler: Option<H>,
}

impl<H> ServerBuilder<H> {
    fn new() -> Self {
        Self { configuration: Configuration::new(), workers: 1, daemon: false, handler: None }
    }

    /// Adds an address to listen on.
    pub fn address(mut self, address: Address) -> Self {
        self.configuration = self.configuration.with_address(address);
        self
    }

    /// Replaces every setting, addresses included.
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<Server<H>, ServerBuildError> {
        let handler = self.handler.ok_or(ServerBuildError::MissingHandler)?;
        if self.configuration.addresses().is_empty() {
            return Err(ServerBuildError::MissingAddress);
        }
        Ok(Server { configuration: self.configuration, workers: self.workers, daemon: self.daemon, handler })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ServerBuildError {
    #[error("handler must be set")]
    MissingHandler,
    #[error("address must be set")]
    MissingAddress,
}

/// A configured server, ready to start its arbiter.
#[derive(Debug)]
pub struct Server<H> {
    configuration: Configuration,
    workers: usize,
    daemon: bool,
    handler: H,
}

impl<H> Server<H> {
    pub fn builder() -> ServerBuilder<H> {
        ServerBuilder::new()
    }

    /// A server set up from parsed command line options.
    pub fn from_options(options: &Options, handler: H) -> Self {
        Self { configuration: options.configuration(), workers: options.workers, daemon: options.daemon, handler }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl<H: Handler + 'static> Server<H> {
    /// Runs the arbiter in this process until it is told to stop.
    pub fn start(self) -> Result<(), ArbiterError> {
        let addresses: Vec<String> = self.configuration.addresses().iter().map(ToString::to_string).collect();
        info!(?addresses, workers = self.workers, "starting server");

        Arbiter::new(self.configuration, self.workers, self.handler).run(self.daemon)
    }
}

impl<H> std::fmt::Debug for ServerBuilder<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("configuration", &self.configuration)
            .field("workers", &self.workers)
            .field("daemon", &self.daemon)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
