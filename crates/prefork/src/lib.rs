//! A preforking HTTP server
//!
//! One arbiter process binds the listening sockets and forks a pool of worker
//! processes that inherit them. Every worker accepts and serves one connection
//! at a time; parallelism comes from the number of workers only.
//!
//! # Example
//!
//! ```no_run
//! use std::convert::Infallible;
//! use bytes::Bytes;
//! use prefork::serve;
//! use prefork_http::handler::make_handler;
//! use prefork_http::protocol::{Request, Response};
//!
//! fn hello(request: Request<'_>) -> Result<Response, Infallible> {
//!     Ok(Response::new(Bytes::from(format!("Hello {}!", request.path()))))
//! }
//!
//! serve(make_handler(hello));
//! ```
//!
//! # Processes
//!
//! - [`arbiter`]: supervises the pool, reacts to signals, kills hung workers
//! - [`worker`]: the accept loop of each worker
//! - [`signals`]: signal delivery through a self-pipe, one channel per process
//! - [`heartbeat`]: liveness files written by workers and read by the arbiter
//!
//! The arbiter reacts to `SIGTERM` (graceful stop), `SIGINT`/`SIGQUIT`
//! (immediate stop), `SIGTTIN`/`SIGTTOU` (one worker more or less) and
//! `SIGCHLD` (reap and replace exited workers).

mod address;
mod config;
mod daemon;
mod error;
mod server;

pub mod arbiter;
pub mod cli;
pub mod heartbeat;
pub mod logging;
pub mod signals;
pub mod worker;

use std::process;

use clap::Parser;
use prefork_http::handler::Handler;
use tracing::{error, warn};

pub use address::{Address, Connection, Listener};
pub use config::Configuration;
pub use error::{AddressParseError, ArbiterError};
pub use server::{Server, ServerBuildError, ServerBuilder};

/// Serves `handler` with settings read from the command line and environment.
///
/// See [`cli::Options`] for the accepted options. Never returns: the process
/// exits with status 0 after a stop signal, or 1 when startup fails.
pub fn serve<H: Handler + 'static>(handler: H) -> ! {
    let options = cli::Options::parse();
    if let Err(e) = logging::init(options.log_level) {
        warn!(cause = %e, "keeping existing tracing subscriber");
    }

    match Server::from_options(&options, handler).start() {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!(cause = %e, "can't start server");
            process::exit(1)
        }
    }
}
