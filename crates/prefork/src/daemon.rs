//! Detaching the arbiter from its terminal.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::process;

use nix::unistd::{ForkResult, dup2, fork, setsid};

use crate::error::ArbiterError;

const DEV_NULL: &str = "/dev/null";

/// Moves the calling process into the background.
///
/// Forks once; the parent exits right away and the child becomes the leader
/// of a new session, with its standard streams pointed at `/dev/null`. Must be
/// called while the process has a single thread.
pub fn daemonize() -> Result<(), ArbiterError> {
    // SAFETY: called from the arbiter before any worker or thread exists; the
    // parent only exits.
    match unsafe { fork() }.map_err(ArbiterError::daemonize)? {
        ForkResult::Parent { .. } => process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(ArbiterError::daemonize)?;

    let null = OpenOptions::new().read(true).write(true).open(DEV_NULL).map_err(ArbiterError::daemonize)?;
    for fd in 0..=2 {
        dup2(null.as_raw_fd(), fd).map_err(ArbiterError::daemonize)?;
    }
    Ok(())
}
