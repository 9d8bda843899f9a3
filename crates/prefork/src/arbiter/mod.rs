//! The arbiter: the parent process owning the listeners and the worker pool.
//!
//! The arbiter never touches a connection. It binds the listeners, forks the
//! workers, and from then on only reacts to signals and to the heartbeats of
//! its workers:
//!
//! | signal        | reaction                                             |
//! |---------------|------------------------------------------------------|
//! | `SIGTERM`     | graceful stop: workers get `SIGTERM` and time to exit |
//! | `SIGINT`/`SIGQUIT` | immediate stop: workers get `SIGQUIT`           |
//! | `SIGTTIN`     | one more worker                                      |
//! | `SIGTTOU`     | one worker less, never below one                     |
//! | `SIGCHLD`     | reap exited workers and replace them                 |

mod pool;

pub use pool::{Pool, Processes, WorkerHandle};

use std::os::fd::RawFd;
use std::process;
use std::time::{Duration, Instant, SystemTime};

use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, fork, getpid};
use prefork_http::handler::Handler;
use tracing::{debug, error, info, warn};

use crate::daemon;
use crate::error::ArbiterError;
use crate::heartbeat::Heartbeat;
use crate::signals::{SignalChannel, SignalEvent};
use crate::worker::Worker;
use crate::{Configuration, Listener};

/// How the arbiter was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    Graceful,
    Immediate,
}

/// State the arbiter's signal callbacks act upon.
#[derive(Debug)]
pub struct Control<P> {
    pool: Pool<P>,
    stop: Option<StopMode>,
}

impl<P: Processes> Control<P> {
    pub fn new(pool: Pool<P>) -> Self {
        Self { pool, stop: None }
    }

    pub fn pool(&self) -> &Pool<P> {
        &self.pool
    }

    pub fn stop_mode(&self) -> Option<StopMode> {
        self.stop
    }
}

/// Supervises a pool of forked workers serving `handler`.
#[derive(Debug)]
pub struct Arbiter<H> {
    configuration: Configuration,
    workers: usize,
    handler: H,
}

impl<H: Handler + 'static> Arbiter<H> {
    pub fn new(configuration: Configuration, workers: usize, handler: H) -> Self {
        Self { configuration, workers, handler }
    }

    /// Runs until a stop signal, then stops the workers and returns.
    ///
    /// Errors are startup failures only: nothing is bound or no address could
    /// be bound, the signal channel could not be set up, or the process could
    /// not be daemonized.
    pub fn run(self, daemonize: bool) -> Result<(), ArbiterError> {
        let Self { configuration, workers, handler } = self;

        let mut channel: SignalChannel<Control<Forker<H>>> = SignalChannel::new().map_err(ArbiterError::signal_channel)?;
        register_callbacks(&mut channel);
        channel.install().map_err(ArbiterError::signal_channel)?;

        let listeners = bind(&configuration)?;

        if daemonize {
            daemon::daemonize()?;
        }

        info!(pid = %getpid(), workers, "arbiter started");
        let wait = configuration.arbiter_wait();
        let graceful_timeout = configuration.graceful_timeout();
        let timeout = configuration.timeout();

        let forker = Forker { configuration, listeners, handler };
        let mut control = Control::new(Pool::new(forker, workers, timeout));
        control.pool.reconcile();

        while control.stop.is_none() {
            if !channel.drain_one(&mut control)
                && let Err(e) = channel.wait(wait)
            {
                warn!(cause = %e, "can't wait for signals");
            }

            if control.stop.is_some() {
                break;
            }

            control.pool.sweep(SystemTime::now());
            control.pool.reconcile();
        }

        control.pool.processes_mut().close_listeners();
        stop_workers(&mut channel, &mut control, graceful_timeout);

        SignalChannel::<Control<Forker<H>>>::reset().map_err(ArbiterError::signal_channel)?;
        info!(pid = %getpid(), "arbiter stopped");
        Ok(())
    }
}

fn bind(configuration: &Configuration) -> Result<Vec<Listener>, ArbiterError> {
    if configuration.addresses().is_empty() {
        return Err(ArbiterError::NoAddress);
    }

    configuration
        .addresses()
        .iter()
        .map(|address| {
            let listener = address.listen(configuration.backlog())?;
            info!(address = %address, "listening");
            Ok(listener)
        })
        .collect()
}

fn register_callbacks<P: Processes + 'static>(channel: &mut SignalChannel<Control<P>>) {
    channel.register(SignalEvent::Interrupt, |control: &mut Control<P>| control.stop = Some(StopMode::Immediate));
    channel.register(SignalEvent::Quit, |control: &mut Control<P>| control.stop = Some(StopMode::Immediate));
    channel.register(SignalEvent::Terminate, |control: &mut Control<P>| {
        control.stop.get_or_insert(StopMode::Graceful);
    });

    channel.register(SignalEvent::Ttin, |control: &mut Control<P>| {
        if control.stop.is_none() {
            control.pool.increment();
        }
    });
    channel.register(SignalEvent::Ttou, |control: &mut Control<P>| {
        if control.stop.is_none() {
            control.pool.decrement();
        }
    });
    channel.register(SignalEvent::Child, |control: &mut Control<P>| {
        control.pool.reap();
        if control.stop.is_none() {
            control.pool.reconcile();
        }
    });
}

/// Stops every worker according to the requested [`StopMode`].
///
/// A graceful stop waits up to `graceful_timeout` for the workers to exit,
/// then kills what is left. An interrupt or quit signal while waiting turns
/// it into an immediate stop.
fn stop_workers<P: Processes>(channel: &mut SignalChannel<Control<P>>, control: &mut Control<P>, graceful_timeout: Duration) {
    if control.stop == Some(StopMode::Graceful) {
        info!(workers = control.pool.len(), "stopping workers gracefully");
        control.pool.retire_all(Signal::SIGTERM);

        let deadline = Instant::now() + graceful_timeout;
        loop {
            control.pool.reap();
            if control.pool.is_empty() || control.stop != Some(StopMode::Graceful) {
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            if !channel.drain_one(control)
                && let Err(e) = channel.wait(remaining)
            {
                warn!(cause = %e, "can't wait for signals");
            }
        }

        if control.stop == Some(StopMode::Graceful) {
            if !control.pool.is_empty() {
                warn!("graceful timeout elapsed, killing remaining workers");
                control.pool.kill_all(Signal::SIGKILL);
            }
            return;
        }
    }

    info!("stopping workers immediately");
    control.pool.kill_all(Signal::SIGQUIT);
}

/// Forks real worker processes.
#[derive(Debug)]
pub struct Forker<H> {
    configuration: Configuration,
    listeners: Vec<Listener>,
    handler: H,
}

impl<H> Forker<H> {
    /// Closes the arbiter's listeners. Workers keep their own copies.
    fn close_listeners(&mut self) {
        for listener in self.listeners.drain(..) {
            listener.close();
        }
    }
}

impl<H: Handler> Processes for Forker<H> {
    fn spawn(&mut self, siblings: &[RawFd]) -> Result<(Pid, Heartbeat), ArbiterError> {
        let heartbeat = Heartbeat::new(self.configuration.worker_tmp_dir()).map_err(ArbiterError::heartbeat)?;

        // SAFETY: the arbiter is single threaded, and the child never returns
        // into the arbiter: it runs the worker loop and exits.
        match unsafe { fork() }? {
            ForkResult::Parent { child } => Ok((child, heartbeat)),
            ForkResult::Child => {
                close_siblings(siblings);
                process::exit(run_worker(&self.configuration, &self.listeners, &self.handler, heartbeat))
            }
        }
    }

    fn kill(&mut self, pid: Pid, signal: Signal) -> nix::Result<()> {
        signal::kill(pid, signal)
    }

    fn reap(&mut self) -> Option<WaitStatus> {
        match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => None,
            Ok(status) => Some(status),
        }
    }
}

/// Closes the heartbeat files of the other workers in a freshly forked child.
///
/// The arbiter's handles owning them are never dropped in the child, which
/// leaves through [`process::exit`].
fn close_siblings(siblings: &[RawFd]) {
    for &fd in siblings {
        if let Err(e) = close(fd) {
            debug!(fd, cause = %e, "can't close sibling heartbeat");
        }
    }
}

/// Body of a freshly forked child. Returns the process exit code.
fn run_worker<H: Handler>(configuration: &Configuration, listeners: &[Listener], handler: &H, mut heartbeat: Heartbeat) -> i32 {
    if let Err(e) = SignalChannel::<()>::reset() {
        error!(cause = %e, "can't reset signal handlers");
        return 1;
    }

    let notify = move || {
        if let Err(e) = heartbeat.notify() {
            warn!(cause = %e, "can't update heartbeat");
        }
    };

    match Worker::new(configuration, listeners, handler, notify).run() {
        Ok(()) => 0,
        Err(e) => {
            error!(pid = %getpid(), cause = %e, "worker failed");
            1
        }
    }
}
