//! Signal delivery through a self-pipe.
//!
//! A signal handler may interrupt the process anywhere, so it only writes the
//! signal number into a non-blocking socket pair. The control loop of the
//! process polls the read end next to its other descriptors and later runs the
//! callback registered for each event with [`SignalChannel::drain_one`], one
//! event at a time, in arrival order.
//!
//! There is one installed channel per process. A freshly forked worker calls
//! [`SignalChannel::reset`] and then installs a channel of its own.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use tracing::{trace, warn};

/// Write end of the installed channel, `-1` while none is installed.
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_signal(signum: libc::c_int) {
    let fd = WAKE_FD.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }

    let saved = Errno::last_raw();
    let byte = u8::try_from(signum).unwrap_or_default();
    // SAFETY: write(2) is async-signal-safe and `byte` outlives the call. A full
    // pipe drops the event, the reader is woken by the bytes already queued.
    unsafe {
        libc::write(fd, (&raw const byte).cast(), 1);
    }
    Errno::set_raw(saved);
}

/// The signals a control loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalEvent {
    Interrupt,
    Quit,
    Terminate,
    Ttin,
    Ttou,
    Child,
}

impl SignalEvent {
    pub const ALL: [SignalEvent; 6] = [
        SignalEvent::Interrupt,
        SignalEvent::Quit,
        SignalEvent::Terminate,
        SignalEvent::Ttin,
        SignalEvent::Ttou,
        SignalEvent::Child,
    ];

    pub fn signal(self) -> Signal {
        match self {
            SignalEvent::Interrupt => Signal::SIGINT,
            SignalEvent::Quit => Signal::SIGQUIT,
            SignalEvent::Terminate => Signal::SIGTERM,
            SignalEvent::Ttin => Signal::SIGTTIN,
            SignalEvent::Ttou => Signal::SIGTTOU,
            SignalEvent::Child => Signal::SIGCHLD,
        }
    }

    pub fn from_signal(signal: Signal) -> Option<Self> {
        SignalEvent::ALL.into_iter().find(|event| event.signal() == signal)
    }

    fn from_byte(byte: u8) -> Option<Self> {
        Signal::try_from(i32::from(byte)).ok().and_then(SignalEvent::from_signal)
    }
}

type Callback<C> = Box<dyn FnMut(&mut C)>;

/// Queue of pending signal events, with at most one callback per event.
///
/// Callbacks get mutable access to a context `C` owned by the control loop.
pub struct SignalChannel<C> {
    reader: UnixStream,
    writer: UnixStream,
    callbacks: HashMap<SignalEvent, Callback<C>>,
}

impl<C> SignalChannel<C> {
    /// Creates the self-pipe. Nothing is delivered to it before [`install`](Self::install).
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self { reader, writer, callbacks: HashMap::new() })
    }

    /// Binds `callback` to `event`, replacing any earlier binding.
    pub fn register<F>(&mut self, event: SignalEvent, callback: F)
    where
        F: FnMut(&mut C) + 'static,
    {
        self.callbacks.insert(event, Box::new(callback));
    }

    /// Routes every [`SignalEvent`] of this process into this channel.
    ///
    /// The channel must stay alive as long as it is installed.
    pub fn install(&self) -> nix::Result<()> {
        WAKE_FD.store(self.writer.as_raw_fd(), Ordering::Relaxed);

        let action = SigAction::new(SigHandler::Handler(on_signal), SaFlags::SA_RESTART, SigSet::empty());
        for event in SignalEvent::ALL {
            // SAFETY: `on_signal` only touches an atomic and calls write(2).
            unsafe { sigaction(event.signal(), &action) }?;
        }
        Ok(())
    }

    /// Restores the default disposition of every [`SignalEvent`] and detaches
    /// the installed channel, if any.
    pub fn reset() -> nix::Result<()> {
        let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        for event in SignalEvent::ALL {
            // SAFETY: restoring the default disposition installs no code of ours.
            unsafe { sigaction(event.signal(), &action) }?;
        }

        WAKE_FD.store(-1, Ordering::Relaxed);
        Ok(())
    }

    /// Handles the oldest pending event.
    ///
    /// Returns `false` when nothing was pending. Call it until it does before
    /// blocking in [`wait`](Self::wait) again.
    pub fn drain_one(&mut self, context: &mut C) -> bool {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(1) => break,
                Ok(_) => return false,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                Err(e) => {
                    warn!(cause = %e, "can't read signal channel");
                    return false;
                }
            }
        }

        let Some(event) = SignalEvent::from_byte(byte[0]) else {
            warn!(signum = byte[0], "unexpected signal in channel");
            return true;
        };

        trace!(?event, "handling signal");
        if let Some(callback) = self.callbacks.get_mut(&event) {
            callback(context);
        }
        true
    }

    /// Blocks until an event is pending or `timeout` elapsed.
    ///
    /// Returns whether an event is pending. A poll interrupted by a signal
    /// counts as pending: its handler has written to the pipe.
    pub fn wait(&self, timeout: Duration) -> io::Result<bool> {
        let mut fds = [PollFd::new(self.reader.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::try_from(timeout).unwrap_or(PollTimeout::MAX)) {
            Ok(ready) => Ok(ready > 0),
            Err(Errno::EINTR) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(test)]
    pub(crate) fn push(&self, event: SignalEvent) {
        use std::io::Write;
        let signum = u8::try_from(event.signal() as i32).unwrap();
        (&self.writer).write_all(&[signum]).unwrap();
    }
}

impl<C> AsFd for SignalChannel<C> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

impl<C> fmt::Debug for SignalChannel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalChannel")
            .field("reader", &self.reader)
            .field("registered", &self.callbacks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
