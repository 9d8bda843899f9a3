//! The accept loop run by every worker process.

use std::io::{self, ErrorKind};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::unistd::{Pid, getpid, getppid};
use prefork_http::connection::HttpConnection;
use prefork_http::handler::Handler;
use tracing::{debug, info, warn};

use crate::error::ArbiterError;
use crate::signals::{SignalChannel, SignalEvent};
use crate::{Configuration, Connection, Listener};

/// A worker serving connections from inherited listeners, one at a time.
///
/// Built in the child right after fork. `notify` is called once per loop
/// iteration and must leave a trace the arbiter can observe, see
/// [`Heartbeat`](crate::heartbeat::Heartbeat).
pub struct Worker<'a, H, N> {
    configuration: &'a Configuration,
    listeners: &'a [Listener],
    handler: &'a H,
    notify: N,
    parent: Pid,
}

impl<'a, H, N> Worker<'a, H, N>
where
    H: Handler,
    N: FnMut(),
{
    pub fn new(configuration: &'a Configuration, listeners: &'a [Listener], handler: &'a H, notify: N) -> Self {
        Self { configuration, listeners, handler, notify, parent: getppid() }
    }

    /// Serves until a stop signal arrives or the arbiter goes away.
    pub fn run(mut self) -> Result<(), ArbiterError> {
        let mut channel = SignalChannel::<bool>::new().map_err(ArbiterError::signal_channel)?;
        for event in [SignalEvent::Interrupt, SignalEvent::Quit, SignalEvent::Terminate] {
            channel.register(event, |alive: &mut bool| *alive = false);
        }
        channel.install().map_err(ArbiterError::signal_channel)?;

        for listener in self.listeners {
            listener.set_nonblocking(true).map_err(ArbiterError::worker_setup)?;
        }

        info!(pid = %getpid(), "booting worker");
        let wait = self.configuration.worker_wait();
        let mut alive = true;

        while alive {
            while channel.drain_one(&mut alive) {}
            if !alive {
                break;
            }

            (self.notify)();

            for index in ready_listeners(self.listeners, channel.as_fd(), wait) {
                self.accept(&self.listeners[index]);
            }

            if getppid() != self.parent {
                info!(pid = %getpid(), "parent changed, shutting down");
                break;
            }
        }

        info!(pid = %getpid(), "worker exiting");
        Ok(())
    }

    fn accept(&self, listener: &Listener) {
        match listener.accept() {
            Ok(connection) => {
                if let Err(e) = connection.set_nonblocking(false) {
                    warn!(cause = %e, "can't make connection blocking");
                    return;
                }
                serve_connection(connection, self.handler);
            }
            // another worker won the race for this connection
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => debug!(address = %listener.address(), cause = %e, "accept failed"),
        }
    }
}

/// Serves a single request on `connection`, then shuts it down.
pub fn serve_connection<H: Handler>(mut connection: Connection, handler: &H) {
    if let Err(e) = HttpConnection::new(&mut connection).process(handler) {
        debug!(cause = %e, "connection finished with error");
    }

    if let Err(e) = connection.shutdown()
        && e.kind() != ErrorKind::NotConnected
    {
        debug!(cause = %e, "can't shut connection down");
    }
}

/// Waits until a listener is ready to accept or `wake` becomes readable.
///
/// Returns the indices of the ready listeners; empty on timeout, on a signal,
/// or when only `wake` is readable.
fn ready_listeners(listeners: &[Listener], wake: BorrowedFd<'_>, timeout: Duration) -> Vec<usize> {
    let mut fds: Vec<PollFd<'_>> = listeners.iter().map(|listener| PollFd::new(listener.as_fd(), PollFlags::POLLIN)).collect();
    fds.push(PollFd::new(wake, PollFlags::POLLIN));

    match poll(&mut fds, PollTimeout::try_from(timeout).unwrap_or(PollTimeout::MAX)) {
        Ok(0) | Err(Errno::EINTR) => return Vec::new(),
        Ok(_) => {}
        Err(e) => {
            warn!(cause = %io::Error::from(e), "poll failed");
            return Vec::new();
        }
    }

    fds[..listeners.len()]
        .iter()
        .enumerate()
        .filter(|(_, fd)| fd.revents().is_some_and(|events| events.intersects(PollFlags::POLLIN)))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Address;
    use bytes::Bytes;
    use prefork_http::handler::make_handler;
    use prefork_http::protocol::{Request, Response};
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::os::unix::net::UnixStream;

    fn hello(request: Request<'_>) -> Result<Response, io::Error> {
        Ok(Response::new(Bytes::from(format!("hello {}", request.path()))))
    }

    #[test]
    fn serves_and_closes_connection() {
        let (server, mut client) = UnixStream::pair().unwrap();
        client.write_all(b"GET /world HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();

        serve_connection(Connection::Unix(server), &make_handler(hello));

        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\nconnection: close\r\n"));
        assert!(response.ends_with("\r\n\r\nhello /world"));
    }

    #[test]
    fn bad_request_gets_error_response() {
        let (server, mut client) = UnixStream::pair().unwrap();
        client.write_all(b"GET / HTTP/5.0\r\n\r\n").unwrap();

        serve_connection(Connection::Unix(server), &make_handler(hello));

        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.ends_with("Bad Version (HTTP/5.0)"));
    }

    #[test]
    fn ready_listener_is_reported() {
        let idle = Address::ip("127.0.0.1", 0).listen(16).unwrap();
        let busy = Address::ip("127.0.0.1", 0).listen(16).unwrap();
        let (wake, _) = UnixStream::pair().unwrap();
        let listeners = [idle, busy];

        assert!(ready_listeners(&listeners, wake.as_fd(), Duration::from_millis(10)).is_empty());

        let _client = TcpStream::connect(("127.0.0.1", listeners[1].local_port().unwrap())).unwrap();
        assert_eq!(ready_listeners(&listeners, wake.as_fd(), Duration::from_secs(5)), [1]);
    }

    #[test]
    fn wake_descriptor_interrupts_wait() {
        let listeners = [Address::ip("127.0.0.1", 0).listen(16).unwrap()];
        let (wake, mut waker) = UnixStream::pair().unwrap();
        waker.write_all(&[1]).unwrap();

        let started = std::time::Instant::now();
        assert!(ready_listeners(&listeners, wake.as_fd(), Duration::from_secs(5)).is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
