//! Listening addresses and the sockets bound to them.
//!
//! An [`Address`] is either a TCP `host:port` pair or a unix domain socket path.
//! The arbiter binds every configured address once, before forking, and every
//! worker inherits the resulting [`Listener`]s.

use std::fmt;
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use socket2::{Domain, SockAddr, Socket, Type};
use tracing::{debug, warn};

use crate::error::{AddressParseError, ArbiterError};

const UNIX_PREFIX: &str = "unix:";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Ip { host: String, port: u16 },
    Unix(PathBuf),
}

impl Address {
    pub fn ip<H: Into<String>>(host: H, port: u16) -> Self {
        Self::Ip { host: host.into(), port }
    }

    pub fn unix<P: Into<PathBuf>>(path: P) -> Self {
        Self::Unix(path.into())
    }

    /// Binds a listening socket with `SO_REUSEADDR` and the given backlog.
    ///
    /// A file left over at a unix socket path, typically from an earlier run, is
    /// removed first.
    pub fn listen(&self, backlog: i32) -> Result<Listener, ArbiterError> {
        let inner = match self {
            Address::Ip { host, port } => {
                let socket_addr = (host.as_str(), *port)
                    .to_socket_addrs()
                    .map_err(|e| ArbiterError::bind(self, e))?
                    .next()
                    .ok_or_else(|| ArbiterError::bind(self, io::Error::new(ErrorKind::NotFound, "host did not resolve")))?;

                let socket = bind_socket(Domain::for_address(socket_addr), &socket_addr.into(), backlog)
                    .map_err(|e| ArbiterError::bind(self, e))?;
                Inner::Tcp(TcpListener::from(socket))
            }
            Address::Unix(path) => {
                remove_socket_file(path).map_err(|e| ArbiterError::bind(self, e))?;

                let sock_addr = SockAddr::unix(path).map_err(|e| ArbiterError::bind(self, e))?;
                let socket = bind_socket(Domain::UNIX, &sock_addr, backlog).map_err(|e| ArbiterError::bind(self, e))?;
                Inner::Unix(UnixListener::from(socket))
            }
        };

        Ok(Listener { address: self.clone(), inner })
    }
}

fn bind_socket(domain: Domain, address: &SockAddr, backlog: i32) -> io::Result<Socket> {
    let socket = Socket::new(domain, Type::STREAM, None)?;
    if domain != Domain::UNIX {
        socket.set_reuse_address(true)?;
    }
    socket.bind(address)?;
    socket.listen(backlog)?;
    Ok(socket)
}

fn remove_socket_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale unix socket");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ip { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Address::Ip { host, port } => write!(f, "{host}:{port}"),
            Address::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Parses `unix:/path`, `host:port` or `[v6 host]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(AddressParseError::EmptyPath);
            }
            return Ok(Address::unix(path));
        }

        let (host, port) = s.rsplit_once(':').ok_or_else(|| AddressParseError::MissingPort { address: s.to_string() })?;
        let port = port.parse::<u16>().map_err(|_| AddressParseError::InvalidPort { address: s.to_string() })?;
        let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);

        Ok(Address::ip(host, port))
    }
}

/// A bound, listening socket.
#[derive(Debug)]
pub struct Listener {
    address: Address,
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    /// The address this listener was bound from.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn accept(&self) -> io::Result<Connection> {
        match &self.inner {
            Inner::Tcp(listener) => listener.accept().map(|(stream, _)| Connection::Tcp(stream)),
            Inner::Unix(listener) => listener.accept().map(|(stream, _)| Connection::Unix(stream)),
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match &self.inner {
            Inner::Tcp(listener) => listener.set_nonblocking(nonblocking),
            Inner::Unix(listener) => listener.set_nonblocking(nonblocking),
        }
    }

    /// The TCP port actually bound, useful when binding port 0.
    pub fn local_port(&self) -> Option<u16> {
        match &self.inner {
            Inner::Tcp(listener) => listener.local_addr().ok().map(|addr| addr.port()),
            Inner::Unix(_) => None,
        }
    }

    /// Closes the socket; a unix socket also has its file removed.
    ///
    /// Only the arbiter calls this. Workers just drop their inherited copies, the
    /// path must stay in place for the other processes.
    pub fn close(self) {
        let Listener { address, inner } = self;
        drop(inner);

        if let Address::Unix(path) = &address
            && let Err(e) = remove_socket_file(path)
        {
            warn!(address = %address, cause = %e, "can't remove unix socket");
        }
    }
}

impl AsFd for Listener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match &self.inner {
            Inner::Tcp(listener) => listener.as_fd(),
            Inner::Unix(listener) => listener.as_fd(),
        }
    }
}

/// An accepted client connection.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Connection {
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => stream.set_nonblocking(nonblocking),
            Connection::Unix(stream) => stream.set_nonblocking(nonblocking),
        }
    }

    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => stream.shutdown(Shutdown::Both),
            Connection::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(stream) => stream.read(buf),
            Connection::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(stream) => stream.write(buf),
            Connection::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => stream.flush(),
            Connection::Unix(stream) => stream.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description() {
        assert_eq!(Address::ip("127.0.0.1", 80).to_string(), "127.0.0.1:80");
        assert_eq!(Address::unix("/tmp/x").to_string(), "unix:/tmp/x");
        assert_eq!(Address::ip("::1", 8000).to_string(), "[::1]:8000");
    }

    #[test]
    fn parse() {
        assert_eq!("127.0.0.1:80".parse::<Address>(), Ok(Address::ip("127.0.0.1", 80)));
        assert_eq!("localhost:8000".parse::<Address>(), Ok(Address::ip("localhost", 8000)));
        assert_eq!("[::1]:8000".parse::<Address>(), Ok(Address::ip("::1", 8000)));
        assert_eq!("unix:/tmp/x".parse::<Address>(), Ok(Address::unix("/tmp/x")));

        assert_eq!("localhost".parse::<Address>(), Err(AddressParseError::MissingPort { address: "localhost".to_string() }));
        assert_eq!("localhost:http".parse::<Address>(), Err(AddressParseError::InvalidPort { address: "localhost:http".to_string() }));
        assert_eq!("unix:".parse::<Address>(), Err(AddressParseError::EmptyPath));
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(Address::ip("127.0.0.1", 80), Address::ip("127.0.0.1", 80));
        assert_ne!(Address::ip("127.0.0.1", 80), Address::ip("127.0.0.1", 81));
        assert_ne!(Address::unix("/tmp/x"), Address::ip("/tmp/x", 0));
    }

    #[test]
    fn listens_on_tcp() {
        let listener = Address::ip("127.0.0.1", 0).listen(16).unwrap();
        let port = listener.local_port().unwrap();

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.write_all(b"ping").unwrap();

        let mut connection = listener.accept().unwrap();
        let mut buf = [0; 4];
        connection.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn unix_socket_file_is_replaced_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.sock");
        fs::write(&path, b"stale").unwrap();

        let listener = Address::unix(&path).listen(16).unwrap();
        let _client = UnixStream::connect(&path).unwrap();
        assert!(listener.accept().is_ok());

        listener.close();
        assert!(!path.exists());
    }

    #[test]
    fn bind_failure_names_the_address() {
        let dir = tempfile::tempdir().unwrap();
        let address = Address::unix(dir.path().join("missing").join("server.sock"));

        let err = address.listen(16).unwrap_err();
        assert!(matches!(err, ArbiterError::Bind { address: ref failed, .. } if failed == &address));
    }
}
