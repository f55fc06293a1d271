//! Byte-stream transports to the engine.
//!
//! The engine listens on TCP loopback or a Unix domain socket. Dialing sits
//! behind [`Dialer`] so tests can substitute in-memory or flaky streams.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Where the engine accepts connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Address {
    /// TCP socket, normally on loopback.
    Tcp {
        /// Host name or IP address.
        host: String,
        /// Port number.
        port: u16,
    },
    /// Unix domain socket path.
    Unix(PathBuf),
}

impl Address {
    /// TCP address on `127.0.0.1`.
    pub fn loopback(port: u16) -> Self {
        Self::Tcp {
            host: "127.0.0.1".into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A connected, bidirectional byte stream.
pub trait Transport: Read + Write + fmt::Debug + Send {}

impl<T: Read + Write + fmt::Debug + Send> Transport for T {}

/// Opens transports to an [`Address`].
pub trait Dialer: fmt::Debug + Send {
    /// Makes one connection attempt.
    fn dial(&self, address: &Address) -> io::Result<Box<dyn Transport>>;
}

/// Dials real TCP and Unix domain sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketDialer;

impl Dialer for SocketDialer {
    fn dial(&self, address: &Address) -> io::Result<Box<dyn Transport>> {
        match address {
            Address::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Address::Unix(path) => Ok(Box::new(std::os::unix::net::UnixStream::connect(path)?)),
            #[cfg(not(unix))]
            Address::Unix(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Unix domain sockets are not supported on this platform",
            )),
        }
    }
}

/// Dials `address` up to `attempts` times, sleeping `delay` between tries.
pub(crate) fn connect_with_retry(
    dialer: &dyn Dialer,
    address: &Address,
    attempts: u32,
    delay: Duration,
) -> Result<Box<dyn Transport>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match dialer.dial(address) {
            Ok(stream) => {
                debug!(%address, attempt, "connected");
                return Ok(stream);
            }
            Err(source) if attempt >= attempts => {
                return Err(Error::ConnectExhausted {
                    address: address.to_string(),
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                warn!(%address, attempt, error = %err, "connect failed, retrying");
                thread::sleep(delay);
            }
        }
    }
}
