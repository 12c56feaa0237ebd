//! TCP-based transport implementation

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::Transport;

/// TCP-based transport
///
/// Reads on this transport block without a timeout: a session is strictly
/// turn taking and the only thing to do while waiting is wait.
///
/// # Examples
///
/// ```no_run
/// use transport::io::TcpTransport;
///
/// let transport = TcpTransport::connect("127.0.0.1:9001")?;
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Create a new TCP transport from an existing stream
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_read_timeout(None)?;
        // small request/reply messages, do not wait to coalesce them
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Connect to a server at the given address
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Self::new(stream)
    }
}

impl Transport for TcpTransport {
    type Reader = BufReader<TcpStream>;
    type Writer = TcpStream;

    fn split(self) -> io::Result<(Self::Reader, Self::Writer)> {
        // Clone stream for reader, keep original for writer
        let input = self.stream.try_clone()?;
        let output = self.stream;

        Ok((BufReader::new(input), output))
    }
}

/// Probe whether something accepts connections at `addr`
///
/// Connects with a short timeout and closes immediately; nothing is written.
pub fn is_reachable(addr: impl ToSocketAddrs, timeout: Duration) -> bool {
    let addrs: Vec<SocketAddr> = match addr.to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            tracing::debug!(error = %e, "could not resolve address");
            return false;
        }
    };

    addrs.iter().any(|addr| match TcpStream::connect_timeout(addr, timeout) {
        Ok(stream) => {
            drop(stream);
            true
        }
        Err(e) => {
            tracing::trace!(%addr, error = %e, "address not reachable");
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn test_reachable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(is_reachable(addr, Duration::from_secs(1)));
    }

    #[test]
    fn test_unreachable_port() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        assert!(!is_reachable(addr, Duration::from_millis(200)));
    }
}
