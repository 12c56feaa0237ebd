use std::net::TcpListener;

use eyre::Result;

/// Reserve a free local TCP port
///
/// The listener is dropped before returning, so the port is only very likely
/// to still be free when the caller binds it.
pub fn get_random_tcp_port() -> Result<u16> {
    for _ in 0..50 {
        match TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => {
                let port = listener.local_addr()?.port();
                return Ok(port);
            }
            Err(e) => {
                tracing::warn!(%e, "binding");
            }
        }
    }

    eyre::bail!("could not get free port");
}
