//! Unauthenticated reachability probe.

use crate::constants::DISCOVERY_TIMEOUT;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Whether a TCP connection to `host:port` can be opened within 5 seconds.
pub fn discover_remote(host: &str, port: u16) -> bool {
    discover_with_timeout(host, port, DISCOVERY_TIMEOUT)
}

pub fn discover_with_timeout(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            debug!(host, port, error = %e, "cannot resolve remote");
            return false;
        }
    };
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => {
                debug!(%addr, "remote reachable");
                return true;
            }
            Err(e) => debug!(%addr, error = %e, "dial failed"),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_listening_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(discover_remote("127.0.0.1", port));
    }

    #[test]
    fn test_closed_port_is_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!discover_with_timeout("127.0.0.1", port, Duration::from_millis(500)));
    }

    #[test]
    fn test_unresolvable_host() {
        assert!(!discover_remote("host.invalid", 22));
    }
}
