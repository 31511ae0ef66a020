//! Peer addressing.
//!
//! An [`Address`] is the canonical identity of a peer: an IPv4 string
//! paired with a TCP port. It seeds the peer's ring [`crate::id::Id`] via
//! [`crate::id::hash`] over `"ip:port"`.

use std::fmt;
use std::net::{SocketAddr, UdpSocket};

use serde::{Deserialize, Serialize};

use crate::id::{self, Id};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub ip: String,
    pub port: u16,
}

impl Address {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    /// The ring identifier this address hashes to.
    pub fn id(&self) -> Id {
        id::hash(&self.to_string())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.ip, self.port).parse()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<(String, u16)> for Address {
    fn from((ip, port): (String, u16)) -> Self {
        Self { ip, port }
    }
}

/// Auto-detects the outbound IP address by opening a UDP socket toward a
/// well-known public endpoint and reading back the local endpoint it was
/// assigned. No packet is ever sent; the handshake-free nature of UDP
/// `connect` is enough to let the OS pick a route and a source address.
///
/// Falls back to `127.0.0.1` if no route exists (e.g. no network
/// interface is up).
pub fn detect_local_ip() -> String {
    try_detect_local_ip().unwrap_or_else(|| "127.0.0.1".to_string())
}

fn try_detect_local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_ip_colon_port() {
        let a = Address::new("127.0.0.1", 8008);
        assert_eq!(a.to_string(), "127.0.0.1:8008");
    }

    #[test]
    fn id_is_stable_for_same_address() {
        let a = Address::new("127.0.0.1", 8008);
        let b = Address::new("127.0.0.1", 8008);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn id_differs_for_different_ports() {
        let a = Address::new("127.0.0.1", 8008);
        let b = Address::new("127.0.0.1", 8009);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn detect_local_ip_never_panics() {
        let ip = detect_local_ip();
        assert!(!ip.is_empty());
    }
}
