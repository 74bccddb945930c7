//! Fabric Manager address resolution
//!
//! The daemon listens either on a TCP port or on a UNIX domain socket. An
//! address string is classified by its shape: anything that looks like a
//! filesystem path selects the socket, everything else is `host[:port]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default Fabric Manager command port
pub const FM_CMD_PORT_NUMBER: u16 = 6666;

/// File suffixes recognized as socket paths
const SOCKET_SUFFIXES: [&str; 2] = [".sock", ".socket"];

/// Where the daemon is reached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FabricAddress {
    /// Local UNIX domain socket
    UnixSocket(PathBuf),
    /// TCP endpoint
    Network { host: String, port: u16 },
}

impl FabricAddress {
    /// Classify an address string
    pub fn parse(address: &str) -> Self {
        let address = address.trim();
        if is_socket_path(address) {
            return FabricAddress::UnixSocket(PathBuf::from(address));
        }
        let (host, port) = split_host_port(address);
        FabricAddress::Network {
            host: host.to_string(),
            port: port.unwrap_or(FM_CMD_PORT_NUMBER),
        }
    }

    /// Network address with an explicit port
    pub fn network(host: impl Into<String>, port: u16) -> Self {
        FabricAddress::Network {
            host: host.into(),
            port,
        }
    }

    /// Socket address
    pub fn unix_socket(path: impl AsRef<Path>) -> Self {
        FabricAddress::UnixSocket(path.as_ref().to_path_buf())
    }

    pub fn is_unix_socket(&self) -> bool {
        matches!(self, FabricAddress::UnixSocket(_))
    }

    /// String written into the connect parameters
    pub fn wire_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FabricAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FabricAddress::UnixSocket(path) => write!(f, "{}", path.display()),
            FabricAddress::Network { host, port } if host.contains(':') => {
                write!(f, "[{}]:{}", host, port)
            }
            FabricAddress::Network { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

impl From<&str> for FabricAddress {
    fn from(address: &str) -> Self {
        FabricAddress::parse(address)
    }
}

fn is_socket_path(address: &str) -> bool {
    address.contains(std::path::MAIN_SEPARATOR)
        || address.contains('/')
        || SOCKET_SUFFIXES.iter().any(|s| address.ends_with(s))
}

/// Split `host:port`, `[v6]:port`, `[v6]`, bare IPv6 or bare host
fn split_host_port(address: &str) -> (&str, Option<u16>) {
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (host, port);
        }
    }
    match address.rsplit_once(':') {
        // More than one colon without brackets is an IPv6 literal
        Some((host, _)) if host.contains(':') => (address, None),
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (address, None),
        },
        None => (address, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_path_is_socket() {
        let addr = FabricAddress::parse("/var/run/nvidia-fabricmanager/fm.sock");
        assert!(addr.is_unix_socket());
        assert_eq!(addr.wire_string(), "/var/run/nvidia-fabricmanager/fm.sock");
    }

    #[test]
    fn test_relative_path_is_socket() {
        assert!(FabricAddress::parse("run/fm").is_unix_socket());
    }

    #[test]
    fn test_socket_suffix_is_socket() {
        assert!(FabricAddress::parse("fabricmanager.sock").is_unix_socket());
        assert!(FabricAddress::parse("fm.socket").is_unix_socket());
    }

    #[test]
    fn test_host_defaults_port() {
        let addr = FabricAddress::parse("127.0.0.1");
        assert_eq!(addr, FabricAddress::network("127.0.0.1", 6666));
        assert_eq!(addr.wire_string(), "127.0.0.1:6666");
    }

    #[test]
    fn test_host_with_port() {
        let addr = FabricAddress::parse("fm-node-01:7000");
        assert_eq!(addr, FabricAddress::network("fm-node-01", 7000));
        assert!(!addr.is_unix_socket());
    }

    #[test]
    fn test_ipv6() {
        assert_eq!(
            FabricAddress::parse("[::1]:7000"),
            FabricAddress::network("::1", 7000)
        );
        let bare = FabricAddress::parse("::1");
        assert_eq!(bare, FabricAddress::network("::1", 6666));
        assert_eq!(bare.wire_string(), "[::1]:6666");
    }

    #[test]
    fn test_bad_port_kept_in_host() {
        let addr = FabricAddress::parse("host:notaport");
        assert_eq!(addr, FabricAddress::network("host:notaport", 6666));
    }
}
