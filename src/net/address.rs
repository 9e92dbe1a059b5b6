//! Listen address parsing.
//!
//! Addresses are written as `network://host:port`, for example
//! `tcp://:1935`, `tcp4://0.0.0.0:1935` or `tcp6://[::1]:1935`.
//! An empty host binds the wildcard address of the network's family.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

/// Separator between the network and the host part.
const NETWORK_SEPARATOR: &str = "://";

/// Errors produced while parsing a listen address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("{0} should prefix with tcp://, tcp4:// or tcp6://")]
    UnknownNetwork(String),

    #[error("{addr} contains {count} network identifiers")]
    NetworkCount { addr: String, count: usize },

    #[error("{0} has no port")]
    MissingPort(String),

    #[error("{0} has an invalid port")]
    InvalidPort(String),

    #[error("{addr} cannot be resolved for {network}")]
    Unresolvable { addr: String, network: Network },
}

/// TCP network family of a listen address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// Either family, decided by the host.
    Tcp,
    /// IPv4 only.
    Tcp4,
    /// IPv6 only.
    Tcp6,
}

impl Network {
    fn accepts(&self, ip: &IpAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => ip.is_ipv4(),
            Network::Tcp6 => ip.is_ipv6(),
        }
    }

    fn wildcard(&self) -> IpAddr {
        match self {
            Network::Tcp | Network::Tcp4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Network::Tcp6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Tcp4 => write!(f, "tcp4"),
            Network::Tcp6 => write!(f, "tcp6"),
        }
    }
}

/// A validated `network://host:port` listen address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenAddr {
    network: Network,
    host: String,
    port: u16,
}

impl ListenAddr {
    pub fn network(&self) -> Network {
        self.network
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to a concrete socket address of the right family.
    ///
    /// Literal IPs resolve without touching DNS; names such as `localhost`
    /// go through the system resolver.
    pub async fn resolve(&self) -> Result<SocketAddr, AddressError> {
        if self.host.is_empty() {
            return Ok(SocketAddr::new(self.network.wildcard(), self.port));
        }

        let literal = self.host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            if self.network.accepts(&ip) {
                return Ok(SocketAddr::new(ip, self.port));
            }
            return Err(self.unresolvable());
        }

        let candidates = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|_| self.unresolvable())?;
        for candidate in candidates {
            if self.network.accepts(&candidate.ip()) {
                return Ok(candidate);
            }
        }
        Err(self.unresolvable())
    }

    fn unresolvable(&self) -> AddressError {
        AddressError::Unresolvable {
            addr: self.to_string(),
            network: self.network,
        }
    }
}

impl FromStr for ListenAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let network = if s.starts_with("tcp://") {
            Network::Tcp
        } else if s.starts_with("tcp4://") {
            Network::Tcp4
        } else if s.starts_with("tcp6://") {
            Network::Tcp6
        } else {
            return Err(AddressError::UnknownNetwork(s.to_string()));
        };

        let count = s.matches(NETWORK_SEPARATOR).count();
        if count != 1 {
            return Err(AddressError::NetworkCount {
                addr: s.to_string(),
                count,
            });
        }

        let laddr = s
            .split_once(NETWORK_SEPARATOR)
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        let (host, port) = laddr
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::InvalidPort(s.to_string()))?;

        Ok(Self {
            network,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}:{}", self.network, NETWORK_SEPARATOR, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_networks() {
        let a: ListenAddr = "tcp://:1935".parse().unwrap();
        assert_eq!(a.network(), Network::Tcp);
        assert_eq!(a.host(), "");
        assert_eq!(a.port(), 1935);

        let b: ListenAddr = "tcp4://127.0.0.1:1936".parse().unwrap();
        assert_eq!(b.network(), Network::Tcp4);
        assert_eq!(b.host(), "127.0.0.1");

        let c: ListenAddr = "tcp6://[::1]:1937".parse().unwrap();
        assert_eq!(c.network(), Network::Tcp6);
        assert_eq!(c.host(), "[::1]");
        assert_eq!(c.to_string(), "tcp6://[::1]:1937");
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            "udp://:1935".parse::<ListenAddr>(),
            Err(AddressError::UnknownNetwork(_))
        ));
        assert!(matches!(
            ":1935".parse::<ListenAddr>(),
            Err(AddressError::UnknownNetwork(_))
        ));
        assert!(matches!(
            "tcp://tcp://:1935".parse::<ListenAddr>(),
            Err(AddressError::NetworkCount { count: 2, .. })
        ));
        assert!(matches!(
            "tcp://localhost".parse::<ListenAddr>(),
            Err(AddressError::MissingPort(_))
        ));
        assert!(matches!(
            "tcp://:99999".parse::<ListenAddr>(),
            Err(AddressError::InvalidPort(_))
        ));
    }

    #[tokio::test]
    async fn resolves_wildcards_by_family() {
        let v4: ListenAddr = "tcp4://:1935".parse().unwrap();
        assert_eq!(v4.resolve().await.unwrap(), "0.0.0.0:1935".parse().unwrap());

        let v6: ListenAddr = "tcp6://:1935".parse().unwrap();
        assert_eq!(v6.resolve().await.unwrap(), "[::]:1935".parse().unwrap());

        let mismatch: ListenAddr = "tcp6://127.0.0.1:1935".parse().unwrap();
        assert!(mismatch.resolve().await.is_err());
    }
}
