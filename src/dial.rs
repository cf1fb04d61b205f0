use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use std::time::Duration;

use crate::connection::{Connection, UdpConnection};

/// Errors raised while establishing a single upstream.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    /// The protocol name is not one of the supported network kinds.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// The address could not be resolved.
    #[error("can't resolve {address}: {source}")]
    Resolve {
        /// The address as given.
        address: String,
        /// Why resolution failed.
        #[source]
        source: io::Error,
    },

    /// The address resolved, but not to the family the protocol asks for.
    #[error("no suitable address found for {0}")]
    NoAddress(String),

    /// Connecting failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Network kinds understood by [`NetDialer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// TCP over IPv4 or IPv6.
    Tcp,
    /// TCP over IPv4 only.
    Tcp4,
    /// TCP over IPv6 only.
    Tcp6,
    /// UDP over IPv4 or IPv6.
    Udp,
    /// UDP over IPv4 only.
    Udp4,
    /// UDP over IPv6 only.
    Udp6,
}

impl Protocol {
    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Protocol::Tcp | Protocol::Udp => true,
            Protocol::Tcp4 | Protocol::Udp4 => addr.is_ipv4(),
            Protocol::Tcp6 | Protocol::Udp6 => addr.is_ipv6(),
        }
    }

    fn is_udp(self) -> bool {
        matches!(self, Protocol::Udp | Protocol::Udp4 | Protocol::Udp6)
    }
}

impl FromStr for Protocol {
    type Err = DialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "tcp4" => Ok(Protocol::Tcp4),
            "tcp6" => Ok(Protocol::Tcp6),
            "udp" => Ok(Protocol::Udp),
            "udp4" => Ok(Protocol::Udp4),
            "udp6" => Ok(Protocol::Udp6),
            _ => Err(DialError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// Establishes one connection to one address.
///
/// [`MultiConnection::dial_with`](crate::MultiConnection::dial_with) calls
/// this once per upstream address.
pub trait Dialer {
    /// Connects to `address` over `protocol`, giving up after `timeout`.
    fn dial(
        &self,
        protocol: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>, DialError>;
}

/// Dials over the operating system's TCP and UDP sockets.
///
/// A zero `timeout` means the connect attempt is not bounded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetDialer;

impl NetDialer {
    fn resolve(protocol: Protocol, address: &str) -> Result<Vec<SocketAddr>, DialError> {
        let addresses: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|source| DialError::Resolve { address: address.to_string(), source })?
            .filter(|a| protocol.accepts(a))
            .collect();
        if addresses.is_empty() {
            return Err(DialError::NoAddress(address.to_string()));
        }
        Ok(addresses)
    }

    fn connect_tcp(addr: &SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
        if timeout.is_zero() {
            TcpStream::connect(addr)
        } else {
            TcpStream::connect_timeout(addr, timeout)
        }
    }

    fn connect_udp(addr: &SocketAddr) -> io::Result<UdpSocket> {
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;
        Ok(socket)
    }
}

impl Dialer for NetDialer {
    fn dial(
        &self,
        protocol: &str,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>, DialError> {
        let protocol: Protocol = protocol.parse()?;
        let mut last_err = None;
        for addr in Self::resolve(protocol, address)? {
            log::debug!("Dialing {protocol:?} {addr} ({address})");
            let conn: io::Result<Box<dyn Connection>> = if protocol.is_udp() {
                Self::connect_udp(&addr).map(|s| Box::new(UdpConnection::new(s)) as Box<dyn Connection>)
            } else {
                Self::connect_tcp(&addr, timeout).map(|s| Box::new(s) as Box<dyn Connection>)
            };
            match conn {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    log::debug!("Dial to {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        // resolve() never returns an empty list
        Err(last_err.map_or_else(|| DialError::NoAddress(address.to_string()), DialError::Io))
    }
}
