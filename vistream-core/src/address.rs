//! Stream name → transport address.
//!
//! Publisher and subscriber agree only on a stream name; both sides derive
//! the same address from it with [`StreamAddress::derive`].

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Longest accepted stream name, in bytes.
pub const MAX_STREAM_NAME_LEN: usize = 100;

/// Socket family used for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportScheme {
    /// Unix domain socket under a shared directory.
    #[default]
    Ipc,
    /// Loopback TCP on a port hashed from the stream name.
    Tcp,
}

impl std::str::FromStr for TransportScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ipc" => Ok(TransportScheme::Ipc),
            "tcp" => Ok(TransportScheme::Tcp),
            other => Err(format!("unknown transport scheme '{other}' (expected ipc or tcp)")),
        }
    }
}

impl fmt::Display for TransportScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportScheme::Ipc => f.write_str("ipc"),
            TransportScheme::Tcp => f.write_str("tcp"),
        }
    }
}

/// Address convention shared by publishers and subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressConfig {
    pub scheme: TransportScheme,
    /// Directory holding ipc sockets.
    pub ipc_dir: PathBuf,
    /// Host for the tcp scheme.
    pub host: IpAddr,
    /// First port of the tcp range.
    pub base_port: u16,
    /// Number of ports the stream names hash into.
    pub port_span: u16,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            scheme: TransportScheme::Ipc,
            ipc_dir: PathBuf::from("/tmp"),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 47000,
            port_span: 1000,
        }
    }
}

impl AddressConfig {
    pub fn with_scheme(mut self, scheme: TransportScheme) -> Self {
        self.scheme = scheme;
        self
    }
}

/// A concrete endpoint for one stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamAddress {
    Ipc(PathBuf),
    Tcp(SocketAddr),
}

impl StreamAddress {
    /// Derive the address of `name` under `config`.
    ///
    /// Pure: the same inputs always give the same address.
    pub fn derive(name: &str, config: &AddressConfig) -> Result<Self, StreamError> {
        validate_stream_name(name)?;
        match config.scheme {
            TransportScheme::Ipc => Ok(StreamAddress::Ipc(config.ipc_dir.join(name))),
            TransportScheme::Tcp => {
                let digest = blake3::hash(name.as_bytes());
                let bytes = digest.as_bytes();
                let offset = u16::from_le_bytes([bytes[0], bytes[1]]) % config.port_span.max(1);
                let port = config.base_port.checked_add(offset).ok_or(
                    StreamError::InvalidStreamName {
                        name: name.to_string(),
                        reason: "derived port is out of range",
                    },
                )?;
                Ok(StreamAddress::Tcp(SocketAddr::new(config.host, port)))
            }
        }
    }

    pub fn scheme(&self) -> TransportScheme {
        match self {
            StreamAddress::Ipc(_) => TransportScheme::Ipc,
            StreamAddress::Tcp(_) => TransportScheme::Tcp,
        }
    }
}

impl fmt::Display for StreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamAddress::Ipc(path) => write!(f, "ipc://{}", path.display()),
            StreamAddress::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Reject names that cannot safely become a socket file name.
pub fn validate_stream_name(name: &str) -> Result<(), StreamError> {
    let invalid = |reason| StreamError::InvalidStreamName {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_STREAM_NAME_LEN {
        return Err(invalid("name is longer than 100 bytes"));
    }
    if name.starts_with('.') {
        return Err(invalid("name starts with '.'"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return Err(invalid("only ASCII letters, digits, '.', '_' and '-' are allowed"));
    }
    Ok(())
}
