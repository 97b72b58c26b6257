//! Bound stream address accepting subscriber connections.

use std::io;
#[cfg(unix)]
use std::path::{Path, PathBuf};

use tokio::net::TcpListener;
use tracing::{debug, warn};

use super::Link;
use crate::address::StreamAddress;
use crate::error::StreamError;

#[derive(Debug)]
pub enum StreamListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Ipc {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
}

impl StreamListener {
    /// Bind `address`.
    ///
    /// An ipc socket file left behind by a dead publisher is replaced;
    /// one that still accepts connections means the stream is taken.
    pub async fn bind(address: &StreamAddress) -> Result<Self, StreamError> {
        let bind_err = |source| StreamError::Bind {
            address: address.to_string(),
            source,
        };
        match address {
            StreamAddress::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
                Ok(StreamListener::Tcp(listener))
            }
            #[cfg(unix)]
            StreamAddress::Ipc(path) => {
                let listener = bind_ipc(path).await.map_err(bind_err)?;
                Ok(StreamListener::Ipc {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            StreamAddress::Ipc(_) => Err(StreamError::UnsupportedTransport(
                "ipc sockets need a unix platform",
            )),
        }
    }

    /// Wait for the next subscriber. Returns the link and a peer label
    /// for logging.
    pub async fn accept(&self) -> io::Result<(Link, String)> {
        match self {
            StreamListener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            StreamListener::Ipc { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                let label = match stream.peer_cred() {
                    Ok(cred) => match cred.pid() {
                        Some(pid) => format!("pid {pid}"),
                        None => format!("uid {}", cred.uid()),
                    },
                    Err(_) => "unix peer".to_string(),
                };
                Ok((Box::new(stream), label))
            }
        }
    }

    /// Socket file owned by this listener, if any.
    #[cfg(unix)]
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            StreamListener::Ipc { path, .. } => Some(path),
            StreamListener::Tcp(_) => None,
        }
    }
}

#[cfg(unix)]
async fn bind_ipc(path: &Path) -> io::Result<tokio::net::UnixListener> {
    use std::os::unix::fs::FileTypeExt;
    use tokio::net::{UnixListener, UnixStream};

    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            let is_socket = std::fs::symlink_metadata(path)
                .map(|m| m.file_type().is_socket())
                .unwrap_or(false);
            if !is_socket {
                return Err(e);
            }
            match UnixStream::connect(path).await {
                Ok(_) => {
                    debug!(path = %path.display(), "socket is served by a live publisher");
                    Err(e)
                }
                Err(probe) if probe.kind() == io::ErrorKind::ConnectionRefused => {
                    warn!(path = %path.display(), "replacing stale socket");
                    std::fs::remove_file(path)?;
                    UnixListener::bind(path)
                }
                Err(_) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}
