//! Socket plumbing shared by the endpoints.
//!
//! Both transports are reduced to a boxed [`LinkIo`] so the envelope
//! framing, the publisher's writer tasks and the subscriber's reader task
//! are written once.

pub mod link;
pub mod listener;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::address::StreamAddress;
use crate::codec::EnvelopeCodec;
use crate::error::StreamError;

pub use link::{handshake, serve_subscriber};
pub use listener::StreamListener;

/// A connected byte stream of either transport.
pub trait LinkIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkIo for T {}

pub type Link = Box<dyn LinkIo>;

/// A link framed into envelopes.
pub type EnvelopeLink = Framed<Link, EnvelopeCodec>;

pub fn frame_link(link: Link) -> EnvelopeLink {
    Framed::new(link, EnvelopeCodec::new())
}

/// Open a connection to `address`.
pub async fn connect(address: &StreamAddress) -> Result<Link, StreamError> {
    let connect_err = |source| StreamError::Connect {
        address: address.to_string(),
        source,
    };
    match address {
        StreamAddress::Tcp(addr) => {
            let stream = TcpStream::connect(addr).await.map_err(connect_err)?;
            stream.set_nodelay(true).map_err(connect_err)?;
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        StreamAddress::Ipc(path) => {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(connect_err)?;
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        StreamAddress::Ipc(_) => Err(StreamError::UnsupportedTransport(
            "ipc sockets need a unix platform",
        )),
    }
}
