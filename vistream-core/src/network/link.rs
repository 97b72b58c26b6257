//! Per-connection tasks: the publisher side writer and the subscriber
//! side hello check.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::EnvelopeLink;
use crate::codec::{Envelope, Hello, PROTOCOL_VERSION};
use crate::error::StreamError;

/// Forward broadcast frame messages to one subscriber until either side
/// goes away.
///
/// `frames` must already be subscribed when this starts: the hello tells
/// the subscriber it is registered, so nothing published after it may be
/// missed. A lagging subscriber skips the messages it could not keep up
/// with.
pub async fn serve_subscriber(
    mut link: EnvelopeLink,
    hello: Hello,
    mut frames: broadcast::Receiver<Bytes>,
    peer: String,
) {
    if let Err(e) = link.send(Envelope::Hello(hello)).await {
        debug!(%peer, error = %e, "hello not delivered");
        return;
    }
    debug!(%peer, "subscriber registered");

    loop {
        tokio::select! {
            msg = frames.recv() => match msg {
                Ok(message) => {
                    if let Err(e) = link.send(Envelope::Frame(message)).await {
                        debug!(%peer, error = %e, "subscriber write failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(%peer, skipped, "slow subscriber dropped frames");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            // Subscribers never send; anything but EOF is ignored.
            inbound = link.next() => match inbound {
                None | Some(Err(_)) => {
                    debug!(%peer, "subscriber hung up");
                    break;
                }
                Some(Ok(_)) => trace!(%peer, "ignoring inbound envelope"),
            },
        }
    }
}

/// Wait for the publisher's hello and check it names `stream_name`.
pub async fn handshake(
    link: &mut EnvelopeLink,
    stream_name: &str,
    timeout: Duration,
) -> Result<(), StreamError> {
    let first = tokio::time::timeout(timeout, link.next())
        .await
        .map_err(|_| StreamError::Timeout(timeout))?;

    match first {
        Some(Ok(Envelope::Hello(hello))) => {
            if hello.version != PROTOCOL_VERSION {
                return Err(StreamError::Handshake(format!(
                    "publisher speaks protocol version {}, expected {PROTOCOL_VERSION}",
                    hello.version
                )));
            }
            if hello.stream_name != stream_name {
                return Err(StreamError::Handshake(format!(
                    "address serves stream {:?}, expected {stream_name:?}",
                    hello.stream_name
                )));
            }
            Ok(())
        }
        Some(Ok(Envelope::Frame(_))) => Err(StreamError::Handshake(
            "frame received before hello".into(),
        )),
        Some(Err(e)) => Err(e),
        None => Err(StreamError::Handshake(
            "publisher closed the connection before hello".into(),
        )),
    }
}
