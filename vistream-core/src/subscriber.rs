//! Subscriber endpoint.
//!
//! A background task owns the connection and overwrites a single-slot
//! `watch` channel with every raw message it receives. [`get_next`]
//! only looks at that slot, so it never blocks, and whatever arrived
//! between two calls except the newest message is lost.
//!
//! [`get_next`]: FrameSubscriber::get_next

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::address::{AddressConfig, StreamAddress};
use crate::codec::{decode_frame, Envelope};
use crate::error::StreamError;
use crate::frame::SensorFrame;
use crate::network::{self, EnvelopeLink};
use crate::state::EndpointPhase;

// ── SubscriberConfig ─────────────────────────────────────────────

/// Configuration for [`FrameSubscriber`].
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub address: AddressConfig,
    /// How long `connect` waits for the publisher's hello.
    pub handshake_timeout: Duration,
    /// Pause between reconnect attempts after the link drops.
    pub reconnect_interval: Duration,
    /// Whether to reconnect at all.
    pub reconnect: bool,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            address: AddressConfig::default(),
            handshake_timeout: Duration::from_secs(2),
            reconnect_interval: Duration::from_millis(100),
            reconnect: true,
        }
    }
}

// ── SubscriberStats ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Messages taken off the socket.
    pub received: u64,
    /// Frames handed to the caller.
    pub decoded: u64,
    /// Messages dropped as malformed or truncated.
    pub malformed: u64,
    /// Successful re-connections after a lost link.
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct Shared {
    received: AtomicU64,
    reconnects: AtomicU64,
    linked: AtomicBool,
}

// ── FrameSubscriber ──────────────────────────────────────────────

/// Receiving side of a named stream.
pub struct FrameSubscriber {
    stream_name: String,
    address: StreamAddress,
    phase: EndpointPhase,
    latest: watch::Receiver<Option<Bytes>>,
    // Held here too so an unread message outlives the receive task.
    _slot: Arc<watch::Sender<Option<Bytes>>>,
    shared: Arc<Shared>,
    receive_task: Option<JoinHandle<()>>,
    decoded: u64,
    malformed: u64,
}

impl FrameSubscriber {
    /// Connect to `stream_name` under the default address convention.
    pub async fn connect(stream_name: &str) -> Result<Self, StreamError> {
        Self::connect_with_config(stream_name, SubscriberConfig::default()).await
    }

    /// Connect and wait for the publisher to register this subscriber.
    ///
    /// Every frame the publisher sends after this returns is delivered to
    /// the slot. There is no replay of earlier frames.
    pub async fn connect_with_config(
        stream_name: &str,
        config: SubscriberConfig,
    ) -> Result<Self, StreamError> {
        let address = StreamAddress::derive(stream_name, &config.address)?;
        let link = open_link(&address, stream_name, config.handshake_timeout).await?;

        let (slot, latest) = watch::channel(None);
        let slot = Arc::new(slot);
        let shared = Arc::new(Shared::default());
        shared.linked.store(true, Ordering::SeqCst);

        let receive_task = tokio::spawn(receive_loop(
            link,
            stream_name.to_string(),
            address.clone(),
            config,
            Arc::clone(&slot),
            Arc::clone(&shared),
        ));

        info!(stream = stream_name, %address, "subscriber connected");

        Ok(Self {
            stream_name: stream_name.to_string(),
            address,
            phase: EndpointPhase::opened(),
            latest,
            _slot: slot,
            shared,
            receive_task: Some(receive_task),
            decoded: 0,
            malformed: 0,
        })
    }

    /// The newest frame received since the previous call, if any.
    ///
    /// Never blocks. A message that fails to decode is dropped with a
    /// warning and reported as `None`.
    pub fn get_next(&mut self) -> Result<Option<SensorFrame>, StreamError> {
        self.phase.ensure_open()?;

        // `_slot` keeps the channel open, so a message left by a finished
        // receive task still reads as changed.
        if !self.latest.has_changed().unwrap_or(false) {
            return Ok(None);
        }
        let Some(message) = self.latest.borrow_and_update().clone() else {
            return Ok(None);
        };

        match decode_frame(&message) {
            Ok(frame) => {
                self.decoded += 1;
                Ok(Some(frame))
            }
            Err(e) => {
                self.malformed += 1;
                warn!(stream = %self.stream_name, error = %e, len = message.len(), "dropping undecodable message");
                Ok(None)
            }
        }
    }

    /// Stop receiving and release the connection. Idempotent.
    pub fn disconnect(&mut self) {
        let Some(uptime) = self.phase.close() else {
            return;
        };
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }
        self.shared.linked.store(false, Ordering::SeqCst);
        info!(stream = %self.stream_name, ?uptime, "subscriber disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.phase.is_open()
    }

    /// Whether the background task currently holds a live link.
    pub fn is_linked(&self) -> bool {
        self.phase.is_open() && self.shared.linked.load(Ordering::SeqCst)
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn address(&self) -> &StreamAddress {
        &self.address
    }

    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            received: self.shared.received.load(Ordering::Relaxed),
            decoded: self.decoded,
            malformed: self.malformed,
            reconnects: self.shared.reconnects.load(Ordering::Relaxed),
        }
    }
}

impl Drop for FrameSubscriber {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for FrameSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSubscriber")
            .field("stream_name", &self.stream_name)
            .field("address", &self.address)
            .field("phase", &self.phase)
            .field("stats", &self.stats())
            .finish()
    }
}

async fn open_link(
    address: &StreamAddress,
    stream_name: &str,
    timeout: Duration,
) -> Result<EnvelopeLink, StreamError> {
    let mut link = network::frame_link(network::connect(address).await?);
    network::handshake(&mut link, stream_name, timeout).await?;
    Ok(link)
}

/// Fill the slot from the socket, reconnecting when the link drops.
async fn receive_loop(
    link: EnvelopeLink,
    stream_name: String,
    address: StreamAddress,
    config: SubscriberConfig,
    slot: Arc<watch::Sender<Option<Bytes>>>,
    shared: Arc<Shared>,
) {
    let mut link = Some(link);

    loop {
        let Some(current) = link.as_mut() else {
            if !config.reconnect {
                debug!(stream = %stream_name, "link lost, not reconnecting");
                return;
            }
            tokio::time::sleep(config.reconnect_interval).await;
            match open_link(&address, &stream_name, config.handshake_timeout).await {
                Ok(fresh) => {
                    info!(stream = %stream_name, %address, "reconnected");
                    shared.reconnects.fetch_add(1, Ordering::Relaxed);
                    shared.linked.store(true, Ordering::SeqCst);
                    link = Some(fresh);
                }
                Err(e) => debug!(stream = %stream_name, error = %e, "reconnect failed"),
            }
            continue;
        };

        let next = current.next().await;
        match next {
            Some(Ok(Envelope::Frame(message))) => {
                shared.received.fetch_add(1, Ordering::Relaxed);
                slot.send_replace(Some(message));
            }
            Some(Ok(Envelope::Hello(hello))) => {
                debug!(stream = %stream_name, ?hello, "ignoring repeated hello");
            }
            Some(Err(e)) => {
                warn!(stream = %stream_name, error = %e, "link corrupted, dropping connection");
                shared.linked.store(false, Ordering::SeqCst);
                link = None;
            }
            None => {
                info!(stream = %stream_name, "publisher went away");
                shared.linked.store(false, Ordering::SeqCst);
                link = None;
            }
        }
    }
}
