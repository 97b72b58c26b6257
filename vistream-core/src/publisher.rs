//! Publisher endpoint.
//!
//! Binds the address derived from a stream name and fans every admitted
//! frame out to all connected subscribers:
//!
//! 1. [`publish`](FramePublisher::publish) gates on the target frame rate,
//!    encodes the frame and pushes the message into a bounded broadcast
//!    channel. It never waits on the network.
//! 2. An accept task registers each subscriber and spawns a writer task
//!    fed from the channel.
//! 3. A writer that falls behind loses the oldest messages; it never
//!    slows the publisher or the other subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, trace, warn};

use crate::address::{AddressConfig, StreamAddress};
use crate::codec::{encode_frame, Hello, MAX_ENVELOPE_SIZE};
use crate::error::{SourceError, StreamError};
use crate::frame::SensorFrame;
use crate::network::{self, StreamListener};
use crate::rate::RateLimiter;
use crate::source::FrameSource;
use crate::state::EndpointPhase;

// ── PublisherConfig ──────────────────────────────────────────────

/// Configuration for [`FramePublisher`].
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Target frames per second (at least 1).
    pub target_fps: u32,
    /// Messages buffered per subscriber before the oldest is dropped.
    pub send_queue: usize,
    /// Largest encoded frame accepted, capped at [`MAX_ENVELOPE_SIZE`].
    pub max_message_size: usize,
    pub address: AddressConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            send_queue: 2,
            max_message_size: MAX_ENVELOPE_SIZE,
            address: AddressConfig::default(),
        }
    }
}

// ── PublishOutcome / PublisherStats ──────────────────────────────

/// What [`FramePublisher::publish`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Encoded and handed to `subscribers` connections (possibly zero).
    Sent { subscribers: usize },
    /// Dropped by the rate gate.
    Throttled,
}

impl PublishOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, PublishOutcome::Sent { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub published: u64,
    pub throttled: u64,
    /// Frames rejected by the encoder.
    pub failed: u64,
}

// ── FramePublisher ───────────────────────────────────────────────

/// Publishing side of a named stream.
///
/// Once [`close`](Self::close) returns, a new publisher may bind the same
/// stream name. Dropping without closing releases the address on the
/// runtime's next poll of the accept task.
pub struct FramePublisher {
    stream_name: String,
    address: StreamAddress,
    phase: EndpointPhase,
    limiter: RateLimiter,
    max_message_size: usize,
    frames: broadcast::Sender<Bytes>,
    accept_task: Option<JoinHandle<()>>,
    #[cfg(unix)]
    socket_path: Option<std::path::PathBuf>,
    stats: PublisherStats,
}

impl FramePublisher {
    /// Bind `stream_name` under the default address convention.
    pub async fn open(stream_name: &str, target_fps: u32) -> Result<Self, StreamError> {
        Self::open_with_config(
            stream_name,
            PublisherConfig {
                target_fps,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn open_with_config(
        stream_name: &str,
        config: PublisherConfig,
    ) -> Result<Self, StreamError> {
        let limiter = RateLimiter::new(config.target_fps)?;
        let address = StreamAddress::derive(stream_name, &config.address)?;
        let listener = StreamListener::bind(&address).await?;
        #[cfg(unix)]
        let socket_path = listener.socket_path().map(|p| p.to_path_buf());

        let (frames, _) = broadcast::channel(config.send_queue.max(1));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            stream_name.to_string(),
            frames.clone(),
        ));

        info!(
            stream = stream_name,
            %address,
            fps = config.target_fps,
            "publisher bound"
        );

        Ok(Self {
            stream_name: stream_name.to_string(),
            address,
            phase: EndpointPhase::opened(),
            limiter,
            max_message_size: config.max_message_size.min(MAX_ENVELOPE_SIZE),
            frames,
            accept_task: Some(accept_task),
            #[cfg(unix)]
            socket_path,
            stats: PublisherStats::default(),
        })
    }

    /// Send `frame` to every subscriber if the rate gate admits it.
    ///
    /// A throttled frame is dropped, not queued. An encoding failure
    /// leaves the gate untouched so the next valid frame goes out at once.
    pub fn publish(&mut self, frame: &SensorFrame) -> Result<PublishOutcome, StreamError> {
        self.publish_at(frame, Instant::now())
    }

    /// [`publish`](Self::publish) with an explicit clock reading.
    pub fn publish_at(
        &mut self,
        frame: &SensorFrame,
        now: Instant,
    ) -> Result<PublishOutcome, StreamError> {
        self.phase.ensure_open()?;

        if !self.limiter.ready_at(now) {
            self.stats.throttled += 1;
            trace!(stream = %self.stream_name, "frame throttled");
            return Ok(PublishOutcome::Throttled);
        }

        let message = encode_frame(frame).inspect_err(|_| self.stats.failed += 1)?;
        if message.len() > self.max_message_size {
            self.stats.failed += 1;
            return Err(StreamError::Encoding {
                field: "frame",
                reason: format!(
                    "message of {} bytes exceeds the {} byte limit",
                    message.len(),
                    self.max_message_size
                ),
            });
        }
        self.limiter.mark_at(now);

        // No receivers is not an error: the frame is simply unseen.
        let subscribers = self.frames.send(message).unwrap_or(0);
        self.stats.published += 1;
        trace!(stream = %self.stream_name, subscribers, "frame published");
        Ok(PublishOutcome::Sent { subscribers })
    }

    /// Pull frames from `source` and publish them at the target rate
    /// until the source ends or `running` is cleared.
    ///
    /// Capture runs on the blocking pool. Invalid frames and failed
    /// capture ticks are logged and skipped.
    pub async fn run<S>(&mut self, source: S, running: Arc<AtomicBool>) -> Result<S, StreamError>
    where
        S: FrameSource + Send + 'static,
    {
        info!(stream = %self.stream_name, source = %source.describe(), "publish loop started");
        let mut source = source;

        while running.load(Ordering::SeqCst) {
            self.phase.ensure_open()?;

            let wait = self.limiter.remaining_at(Instant::now());
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }

            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = source.next_frame();
                (source, result)
            })
            .await
            .map_err(|e| SourceError::CaptureFailed(format!("capture task failed: {e}")))?;
            source = returned;

            match result {
                Ok(Some(frame)) => match self.publish(&frame) {
                    Ok(_) => {}
                    Err(e @ StreamError::Encoding { .. }) => {
                        warn!(stream = %self.stream_name, error = %e, "dropping invalid frame");
                    }
                    Err(e) => return Err(e),
                },
                Ok(None) => {
                    info!(stream = %self.stream_name, "source exhausted");
                    break;
                }
                Err(e @ (SourceError::CaptureFailed(_) | SourceError::InvalidFrame(_))) => {
                    warn!(stream = %self.stream_name, error = %e, "capture tick failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            stream = %self.stream_name,
            published = self.stats.published,
            throttled = self.stats.throttled,
            failed = self.stats.failed,
            "publish loop stopped"
        );
        Ok(source)
    }

    /// Release the address. Idempotent.
    ///
    /// Returns once the listener is dropped, so the same stream may be
    /// bound again immediately on either transport.
    pub async fn close(&mut self) {
        if let Some(task) = self.shutdown() {
            // Cancelled tasks drop their future before the handle resolves.
            let _ = task.await;
        }
    }

    /// Mark closed, cancel the accept task and unlink the socket file.
    /// The returned task may still own the listener until it is awaited.
    fn shutdown(&mut self) -> Option<JoinHandle<()>> {
        let uptime = self.phase.close()?;
        let task = self.accept_task.take();
        if let Some(task) = &task {
            task.abort();
        }
        self.remove_socket();
        info!(stream = %self.stream_name, ?uptime, "publisher closed");
        task
    }

    #[cfg(unix)]
    fn remove_socket(&mut self) {
        let Some(path) = self.socket_path.take() else {
            return;
        };
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "could not remove socket");
            }
        }
    }

    #[cfg(not(unix))]
    fn remove_socket(&mut self) {}

    pub fn is_open(&self) -> bool {
        self.phase.is_open()
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn address(&self) -> &StreamAddress {
        &self.address
    }

    pub fn stats(&self) -> PublisherStats {
        self.stats
    }

    /// Subscribers currently registered.
    pub fn subscriber_count(&self) -> usize {
        if self.phase.is_open() {
            self.frames.receiver_count()
        } else {
            0
        }
    }
}

impl Drop for FramePublisher {
    fn drop(&mut self) {
        // The listener goes away on the runtime's next poll of the task.
        self.shutdown();
    }
}

impl std::fmt::Debug for FramePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePublisher")
            .field("stream_name", &self.stream_name)
            .field("address", &self.address)
            .field("phase", &self.phase)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Accept subscribers until aborted. Dropping this future drops the
/// listener and every writer task with it.
async fn accept_loop(listener: StreamListener, stream_name: String, frames: broadcast::Sender<Bytes>) {
    let mut writers = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((link, peer)) => {
                    // Subscribe before the hello goes out.
                    let rx = frames.subscribe();
                    debug!(stream = %stream_name, %peer, "subscriber connected");
                    writers.spawn(network::serve_subscriber(
                        network::frame_link(link),
                        Hello::new(stream_name.clone()),
                        rx,
                        peer,
                    ));
                }
                Err(e) => {
                    warn!(stream = %stream_name, error = %e, "accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            },
            Some(_) = writers.join_next() => {}
        }
    }
}
