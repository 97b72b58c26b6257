//! Publisher service: binds the stream and drives it from the frame
//! source until stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use vistream_core::{FramePublisher, PublisherStats, StreamError, SyntheticSource};

use crate::config::PublisherToml;

/// The top-level publisher service.
pub struct PublisherService {
    config: PublisherToml,
    running: Arc<AtomicBool>,
}

impl PublisherService {
    pub fn new(config: PublisherToml) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for stopping the service from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until the stop handle is cleared.
    ///
    /// The address is released before returning, on success or error.
    pub async fn run(&self) -> Result<PublisherStats, StreamError> {
        self.running.store(true, Ordering::SeqCst);

        let source = SyntheticSource::new(self.config.to_source_config())?;
        let mut publisher =
            FramePublisher::open_with_config(&self.config.stream.name, self.config.to_publisher_config())
                .await?;
        info!(
            "streaming {} on {}",
            self.config.stream.name,
            publisher.address()
        );

        let result = publisher.run(source, Arc::clone(&self.running)).await;
        let stats = publisher.stats();
        publisher.close().await;
        self.running.store(false, Ordering::SeqCst);

        result.map(|_| stats)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ── Tests ────────────────────────────────────────────────────────
