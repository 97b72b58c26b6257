//! Entry point for the vistream monitor.
//!
//! ```text
//! vistream-monitor oakd                 Watch stream "oakd"
//! vistream-monitor oakd --poll-ms 5     Poll the subscriber every 5 ms
//! vistream-monitor oakd --scheme tcp    Use the tcp address convention
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vistream_core::{AddressConfig, FrameSubscriber, SubscriberConfig, TransportScheme};
use vistream_monitor::meter::FrameMeter;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vistream-monitor", about = "Report statistics for an RGB-D + pose stream")]
struct Cli {
    /// Stream name to subscribe to.
    stream: String,

    /// Interval between `get_next` polls, in milliseconds.
    #[arg(long, default_value_t = 10)]
    poll_ms: u64,

    /// Address convention: ipc or tcp.
    #[arg(long, default_value = "ipc")]
    scheme: TransportScheme,

    /// Directory holding ipc sockets.
    #[arg(long, default_value = "/tmp")]
    ipc_dir: PathBuf,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vistream-monitor v{}", env!("CARGO_PKG_VERSION"));

    let config = SubscriberConfig {
        address: AddressConfig {
            scheme: cli.scheme,
            ipc_dir: cli.ipc_dir,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut subscriber = FrameSubscriber::connect_with_config(&cli.stream, config).await?;
    info!("subscribed to {} at {}", cli.stream, subscriber.address());

    let mut meter = FrameMeter::new(Duration::from_secs(1));
    let mut poll = tokio::time::interval(Duration::from_millis(cli.poll_ms.max(1)));
    let mut was_linked = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = poll.tick() => {}
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }

        if let Some(frame) = subscriber.get_next()? {
            meter.record(&frame);
        }

        let linked = subscriber.is_linked();
        if linked != was_linked {
            if linked {
                info!("publisher is back");
            } else {
                warn!("publisher went away, waiting for it to return");
            }
            was_linked = linked;
        }

        if let Some(report) = meter.report_at(Instant::now()) {
            let layout = report
                .layout
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-".into());
            info!(
                "{:.1} fps, {} frames, {:.1} MB, {} identity poses | {layout}",
                report.fps,
                report.frames,
                report.bytes as f64 / 1_048_576.0,
                report.identity_poses
            );
            if report.identity_poses > 0 {
                warn!(
                    "{} of {} poses were the identity (odometry not converged)",
                    report.identity_poses, report.frames
                );
            }
        }
    }

    let stats = subscriber.stats();
    info!(
        "received {}, decoded {}, malformed {}, reconnects {}",
        stats.received, stats.decoded, stats.malformed, stats.reconnects
    );
    subscriber.disconnect();
    Ok(())
}
