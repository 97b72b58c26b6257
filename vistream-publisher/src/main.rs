//! Entry point for the vistream publisher.
//!
//! ```text
//! vistream-publisher [STREAM]          Publish STREAM (default from config)
//! vistream-publisher --fps 15          Override the frame rate
//! vistream-publisher --scheme tcp      Use the tcp address convention
//! vistream-publisher --config <path>   Load a custom config TOML
//! vistream-publisher --gen-config      Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vistream_core::TransportScheme;
use vistream_publisher::config::PublisherToml;
use vistream_publisher::service::PublisherService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vistream-publisher", about = "Publish an RGB-D + pose stream")]
struct Cli {
    /// Stream name subscribers connect to.
    stream: Option<String>,

    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Address convention: ipc or tcp.
    #[arg(long)]
    scheme: Option<TransportScheme>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vistream-publisher.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&PublisherToml::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = PublisherToml::load(&cli.config);
    if let Some(stream) = cli.stream {
        config.stream.name = stream;
    }
    if let Some(fps) = cli.fps {
        config.stream.fps = fps;
    }
    if let Some(scheme) = cli.scheme {
        config.transport.scheme = scheme;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vistream-publisher v{}", env!("CARGO_PKG_VERSION"));
    info!("stream: {}", config.stream.name);
    info!("target FPS: {}", config.to_publisher_config().target_fps);
    info!(
        "source: {}x{} with {} points",
        config.source.width, config.source.height, config.source.points
    );

    let service = PublisherService::new(config);
    let stop = service.stop_handle();

    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop_clone.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    let stats = service.run().await?;
    info!(
        "published {} frames ({} throttled, {} rejected)",
        stats.published, stats.throttled, stats.failed
    );

    Ok(())
}
