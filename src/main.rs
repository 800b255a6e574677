//! http-cloak: TCP tunnel that can dress its traffic up as HTTP.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                    http-cloak                    │
//!                     │                                                  │
//!   Client            │  ┌──────────┐   ┌──────────┐   ┌──────────────┐  │   Remote
//!   ──────────────────┼─▶│   net    │──▶│  relay   │──▶│ FramedEndpt  │──┼──▶ host
//!   (raw or disguised)│  │ listener │   │ session  │   │  (dial side) │  │ (raw or disguised)
//!                     │  └──────────┘   └────┬─────┘   └──────────────┘  │
//!                     │                      │                           │
//!                     │                 ┌────▼─────┐                     │
//!                     │                 │ framing  │ header scan,        │
//!                     │                 │          │ Content-Length      │
//!                     │                 └──────────┘                     │
//!                     │  config · observability · resilience · lifecycle │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use http_cloak::config::loader::{load_config, ConfigError};
use http_cloak::config::validation::validate_config;
use http_cloak::framing::Mode;
use http_cloak::lifecycle::{signals, Shutdown};
use http_cloak::net::Listener;
use http_cloak::observability::{logging, metrics};
use http_cloak::{TunnelConfig, TunnelServer};

#[derive(Parser)]
#[command(name = "http-cloak")]
#[command(version, about = "TCP tunnel with optional HTTP-disguised framing", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to accept clients on.
    #[arg(short, long)]
    listen: Option<String>,

    /// Host every accepted connection is forwarded to.
    #[arg(long)]
    remote_host: Option<String>,

    #[arg(long)]
    remote_port: Option<u16>,

    /// Framing on accepted connections (raw or disguised).
    #[arg(long)]
    listen_mode: Option<Mode>,

    /// Framing towards the remote host (raw or disguised).
    #[arg(long)]
    remote_mode: Option<Mode>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Command-line values win over the file.
    fn apply(self, config: &mut TunnelConfig) {
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if let Some(host) = self.remote_host {
            config.remote.host = host;
        }
        if let Some(port) = self.remote_port {
            config.remote.port = port;
        }
        if let Some(mode) = self.listen_mode {
            config.listener.mode = mode;
        }
        if let Some(mode) = self.remote_mode {
            config.remote.mode = mode;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TunnelConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "http-cloak starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        listen_mode = %config.listener.mode,
        remote = %format!("{}:{}", config.remote.host, config.remote.port),
        remote_mode = %config.remote.mode,
        buffer_size = config.io.buffer_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    TunnelServer::new(config).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
