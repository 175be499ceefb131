//! vidcast-server entry point.
//!
//! ```text
//! vidcast-server                  Run with ./vidcast-server.toml or defaults
//! vidcast-server --config <path>  Load a custom config TOML
//! vidcast-server --port <port>    Override the listen port
//! vidcast-server --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vidcast_server::config::ServerSettings;
use vidcast_server::service::StreamingService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vidcast-server", about = "Stream live frames to connected viewers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vidcast-server.toml")]
    config: PathBuf,

    /// Listen port, overriding the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerSettings::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerSettings::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let service = StreamingService::new(config);

    let stop = service.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
