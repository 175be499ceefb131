//! vidcast-client entry point.
//!
//! ```text
//! vidcast-client                  Connect using ./vidcast-client.toml or defaults
//! vidcast-client --host <ip>      Server host (overrides config)
//! vidcast-client --port <port>    Server port (overrides config)
//! vidcast-client --config <path>  Use custom config TOML
//! vidcast-client --gen-config     Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vidcast_core::network::discovery::DEFAULT_PROBE_ADDR;
use vidcast_core::outbound_ip;

use vidcast_client::config::ClientSettings;
use vidcast_client::viewer::Viewer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vidcast-client", about = "Receive and display a vidcast stream")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vidcast-client.toml")]
    config: PathBuf,

    /// Server host. Defaults to this machine's outbound address.
    #[arg(long)]
    host: Option<String>,

    /// Server port.
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
        let text = toml::to_string_pretty(&ClientSettings::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientSettings::load(&cli.config);
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let host = if config.network.host.is_empty() {
        outbound_ip(DEFAULT_PROBE_ADDR).await.to_string()
    } else {
        config.network.host.clone()
    };
    let client_config = config.to_client_config(host);

    info!("vidcast-client v{}", env!("CARGO_PKG_VERSION"));
    info!("  server:          {}", client_config.server);
    info!("  connect timeout: {:?}", client_config.connect_timeout);
    info!(
        "  reconnect:       {} attempts, {:?} apart",
        client_config.reconnect_attempts, client_config.reconnect_delay
    );

    let viewer = Viewer::new(client_config, config.monitor_interval());

    let stop = viewer.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    viewer.run().await?;

    Ok(())
}
