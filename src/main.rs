//! chatte: WebSocket chat server.
//!
//! Settings come from `~/.chatte/settings.json` (or `--config`), then
//! `CHATTE_*` environment variables, then command-line flags.

use std::path::PathBuf;

use anyhow::Context;
use chatte_settings::{parse_log_format, ChatSettings, LogFormat};
use chatte_server::ShutdownCoordinator;
use clap::Parser;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "chatte", version, about = "WebSocket chat server")]
struct Cli {
    /// Settings file (defaults to ~/.chatte/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Bind address.
    #[arg(long)]
    host: Option<String>,
    /// Bind port.
    #[arg(long, short)]
    port: Option<u16>,
    /// Directory of static assets to serve.
    #[arg(long)]
    static_dir: Option<PathBuf>,
    /// Allowed WebSocket origin; repeat for several.
    #[arg(long = "allow-origin")]
    allowed_origins: Vec<String>,
    /// Log filter directive, e.g. `debug` or `chatte_server=trace`.
    #[arg(long)]
    log_level: Option<String>,
    /// Log format: `pretty` or `json`.
    #[arg(long, value_parser = parse_format)]
    log_format: Option<LogFormat>,
}

fn parse_format(s: &str) -> Result<LogFormat, String> {
    parse_log_format(s).ok_or_else(|| format!("unknown log format `{s}`"))
}

impl Cli {
    fn apply(self, settings: &mut ChatSettings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = self.static_dir {
            settings.server.static_dir = Some(dir);
        }
        if !self.allowed_origins.is_empty() {
            settings.server.allowed_origins = self.allowed_origins;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => chatte_settings::load_settings_from_path(path),
        None => chatte_settings::load_settings(),
    }
    .context("failed to load settings")?;
    cli.apply(&mut settings);
    settings.validate().context("invalid settings")?;

    chatte_telemetry::init_logging(&settings.logging).context("failed to initialize logging")?;

    let shutdown = ShutdownCoordinator::new();
    let handle = chatte_server::start(&settings, &shutdown).await?;
    info!(addr = %handle.addr(), "ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!(connections = handle.connection_count(), "shutdown requested");

    if !shutdown
        .graceful_shutdown(settings.server.shutdown_timeout())
        .await
    {
        warn!("some tasks did not finish before the shutdown timeout");
    }
    Ok(())
}
