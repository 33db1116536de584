//! `sedimentd`: the Sediment telemetry tiering daemon.
//!
//! Reads `sediment.toml` (or the path given with `--config`), layered with
//! `SEDIMENT_*` environment variables (`__` separates nested keys, e.g.
//! `SEDIMENT_ARCHIVE__IS_ARCHIVE_WORKER=true`), and serves the HTTP API.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use sediment_server::ServerConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Sediment telemetry tiering daemon")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "sediment.toml")]
  config: PathBuf,

  /// Run as the archive worker regardless of the configuration.
  #[arg(long)]
  worker: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("SEDIMENT")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let mut server_cfg: ServerConfig =
    settings.try_deserialize().context("failed to deserialise ServerConfig")?;
  if cli.worker {
    server_cfg.archive.is_archive_worker = true;
  }

  sediment_server::run(server_cfg).await
}
