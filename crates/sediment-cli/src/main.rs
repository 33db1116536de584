//! `sediment`: operator CLI for a running `sedimentd`.
//!
//! # Usage
//!
//! ```text
//! sediment --url http://localhost:7300 archives s001 hourly
//! sediment rotate s001 --now
//! sediment activate s001 hourly s001_hourdata_20240101_20240201
//! ```

mod client;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::ApiClient;
use sediment_core::{DataKind, SiteId};
use serde::Deserialize;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sediment", about = "Operate the Sediment telemetry tiering engine")]
struct Args {
  /// Path to a TOML config file (`url = "..."`).
  #[arg(short, long, value_name = "FILE")]
  config: Option<std::path::PathBuf>,

  /// Base URL of a sedimentd instance (default: http://localhost:7300).
  #[arg(long, env = "SEDIMENT_URL")]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Check that the daemon is up.
  Health,
  /// Request a rotation pass for every data kind of a site.
  Rotate {
    site: SiteId,
    /// Run now instead of at the next scheduled slot.
    #[arg(long)]
    now:  bool,
  },
  /// List archive buckets and their status.
  Archives { site: SiteId, kind: DataKind },
  /// Promote an archive bucket back into a queryable table.
  Activate { site: SiteId, kind: DataKind, table: String },
  /// Reset the rollback countdown of an activated bucket.
  Touch { site: SiteId, kind: DataKind, table: String },
  /// Drop the worker's cached archive listing.
  Clear { site: SiteId, kind: DataKind },
  /// Show the tables a query over [begin, end) reads.
  Tables {
    site:  SiteId,
    kind:  DataKind,
    /// `YYYY-MM-DD[ HH:MM:SS]`
    #[arg(long)]
    begin: String,
    #[arg(long)]
    end:   String,
  },
}

// ─── Config file ─────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url: String,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let base_url = args
    .url
    .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
    .unwrap_or_else(|| "http://localhost:7300".to_string());
  let client = ApiClient::new(base_url)?;

  match args.command {
    Command::Health => {
      let status = client.health().await?;
      println!("{status}");
    }
    Command::Rotate { site, now } => {
      client.rotate(&site, now).await?;
      if now {
        println!("rotation of {site} finished");
      } else {
        println!("rotation of {site} scheduled");
      }
    }
    Command::Archives { site, kind } => {
      let tables = client.archives(&site, kind).await?;
      if tables.is_empty() {
        println!("no archive tables for {site}/{kind}");
      }
      for t in tables {
        println!("{:<48} {} .. {}  {:?}", t.name, t.begin, t.end, t.status);
      }
    }
    Command::Activate { site, kind, table } => {
      client.activate(&site, kind, &table).await?;
      println!("activation of {table} started");
    }
    Command::Touch { site, kind, table } => {
      client.touch(&site, kind, &table).await?;
      println!("rollback countdown for {site}/{kind} reset");
    }
    Command::Clear { site, kind } => {
      client.clear(&site, kind).await?;
      println!("catalog entry for {site}/{kind} cleared");
    }
    Command::Tables { site, kind, begin, end } => {
      for table in client.tables(&site, kind, &begin, &end).await? {
        println!("{table}");
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_activate() {
    let args = Args::try_parse_from([
      "sediment",
      "activate",
      "s001",
      "hourly",
      "s001_hourdata_20240101_20240201",
    ])
    .unwrap();
    match args.command {
      Command::Activate { site, kind, table } => {
        assert_eq!(site.as_str(), "s001");
        assert_eq!(kind, DataKind::Hourly);
        assert_eq!(table, "s001_hourdata_20240101_20240201");
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn rejects_unknown_kind() {
    assert!(Args::try_parse_from(["sediment", "archives", "s001", "weekly"]).is_err());
  }

  #[test]
  fn rotate_defaults_to_deferred() {
    let args = Args::try_parse_from(["sediment", "rotate", "s001"]).unwrap();
    assert!(matches!(args.command, Command::Rotate { now: false, .. }));
  }
}
