// src/main.rs

use anyhow::Result;
use bibsnap::{dedup, snapshot, AccountSession, Endpoints, ReqwestTransport, SnapshotWriter, UserConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "bibsnap")]
#[command(author, version, about = "Captures library-account snapshots and dedups identical runs", long_about = None)]
struct Cli {
    /// Base directory for captured snapshots (must contain bib.toml)
    #[arg(short = 'd', long)]
    data_dir: PathBuf,

    /// Always capture, regardless of when the last snapshot was taken
    #[arg(long)]
    force_download: bool,
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if !cli.data_dir.is_dir() {
        anyhow::bail!("{} is not a directory", cli.data_dir.display());
    }

    let config = UserConfig::load(&cli.data_dir)?;

    let age = snapshot::time_since_last_capture(&cli.data_dir)?;
    if snapshot::should_capture(age, cli.force_download) {
        let endpoints = Endpoints::new(&config.base_url)?;
        let writer = SnapshotWriter::new(&cli.data_dir);
        let committed = writer.capture_all(&config.credentials, |credential| {
            let transport = ReqwestTransport::new()?;
            Ok(AccountSession::new(
                transport,
                endpoints.clone(),
                credential.clone(),
            ))
        })?;
        info!("snapshot written to {}", committed.display());
    } else {
        info!("already up to date, skipping capture");
    }

    // Dedup only runs once the capture has committed or been skipped; a
    // failed run deletes nothing.
    dedup::dedup(&cli.data_dir)?;

    Ok(())
}
