//! Retry-replayer binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! primary SQLite store, and drains the ingestion retry queue on a poll
//! interval. Pass `--once` to process a single batch and exit, which is
//! how scheduled-job deployments invoke it.

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use casegraph_fanout::{
  RetryReplayer,
  backends::{DocumentStoreClient, SearchIndexClient},
  config::FanoutSettings,
};
use casegraph_store_sqlite::SqliteStore;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "casegraph retry-queue replayer")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: std::path::PathBuf,

  /// Process one batch and exit instead of polling.
  #[arg(long)]
  once: bool,
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
    .add_source(config::Environment::with_prefix("CASEGRAPH").separator("__"))
    .build()
    .context("failed to read config file")?;

  let settings: FanoutSettings = settings
    .try_deserialize()
    .context("failed to deserialise FanoutSettings")?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", settings.store_path)
    })?;
  let store = Arc::new(store);

  let mut replayer = RetryReplayer::new(store, settings.replay_config());
  if let Some(doc) = settings.document_store.as_ref().filter(|b| b.enabled) {
    replayer = replayer.with_backend(Arc::new(DocumentStoreClient::new(
      doc.base_url.clone(),
      doc.target.clone(),
    )));
  }
  if let Some(idx) = settings.search_index.as_ref().filter(|b| b.enabled) {
    replayer = replayer.with_backend(Arc::new(SearchIndexClient::new(
      idx.base_url.clone(),
      idx.target.clone(),
    )));
  }

  let poll_interval = Duration::from_secs(settings.poll_interval_secs);
  loop {
    match replayer.run_once().await {
      Ok(stats) => {
        if stats.replayed + stats.rescheduled + stats.dropped + stats.malformed
          == 0
        {
          tracing::debug!("no retry entries ready");
        }
      }
      Err(error) => {
        tracing::error!(%error, "retry batch failed");
      }
    }

    if cli.once {
      break;
    }
    tokio::time::sleep(poll_interval).await;
  }

  Ok(())
}
