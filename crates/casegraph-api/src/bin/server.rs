//! casegraph API server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, wires the fan-out pipeline and hybrid search, and serves
//! the JSON API over HTTP.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use casegraph_api::ApiState;
use casegraph_fanout::{
  FanoutConfig, FanoutCoordinator, IngestPipeline,
  backends::{DocumentStoreClient, SearchIndexClient},
  config::BackendSettings,
};
use casegraph_search::{
  HybridSearchService, MergeWeights, SearchConfig, lexical::LexicalIndex,
};
use casegraph_store_sqlite::SqliteStore;
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "casegraph API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerConfig {
  #[serde(default = "default_host")]
  host: String,
  #[serde(default = "default_port")]
  port: u16,
  store_path: PathBuf,

  #[serde(default = "default_limit")]
  default_limit: usize,
  #[serde(default = "default_semantic_weight")]
  semantic_weight: f64,
  #[serde(default = "default_structured_weight")]
  structured_weight: f64,

  #[serde(default = "default_write_timeout_secs")]
  write_timeout_secs: u64,
  #[serde(default = "default_retry_delay_secs")]
  retry_delay_secs: u64,
  #[serde(default = "default_max_retries")]
  max_retries: i64,

  document_store: Option<BackendSettings>,
  search_index: Option<BackendSettings>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_limit() -> usize { 25 }
fn default_semantic_weight() -> f64 { 0.6 }
fn default_structured_weight() -> f64 { 0.4 }
fn default_write_timeout_secs() -> u64 { 30 }
fn default_retry_delay_secs() -> u64 { 300 }
fn default_max_retries() -> i64 { 5 }

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

  let config: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store = SqliteStore::open(&config.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", config.store_path)
    })?;
  let store = Arc::new(store);
  let index = Arc::new(LexicalIndex::new());

  let fanout_config = FanoutConfig {
    write_timeout: std::time::Duration::from_secs(config.write_timeout_secs),
    retry_delay:   std::time::Duration::from_secs(config.retry_delay_secs),
    max_retries:   config.max_retries,
  };
  let mut coordinator =
    FanoutCoordinator::new(store.clone(), fanout_config);
  if let Some(doc) = &config.document_store {
    coordinator = coordinator.with_backend(
      Arc::new(DocumentStoreClient::new(
        doc.base_url.clone(),
        doc.target.clone(),
      )),
      doc.enabled,
    );
  }
  if let Some(idx) = &config.search_index {
    coordinator = coordinator.with_backend(
      Arc::new(SearchIndexClient::new(
        idx.base_url.clone(),
        idx.target.clone(),
      )),
      idx.enabled,
    );
  }

  let pipeline = Arc::new(IngestPipeline::new(store.clone(), coordinator));
  let search = Arc::new(HybridSearchService::new(
    store.clone(),
    index.clone(),
    SearchConfig {
      default_limit: config.default_limit,
      weights:       MergeWeights {
        semantic:   config.semantic_weight,
        structured: config.structured_weight,
      },
    },
  ));

  let state = ApiState { store, index, pipeline, search };
  let app = casegraph_api::api_router(state).layer(TraceLayer::new_for_http());

  let address = format!("{}:{}", config.host, config.port);
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
