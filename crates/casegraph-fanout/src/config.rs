//! Deserializable configuration for the fan-out layer and its binary.

use std::time::Duration;

use serde::Deserialize;

use crate::{coordinator::FanoutConfig, replayer::ReplayConfig};

/// One secondary backend's connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
  #[serde(default)]
  pub enabled:  bool,
  pub base_url: String,
  /// Collection (document store) or index (search index) name.
  pub target:   String,
}

/// Settings shared by the ingest worker and the retry replayer.
#[derive(Debug, Clone, Deserialize)]
pub struct FanoutSettings {
  /// Path to the primary SQLite store.
  pub store_path:         std::path::PathBuf,
  #[serde(default = "default_write_timeout_secs")]
  pub write_timeout_secs: u64,
  #[serde(default = "default_retry_delay_secs")]
  pub retry_delay_secs:   u64,
  #[serde(default = "default_max_retries")]
  pub max_retries:        i64,
  #[serde(default = "default_batch_limit")]
  pub batch_limit:        usize,
  #[serde(default = "default_poll_interval_secs")]
  pub poll_interval_secs: u64,
  pub document_store:     Option<BackendSettings>,
  pub search_index:       Option<BackendSettings>,
}

fn default_write_timeout_secs() -> u64 { 30 }
fn default_retry_delay_secs() -> u64 { 300 }
fn default_max_retries() -> i64 { 5 }
fn default_batch_limit() -> usize { 25 }
fn default_poll_interval_secs() -> u64 { 60 }

impl FanoutSettings {
  pub fn fanout_config(&self) -> FanoutConfig {
    FanoutConfig {
      write_timeout: Duration::from_secs(self.write_timeout_secs),
      retry_delay:   Duration::from_secs(self.retry_delay_secs),
      max_retries:   self.max_retries,
    }
  }

  pub fn replay_config(&self) -> ReplayConfig {
    ReplayConfig {
      batch_limit:   self.batch_limit,
      write_timeout: Duration::from_secs(self.write_timeout_secs),
      retry_delay:   Duration::from_secs(self.retry_delay_secs),
      max_retries:   self.max_retries,
    }
  }
}
