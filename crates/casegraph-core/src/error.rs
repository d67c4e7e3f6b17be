//! Error types for `casegraph-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed bundle. Surfaced synchronously to the ingest caller; the
  /// primary write is aborted and nothing is committed.
  #[error("invalid bundle: {0}")]
  Validation(String),

  #[error("unknown match mode: {0:?}")]
  UnknownMatchMode(String),

  #[error("unknown backend: {0:?}")]
  UnknownBackend(String),

  #[error("unknown run status: {0:?}")]
  UnknownRunStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
