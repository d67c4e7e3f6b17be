//! Error type for `casegraph-search`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("semantic index error: {0}")]
  Index(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
