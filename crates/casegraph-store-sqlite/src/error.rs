//! Error type for `casegraph-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] casegraph_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  /// Shorthand for a bundle-validation failure.
  pub fn validation(message: impl Into<String>) -> Self {
    Error::Core(casegraph_core::Error::Validation(message.into()))
  }

  /// Whether this error is a bundle-validation failure (as opposed to a
  /// database fault).
  pub fn is_validation(&self) -> bool {
    matches!(self, Error::Core(casegraph_core::Error::Validation(_)))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
