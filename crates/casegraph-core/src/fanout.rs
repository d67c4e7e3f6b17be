//! Secondary-store fan-out contracts.
//!
//! The primary write is authoritative; secondary backends receive the same
//! logical record best-effort. Every fan-out call reports an explicit
//! [`BackendAttempt`] instead of logging and continuing, so callers and
//! tests can assert on outcomes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Error, Result, snapshot::CaseSnapshot};

// ─── Backends ────────────────────────────────────────────────────────────────

/// A configured secondary backend.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
  /// Document-oriented store holding the nested case snapshot.
  DocumentStore,
  /// Managed search index holding a flattened, searchable rendition.
  SearchIndex,
}

impl Backend {
  pub fn as_str(&self) -> &'static str {
    match self {
      Backend::DocumentStore => "document_store",
      Backend::SearchIndex => "search_index",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "document_store" => Ok(Backend::DocumentStore),
      "search_index" => Ok(Backend::SearchIndex),
      other => Err(Error::UnknownBackend(other.to_owned())),
    }
  }
}

impl std::fmt::Display for Backend {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Attempt outcome ─────────────────────────────────────────────────────────

/// Outcome of one secondary-store write. A disabled backend is recorded
/// with `attempted = false`; a failed one carries the error message but is
/// never surfaced to the ingest caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendAttempt {
  pub backend:   Backend,
  pub attempted: bool,
  pub succeeded: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error:     Option<String>,
}

impl BackendAttempt {
  pub fn skipped(backend: Backend) -> Self {
    Self { backend, attempted: false, succeeded: false, error: None }
  }

  pub fn success(backend: Backend) -> Self {
    Self { backend, attempted: true, succeeded: true, error: None }
  }

  pub fn failure(backend: Backend, error: impl Into<String>) -> Self {
    Self {
      backend,
      attempted: true,
      succeeded: false,
      error: Some(error.into()),
    }
  }
}

// ─── Backend errors ──────────────────────────────────────────────────────────

/// Failure of a single secondary-store write. Transient by definition:
/// these are recorded and retried, never propagated to ingest callers.
#[derive(Debug, Error)]
pub enum BackendError {
  #[error("write timed out after {0:?}")]
  Timeout(Duration),

  #[error("backend rejected write: {0}")]
  Rejected(String),

  #[error("transport error: {0}")]
  Transport(String),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A secondary store that accepts denormalized case snapshots.
///
/// Implementations must write the snapshot keyed by `snapshot.case_id`,
/// preserving every canonical identifier it carries. Boxed (`async_trait`)
/// so the fan-out layer can hold a heterogeneous backend registry behind
/// `Arc<dyn SecondaryStore>`.
#[async_trait]
pub trait SecondaryStore: Send + Sync {
  fn backend(&self) -> Backend;

  async fn write_case(
    &self,
    snapshot: &CaseSnapshot,
  ) -> Result<(), BackendError>;
}
