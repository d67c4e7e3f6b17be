//! The `CaseStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g.
//! `casegraph-store-sqlite`). Higher layers (fan-out, search, API) depend
//! on this abstraction, not on any concrete backend.

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  bundle::{CanonicalIds, CaseBundle},
  fanout::Backend,
  query::{CaseHit, CaseMatch, IndicatorQuery, StructuredQuery},
};

// ─── Retry queue ─────────────────────────────────────────────────────────────

/// A queued retry record for a failed secondary-store write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryItem {
  pub retry_id:        String,
  pub case_id:         String,
  pub backend:         Backend,
  /// Snapshot of the payload at enqueue time; a deep copy, so later
  /// caller-side mutation cannot corrupt a queued retry.
  pub payload:         serde_json::Value,
  pub attempt_count:   i64,
  pub next_attempt_at: DateTime<Utc>,
}

// ─── Ingestion runs ──────────────────────────────────────────────────────────

/// Lifecycle state of a batch ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  Running,
  Succeeded,
  /// Completed with at least one per-case failure.
  Partial,
  Failed,
}

impl RunStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunStatus::Running => "running",
      RunStatus::Succeeded => "succeeded",
      RunStatus::Partial => "partial",
      RunStatus::Failed => "failed",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "running" => Ok(RunStatus::Running),
      "succeeded" => Ok(RunStatus::Succeeded),
      "partial" => Ok(RunStatus::Partial),
      "failed" => Ok(RunStatus::Failed),
      other => Err(Error::UnknownRunStatus(other.to_owned())),
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the primary evidence store.
///
/// `persist_bundle` is the only write path into the case graph; it is
/// transactional and idempotent. The retry-queue methods back the fan-out
/// layer. Retrieval methods are read-only and safe under unlimited
/// concurrency.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CaseStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Case graph ────────────────────────────────────────────────────────

  /// Persist a bundle transactionally and return the canonical
  /// identifiers. Calling twice with an identical bundle yields the same
  /// identifiers and no duplicate child rows.
  fn persist_bundle(
    &self,
    bundle: CaseBundle,
  ) -> impl Future<Output = Result<CanonicalIds, Self::Error>> + Send + '_;

  // ── Retrieval ─────────────────────────────────────────────────────────

  /// Case lookup by structured filters; feeds the structured side of
  /// hybrid search.
  fn filter_cases<'a>(
    &'a self,
    query: &'a StructuredQuery,
  ) -> impl Future<Output = Result<Vec<CaseHit>, Self::Error>> + Send + 'a;

  /// Indicator-centric case lookup with fuzzy match modes and
  /// loss-bucket filters.
  fn search_by_indicator<'a>(
    &'a self,
    query: &'a IndicatorQuery,
  ) -> impl Future<Output = Result<Vec<CaseMatch>, Self::Error>> + Send + 'a;

  // ── Retry queue ───────────────────────────────────────────────────────

  /// Insert or update the retry entry for `(case_id, backend)`. An
  /// existing entry's payload and schedule are overwritten so at most one
  /// live item exists per pair.
  fn retry_enqueue<'a>(
    &'a self,
    case_id: &'a str,
    backend: Backend,
    payload: serde_json::Value,
    delay: Duration,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  /// Entries whose `next_attempt_at` has elapsed, oldest first.
  fn retry_fetch_ready(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<RetryItem>, Self::Error>> + Send + '_;

  /// Remove an entry after successful processing (or a permanent drop).
  fn retry_delete<'a>(
    &'a self,
    retry_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Increment the attempt count and push `next_attempt_at` into the
  /// future. Returns the new attempt count, or `None` when the entry
  /// disappeared.
  fn retry_schedule<'a>(
    &'a self,
    retry_id: &'a str,
    delay: Duration,
  ) -> impl Future<Output = Result<Option<i64>, Self::Error>> + Send + 'a;

  // ── Ingestion runs ────────────────────────────────────────────────────

  /// Open a run row and return its identifier.
  fn run_start<'a>(
    &'a self,
    dataset: &'a str,
    source_bundle: &'a str,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  /// Accumulate per-case counters onto a run.
  fn run_record_case<'a>(
    &'a self,
    run_id: &'a str,
    ids: &'a CanonicalIds,
    secondary_writes: usize,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Close a run with a final status.
  fn run_complete<'a>(
    &'a self,
    run_id: &'a str,
    status: RunStatus,
    last_error: Option<String>,
    retry_increment: usize,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
