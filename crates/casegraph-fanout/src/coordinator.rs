//! [`FanoutCoordinator`] — best-effort propagation to secondary stores.

use std::{sync::Arc, time::Duration};

use casegraph_core::{
  bundle::{CanonicalIds, CaseBundle},
  fanout::{BackendAttempt, BackendError, SecondaryStore},
  store::CaseStore,
};
use chrono::Utc;

use crate::snapshot::{RetryContext, RetryEnvelope, build_snapshot};

/// Tunables for the fan-out pass.
#[derive(Debug, Clone)]
pub struct FanoutConfig {
  /// Per-backend write deadline; exceeding it counts as a failure.
  pub write_timeout: Duration,
  /// Delay before a failed write becomes eligible for replay.
  pub retry_delay:   Duration,
  /// Retry budget. Zero or negative disables queueing entirely.
  pub max_retries:   i64,
}

impl Default for FanoutConfig {
  fn default() -> Self {
    Self {
      write_timeout: Duration::from_secs(30),
      retry_delay:   Duration::from_secs(300),
      max_retries:   5,
    }
  }
}

struct BackendSlot {
  enabled: bool,
  store:   Arc<dyn SecondaryStore>,
}

/// Propagates a just-persisted bundle to every registered backend.
///
/// The primary write has already committed when this runs, so backend
/// failures never surface to the ingest caller: they are recorded in the
/// returned [`BackendAttempt`]s and queued for replay.
pub struct FanoutCoordinator<S> {
  retry_store: Arc<S>,
  backends:    Vec<BackendSlot>,
  config:      FanoutConfig,
}

impl<S: CaseStore> FanoutCoordinator<S> {
  pub fn new(retry_store: Arc<S>, config: FanoutConfig) -> Self {
    Self { retry_store, backends: Vec::new(), config }
  }

  /// Register a backend. Disabled backends are reported with
  /// `attempted = false` on every propagate call.
  pub fn with_backend(
    mut self,
    store: Arc<dyn SecondaryStore>,
    enabled: bool,
  ) -> Self {
    self.backends.push(BackendSlot { enabled, store });
    self
  }

  /// Attempt every registered backend and report per-backend outcomes.
  /// Failed attempts are handed to the retry queue before returning.
  pub async fn propagate(
    &self,
    bundle: &CaseBundle,
    ids: &CanonicalIds,
  ) -> Vec<BackendAttempt> {
    let snapshot = build_snapshot(bundle, ids, Utc::now());
    let mut attempts = Vec::with_capacity(self.backends.len());

    for slot in &self.backends {
      let backend = slot.store.backend();
      if !slot.enabled {
        attempts.push(BackendAttempt::skipped(backend));
        continue;
      }

      let outcome = tokio::time::timeout(
        self.config.write_timeout,
        slot.store.write_case(&snapshot),
      )
      .await;

      let attempt = match outcome {
        Ok(Ok(())) => BackendAttempt::success(backend),
        Ok(Err(error)) => BackendAttempt::failure(backend, error.to_string()),
        Err(_) => BackendAttempt::failure(
          backend,
          BackendError::Timeout(self.config.write_timeout).to_string(),
        ),
      };

      if attempt.attempted && !attempt.succeeded {
        self
          .enqueue_retry(&snapshot.case_id, &snapshot, &attempt)
          .await;
      }
      attempts.push(attempt);
    }
    attempts
  }

  async fn enqueue_retry(
    &self,
    case_id: &str,
    snapshot: &casegraph_core::snapshot::CaseSnapshot,
    attempt: &BackendAttempt,
  ) {
    if self.config.max_retries <= 0 {
      tracing::info!(
        backend = %attempt.backend,
        case_id,
        max_retries = self.config.max_retries,
        "skipping retry enqueue"
      );
      return;
    }

    let envelope = RetryEnvelope {
      record:  snapshot.clone(),
      context: RetryContext { error: attempt.error.clone() },
    };
    let payload = match serde_json::to_value(&envelope) {
      Ok(payload) => payload,
      Err(error) => {
        tracing::error!(
          backend = %attempt.backend,
          case_id,
          %error,
          "failed to serialize retry payload"
        );
        return;
      }
    };

    match self
      .retry_store
      .retry_enqueue(
        case_id,
        attempt.backend,
        payload,
        self.config.retry_delay,
      )
      .await
    {
      Ok(_) => {
        tracing::warn!(
          backend = %attempt.backend,
          case_id,
          error = attempt.error.as_deref().unwrap_or("unknown"),
          "scheduled secondary-store retry"
        );
      }
      Err(error) => {
        // The write is lost if this happens; make it loud.
        tracing::error!(
          backend = %attempt.backend,
          case_id,
          %error,
          "failed to enqueue secondary-store retry"
        );
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use casegraph_core::fanout::Backend;
  use casegraph_store_sqlite::SqliteStore;

  use super::*;
  use crate::testutil::{MockBackend, simple_bundle};

  async fn seeded_store() -> (Arc<SqliteStore>, CanonicalIds, CaseBundle) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let bundle = simple_bundle("c1");
    let ids = store.persist_bundle(bundle.clone()).await.unwrap();
    (store, ids, bundle)
  }

  #[tokio::test]
  async fn success_records_attempt_and_skips_queue() {
    let (store, ids, bundle) = seeded_store().await;
    let coordinator =
      FanoutCoordinator::new(store.clone(), FanoutConfig::default())
        .with_backend(
          Arc::new(MockBackend::new(Backend::DocumentStore, false)),
          true,
        );

    let attempts = coordinator.propagate(&bundle, &ids).await;
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].attempted);
    assert!(attempts[0].succeeded);
    assert!(store.retry_fetch_ready(10).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn failure_is_swallowed_and_queued() {
    let (store, ids, bundle) = seeded_store().await;
    let config = FanoutConfig {
      retry_delay: Duration::ZERO,
      ..FanoutConfig::default()
    };
    let coordinator = FanoutCoordinator::new(store.clone(), config)
      .with_backend(
        Arc::new(MockBackend::new(Backend::DocumentStore, true)),
        true,
      )
      .with_backend(
        Arc::new(MockBackend::new(Backend::SearchIndex, false)),
        true,
      );

    let attempts = coordinator.propagate(&bundle, &ids).await;
    assert!(!attempts[0].succeeded);
    assert!(attempts[0].error.as_deref().unwrap().contains("refused"));
    assert!(attempts[1].succeeded);

    let ready = store.retry_fetch_ready(10).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].backend, Backend::DocumentStore);
    assert_eq!(ready[0].case_id, "c1");
  }

  #[tokio::test]
  async fn disabled_backend_is_not_attempted() {
    let (store, ids, bundle) = seeded_store().await;
    let coordinator =
      FanoutCoordinator::new(store.clone(), FanoutConfig::default())
        .with_backend(
          Arc::new(MockBackend::new(Backend::SearchIndex, true)),
          false,
        );

    let attempts = coordinator.propagate(&bundle, &ids).await;
    assert!(!attempts[0].attempted);
    assert!(!attempts[0].succeeded);
    assert!(store.retry_fetch_ready(10).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn zero_retry_budget_skips_queue() {
    let (store, ids, bundle) = seeded_store().await;
    let config = FanoutConfig { max_retries: 0, ..FanoutConfig::default() };
    let coordinator = FanoutCoordinator::new(store.clone(), config)
      .with_backend(
        Arc::new(MockBackend::new(Backend::DocumentStore, true)),
        true,
      );

    let attempts = coordinator.propagate(&bundle, &ids).await;
    assert!(!attempts[0].succeeded);
    assert!(store.retry_fetch_ready(10).await.unwrap().is_empty());
  }
}
