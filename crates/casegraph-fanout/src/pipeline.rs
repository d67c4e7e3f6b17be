//! [`IngestPipeline`] — primary write followed by secondary fan-out.

use std::sync::Arc;

use casegraph_core::{
  bundle::{CanonicalIds, CaseBundle},
  fanout::BackendAttempt,
  store::CaseStore,
};

use crate::coordinator::FanoutCoordinator;

/// Result of one ingest call: the canonical identifiers from the primary
/// store plus the per-backend fan-out outcomes.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
  pub ids:      CanonicalIds,
  pub attempts: Vec<BackendAttempt>,
}

impl IngestOutcome {
  pub fn secondary_successes(&self) -> usize {
    self.attempts.iter().filter(|a| a.succeeded).count()
  }
}

/// Drives a classification payload through the primary store and the
/// fan-out coordinator.
///
/// Primary-store errors propagate to the caller; secondary failures never
/// do — they surface only through [`IngestOutcome::attempts`].
pub struct IngestPipeline<S> {
  store:       Arc<S>,
  coordinator: FanoutCoordinator<S>,
}

impl<S: CaseStore> IngestPipeline<S> {
  pub fn new(store: Arc<S>, coordinator: FanoutCoordinator<S>) -> Self {
    Self { store, coordinator }
  }

  /// Ingest one bundle. When `run_id` is supplied the bundle is stamped
  /// with it and the run counters are updated; counter failures are
  /// logged, never fatal.
  pub async fn ingest(
    &self,
    mut bundle: CaseBundle,
    run_id: Option<&str>,
  ) -> Result<IngestOutcome, S::Error> {
    if let Some(run_id) = run_id {
      bundle.ingestion_run_id = Some(run_id.to_owned());
    }

    let ids = self.store.persist_bundle(bundle.clone()).await?;
    let attempts = self.coordinator.propagate(&bundle, &ids).await;
    let outcome = IngestOutcome { ids, attempts };

    if let Some(run_id) = run_id {
      if let Err(error) = self
        .store
        .run_record_case(
          run_id,
          &outcome.ids,
          outcome.secondary_successes(),
        )
        .await
      {
        tracing::warn!(run_id, %error, "failed to update run counters");
      }
    }

    tracing::info!(
      case_id = %outcome.ids.case_id,
      entities = outcome.ids.entity_ids.len(),
      indicators = outcome.ids.indicator_ids.len(),
      secondary_ok = outcome.secondary_successes(),
      "ingested case bundle"
    );
    Ok(outcome)
  }
}

#[cfg(test)]
mod tests {
  use casegraph_core::fanout::Backend;
  use casegraph_store_sqlite::SqliteStore;

  use super::*;
  use crate::{
    coordinator::FanoutConfig,
    testutil::{MockBackend, simple_bundle},
  };

  #[tokio::test]
  async fn primary_error_propagates_before_fanout() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let coordinator =
      FanoutCoordinator::new(store.clone(), FanoutConfig::default());
    let pipeline = IngestPipeline::new(store.clone(), coordinator);

    let mut bundle = simple_bundle("c1");
    bundle.case.text = None;

    assert!(pipeline.ingest(bundle, None).await.is_err());
    assert!(store.retry_fetch_ready(10).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn secondary_failure_does_not_fail_ingest() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let coordinator = FanoutCoordinator::new(
      store.clone(),
      FanoutConfig {
        retry_delay: std::time::Duration::ZERO,
        ..FanoutConfig::default()
      },
    )
    .with_backend(
      Arc::new(MockBackend::new(Backend::DocumentStore, true)),
      true,
    );
    let pipeline = IngestPipeline::new(store.clone(), coordinator);

    let outcome = pipeline.ingest(simple_bundle("c1"), None).await.unwrap();
    assert_eq!(outcome.ids.case_id, "c1");
    assert_eq!(outcome.secondary_successes(), 0);
    assert_eq!(store.retry_fetch_ready(10).await.unwrap().len(), 1);
  }
}
