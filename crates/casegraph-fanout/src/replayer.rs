//! [`RetryReplayer`] — out-of-band replay of queued secondary writes.
//!
//! Runs as a scheduled batch job. Each invocation drains a bounded batch
//! of ready queue entries: successful replays delete their entry, failures
//! are rescheduled with a delay, and entries that exhaust the retry budget
//! are dropped loudly so operators can follow up.

use std::{collections::HashMap, sync::Arc, time::Duration};

use casegraph_core::{
  fanout::{Backend, SecondaryStore},
  store::{CaseStore, RetryItem},
};

use crate::snapshot::RetryEnvelope;

/// Tunables for one replay batch.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
  /// Maximum queue entries processed per invocation.
  pub batch_limit:   usize,
  /// Per-write deadline during replay.
  pub write_timeout: Duration,
  /// Delay applied when rescheduling a failed replay.
  pub retry_delay:   Duration,
  /// Attempt budget; reaching it drops the entry.
  pub max_retries:   i64,
}

impl Default for ReplayConfig {
  fn default() -> Self {
    Self {
      batch_limit:   25,
      write_timeout: Duration::from_secs(30),
      retry_delay:   Duration::from_secs(300),
      max_retries:   5,
    }
  }
}

/// Outcome counts for one replay batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
  pub replayed:    usize,
  pub rescheduled: usize,
  pub dropped:     usize,
  /// Entries deleted because their payload was irrecoverably malformed.
  /// These never consume a retry attempt.
  pub malformed:   usize,
}

pub struct RetryReplayer<S> {
  store:    Arc<S>,
  backends: HashMap<Backend, Arc<dyn SecondaryStore>>,
  config:   ReplayConfig,
}

impl<S: CaseStore> RetryReplayer<S> {
  pub fn new(store: Arc<S>, config: ReplayConfig) -> Self {
    Self { store, backends: HashMap::new(), config }
  }

  pub fn with_backend(mut self, backend: Arc<dyn SecondaryStore>) -> Self {
    self.backends.insert(backend.backend(), backend);
    self
  }

  /// Process one bounded batch of ready entries.
  pub async fn run_once(&self) -> Result<ReplayStats, S::Error> {
    let ready = self.store.retry_fetch_ready(self.config.batch_limit).await?;
    let mut stats = ReplayStats::default();
    if ready.is_empty() {
      return Ok(stats);
    }

    tracing::info!(count = ready.len(), "processing retry queue batch");
    for item in ready {
      self.process_item(item, &mut stats).await?;
    }

    tracing::info!(
      replayed = stats.replayed,
      rescheduled = stats.rescheduled,
      dropped = stats.dropped,
      malformed = stats.malformed,
      "retry batch complete"
    );
    Ok(stats)
  }

  async fn process_item(
    &self,
    item: RetryItem,
    stats: &mut ReplayStats,
  ) -> Result<(), S::Error> {
    let envelope = match decode_envelope(&item) {
      Ok(envelope) => envelope,
      Err(reason) => {
        // Permanent failure: drop immediately without consuming a slot.
        self.store.retry_delete(&item.retry_id).await?;
        stats.malformed += 1;
        tracing::error!(
          retry_id = %item.retry_id,
          backend = %item.backend,
          case_id = %item.case_id,
          reason,
          "dropping malformed retry payload"
        );
        return Ok(());
      }
    };

    let Some(backend) = self.backends.get(&item.backend) else {
      self.store.retry_delete(&item.retry_id).await?;
      stats.malformed += 1;
      tracing::error!(
        retry_id = %item.retry_id,
        backend = %item.backend,
        "dropping retry for unregistered backend"
      );
      return Ok(());
    };

    let outcome = tokio::time::timeout(
      self.config.write_timeout,
      backend.write_case(&envelope.record),
    )
    .await;

    match outcome {
      Ok(Ok(())) => {
        self.store.retry_delete(&item.retry_id).await?;
        stats.replayed += 1;
        tracing::info!(
          backend = %item.backend,
          case_id = %item.case_id,
          "replayed secondary-store write"
        );
      }
      Ok(Err(error)) => {
        self.handle_failure(&item, &error.to_string(), stats).await?;
      }
      Err(_) => {
        let message = format!(
          "replay timed out after {:?}",
          self.config.write_timeout
        );
        self.handle_failure(&item, &message, stats).await?;
      }
    }
    Ok(())
  }

  async fn handle_failure(
    &self,
    item: &RetryItem,
    error: &str,
    stats: &mut ReplayStats,
  ) -> Result<(), S::Error> {
    tracing::warn!(
      retry_id = %item.retry_id,
      backend = %item.backend,
      case_id = %item.case_id,
      error,
      "backend replay failed"
    );

    if self.config.max_retries <= 0 {
      self.store.retry_delete(&item.retry_id).await?;
      stats.dropped += 1;
      tracing::error!(
        backend = %item.backend,
        case_id = %item.case_id,
        max_retries = self.config.max_retries,
        "dropping retry"
      );
      return Ok(());
    }

    match self
      .store
      .retry_schedule(&item.retry_id, self.config.retry_delay)
      .await?
    {
      None => {
        tracing::warn!(
          retry_id = %item.retry_id,
          "retry entry disappeared while rescheduling"
        );
      }
      Some(attempts) if attempts >= self.config.max_retries => {
        // The write is permanently lost; this must be visible to
        // operators, not silently absorbed.
        self.store.retry_delete(&item.retry_id).await?;
        stats.dropped += 1;
        tracing::error!(
          backend = %item.backend,
          case_id = %item.case_id,
          attempts,
          "dropping retry after exhausting attempts"
        );
      }
      Some(attempts) => {
        stats.rescheduled += 1;
        tracing::info!(
          backend = %item.backend,
          case_id = %item.case_id,
          attempts,
          max_retries = self.config.max_retries,
          "rescheduled retry"
        );
      }
    }
    Ok(())
  }
}

fn decode_envelope(item: &RetryItem) -> Result<RetryEnvelope, &'static str> {
  let envelope: RetryEnvelope =
    serde_json::from_value(item.payload.clone())
      .map_err(|_| "payload is not a retry envelope")?;
  if envelope.record.case_id.is_empty() {
    return Err("payload record is missing case_id");
  }
  if envelope.record.dataset.is_empty() {
    return Err("payload record is missing dataset");
  }
  Ok(envelope)
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use casegraph_store_sqlite::SqliteStore;
  use serde_json::json;

  use super::*;
  use crate::{
    coordinator::{FanoutConfig, FanoutCoordinator},
    testutil::{MockBackend, simple_bundle},
  };

  async fn queue_failed_write(
    store: &Arc<SqliteStore>,
  ) -> Arc<MockBackend> {
    let backend = Arc::new(MockBackend::new(Backend::DocumentStore, true));
    let coordinator = FanoutCoordinator::new(
      store.clone(),
      FanoutConfig { retry_delay: Duration::ZERO, ..FanoutConfig::default() },
    )
    .with_backend(backend.clone(), true);

    let bundle = simple_bundle("c1");
    let ids = store.persist_bundle(bundle.clone()).await.unwrap();
    coordinator.propagate(&bundle, &ids).await;
    backend
  }

  fn replayer(
    store: &Arc<SqliteStore>,
    backend: Arc<MockBackend>,
    max_retries: i64,
  ) -> RetryReplayer<SqliteStore> {
    RetryReplayer::new(
      store.clone(),
      ReplayConfig {
        retry_delay: Duration::ZERO,
        max_retries,
        ..ReplayConfig::default()
      },
    )
    .with_backend(backend)
  }

  #[tokio::test]
  async fn successful_replay_deletes_entry() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let backend = queue_failed_write(&store).await;

    // Backend recovers before the replay runs.
    backend.fail.store(false, Ordering::SeqCst);

    let stats = replayer(&store, backend, 5).run_once().await.unwrap();
    assert_eq!(stats.replayed, 1);
    assert_eq!(stats.dropped, 0);
    assert!(store.retry_fetch_ready(10).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn failed_replay_is_rescheduled() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let backend = queue_failed_write(&store).await;

    let stats = replayer(&store, backend, 5).run_once().await.unwrap();
    assert_eq!(stats.rescheduled, 1);

    let ready = store.retry_fetch_ready(10).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].attempt_count, 1);
  }

  #[tokio::test]
  async fn exhausted_budget_drops_entry() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let backend = queue_failed_write(&store).await;

    // max_retries = 1: the single failed replay exhausts the budget.
    let stats = replayer(&store, backend.clone(), 1).run_once().await.unwrap();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.rescheduled, 0);

    // No second attempt occurs.
    let stats = replayer(&store, backend, 1).run_once().await.unwrap();
    assert_eq!(stats, ReplayStats::default());
  }

  #[tokio::test]
  async fn malformed_payload_is_dropped_without_attempt() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    store
      .retry_enqueue(
        "c9",
        Backend::DocumentStore,
        json!({"not": "an envelope"}),
        Duration::ZERO,
      )
      .await
      .unwrap();

    let backend = Arc::new(MockBackend::new(Backend::DocumentStore, false));
    let stats = replayer(&store, backend, 5).run_once().await.unwrap();
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.replayed, 0);
    assert!(store.retry_fetch_ready(10).await.unwrap().is_empty());
  }
}
