//! Shared fixtures for the fan-out test suites.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use casegraph_core::{
  bundle::{CaseBundle, CasePayload},
  fanout::{Backend, BackendError, SecondaryStore},
  meta::Metadata,
  snapshot::CaseSnapshot,
};

pub(crate) fn simple_bundle(case_id: &str) -> CaseBundle {
  CaseBundle {
    case:             CasePayload {
      dataset:         "d1".into(),
      source_type:     "intake".into(),
      classification:  "investment_scam".into(),
      confidence:      0.9,
      case_id:         Some(case_id.into()),
      text:            Some(format!("report for {case_id}")),
      raw_text_sha256: None,
      detected_at:     None,
      reported_at:     None,
      status:          "open".into(),
      metadata:        Metadata::new(),
      is_deleted:      false,
      deleted_at:      None,
    },
    documents:        vec![],
    entities:         vec![],
    indicators:       vec![],
    ingestion_run_id: None,
  }
}

/// Secondary store whose failure mode can be flipped at runtime.
pub(crate) struct MockBackend {
  pub backend: Backend,
  pub fail:    AtomicBool,
}

impl MockBackend {
  pub fn new(backend: Backend, fail: bool) -> Self {
    Self { backend, fail: AtomicBool::new(fail) }
  }
}

#[async_trait]
impl SecondaryStore for MockBackend {
  fn backend(&self) -> Backend { self.backend }

  async fn write_case(
    &self,
    _snapshot: &CaseSnapshot,
  ) -> Result<(), BackendError> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(BackendError::Transport("connection refused".into()));
    }
    Ok(())
  }
}
