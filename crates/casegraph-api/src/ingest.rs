//! Handler for `POST /cases`.

use axum::{Json, extract::State};
use casegraph_core::{
  bundle::{CanonicalIds, CaseBundle},
  fanout::BackendAttempt,
};
use casegraph_search::SemanticIndex;
use serde::Serialize;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
  pub ids:      CanonicalIds,
  pub attempts: Vec<BackendAttempt>,
}

/// `POST /cases` — persist a classification bundle and fan it out.
///
/// Secondary-store failures are reported in `attempts`, never as an HTTP
/// error; only primary-store failures fail the request.
pub async fn create<V>(
  State(state): State<ApiState<V>>,
  Json(bundle): Json<CaseBundle>,
) -> Result<Json<IngestResponse>, ApiError>
where
  V: SemanticIndex,
{
  let text = bundle.case.text.clone();
  let outcome = state.pipeline.ingest(bundle, None).await?;

  if let Some(text) = text.filter(|t| !t.is_empty()) {
    if let Err(error) =
      state.index.index_case(&outcome.ids.case_id, &text).await
    {
      tracing::warn!(
        case_id = %outcome.ids.case_id,
        %error,
        "failed to index case text"
      );
    }
  }

  Ok(Json(IngestResponse {
    ids:      outcome.ids,
    attempts: outcome.attempts,
  }))
}
