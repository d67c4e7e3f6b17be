//! Handler for `POST /search`.
//!
//! The request body is the full [`HybridSearchQuery`] contract; the
//! response carries merged results plus merge diagnostics.

use axum::{Json, extract::State};
use casegraph_core::query::{HybridSearchQuery, HybridSearchResponse};
use casegraph_search::SemanticIndex;

use crate::{ApiState, error::ApiError};

pub async fn handler<V>(
  State(state): State<ApiState<V>>,
  Json(query): Json<HybridSearchQuery>,
) -> Result<Json<HybridSearchResponse>, ApiError>
where
  V: SemanticIndex,
{
  let response = state.search.search(&query).await?;
  Ok(Json(response))
}
