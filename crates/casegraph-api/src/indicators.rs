//! Handler for `GET /indicators/search`.
//!
//! Query params map directly to [`IndicatorQuery`] fields. `datasets` and
//! `loss_buckets` are accepted as comma-separated strings.

use axum::{
  Json,
  extract::{Query, State},
};
use casegraph_core::{
  query::{CaseMatch, IndicatorQuery, MatchMode, default_indicator_limit},
  store::CaseStore as _,
};
use casegraph_search::SemanticIndex;
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct IndicatorParams {
  /// Indicator type, e.g. `bank_account` or `crypto_wallet`.
  #[serde(rename = "type")]
  pub indicator_type: String,
  pub value:          String,
  pub match_mode:     Option<String>,
  /// Comma-separated dataset allow-list.
  pub datasets:       Option<String>,
  /// Comma-separated bucket tokens, e.g. `<10k,10k-50k`.
  pub loss_buckets:   Option<String>,
  pub limit:          Option<usize>,
}

fn split_csv(value: Option<String>) -> Vec<String> {
  value
    .map(|s| {
      s.split(',')
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect()
    })
    .unwrap_or_default()
}

/// `GET /indicators/search?type=...&value=...[&match_mode=...][&datasets=...]`
pub async fn handler<V>(
  State(state): State<ApiState<V>>,
  Query(params): Query<IndicatorParams>,
) -> Result<Json<Vec<CaseMatch>>, ApiError>
where
  V: SemanticIndex,
{
  let match_mode = match params.match_mode.as_deref() {
    Some(raw) => MatchMode::parse(raw)
      .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    None => MatchMode::Exact,
  };

  let query = IndicatorQuery {
    indicator_type: params.indicator_type,
    value:          params.value,
    match_mode,
    datasets:       split_csv(params.datasets),
    loss_buckets:   split_csv(params.loss_buckets),
    limit:          params.limit.unwrap_or_else(default_indicator_limit),
  };

  let matches = state.store.search_by_indicator(&query).await?;
  Ok(Json(matches))
}

#[cfg(test)]
mod tests {
  use super::split_csv;

  #[test]
  fn csv_params_are_trimmed_and_filtered() {
    assert_eq!(
      split_csv(Some("d1, d2 ,,".into())),
      vec!["d1".to_owned(), "d2".to_owned()]
    );
    assert!(split_csv(None).is_empty());
  }
}
