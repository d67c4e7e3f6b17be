//! [`HybridSearchService`] — coordinates the structured and semantic
//! sides of a query and assembles the merged response.

use std::sync::Arc;

use async_trait::async_trait;
use casegraph_core::{
  meta::first_number,
  query::{
    HybridSearchQuery, HybridSearchResponse, SearchDiagnostics, SemanticHit,
    StructuredQuery, loss_in_buckets, parse_loss_buckets,
  },
  store::CaseStore,
};

use crate::{
  Error, Result,
  merge::{MergeWeights, merge_results},
};

const SCORE_STRATEGY: &str = "max_weighted";

/// The semantic side of hybrid search. Production deployments back this
/// with a vector index; [`crate::lexical::LexicalIndex`] is the
/// in-process fallback.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
  async fn query_similar(
    &self,
    text: &str,
    top_k: usize,
  ) -> Result<Vec<SemanticHit>>;

  /// Ingest-side hook: make the case text retrievable by later queries.
  /// Indexes populated externally (e.g. by the fan-out layer) ignore it.
  async fn index_case(&self, _case_id: &str, _text: &str) -> Result<()> {
    Ok(())
  }
}

/// Search-wide tunables.
#[derive(Debug, Clone)]
pub struct SearchConfig {
  pub default_limit: usize,
  pub weights:       MergeWeights,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self { default_limit: 25, weights: MergeWeights::default() }
  }
}

pub struct HybridSearchService<S, V> {
  store:  Arc<S>,
  index:  Arc<V>,
  config: SearchConfig,
}

impl<S, V> HybridSearchService<S, V>
where
  S: CaseStore,
  V: SemanticIndex,
{
  pub fn new(store: Arc<S>, index: Arc<V>, config: SearchConfig) -> Self {
    Self { store, index, config }
  }

  /// Execute a hybrid search request and return merged results.
  pub async fn search(
    &self,
    query: &HybridSearchQuery,
  ) -> Result<HybridSearchResponse> {
    let limit = query.limit.unwrap_or(self.config.default_limit).max(1);
    let vector_top_k = query.vector_limit.unwrap_or(limit);
    let structured_top_k = query.structured_limit.unwrap_or(limit);

    let semantic_hits = match query.text.as_deref().filter(|t| !t.is_empty())
    {
      Some(text) => self.index.query_similar(text, vector_top_k).await?,
      None => Vec::new(),
    };

    let structured_query = StructuredQuery {
      classifications: query.classifications.clone(),
      datasets:        query.datasets.clone(),
      case_ids:        query.case_ids.clone(),
      entities:        query.entities.clone(),
      limit:           structured_top_k,
    };
    let mut structured_hits = if structured_query.is_empty() {
      Vec::new()
    } else {
      self
        .store
        .filter_cases(&structured_query)
        .await
        .map_err(|e| Error::Store(Box::new(e)))?
    };

    let buckets = parse_loss_buckets(&query.loss_buckets);
    if !buckets.is_empty() {
      structured_hits.retain(|hit| {
        let loss = first_number(
          [&hit.metadata],
          &["loss_amount", "loss", "loss_usd"],
        );
        loss_in_buckets(loss, &buckets)
      });
    }

    let vector_count = semantic_hits.len();
    let structured_count = structured_hits.len();

    let output = merge_results(
      structured_hits,
      semantic_hits,
      &self.config.weights,
      query.time_range.as_ref(),
    );

    let total = output.merged_count;
    let results: Vec<_> = output
      .items
      .into_iter()
      .skip(query.offset)
      .take(limit)
      .collect();

    let diagnostics = SearchDiagnostics {
      strategy:              SCORE_STRATEGY.to_owned(),
      semantic_weight:       self.config.weights.semantic,
      structured_weight:     self.config.weights.structured,
      vector_hits:           vector_count,
      structured_hits:       structured_count,
      merged_results:        output.merged_count,
      deduped_overlap:       (vector_count + structured_count)
        .saturating_sub(output.merged_count),
      returned_results:      results.len(),
      dropped_by_time_range: output.dropped_by_time,
    };

    tracing::debug!(
      vector_hits = vector_count,
      structured_hits = structured_count,
      merged = output.merged_count,
      returned = results.len(),
      "hybrid search merged"
    );

    Ok(HybridSearchResponse {
      count: results.len(),
      offset: query.offset,
      limit,
      total,
      vector_hits: vector_count,
      structured_hits: structured_count,
      diagnostics,
      results,
    })
  }
}

#[cfg(test)]
mod tests {
  use casegraph_core::{
    bundle::{CaseBundle, CasePayload},
    meta::Metadata,
    query::{ResultSource, TimeRange},
    store::CaseStore as _,
  };
  use casegraph_store_sqlite::SqliteStore;
  use chrono::{TimeZone as _, Utc};

  use super::*;
  use crate::lexical::LexicalIndex;

  fn bundle(case_id: &str, classification: &str, text: &str) -> CaseBundle {
    CaseBundle {
      case:             CasePayload {
        dataset:         "d1".into(),
        source_type:     "intake".into(),
        classification:  classification.into(),
        confidence:      0.9,
        case_id:         Some(case_id.into()),
        text:            Some(text.into()),
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

  async fn seeded() -> HybridSearchService<SqliteStore, LexicalIndex> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let index = Arc::new(LexicalIndex::new());

    for (case_id, classification, text) in [
      ("c1", "investment_scam", "urgent wire transfer to offshore account"),
      ("c2", "romance_scam", "met on a dating app, asked for gift cards"),
      ("c3", "investment_scam", "crypto doubling scheme on telegram"),
    ] {
      store
        .persist_bundle(bundle(case_id, classification, text))
        .await
        .unwrap();
      index.upsert(case_id, text);
    }

    HybridSearchService::new(store, index, SearchConfig::default())
  }

  #[tokio::test]
  async fn text_only_query_hits_semantic_side() {
    let service = seeded().await;
    let response = service
      .search(&HybridSearchQuery {
        text: Some("wire transfer".into()),
        ..Default::default()
      })
      .await
      .unwrap();

    assert_eq!(response.structured_hits, 0);
    assert!(response.vector_hits >= 1);
    assert_eq!(response.results[0].case_id, "c1");
    assert_eq!(
      response.results[0].scores.winner,
      Some(ResultSource::Vector)
    );
  }

  #[tokio::test]
  async fn overlapping_sides_dedupe_into_one_result() {
    let service = seeded().await;
    let response = service
      .search(&HybridSearchQuery {
        text:            Some("wire transfer".into()),
        classifications: vec!["investment_scam".into()],
        ..Default::default()
      })
      .await
      .unwrap();

    let c1: Vec<_> =
      response.results.iter().filter(|r| r.case_id == "c1").collect();
    assert_eq!(c1.len(), 1);
    assert_eq!(c1[0].sources.len(), 2);
    assert!(response.diagnostics.deduped_overlap >= 1);
  }

  #[tokio::test]
  async fn structured_only_query_skips_index() {
    let service = seeded().await;
    let response = service
      .search(&HybridSearchQuery {
        classifications: vec!["romance_scam".into()],
        ..Default::default()
      })
      .await
      .unwrap();

    assert_eq!(response.vector_hits, 0);
    assert_eq!(response.count, 1);
    assert_eq!(response.results[0].case_id, "c2");
    assert_eq!(
      response.results[0].scores.winner,
      Some(ResultSource::Structured)
    );
  }

  #[tokio::test]
  async fn pagination_slices_after_merge() {
    let service = seeded().await;
    let all = service
      .search(&HybridSearchQuery {
        classifications: vec![
          "investment_scam".into(),
          "romance_scam".into(),
        ],
        ..Default::default()
      })
      .await
      .unwrap();
    assert_eq!(all.total, 3);

    let page = service
      .search(&HybridSearchQuery {
        classifications: vec![
          "investment_scam".into(),
          "romance_scam".into(),
        ],
        limit: Some(2),
        offset: 2,
        ..Default::default()
      })
      .await
      .unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.total, 3);
  }

  #[tokio::test]
  async fn time_range_excludes_out_of_window_records() {
    let service = seeded().await;

    // Seeded rows were created just now; a window in the past excludes
    // every structured hit.
    let response = service
      .search(&HybridSearchQuery {
        classifications: vec!["investment_scam".into()],
        time_range: Some(TimeRange {
          start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
          end:   Utc.with_ymd_and_hms(2020, 12, 31, 0, 0, 0).unwrap(),
        }),
        ..Default::default()
      })
      .await
      .unwrap();

    assert_eq!(response.count, 0);
    assert_eq!(response.diagnostics.dropped_by_time_range, 2);
  }
}
