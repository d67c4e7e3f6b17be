//! Score normalization and the hybrid merge itself.

use std::collections::BTreeMap;

use casegraph_core::{
  meta::{Metadata, MetaValue},
  query::{
    CaseHit, HybridSearchItem, ResultSource, ScoreBreakdown, SemanticHit,
    TimeRange,
  },
};
use chrono::{DateTime, Utc};

/// Two-sided ties resolve to structured within this tolerance.
const TIE_EPSILON: f64 = 1e-9;

/// Relative weights applied to each side's normalized score.
#[derive(Debug, Clone, Copy)]
pub struct MergeWeights {
  pub semantic:   f64,
  pub structured: f64,
}

impl Default for MergeWeights {
  fn default() -> Self { Self { semantic: 0.6, structured: 0.4 } }
}

// ─── Score normalization ─────────────────────────────────────────────────────

/// Structured score for a case record: confidence, metadata `score`
/// fallback, and 1.0 when the record is present without either.
pub fn structured_score(record: &CaseHit) -> f64 {
  record
    .confidence
    .or_else(|| record.metadata.get("score").and_then(MetaValue::as_number))
    .unwrap_or(1.0)
}

/// Semantic score for an index hit: a provided similarity in [0, 1] wins;
/// otherwise similarity is derived as `1 / (1 + distance)`. Non-positive
/// distances carry no signal and yield no score.
pub fn semantic_score(hit: &SemanticHit) -> Option<f64> {
  if let Some(similarity) = hit.similarity {
    return Some(similarity);
  }
  let distance = hit.distance?;
  if distance <= 0.0 {
    return None;
  }
  Some(1.0 / (1.0 + distance))
}

/// Combine weighted contributions. The winner is the larger weighted
/// value; a genuine tie goes to structured; a side that produced no score
/// simply does not compete.
pub fn combine_scores(
  semantic: Option<f64>,
  structured: Option<f64>,
  weights: &MergeWeights,
) -> (Option<f64>, ScoreBreakdown) {
  let mut breakdown = ScoreBreakdown::default();

  let semantic_weighted = semantic
    .filter(|_| weights.semantic > 0.0)
    .map(|score| {
      breakdown.semantic = Some(score);
      score * weights.semantic
    });
  breakdown.semantic_weighted = semantic_weighted;

  let structured_weighted = structured
    .filter(|_| weights.structured > 0.0)
    .map(|score| {
      breakdown.structured = Some(score);
      score * weights.structured
    });
  breakdown.structured_weighted = structured_weighted;

  let (winner, merged) = match (semantic_weighted, structured_weighted) {
    (None, None) => (None, None),
    (Some(sem), None) => (Some(ResultSource::Vector), Some(sem)),
    (None, Some(st)) => (Some(ResultSource::Structured), Some(st)),
    (Some(sem), Some(st)) => {
      if sem > st + TIE_EPSILON {
        (Some(ResultSource::Vector), Some(sem))
      } else {
        (Some(ResultSource::Structured), Some(st))
      }
    }
  };

  breakdown.winner = winner;
  (merged, breakdown)
}

// ─── Merge ───────────────────────────────────────────────────────────────────

/// Result of merging both sides, before pagination.
pub struct MergeOutput {
  /// Sorted descending by merged score; unscored items last.
  pub items:           Vec<HybridSearchItem>,
  pub merged_count:    usize,
  pub dropped_by_time: usize,
}

/// Merge both result sets keyed by case_id, score each case, apply the
/// time filter, and sort.
pub fn merge_results(
  structured: Vec<CaseHit>,
  semantic: Vec<SemanticHit>,
  weights: &MergeWeights,
  time_range: Option<&TimeRange>,
) -> MergeOutput {
  struct Entry {
    record: Option<CaseHit>,
    vector: Option<SemanticHit>,
  }

  // BTreeMap keeps merge order deterministic for equal-score items.
  let mut merged: BTreeMap<String, Entry> = BTreeMap::new();
  for hit in semantic {
    let key = hit.case_id.clone();
    merged
      .entry(key)
      .or_insert(Entry { record: None, vector: None })
      .vector = Some(hit);
  }
  for record in structured {
    let key = record.case_id.clone();
    merged
      .entry(key)
      .or_insert(Entry { record: None, vector: None })
      .record = Some(record);
  }
  let merged_count = merged.len();

  let mut items: Vec<HybridSearchItem> = merged
    .into_iter()
    .map(|(case_id, entry)| {
      let semantic = entry.vector.as_ref().and_then(semantic_score);
      let structured = entry.record.as_ref().map(structured_score);
      let (merged_score, scores) =
        combine_scores(semantic, structured, weights);

      let mut sources = Vec::new();
      if entry.record.is_some() {
        sources.push(ResultSource::Structured);
      }
      if entry.vector.is_some() {
        sources.push(ResultSource::Vector);
      }

      HybridSearchItem {
        case_id,
        sources,
        merged_score,
        scores,
        record: entry.record,
        vector: entry.vector,
      }
    })
    .collect();

  let mut dropped_by_time = 0;
  if let Some(range) = time_range {
    items.retain(|item| {
      // Items with no known timestamp are always kept.
      let keep = match item_timestamp(item) {
        Some(ts) => range.contains(ts),
        None => true,
      };
      if !keep {
        dropped_by_time += 1;
      }
      keep
    });
  }

  items.sort_by(|a, b| {
    let key =
      |item: &HybridSearchItem| {
        (item.merged_score.is_some(), item.merged_score.unwrap_or(0.0))
      };
    key(b)
      .partial_cmp(&key(a))
      .unwrap_or(std::cmp::Ordering::Equal)
  });

  MergeOutput { items, merged_count, dropped_by_time }
}

/// Best-known timestamp for a merged item: the record's `created_at`,
/// else a `created_at`/`ingested_at` value from either side's metadata.
fn item_timestamp(item: &HybridSearchItem) -> Option<DateTime<Utc>> {
  if let Some(record) = &item.record {
    return Some(record.created_at);
  }
  item
    .vector
    .as_ref()
    .and_then(|hit| metadata_timestamp(&hit.metadata))
}

fn metadata_timestamp(metadata: &Metadata) -> Option<DateTime<Utc>> {
  for key in ["created_at", "ingested_at"] {
    let Some(text) = metadata.get(key).and_then(MetaValue::as_text) else {
      continue;
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
      return Some(ts.with_timezone(&Utc));
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  fn case_hit(case_id: &str, confidence: Option<f64>) -> CaseHit {
    CaseHit {
      case_id:        case_id.into(),
      dataset:        "d1".into(),
      classification: "investment_scam".into(),
      confidence,
      status:         "open".into(),
      created_at:     Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
      metadata:       Metadata::new(),
    }
  }

  fn semantic_hit(case_id: &str, similarity: f64) -> SemanticHit {
    SemanticHit {
      case_id:    case_id.into(),
      similarity: Some(similarity),
      distance:   None,
      snippet:    None,
      metadata:   Metadata::new(),
    }
  }

  const EVEN: MergeWeights = MergeWeights { semantic: 0.5, structured: 0.5 };

  // ── Score normalization ───────────────────────────────────────────────

  #[test]
  fn structured_score_falls_back_to_one() {
    assert_eq!(structured_score(&case_hit("c", Some(0.7))), 0.7);
    assert_eq!(structured_score(&case_hit("c", None)), 1.0);

    let mut hit = case_hit("c", None);
    hit.metadata.insert("score".into(), 0.3.into());
    assert_eq!(structured_score(&hit), 0.3);
  }

  #[test]
  fn distance_converts_to_similarity() {
    let mut hit = semantic_hit("c", 0.0);
    hit.similarity = None;
    hit.distance = Some(3.0);
    assert_eq!(semantic_score(&hit), Some(0.25));

    hit.distance = Some(0.0);
    assert_eq!(semantic_score(&hit), None);

    hit.distance = Some(-1.0);
    assert_eq!(semantic_score(&hit), None);
  }

  #[test]
  fn provided_similarity_wins_over_distance() {
    let mut hit = semantic_hit("c", 0.9);
    hit.distance = Some(10.0);
    assert_eq!(semantic_score(&hit), Some(0.9));
  }

  // ── Tie-break ─────────────────────────────────────────────────────────

  #[test]
  fn exact_tie_goes_to_structured() {
    let (merged, breakdown) = combine_scores(Some(0.8), Some(0.8), &EVEN);
    assert_eq!(breakdown.winner, Some(ResultSource::Structured));
    assert_eq!(merged, Some(0.4));
  }

  #[test]
  fn larger_weighted_side_wins() {
    let (_, breakdown) = combine_scores(Some(0.9), Some(0.8), &EVEN);
    assert_eq!(breakdown.winner, Some(ResultSource::Vector));

    let (_, breakdown) = combine_scores(Some(0.5), Some(0.8), &EVEN);
    assert_eq!(breakdown.winner, Some(ResultSource::Structured));
  }

  #[test]
  fn one_sided_results_win_their_own_side() {
    let (merged, breakdown) = combine_scores(Some(0.4), None, &EVEN);
    assert_eq!(breakdown.winner, Some(ResultSource::Vector));
    assert_eq!(merged, Some(0.2));

    let (merged, breakdown) = combine_scores(None, Some(0.4), &EVEN);
    assert_eq!(breakdown.winner, Some(ResultSource::Structured));
    assert_eq!(merged, Some(0.2));
  }

  #[test]
  fn zero_weight_disables_a_side() {
    let weights = MergeWeights { semantic: 0.0, structured: 1.0 };
    let (merged, breakdown) = combine_scores(Some(0.9), None, &weights);
    assert_eq!(merged, None);
    assert_eq!(breakdown.winner, None);
  }

  // ── Merge ─────────────────────────────────────────────────────────────

  #[test]
  fn overlapping_case_merges_into_one_item() {
    let output = merge_results(
      vec![case_hit("c1", Some(0.9))],
      vec![semantic_hit("c1", 0.7), semantic_hit("c2", 0.6)],
      &EVEN,
      None,
    );

    assert_eq!(output.merged_count, 2);
    let c1 = output.items.iter().find(|i| i.case_id == "c1").unwrap();
    assert_eq!(
      c1.sources,
      vec![ResultSource::Structured, ResultSource::Vector]
    );
    assert!(c1.record.is_some());
    assert!(c1.vector.is_some());
  }

  #[test]
  fn unscored_items_sort_last() {
    let mut no_score = semantic_hit("c2", 0.0);
    no_score.similarity = None;
    no_score.distance = Some(-1.0);

    let output = merge_results(
      vec![],
      vec![semantic_hit("c1", 0.4), no_score],
      &EVEN,
      None,
    );

    assert_eq!(output.items[0].case_id, "c1");
    assert_eq!(output.items[1].merged_score, None);
  }

  // ── Time filter ───────────────────────────────────────────────────────

  #[test]
  fn time_filter_drops_out_of_range_keeps_unknown() {
    let range = TimeRange {
      start: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
      end:   Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
    };

    let mut early = case_hit("early", Some(0.9));
    early.created_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let mut late = case_hit("late", Some(0.9));
    late.created_at = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
    let in_range = case_hit("in-range", Some(0.9));

    // A vector-only hit with no metadata has no timestamp: always kept.
    let unknown = semantic_hit("unknown", 0.5);

    let output = merge_results(
      vec![early, late, in_range],
      vec![unknown],
      &EVEN,
      Some(&range),
    );

    let ids: Vec<_> =
      output.items.iter().map(|i| i.case_id.as_str()).collect();
    assert!(ids.contains(&"in-range"));
    assert!(ids.contains(&"unknown"));
    assert!(!ids.contains(&"early"));
    assert!(!ids.contains(&"late"));
    assert_eq!(output.dropped_by_time, 2);
  }

  #[test]
  fn vector_metadata_timestamp_is_honoured() {
    let range = TimeRange {
      start: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
      end:   Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
    };

    let mut hit = semantic_hit("c1", 0.5);
    hit
      .metadata
      .insert("ingested_at".into(), "2026-01-01T00:00:00Z".into());

    let output = merge_results(vec![], vec![hit], &EVEN, Some(&range));
    assert!(output.items.is_empty());
    assert_eq!(output.dropped_by_time, 1);
  }
}
