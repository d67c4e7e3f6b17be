//! Query contracts for the retrieval layer.
//!
//! Covers the indicator lookup (type/value match with fuzzy modes and
//! loss-bucket filters) and the hybrid search request/response shapes
//! consumed by the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  meta::{Metadata, first_number},
};

// ─── Match modes ─────────────────────────────────────────────────────────────

/// How an indicator value filter is applied. All modes compare
/// case-insensitively against the stored value.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
  #[default]
  Exact,
  Prefix,
  Contains,
}

impl MatchMode {
  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "exact" => Ok(MatchMode::Exact),
      "prefix" => Ok(MatchMode::Prefix),
      "contains" => Ok(MatchMode::Contains),
      other => Err(Error::UnknownMatchMode(other.to_owned())),
    }
  }
}

// ─── Loss buckets ────────────────────────────────────────────────────────────

/// A numeric range parsed from a human loss-bucket token.
///
/// `"<10k"` and `">50k"` are strict bounds; `"10k-50k"` is inclusive on
/// both ends. Suffix `k` multiplies by 1,000 and `m` by 1,000,000.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LossBucket {
  Below(f64),
  Above(f64),
  Between(f64, f64),
}

impl LossBucket {
  /// Parse one bucket token. Unrecognized tokens yield `None` and are
  /// ignored by callers, mirroring lenient filter handling elsewhere.
  pub fn parse(label: &str) -> Option<Self> {
    let token = label.trim().to_lowercase();
    if token.is_empty() {
      return None;
    }
    if let Some(rest) = token.strip_prefix('<') {
      return parse_amount(rest).map(LossBucket::Below);
    }
    if let Some(rest) = token.strip_prefix('>') {
      return parse_amount(rest).map(LossBucket::Above);
    }
    if let Some((start, end)) = token.split_once('-') {
      let lower = parse_amount(start)?;
      let upper = parse_amount(end)?;
      return Some(LossBucket::Between(lower, upper));
    }
    None
  }

  pub fn contains(&self, value: f64) -> bool {
    match *self {
      LossBucket::Below(upper) => value < upper,
      LossBucket::Above(lower) => value > lower,
      LossBucket::Between(lower, upper) => value >= lower && value <= upper,
    }
  }
}

fn parse_amount(raw: &str) -> Option<f64> {
  let token = raw.trim();
  let (token, multiplier) = if let Some(t) = token.strip_suffix('k') {
    (t, 1_000.0)
  } else if let Some(t) = token.strip_suffix('m') {
    (t, 1_000_000.0)
  } else {
    (token, 1.0)
  };
  if token.is_empty() {
    return None;
  }
  token.parse::<f64>().ok().map(|v| v * multiplier)
}

/// Parse every recognizable bucket token from `labels`.
pub fn parse_loss_buckets<S: AsRef<str>>(labels: &[S]) -> Vec<LossBucket> {
  labels
    .iter()
    .filter_map(|label| LossBucket::parse(label.as_ref()))
    .collect()
}

/// Whether `value` falls in any of `buckets`. A case with unknown loss
/// amount never matches a bucket filter.
pub fn loss_in_buckets(value: Option<f64>, buckets: &[LossBucket]) -> bool {
  match value {
    Some(v) => buckets.iter().any(|bucket| bucket.contains(v)),
    None => false,
  }
}

/// Loss amount read from case metadata first, then indicator metadata.
pub fn extract_loss_amount(
  case_meta: &Metadata,
  indicator_meta: &Metadata,
) -> Option<f64> {
  first_number(
    [case_meta, indicator_meta],
    &["loss_amount", "loss", "loss_usd"],
  )
}

// ─── Indicator lookup ────────────────────────────────────────────────────────

/// Parameters for an indicator-centric case lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorQuery {
  /// Indicator type to match (`bank_account`, `crypto_wallet`, …).
  pub indicator_type: String,
  /// The indicator number/value to search for.
  pub value:          String,
  #[serde(default)]
  pub match_mode:     MatchMode,
  /// Dataset allow-list; empty means all datasets.
  #[serde(default)]
  pub datasets:       Vec<String>,
  /// Human bucket tokens such as `"<10k"`, `"10k-50k"`, `">50k"`.
  #[serde(default)]
  pub loss_buckets:   Vec<String>,
  #[serde(default = "default_indicator_limit")]
  pub limit:          usize,
}

pub fn default_indicator_limit() -> usize { 25 }

/// One case matched by an indicator lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseMatch {
  pub case_id:         String,
  pub dataset:         Option<String>,
  pub indicator_type:  String,
  pub indicator_value: String,
  pub loss_amount:     Option<f64>,
  pub classification:  Option<String>,
}

// ─── Structured lookup ───────────────────────────────────────────────────────

/// Entity filter inside a hybrid query, matched against indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFilter {
  #[serde(rename = "type")]
  pub entity_type: String,
  pub value:       String,
  #[serde(default)]
  pub match_mode:  MatchMode,
}

/// Structured-side filter set for hybrid search. Filter kinds are ANDed;
/// values within a kind are an IN-list.
#[derive(Debug, Clone, Default)]
pub struct StructuredQuery {
  pub classifications: Vec<String>,
  pub datasets:        Vec<String>,
  pub case_ids:        Vec<String>,
  pub entities:        Vec<EntityFilter>,
  pub limit:           usize,
}

impl StructuredQuery {
  pub fn is_empty(&self) -> bool {
    self.classifications.is_empty()
      && self.datasets.is_empty()
      && self.case_ids.is_empty()
      && self.entities.is_empty()
  }
}

/// One case row surfaced by the structured side of hybrid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseHit {
  pub case_id:        String,
  pub dataset:        String,
  pub classification: String,
  pub confidence:     Option<f64>,
  pub status:         String,
  pub created_at:     DateTime<Utc>,
  #[serde(default)]
  pub metadata:       Metadata,
}

// ─── Hybrid search ───────────────────────────────────────────────────────────

/// Inclusive time window applied to merged results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl TimeRange {
  pub fn contains(&self, ts: DateTime<Utc>) -> bool {
    self.start <= ts && ts <= self.end
  }
}

/// Normalized hybrid search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HybridSearchQuery {
  #[serde(default)]
  pub text:             Option<String>,
  #[serde(default)]
  pub entities:         Vec<EntityFilter>,
  #[serde(default)]
  pub classifications:  Vec<String>,
  #[serde(default)]
  pub datasets:         Vec<String>,
  #[serde(default)]
  pub loss_buckets:     Vec<String>,
  #[serde(default)]
  pub case_ids:         Vec<String>,
  #[serde(default)]
  pub time_range:       Option<TimeRange>,
  #[serde(default)]
  pub limit:            Option<usize>,
  #[serde(default)]
  pub vector_limit:     Option<usize>,
  #[serde(default)]
  pub structured_limit: Option<usize>,
  #[serde(default)]
  pub offset:           usize,
}

/// One hit from the semantic index. Either a ready-made `similarity` in
/// [0, 1] or a raw `distance` the merge layer converts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticHit {
  pub case_id:    String,
  #[serde(default)]
  pub similarity: Option<f64>,
  #[serde(default)]
  pub distance:   Option<f64>,
  #[serde(default)]
  pub snippet:    Option<String>,
  #[serde(default)]
  pub metadata:   Metadata,
}

/// Which side of the merge a result came from.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
  Structured,
  Vector,
}

/// Per-result score breakdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub structured:          Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub structured_weighted: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub semantic:            Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub semantic_weighted:   Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub winner:              Option<ResultSource>,
}

/// Single merged hybrid search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridSearchItem {
  pub case_id:      String,
  pub sources:      Vec<ResultSource>,
  pub merged_score: Option<f64>,
  pub scores:       ScoreBreakdown,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub record:       Option<CaseHit>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub vector:       Option<SemanticHit>,
}

/// Merge accounting reported alongside the results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchDiagnostics {
  pub strategy:              String,
  pub semantic_weight:       f64,
  pub structured_weight:     f64,
  pub vector_hits:           usize,
  pub structured_hits:       usize,
  pub merged_results:        usize,
  pub deduped_overlap:       usize,
  pub returned_results:      usize,
  pub dropped_by_time_range: usize,
}

/// Full hybrid search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridSearchResponse {
  pub results:         Vec<HybridSearchItem>,
  pub count:           usize,
  pub offset:          usize,
  pub limit:           usize,
  /// Merged result count before time filtering and pagination.
  pub total:           usize,
  pub vector_hits:     usize,
  pub structured_hits: usize,
  pub diagnostics:     SearchDiagnostics,
}
