//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Metadata maps are stored
//! as compact JSON (NULL when empty). Numeric fields pass through
//! [`quantize`] so repeated writes of the same bundle are byte-stable.

use casegraph_core::{
  fanout::Backend,
  meta::Metadata,
  query::{CaseHit, CaseMatch, extract_loss_amount},
  store::RetryItem,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn encode_opt_dt(dt: Option<DateTime<Utc>>) -> Option<String> {
  dt.map(encode_dt)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Metadata ────────────────────────────────────────────────────────────────

pub fn encode_metadata(meta: &Metadata) -> Result<Option<String>> {
  if meta.is_empty() {
    return Ok(None);
  }
  Ok(Some(serde_json::to_string(meta)?))
}

pub fn decode_metadata(s: Option<&str>) -> Metadata {
  // Tolerate rows written by older schema revisions; unreadable metadata
  // degrades to empty rather than failing the whole query.
  s.and_then(|raw| serde_json::from_str(raw).ok())
    .unwrap_or_default()
}

// ─── Numbers ─────────────────────────────────────────────────────────────────

/// Round to a fixed number of decimal places, half away from zero.
pub fn quantize(value: f64, places: u32) -> f64 {
  let factor = 10f64.powi(places as i32);
  (value * factor).round() / factor
}

pub fn quantize_opt(value: Option<f64>, places: u32) -> Option<f64> {
  value.map(|v| quantize(v, places))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read from a `cases` row for the structured lookup.
pub struct RawCaseHit {
  pub case_id:        String,
  pub dataset:        String,
  pub classification: String,
  pub confidence:     Option<f64>,
  pub status:         String,
  pub created_at:     String,
  pub metadata:       Option<String>,
}

impl RawCaseHit {
  pub fn into_hit(self) -> Result<CaseHit> {
    Ok(CaseHit {
      case_id:        self.case_id,
      dataset:        self.dataset,
      classification: self.classification,
      confidence:     self.confidence,
      status:         self.status,
      created_at:     decode_dt(&self.created_at)?,
      metadata:       decode_metadata(self.metadata.as_deref()),
    })
  }
}

/// Raw strings read from an `indicators ⋈ cases` row for indicator search.
pub struct RawIndicatorRow {
  pub case_id:            String,
  pub indicator_type:     String,
  pub number:             String,
  pub indicator_dataset:  String,
  pub indicator_metadata: Option<String>,
  pub case_dataset:       String,
  pub classification:     String,
  pub case_metadata:      Option<String>,
}

impl RawIndicatorRow {
  /// Resolve dataset and loss amount, producing the public match shape.
  pub fn into_match(self) -> CaseMatch {
    let indicator_meta = decode_metadata(self.indicator_metadata.as_deref());
    let case_meta = decode_metadata(self.case_metadata.as_deref());

    let dataset = if !self.indicator_dataset.is_empty() {
      Some(self.indicator_dataset)
    } else {
      case_meta
        .get("dataset")
        .and_then(|v| v.as_text())
        .map(str::to_owned)
        .or(Some(self.case_dataset))
        .filter(|d| !d.is_empty())
    };

    let loss_amount = extract_loss_amount(&case_meta, &indicator_meta);

    CaseMatch {
      case_id: self.case_id,
      dataset,
      indicator_type: self.indicator_type,
      indicator_value: self.number,
      loss_amount,
      classification: Some(self.classification),
    }
  }
}

/// Raw strings read from an `ingestion_retry_queue` row.
pub struct RawRetryItem {
  pub retry_id:        String,
  pub case_id:         String,
  pub backend:         String,
  pub payload_json:    String,
  pub attempt_count:   i64,
  pub next_attempt_at: String,
}

impl RawRetryItem {
  pub fn into_item(self) -> Result<RetryItem> {
    Ok(RetryItem {
      backend:         Backend::parse(&self.backend).map_err(Error::Core)?,
      payload:         serde_json::from_str(&self.payload_json)?,
      next_attempt_at: decode_dt(&self.next_attempt_at)?,
      retry_id:        self.retry_id,
      case_id:         self.case_id,
      attempt_count:   self.attempt_count,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::quantize;

  #[test]
  fn quantize_rounds_half_away_from_zero() {
    assert_eq!(quantize(0.123_45, 4), 0.1235);
    assert_eq!(quantize(0.123_44, 4), 0.1234);
    assert_eq!(quantize(0.9995, 3), 1.0);
  }
}
