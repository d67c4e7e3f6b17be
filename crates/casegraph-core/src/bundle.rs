//! Ingest bundle payloads — the unit of work handed to the case-graph
//! writer.
//!
//! A bundle carries one case plus its child artifacts. Documents and
//! entities may carry a bundle-local `alias` so that mentions and indicator
//! sources can reference them before identifiers exist; the writer resolves
//! every alias to a canonical identifier before any child row is written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::meta::Metadata;

/// Generate an identifier, reusing `value` when the caller supplied one.
pub fn generate_id(value: Option<&str>) -> String {
  match value {
    Some(v) if !v.is_empty() => v.to_owned(),
    _ => Uuid::new_v4().hyphenated().to_string(),
  }
}

// ─── Case ────────────────────────────────────────────────────────────────────

/// Canonical representation of a case row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasePayload {
  pub dataset:         String,
  pub source_type:     String,
  pub classification:  String,
  pub confidence:      f64,
  #[serde(default)]
  pub case_id:         Option<String>,
  #[serde(default)]
  pub text:            Option<String>,
  /// Pre-computed content hash; derived from `text` when absent.
  #[serde(default)]
  pub raw_text_sha256: Option<String>,
  #[serde(default)]
  pub detected_at:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub reported_at:     Option<DateTime<Utc>>,
  #[serde(default = "default_case_status")]
  pub status:          String,
  #[serde(default)]
  pub metadata:        Metadata,
  #[serde(default)]
  pub is_deleted:      bool,
  #[serde(default)]
  pub deleted_at:      Option<DateTime<Utc>>,
}

fn default_case_status() -> String { "open".to_owned() }

// ─── Documents ───────────────────────────────────────────────────────────────

/// Source document (and chunk) persisted alongside the case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPayload {
  /// Bundle-local name used by mentions and indicator sources.
  #[serde(default)]
  pub alias:       Option<String>,
  #[serde(default)]
  pub document_id: Option<String>,
  #[serde(default)]
  pub title:       Option<String>,
  #[serde(default)]
  pub source_url:  Option<String>,
  #[serde(default)]
  pub mime_type:   Option<String>,
  #[serde(default)]
  pub text:        Option<String>,
  #[serde(default)]
  pub text_sha256: Option<String>,
  #[serde(default)]
  pub excerpt:     Option<String>,
  #[serde(default)]
  pub chunk_index: i64,
  #[serde(default = "default_chunk_count")]
  pub chunk_count: i64,
  #[serde(default)]
  pub score:       Option<f64>,
  #[serde(default)]
  pub captured_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub metadata:    Metadata,
}

fn default_chunk_count() -> i64 { 1 }

// ─── Entities ────────────────────────────────────────────────────────────────

/// Reference pointing from an entity to a supporting document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentionPayload {
  #[serde(default)]
  pub document_id:    Option<String>,
  #[serde(default)]
  pub document_alias: Option<String>,
  #[serde(default)]
  pub span_start:     Option<i64>,
  #[serde(default)]
  pub span_end:       Option<i64>,
  #[serde(default)]
  pub sentence:       Option<String>,
  #[serde(default)]
  pub metadata:       Metadata,
}

/// Entity extracted from the case text. Identified by the natural key
/// `(case_id, entity_type, canonical_value)`; `entity_id` is only honoured
/// when the caller already knows the canonical identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPayload {
  pub entity_type:     String,
  pub canonical_value: String,
  pub confidence:      f64,
  #[serde(default)]
  pub alias:           Option<String>,
  #[serde(default)]
  pub entity_id:       Option<String>,
  #[serde(default)]
  pub raw_value:       Option<String>,
  #[serde(default)]
  pub first_seen_at:   Option<DateTime<Utc>>,
  #[serde(default)]
  pub last_seen_at:    Option<DateTime<Utc>>,
  #[serde(default)]
  pub metadata:        Metadata,
  #[serde(default)]
  pub mentions:        Vec<MentionPayload>,
}

// ─── Indicators ──────────────────────────────────────────────────────────────

/// Document/entity evidence for an indicator. The document reference is
/// required; the entity reference is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSourcePayload {
  #[serde(default)]
  pub document_id:    Option<String>,
  #[serde(default)]
  pub document_alias: Option<String>,
  #[serde(default)]
  pub entity_id:      Option<String>,
  #[serde(default)]
  pub entity_alias:   Option<String>,
  #[serde(default)]
  pub evidence_score: Option<f64>,
  #[serde(default)]
  pub explanation:    Option<String>,
  #[serde(default)]
  pub metadata:       Metadata,
}

/// Structured indicator tied to the ingested case. Identified by the
/// natural key `(dataset, category, number)`; `dataset` falls back to the
/// case's dataset when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorPayload {
  pub category:       String,
  #[serde(rename = "type")]
  pub indicator_type: String,
  pub number:         String,
  #[serde(default)]
  pub dataset:       Option<String>,
  #[serde(default)]
  pub item:          Option<String>,
  #[serde(default)]
  pub indicator_id:  Option<String>,
  #[serde(default = "default_indicator_status")]
  pub status:        String,
  #[serde(default)]
  pub confidence:    f64,
  #[serde(default)]
  pub first_seen_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub last_seen_at:  Option<DateTime<Utc>>,
  #[serde(default)]
  pub metadata:      Metadata,
  #[serde(default)]
  pub sources:       Vec<IndicatorSourcePayload>,
}

fn default_indicator_status() -> String { "active".to_owned() }

// ─── Bundle ──────────────────────────────────────────────────────────────────

/// Complete payload passed into the case-graph writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseBundle {
  pub case:       CasePayload,
  #[serde(default)]
  pub documents:  Vec<DocumentPayload>,
  #[serde(default)]
  pub entities:   Vec<EntityPayload>,
  #[serde(default)]
  pub indicators: Vec<IndicatorPayload>,
  /// Run foreign key stamped onto the case row when present.
  #[serde(default)]
  pub ingestion_run_id: Option<String>,
}

/// Identifiers assigned by the primary store, authoritative across all
/// stores. `document_ids`, `entity_ids`, and `indicator_ids` are positional
/// with the bundle's payload lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalIds {
  pub case_id:       String,
  pub document_ids:  Vec<String>,
  pub entity_ids:    Vec<String>,
  pub indicator_ids: Vec<String>,
  /// Document aliases of mentions dropped because they resolved to
  /// nothing. The rest of the bundle still committed.
  #[serde(default)]
  pub skipped_mentions: Vec<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generate_id_reuses_existing() {
    assert_eq!(generate_id(Some("c1")), "c1");
    assert_ne!(generate_id(None), generate_id(None));
  }

  #[test]
  fn bundle_deserializes_with_defaults() {
    let bundle: CaseBundle = serde_json::from_str(
      r#"{
        "case": {
          "dataset": "d1",
          "source_type": "intake",
          "classification": "investment_scam",
          "confidence": 0.9,
          "text": "hello"
        }
      }"#,
    )
    .unwrap();

    assert_eq!(bundle.case.status, "open");
    assert!(!bundle.case.is_deleted);
    assert!(bundle.documents.is_empty());
    assert!(bundle.indicators.is_empty());
  }

  #[test]
  fn indicator_type_uses_wire_name() {
    let indicator: IndicatorPayload = serde_json::from_str(
      r#"{"category": "financial", "type": "bank_account", "number": "1234"}"#,
    )
    .unwrap();
    assert_eq!(indicator.indicator_type, "bank_account");
    assert_eq!(indicator.status, "active");
  }
}
