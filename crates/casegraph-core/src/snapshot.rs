//! Denormalized case snapshot — the wire contract for secondary stores.
//!
//! A snapshot nests the whole case graph into one JSON document keyed by
//! `case_id`. Every identifier in a snapshot is the canonical identifier
//! assigned by the primary store, so all stores share one identity space.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionSnapshot {
  pub document_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub span_start:  Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub span_end:    Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sentence:    Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSnapshot {
  pub document_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_url:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mime_type:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub excerpt:     Option<String>,
  pub chunk_index: i64,
  pub chunk_count: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub captured_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Metadata::is_empty")]
  pub metadata:    Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
  pub entity_id:       String,
  pub entity_type:     String,
  pub canonical_value: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub raw_value:       Option<String>,
  pub confidence:      f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub first_seen_at:   Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_seen_at:    Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Metadata::is_empty")]
  pub metadata:        Metadata,
  #[serde(default)]
  pub mentions:        Vec<MentionSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSourceSnapshot {
  pub document_id:    String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entity_id:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub evidence_score: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub explanation:    Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
  pub indicator_id:   String,
  pub dataset:        String,
  pub category:       String,
  #[serde(rename = "type")]
  pub indicator_type: String,
  pub number:         String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item:           Option<String>,
  pub status:         String,
  pub confidence:     f64,
  #[serde(default, skip_serializing_if = "Metadata::is_empty")]
  pub metadata:       Metadata,
  #[serde(default)]
  pub sources:        Vec<IndicatorSourceSnapshot>,
}

/// The full denormalized case graph shipped to every secondary backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSnapshot {
  pub case_id:          String,
  pub dataset:          String,
  pub source_type:      String,
  pub classification:   String,
  pub confidence:       f64,
  pub status:           String,
  pub raw_text_sha256:  String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text:             Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ingestion_run_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detected_at:      Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reported_at:      Option<DateTime<Utc>>,
  pub updated_at:       DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Metadata::is_empty")]
  pub metadata:         Metadata,
  #[serde(default)]
  pub documents:        Vec<DocumentSnapshot>,
  #[serde(default)]
  pub entities:         Vec<EntitySnapshot>,
  #[serde(default)]
  pub indicators:       Vec<IndicatorSnapshot>,
}
