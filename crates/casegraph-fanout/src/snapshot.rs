//! Builds the denormalized [`CaseSnapshot`] shipped to secondary backends,
//! and the envelope format queued for retries.

use std::collections::HashMap;

use casegraph_core::{
  bundle::{CanonicalIds, CaseBundle},
  hash::sha256_hex,
  snapshot::{
    CaseSnapshot, DocumentSnapshot, EntitySnapshot, IndicatorSnapshot,
    IndicatorSourceSnapshot, MentionSnapshot,
  },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload queued for a failed secondary write. The snapshot is
/// serialized at enqueue time, so later mutation of the live bundle can
/// never corrupt a queued retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEnvelope {
  pub record:  CaseSnapshot,
  #[serde(default)]
  pub context: RetryContext,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryContext {
  /// Message from the attempt that put this entry in the queue.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Denormalize `bundle` using the canonical identifiers assigned by the
/// primary store. Aliases resolve against the same positional id lists the
/// writer produced, so every backend shares one identity space.
pub fn build_snapshot(
  bundle: &CaseBundle,
  ids: &CanonicalIds,
  now: DateTime<Utc>,
) -> CaseSnapshot {
  let mut doc_aliases: HashMap<&str, &str> = HashMap::new();
  let mut documents = Vec::with_capacity(bundle.documents.len());
  for (doc, document_id) in bundle.documents.iter().zip(&ids.document_ids) {
    if let Some(alias) = doc.alias.as_deref().filter(|a| !a.is_empty()) {
      doc_aliases.insert(alias, document_id);
    }
    documents.push(DocumentSnapshot {
      document_id: document_id.clone(),
      title:       doc.title.clone(),
      source_url:  doc.source_url.clone(),
      mime_type:   doc.mime_type.clone(),
      excerpt:     doc.excerpt.clone(),
      chunk_index: doc.chunk_index,
      chunk_count: doc.chunk_count,
      captured_at: doc.captured_at,
      metadata:    doc.metadata.clone(),
    });
  }

  let mut entity_aliases: HashMap<&str, &str> = HashMap::new();
  let mut entities = Vec::with_capacity(bundle.entities.len());
  for (entity, entity_id) in bundle.entities.iter().zip(&ids.entity_ids) {
    if let Some(alias) = entity.alias.as_deref().filter(|a| !a.is_empty()) {
      entity_aliases.insert(alias, entity_id);
    }
    let mentions = entity
      .mentions
      .iter()
      .filter_map(|mention| {
        let document_id = mention
          .document_id
          .clone()
          .or_else(|| {
            mention
              .document_alias
              .as_deref()
              .and_then(|a| doc_aliases.get(a).map(|id| (*id).to_owned()))
          })?;
        Some(MentionSnapshot {
          document_id,
          span_start: mention.span_start,
          span_end: mention.span_end,
          sentence: mention.sentence.clone(),
        })
      })
      .collect();
    entities.push(EntitySnapshot {
      entity_id:       entity_id.clone(),
      entity_type:     entity.entity_type.clone(),
      canonical_value: entity.canonical_value.clone(),
      raw_value:       entity.raw_value.clone(),
      confidence:      entity.confidence,
      first_seen_at:   entity.first_seen_at,
      last_seen_at:    entity.last_seen_at,
      metadata:        entity.metadata.clone(),
      mentions,
    });
  }

  let mut indicators = Vec::with_capacity(bundle.indicators.len());
  for (indicator, indicator_id) in
    bundle.indicators.iter().zip(&ids.indicator_ids)
  {
    let sources = indicator
      .sources
      .iter()
      .filter_map(|source| {
        let document_id = source.document_id.clone().or_else(|| {
          source
            .document_alias
            .as_deref()
            .and_then(|a| doc_aliases.get(a).map(|id| (*id).to_owned()))
        })?;
        let entity_id = source.entity_id.clone().or_else(|| {
          source
            .entity_alias
            .as_deref()
            .and_then(|a| entity_aliases.get(a).map(|id| (*id).to_owned()))
        });
        Some(IndicatorSourceSnapshot {
          document_id,
          entity_id,
          evidence_score: source.evidence_score,
          explanation: source.explanation.clone(),
        })
      })
      .collect();
    indicators.push(IndicatorSnapshot {
      indicator_id:   indicator_id.clone(),
      dataset:        indicator
        .dataset
        .clone()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| bundle.case.dataset.clone()),
      category:       indicator.category.clone(),
      indicator_type: indicator.indicator_type.clone(),
      number:         indicator.number.clone(),
      item:           indicator.item.clone(),
      status:         indicator.status.clone(),
      confidence:     indicator.confidence,
      metadata:       indicator.metadata.clone(),
      sources,
    });
  }

  let case = &bundle.case;
  CaseSnapshot {
    case_id:          ids.case_id.clone(),
    dataset:          case.dataset.clone(),
    source_type:      case.source_type.clone(),
    classification:   case.classification.clone(),
    confidence:       case.confidence,
    status:           case.status.clone(),
    raw_text_sha256:  case
      .raw_text_sha256
      .clone()
      .or_else(|| case.text.as_deref().map(sha256_hex))
      .unwrap_or_default(),
    text:             case.text.clone(),
    ingestion_run_id: bundle.ingestion_run_id.clone(),
    detected_at:      case.detected_at,
    reported_at:      case.reported_at,
    updated_at:       now,
    metadata:         case.metadata.clone(),
    documents,
    entities,
    indicators,
  }
}

#[cfg(test)]
mod tests {
  use casegraph_core::bundle::{
    CaseBundle, CasePayload, DocumentPayload, EntityPayload, MentionPayload,
  };

  use super::*;

  fn bundle_with_alias() -> (CaseBundle, CanonicalIds) {
    let bundle = CaseBundle {
      case:             CasePayload {
        dataset:         "d1".into(),
        source_type:     "intake".into(),
        classification:  "investment_scam".into(),
        confidence:      0.9,
        case_id:         Some("c1".into()),
        text:            Some("hello".into()),
        raw_text_sha256: None,
        detected_at:     None,
        reported_at:     None,
        status:          "open".into(),
        metadata:        Default::default(),
        is_deleted:      false,
        deleted_at:      None,
      },
      documents:        vec![DocumentPayload {
        alias: Some("doc-0".into()),
        ..Default::default()
      }],
      entities:         vec![EntityPayload {
        entity_type:     "wallet".into(),
        canonical_value: "0xabc".into(),
        confidence:      0.8,
        alias:           None,
        entity_id:       None,
        raw_value:       None,
        first_seen_at:   None,
        last_seen_at:    None,
        metadata:        Default::default(),
        mentions:        vec![MentionPayload {
          document_alias: Some("doc-0".into()),
          ..Default::default()
        }],
      }],
      indicators:       vec![],
      ingestion_run_id: None,
    };
    let ids = CanonicalIds {
      case_id:          "c1".into(),
      document_ids:     vec!["doc-id-1".into()],
      entity_ids:       vec!["ent-id-1".into()],
      indicator_ids:    vec![],
      skipped_mentions: vec![],
    };
    (bundle, ids)
  }

  #[test]
  fn snapshot_carries_canonical_ids() {
    let (bundle, ids) = bundle_with_alias();
    let snapshot = build_snapshot(&bundle, &ids, Utc::now());

    assert_eq!(snapshot.case_id, "c1");
    assert_eq!(snapshot.documents[0].document_id, "doc-id-1");
    assert_eq!(snapshot.entities[0].entity_id, "ent-id-1");
    assert_eq!(snapshot.entities[0].mentions[0].document_id, "doc-id-1");
    assert!(!snapshot.raw_text_sha256.is_empty());
  }

  #[test]
  fn envelope_roundtrips_through_json() {
    let (bundle, ids) = bundle_with_alias();
    let envelope = RetryEnvelope {
      record:  build_snapshot(&bundle, &ids, Utc::now()),
      context: RetryContext { error: Some("boom".into()) },
    };

    let value = serde_json::to_value(&envelope).unwrap();
    let back: RetryEnvelope = serde_json::from_value(value).unwrap();
    assert_eq!(back.record.case_id, "c1");
    assert_eq!(back.context.error.as_deref(), Some("boom"));
  }
}
