//! Transactional bundle writer.
//!
//! Runs entirely inside one rusqlite transaction: alias resolution is a
//! pre-pass that assigns every document and entity identifier before any
//! row is written, so mentions and indicator sources never forward-
//! reference. Any failure rolls the whole bundle back.

use std::collections::HashMap;

use casegraph_core::{
  bundle::{
    CanonicalIds, CaseBundle, DocumentPayload, EntityPayload,
    IndicatorPayload, MentionPayload, generate_id,
  },
  hash::sha256_hex,
  meta::Metadata,
};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, Transaction, params};

use crate::encode::{
  encode_dt, encode_opt_dt, quantize, quantize_opt,
};

/// Failure inside the write transaction. Validation failures abort the
/// bundle without being database faults.
#[derive(Debug)]
pub(crate) enum WriteError {
  Validation(String),
  Sql(rusqlite::Error),
  Json(serde_json::Error),
}

impl From<rusqlite::Error> for WriteError {
  fn from(e: rusqlite::Error) -> Self { WriteError::Sql(e) }
}

impl From<serde_json::Error> for WriteError {
  fn from(e: serde_json::Error) -> Self { WriteError::Json(e) }
}

type WriteResult<T> = Result<T, WriteError>;

fn encode_meta(meta: &Metadata) -> WriteResult<Option<String>> {
  if meta.is_empty() {
    return Ok(None);
  }
  Ok(Some(serde_json::to_string(meta)?))
}

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Write `bundle` into the open transaction. `case_id` and `raw_hash` are
/// pre-validated by the caller.
pub(crate) fn persist_bundle_tx(
  tx: &Transaction<'_>,
  bundle: &CaseBundle,
  case_id: &str,
  raw_hash: &str,
  now: DateTime<Utc>,
) -> WriteResult<CanonicalIds> {
  // Pre-pass: assign every identifier and build the alias arena before a
  // single row is written. Documents without an explicit identifier are
  // matched by (case_id, chunk_index, text_sha256) so re-ingesting the
  // same bundle reuses the same rows.
  let mut doc_aliases: HashMap<String, String> = HashMap::new();
  let mut document_ids = Vec::with_capacity(bundle.documents.len());
  let mut document_hashes = Vec::with_capacity(bundle.documents.len());
  for doc in &bundle.documents {
    let text_hash = doc
      .text_sha256
      .clone()
      .or_else(|| doc.text.as_deref().map(sha256_hex));
    let document_id =
      match doc.document_id.as_deref().filter(|v| !v.is_empty()) {
        Some(id) => id.to_owned(),
        None => {
          lookup_document_id(tx, case_id, doc.chunk_index, text_hash.as_deref())?
            .unwrap_or_else(|| generate_id(None))
        }
      };
    if let Some(alias) = doc.alias.as_deref().filter(|a| !a.is_empty()) {
      doc_aliases.insert(alias.to_owned(), document_id.clone());
    }
    document_ids.push(document_id);
    document_hashes.push(text_hash);
  }

  let mut entity_aliases: HashMap<String, String> = HashMap::new();
  let mut entity_ids = Vec::with_capacity(bundle.entities.len());
  for entity in &bundle.entities {
    let entity_id = match entity.entity_id.as_deref().filter(|v| !v.is_empty())
    {
      Some(id) => id.to_owned(),
      None => lookup_entity_id(tx, case_id, entity)?
        .unwrap_or_else(|| generate_id(None)),
    };
    if let Some(alias) = entity.alias.as_deref().filter(|a| !a.is_empty()) {
      entity_aliases.insert(alias.to_owned(), entity_id.clone());
    }
    entity_ids.push(entity_id);
  }

  // Write pass.
  upsert_case(tx, bundle, case_id, raw_hash, now)?;

  for ((doc, document_id), text_hash) in
    bundle.documents.iter().zip(&document_ids).zip(&document_hashes)
  {
    upsert_document(tx, case_id, doc, document_id, text_hash.as_deref(), now)?;
  }

  let mut skipped_mentions = Vec::new();
  for (entity, entity_id) in bundle.entities.iter().zip(&entity_ids) {
    upsert_entity(tx, case_id, entity, entity_id, now)?;
    replace_mentions(
      tx,
      entity_id,
      &entity.mentions,
      &doc_aliases,
      now,
      &mut skipped_mentions,
    )?;
  }

  let mut indicator_ids = Vec::with_capacity(bundle.indicators.len());
  for indicator in &bundle.indicators {
    let indicator_id = upsert_indicator(
      tx,
      case_id,
      &bundle.case.dataset,
      indicator,
      now,
    )?;
    replace_sources(
      tx,
      &indicator_id,
      indicator,
      &doc_aliases,
      &entity_aliases,
      now,
    )?;
    indicator_ids.push(indicator_id);
  }

  Ok(CanonicalIds {
    case_id: case_id.to_owned(),
    document_ids,
    entity_ids,
    indicator_ids,
    skipped_mentions,
  })
}

// ─── Case ────────────────────────────────────────────────────────────────────

fn upsert_case(
  tx: &Transaction<'_>,
  bundle: &CaseBundle,
  case_id: &str,
  raw_hash: &str,
  now: DateTime<Utc>,
) -> WriteResult<()> {
  let case = &bundle.case;
  let now_str = encode_dt(now);
  let metadata = encode_meta(&case.metadata)?;
  let confidence = quantize(case.confidence, 4);

  let changed = tx.execute(
    "UPDATE cases SET
       ingestion_run_id = ?2, dataset = ?3, source_type = ?4,
       classification = ?5, confidence = ?6, detected_at = ?7,
       reported_at = ?8, raw_text_sha256 = ?9, status = ?10,
       metadata = ?11, is_deleted = ?12, deleted_at = ?13, updated_at = ?14
     WHERE case_id = ?1",
    params![
      case_id,
      bundle.ingestion_run_id,
      case.dataset,
      case.source_type,
      case.classification,
      confidence,
      encode_opt_dt(case.detected_at),
      encode_opt_dt(case.reported_at),
      raw_hash,
      case.status,
      metadata,
      case.is_deleted,
      encode_opt_dt(case.deleted_at),
      now_str,
    ],
  )?;

  if changed == 0 {
    tx.execute(
      "INSERT INTO cases (
         case_id, ingestion_run_id, dataset, source_type, classification,
         confidence, detected_at, reported_at, raw_text_sha256, status,
         metadata, is_deleted, deleted_at, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
      params![
        case_id,
        bundle.ingestion_run_id,
        case.dataset,
        case.source_type,
        case.classification,
        confidence,
        encode_opt_dt(case.detected_at),
        encode_opt_dt(case.reported_at),
        raw_hash,
        case.status,
        encode_meta(&case.metadata)?,
        case.is_deleted,
        encode_opt_dt(case.deleted_at),
        encode_dt(now),
      ],
    )?;
  }
  Ok(())
}

// ─── Documents ───────────────────────────────────────────────────────────────

fn lookup_document_id(
  tx: &Transaction<'_>,
  case_id: &str,
  chunk_index: i64,
  text_hash: Option<&str>,
) -> WriteResult<Option<String>> {
  let id: Option<String> = tx
    .query_row(
      "SELECT document_id FROM source_documents
       WHERE case_id = ?1 AND chunk_index = ?2
         AND IFNULL(text_sha256, '') = IFNULL(?3, '')",
      params![case_id, chunk_index, text_hash],
      |row| row.get(0),
    )
    .optional()?;
  Ok(id)
}

fn upsert_document(
  tx: &Transaction<'_>,
  case_id: &str,
  doc: &DocumentPayload,
  document_id: &str,
  text_hash: Option<&str>,
  now: DateTime<Utc>,
) -> WriteResult<()> {
  let score = quantize_opt(doc.score, 3);
  let metadata = encode_meta(&doc.metadata)?;
  let now_str = encode_dt(now);

  let changed = tx.execute(
    "UPDATE source_documents SET
       case_id = ?2, title = ?3, source_url = ?4, mime_type = ?5,
       text = ?6, text_sha256 = ?7, excerpt = ?8, chunk_index = ?9,
       chunk_count = ?10, score = ?11, captured_at = ?12, metadata = ?13,
       updated_at = ?14
     WHERE document_id = ?1",
    params![
      document_id,
      case_id,
      doc.title,
      doc.source_url,
      doc.mime_type,
      doc.text,
      text_hash,
      doc.excerpt,
      doc.chunk_index,
      doc.chunk_count,
      score,
      encode_opt_dt(doc.captured_at),
      metadata,
      now_str,
    ],
  )?;

  if changed == 0 {
    tx.execute(
      "INSERT INTO source_documents (
         document_id, case_id, title, source_url, mime_type, text,
         text_sha256, excerpt, chunk_index, chunk_count, score,
         captured_at, metadata, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
      params![
        document_id,
        case_id,
        doc.title,
        doc.source_url,
        doc.mime_type,
        doc.text,
        text_hash,
        doc.excerpt,
        doc.chunk_index,
        doc.chunk_count,
        score,
        encode_opt_dt(doc.captured_at),
        encode_meta(&doc.metadata)?,
        now_str,
      ],
    )?;
  }
  Ok(())
}

// ─── Entities ────────────────────────────────────────────────────────────────

fn lookup_entity_id(
  tx: &Transaction<'_>,
  case_id: &str,
  entity: &EntityPayload,
) -> WriteResult<Option<String>> {
  let id: Option<String> = tx
    .query_row(
      "SELECT entity_id FROM entities
       WHERE case_id = ?1 AND entity_type = ?2 AND canonical_value = ?3",
      params![case_id, entity.entity_type, entity.canonical_value],
      |row| row.get(0),
    )
    .optional()?;
  Ok(id)
}

fn upsert_entity(
  tx: &Transaction<'_>,
  case_id: &str,
  entity: &EntityPayload,
  entity_id: &str,
  now: DateTime<Utc>,
) -> WriteResult<()> {
  let confidence = quantize(entity.confidence, 4);
  let metadata = encode_meta(&entity.metadata)?;
  let last_seen = encode_dt(entity.last_seen_at.unwrap_or(now));
  let now_str = encode_dt(now);

  // `first_seen_at` is preserved on re-sighting unless the payload pins
  // an explicit value.
  let changed = tx.execute(
    "UPDATE entities SET
       case_id = ?2, entity_type = ?3, canonical_value = ?4,
       raw_value = ?5, confidence = ?6,
       first_seen_at = COALESCE(?7, first_seen_at),
       last_seen_at = ?8, metadata = ?9, updated_at = ?10
     WHERE entity_id = ?1",
    params![
      entity_id,
      case_id,
      entity.entity_type,
      entity.canonical_value,
      entity.raw_value,
      confidence,
      encode_opt_dt(entity.first_seen_at),
      last_seen,
      metadata,
      now_str,
    ],
  )?;

  if changed == 0 {
    tx.execute(
      "INSERT INTO entities (
         entity_id, case_id, entity_type, canonical_value, raw_value,
         confidence, first_seen_at, last_seen_at, metadata,
         created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
      params![
        entity_id,
        case_id,
        entity.entity_type,
        entity.canonical_value,
        entity.raw_value,
        confidence,
        encode_dt(entity.first_seen_at.unwrap_or(now)),
        last_seen,
        encode_meta(&entity.metadata)?,
        now_str,
      ],
    )?;
  }
  Ok(())
}

fn replace_mentions(
  tx: &Transaction<'_>,
  entity_id: &str,
  mentions: &[MentionPayload],
  doc_aliases: &HashMap<String, String>,
  now: DateTime<Utc>,
  skipped: &mut Vec<String>,
) -> WriteResult<()> {
  tx.execute(
    "DELETE FROM entity_mentions WHERE entity_id = ?1",
    params![entity_id],
  )?;

  for mention in mentions {
    let document_id = match resolve_document(
      mention.document_id.as_deref(),
      mention.document_alias.as_deref(),
      doc_aliases,
    ) {
      Some(id) => id,
      None => {
        // The mention alone is dropped; the entity and the rest of the
        // bundle still commit.
        let label = mention
          .document_alias
          .clone()
          .unwrap_or_else(|| "(missing)".to_owned());
        tracing::warn!(
          entity_id,
          document_alias = %label,
          "dropping mention with unresolvable document reference"
        );
        skipped.push(label);
        continue;
      }
    };

    tx.execute(
      "INSERT INTO entity_mentions (
         entity_id, document_id, span_start, span_end, sentence,
         metadata, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      params![
        entity_id,
        document_id,
        mention.span_start,
        mention.span_end,
        mention.sentence,
        encode_meta(&mention.metadata)?,
        encode_dt(now),
      ],
    )?;
  }
  Ok(())
}

// ─── Indicators ──────────────────────────────────────────────────────────────

fn upsert_indicator(
  tx: &Transaction<'_>,
  case_id: &str,
  default_dataset: &str,
  indicator: &IndicatorPayload,
  now: DateTime<Utc>,
) -> WriteResult<String> {
  let dataset = indicator
    .dataset
    .as_deref()
    .filter(|d| !d.is_empty())
    .unwrap_or(default_dataset);

  let indicator_id =
    match indicator.indicator_id.as_deref().filter(|v| !v.is_empty()) {
      Some(id) => id.to_owned(),
      None => lookup_indicator_id(tx, dataset, indicator)?
        .unwrap_or_else(|| generate_id(None)),
    };

  let confidence = quantize(indicator.confidence, 4);
  let metadata = encode_meta(&indicator.metadata)?;
  let last_seen = encode_dt(indicator.last_seen_at.unwrap_or(now));
  let now_str = encode_dt(now);

  let changed = tx.execute(
    "UPDATE indicators SET
       case_id = ?2, dataset = ?3, category = ?4, type = ?5, number = ?6,
       item = ?7, status = ?8, confidence = ?9,
       first_seen_at = COALESCE(?10, first_seen_at),
       last_seen_at = ?11, metadata = ?12, updated_at = ?13
     WHERE indicator_id = ?1",
    params![
      indicator_id,
      case_id,
      dataset,
      indicator.category,
      indicator.indicator_type,
      indicator.number,
      indicator.item,
      indicator.status,
      confidence,
      encode_opt_dt(indicator.first_seen_at),
      last_seen,
      metadata,
      now_str,
    ],
  )?;

  if changed == 0 {
    tx.execute(
      "INSERT INTO indicators (
         indicator_id, case_id, dataset, category, type, number, item,
         status, confidence, first_seen_at, last_seen_at, metadata,
         created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
      params![
        indicator_id,
        case_id,
        dataset,
        indicator.category,
        indicator.indicator_type,
        indicator.number,
        indicator.item,
        indicator.status,
        confidence,
        encode_dt(indicator.first_seen_at.unwrap_or(now)),
        last_seen,
        encode_meta(&indicator.metadata)?,
        now_str,
      ],
    )?;
  }
  Ok(indicator_id)
}

fn lookup_indicator_id(
  tx: &Transaction<'_>,
  dataset: &str,
  indicator: &IndicatorPayload,
) -> WriteResult<Option<String>> {
  let id: Option<String> = tx
    .query_row(
      "SELECT indicator_id FROM indicators
       WHERE dataset = ?1 AND category = ?2 AND number = ?3",
      params![dataset, indicator.category, indicator.number],
      |row| row.get(0),
    )
    .optional()?;
  Ok(id)
}

fn replace_sources(
  tx: &Transaction<'_>,
  indicator_id: &str,
  indicator: &IndicatorPayload,
  doc_aliases: &HashMap<String, String>,
  entity_aliases: &HashMap<String, String>,
  now: DateTime<Utc>,
) -> WriteResult<()> {
  tx.execute(
    "DELETE FROM indicator_sources WHERE indicator_id = ?1",
    params![indicator_id],
  )?;

  for source in &indicator.sources {
    let document_id = resolve_document(
      source.document_id.as_deref(),
      source.document_alias.as_deref(),
      doc_aliases,
    )
    .ok_or_else(|| {
      WriteError::Validation(format!(
        "indicator source for {indicator_id} is missing a resolvable \
         document reference"
      ))
    })?;

    let entity_id = match (
      source.entity_id.as_deref().filter(|v| !v.is_empty()),
      source.entity_alias.as_deref().filter(|v| !v.is_empty()),
    ) {
      (Some(id), _) => Some(id.to_owned()),
      (None, Some(alias)) => Some(
        entity_aliases.get(alias).cloned().ok_or_else(|| {
          WriteError::Validation(format!("unknown entity alias {alias:?}"))
        })?,
      ),
      (None, None) => None,
    };

    tx.execute(
      "INSERT INTO indicator_sources (
         indicator_id, document_id, entity_id, evidence_score,
         explanation, metadata, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      params![
        indicator_id,
        document_id,
        entity_id,
        quantize_opt(source.evidence_score, 4),
        source.explanation,
        encode_meta(&source.metadata)?,
        encode_dt(now),
      ],
    )?;
  }
  Ok(())
}

// ─── Alias resolution ────────────────────────────────────────────────────────

fn resolve_document(
  explicit: Option<&str>,
  alias: Option<&str>,
  doc_aliases: &HashMap<String, String>,
) -> Option<String> {
  if let Some(id) = explicit.filter(|v| !v.is_empty()) {
    return Some(id.to_owned());
  }
  alias.and_then(|a| doc_aliases.get(a).cloned())
}
