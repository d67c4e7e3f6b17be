//! [`SqliteStore`] — the SQLite implementation of [`CaseStore`].

use std::{collections::HashSet, path::Path, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use casegraph_core::{
  bundle::{CanonicalIds, CaseBundle, generate_id},
  fanout::Backend,
  hash::sha256_hex,
  query::{
    CaseHit, CaseMatch, IndicatorQuery, StructuredQuery, loss_in_buckets,
    parse_loss_buckets,
  },
  store::{CaseStore, RetryItem, RunStatus},
};

use crate::{
  Error, Result,
  encode::{RawRetryItem, encode_dt},
  query as sql_query,
  schema::SCHEMA,
  writer::{self, WriteError},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A casegraph evidence store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn add_seconds(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
  now + chrono::Duration::seconds(delay.as_secs() as i64)
}

// ─── CaseStore impl ──────────────────────────────────────────────────────────

impl CaseStore for SqliteStore {
  type Error = Error;

  // ── Case graph ────────────────────────────────────────────────────────────

  async fn persist_bundle(&self, bundle: CaseBundle) -> Result<CanonicalIds> {
    if bundle.case.dataset.trim().is_empty() {
      return Err(Error::validation("case payload is missing a dataset"));
    }
    let raw_hash = match (&bundle.case.raw_text_sha256, &bundle.case.text) {
      (Some(hash), _) if !hash.is_empty() => hash.clone(),
      (_, Some(text)) if !text.is_empty() => sha256_hex(text),
      _ => {
        return Err(Error::validation(
          "case payload must include non-empty text or raw_text_sha256",
        ));
      }
    };

    let case_id = generate_id(bundle.case.case_id.as_deref());
    let now = Utc::now();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match writer::persist_bundle_tx(&tx, &bundle, &case_id, &raw_hash, now)
        {
          Ok(ids) => {
            tx.commit()?;
            Ok(Ok(ids))
          }
          // Dropping the transaction rolls the bundle back.
          Err(WriteError::Validation(message)) => Ok(Err(message)),
          Err(WriteError::Sql(e)) => Err(e.into()),
          Err(WriteError::Json(e)) => {
            Err(tokio_rusqlite::Error::Other(Box::new(e)))
          }
        }
      })
      .await?;

    outcome.map_err(Error::validation)
  }

  // ── Retrieval ─────────────────────────────────────────────────────────────

  async fn filter_cases(&self, query: &StructuredQuery) -> Result<Vec<CaseHit>> {
    let query = query.clone();
    let raws = self
      .conn
      .call(move |conn| Ok(sql_query::filter_cases(conn, &query)?))
      .await?;
    raws.into_iter().map(|raw| raw.into_hit()).collect()
  }

  async fn search_by_indicator(
    &self,
    query: &IndicatorQuery,
  ) -> Result<Vec<CaseMatch>> {
    let value = query.value.trim().to_owned();
    let indicator_type = query.indicator_type.trim().to_lowercase();
    if value.is_empty() || indicator_type.is_empty() {
      return Ok(Vec::new());
    }

    let limit = query.limit.max(1);
    let fetch_limit = (limit * 3).max(limit + 5).max(25) as i64;
    let mode = query.match_mode;

    let dataset_filters: Vec<String> = query
      .datasets
      .iter()
      .map(|d| d.trim().to_lowercase())
      .filter(|d| !d.is_empty())
      .collect();
    let buckets = parse_loss_buckets(&query.loss_buckets);

    let raws = self
      .conn
      .call(move |conn| {
        Ok(sql_query::indicator_rows(
          conn,
          &indicator_type,
          &value,
          mode,
          fetch_limit,
        )?)
      })
      .await?;

    let mut matches = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for raw in raws {
      if seen.contains(&raw.case_id) {
        continue;
      }
      let candidate = raw.into_match();

      if !dataset_filters.is_empty() {
        let dataset = candidate
          .dataset
          .as_deref()
          .unwrap_or("")
          .trim()
          .to_lowercase();
        if !dataset_filters.contains(&dataset) {
          continue;
        }
      }
      if !buckets.is_empty()
        && !loss_in_buckets(candidate.loss_amount, &buckets)
      {
        continue;
      }

      seen.insert(candidate.case_id.clone());
      matches.push(candidate);
      if matches.len() >= limit {
        break;
      }
    }
    Ok(matches)
  }

  // ── Retry queue ───────────────────────────────────────────────────────────

  async fn retry_enqueue(
    &self,
    case_id: &str,
    backend: Backend,
    payload: serde_json::Value,
    delay: Duration,
  ) -> Result<String> {
    let now = Utc::now();
    let next_attempt = encode_dt(add_seconds(now, delay));
    let now_str = encode_dt(now);
    let payload_json = serde_json::to_string(&payload)?;
    let case_id = case_id.to_owned();
    let backend_str = backend.as_str();
    let fresh_id = Uuid::new_v4().hyphenated().to_string();

    let retry_id = self
      .conn
      .call(move |conn| {
        let existing: Option<String> = conn
          .query_row(
            "SELECT retry_id FROM ingestion_retry_queue
             WHERE case_id = ?1 AND backend = ?2",
            rusqlite::params![case_id, backend_str],
            |row| row.get(0),
          )
          .optional()?;

        match existing {
          Some(retry_id) => {
            conn.execute(
              "UPDATE ingestion_retry_queue
               SET payload_json = ?2, next_attempt_at = ?3, updated_at = ?4
               WHERE retry_id = ?1",
              rusqlite::params![retry_id, payload_json, next_attempt, now_str],
            )?;
            tracing::info!(
              retry_id,
              backend = backend_str,
              case_id,
              "updated retry queue entry"
            );
            Ok(retry_id)
          }
          None => {
            conn.execute(
              "INSERT INTO ingestion_retry_queue (
                 retry_id, case_id, backend, payload_json, attempt_count,
                 next_attempt_at, created_at, updated_at
               ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)",
              rusqlite::params![
                fresh_id,
                case_id,
                backend_str,
                payload_json,
                next_attempt,
                now_str,
              ],
            )?;
            tracing::info!(
              retry_id = fresh_id,
              backend = backend_str,
              case_id,
              "queued retry"
            );
            Ok(fresh_id)
          }
        }
      })
      .await?;
    Ok(retry_id)
  }

  async fn retry_fetch_ready(&self, limit: usize) -> Result<Vec<RetryItem>> {
    let now_str = encode_dt(Utc::now());
    let limit = limit as i64;

    let raws: Vec<RawRetryItem> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT retry_id, case_id, backend, payload_json, attempt_count,
                  next_attempt_at
           FROM ingestion_retry_queue
           WHERE next_attempt_at <= ?1
           ORDER BY next_attempt_at ASC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![now_str, limit], |row| {
            Ok(RawRetryItem {
              retry_id:        row.get(0)?,
              case_id:         row.get(1)?,
              backend:         row.get(2)?,
              payload_json:    row.get(3)?,
              attempt_count:   row.get(4)?,
              next_attempt_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRetryItem::into_item).collect()
  }

  async fn retry_delete(&self, retry_id: &str) -> Result<()> {
    let retry_id = retry_id.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM ingestion_retry_queue WHERE retry_id = ?1",
          rusqlite::params![retry_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn retry_schedule(
    &self,
    retry_id: &str,
    delay: Duration,
  ) -> Result<Option<i64>> {
    let now = Utc::now();
    let next_attempt = encode_dt(add_seconds(now, delay));
    let now_str = encode_dt(now);
    let retry_id = retry_id.to_owned();

    let next_count = self
      .conn
      .call(move |conn| {
        let current: Option<i64> = conn
          .query_row(
            "SELECT attempt_count FROM ingestion_retry_queue
             WHERE retry_id = ?1",
            rusqlite::params![retry_id],
            |row| row.get(0),
          )
          .optional()?;

        let Some(count) = current else {
          return Ok(None);
        };
        let next_count = count + 1;
        conn.execute(
          "UPDATE ingestion_retry_queue
           SET attempt_count = ?2, next_attempt_at = ?3, updated_at = ?4
           WHERE retry_id = ?1",
          rusqlite::params![retry_id, next_count, next_attempt, now_str],
        )?;
        Ok(Some(next_count))
      })
      .await?;
    Ok(next_count)
  }

  // ── Ingestion runs ────────────────────────────────────────────────────────

  async fn run_start(
    &self,
    dataset: &str,
    source_bundle: &str,
  ) -> Result<String> {
    let run_id = Uuid::new_v4().hyphenated().to_string();
    let now_str = encode_dt(Utc::now());
    let dataset = dataset.to_owned();
    let source_bundle = source_bundle.to_owned();
    let id = run_id.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ingestion_runs (
             run_id, dataset, source_bundle, status, started_at, updated_at
           ) VALUES (?1, ?2, ?3, 'running', ?4, ?4)",
          rusqlite::params![id, dataset, source_bundle, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(run_id)
  }

  async fn run_record_case(
    &self,
    run_id: &str,
    ids: &CanonicalIds,
    secondary_writes: usize,
  ) -> Result<()> {
    let run_id = run_id.to_owned();
    let documents = ids.document_ids.len() as i64;
    let entities = ids.entity_ids.len() as i64;
    let indicators = ids.indicator_ids.len() as i64;
    let secondary = secondary_writes as i64;
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE ingestion_runs SET
             case_count = case_count + 1,
             document_count = document_count + ?2,
             entity_count = entity_count + ?3,
             indicator_count = indicator_count + ?4,
             secondary_write_count = secondary_write_count + ?5,
             updated_at = ?6
           WHERE run_id = ?1",
          rusqlite::params![
            run_id, documents, entities, indicators, secondary, now_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn run_complete(
    &self,
    run_id: &str,
    status: RunStatus,
    last_error: Option<String>,
    retry_increment: usize,
  ) -> Result<()> {
    let run_id = run_id.to_owned();
    let status_str = status.as_str();
    let retries = retry_increment as i64;
    let now_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE ingestion_runs SET
             status = ?2, last_error = ?3,
             retry_count = retry_count + ?4,
             completed_at = ?5, updated_at = ?5
           WHERE run_id = ?1",
          rusqlite::params![run_id, status_str, last_error, retries, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
