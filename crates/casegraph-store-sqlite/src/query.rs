//! Read-side SQL for structured case lookup and indicator search.
//!
//! These helpers run inside the connection thread and return raw rows; the
//! store converts them to domain types outside the closure.

use casegraph_core::query::{EntityFilter, MatchMode, StructuredQuery};
use rusqlite::{Connection, types::Value};

use crate::encode::{RawCaseHit, RawIndicatorRow};

/// Escape `%`, `_`, and the escape character itself for a LIKE pattern.
fn like_escape(value: &str) -> String {
  let mut escaped = String::with_capacity(value.len());
  for ch in value.chars() {
    if matches!(ch, '%' | '_' | '\\') {
      escaped.push('\\');
    }
    escaped.push(ch);
  }
  escaped
}

/// SQL predicate plus bind value for one indicator-value filter.
fn value_predicate(column: &str, value: &str, mode: MatchMode) -> (String, String) {
  let lowered = value.to_lowercase();
  match mode {
    MatchMode::Exact => (format!("lower({column}) = ?"), lowered),
    MatchMode::Prefix => (
      format!("lower({column}) LIKE ? ESCAPE '\\'"),
      format!("{}%", like_escape(&lowered)),
    ),
    MatchMode::Contains => (
      format!("lower({column}) LIKE ? ESCAPE '\\'"),
      format!("%{}%", like_escape(&lowered)),
    ),
  }
}

fn placeholders(count: usize) -> String {
  std::iter::repeat_n("?", count).collect::<Vec<_>>().join(", ")
}

// ─── Structured lookup ───────────────────────────────────────────────────────

/// Case rows matching every supplied filter kind. Values within a kind are
/// an IN-list; entity filters require a matching indicator to exist.
pub(crate) fn filter_cases(
  conn: &Connection,
  query: &StructuredQuery,
) -> rusqlite::Result<Vec<RawCaseHit>> {
  let mut conds: Vec<String> = vec!["c.is_deleted = 0".to_owned()];
  let mut params: Vec<Value> = Vec::new();

  if !query.classifications.is_empty() {
    conds.push(format!(
      "lower(c.classification) IN ({})",
      placeholders(query.classifications.len())
    ));
    params.extend(
      query
        .classifications
        .iter()
        .map(|v| Value::Text(v.to_lowercase())),
    );
  }

  if !query.datasets.is_empty() {
    conds.push(format!(
      "lower(c.dataset) IN ({})",
      placeholders(query.datasets.len())
    ));
    params
      .extend(query.datasets.iter().map(|v| Value::Text(v.to_lowercase())));
  }

  if !query.case_ids.is_empty() {
    conds.push(format!(
      "c.case_id IN ({})",
      placeholders(query.case_ids.len())
    ));
    params.extend(query.case_ids.iter().map(|v| Value::Text(v.clone())));
  }

  for EntityFilter { entity_type, value, match_mode } in &query.entities {
    let (pred, bind) = value_predicate("i.number", value, *match_mode);
    conds.push(format!(
      "EXISTS (SELECT 1 FROM indicators i
        WHERE i.case_id = c.case_id AND lower(i.type) = ? AND {pred})"
    ));
    params.push(Value::Text(entity_type.to_lowercase()));
    params.push(Value::Text(bind));
  }

  let limit = if query.limit == 0 { 100 } else { query.limit };
  params.push(Value::Integer(limit as i64));

  let sql = format!(
    "SELECT c.case_id, c.dataset, c.classification, c.confidence,
            c.status, c.created_at, c.metadata
     FROM cases c
     WHERE {}
     ORDER BY c.created_at DESC
     LIMIT ?",
    conds.join(" AND ")
  );

  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt
    .query_map(rusqlite::params_from_iter(params), |row| {
      Ok(RawCaseHit {
        case_id:        row.get(0)?,
        dataset:        row.get(1)?,
        classification: row.get(2)?,
        confidence:     row.get(3)?,
        status:         row.get(4)?,
        created_at:     row.get(5)?,
        metadata:       row.get(6)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

// ─── Indicator search ────────────────────────────────────────────────────────

/// Indicator rows joined with their case, most recently seen first.
/// Overfetches so that post-SQL dataset/loss filtering and per-case dedup
/// can still fill the caller's limit.
pub(crate) fn indicator_rows(
  conn: &Connection,
  indicator_type: &str,
  value: &str,
  mode: MatchMode,
  fetch_limit: i64,
) -> rusqlite::Result<Vec<RawIndicatorRow>> {
  let (pred, bind) = value_predicate("i.number", value, mode);
  let sql = format!(
    "SELECT i.case_id, i.type, i.number, i.dataset, i.metadata,
            c.dataset, c.classification, c.metadata
     FROM indicators i
     JOIN cases c ON c.case_id = i.case_id
     WHERE c.is_deleted = 0 AND lower(i.type) = ? AND {pred}
     ORDER BY i.last_seen_at IS NULL, i.last_seen_at DESC
     LIMIT ?"
  );

  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt
    .query_map(
      rusqlite::params![indicator_type.to_lowercase(), bind, fetch_limit],
      |row| {
        Ok(RawIndicatorRow {
          case_id:            row.get(0)?,
          indicator_type:     row.get(1)?,
          number:             row.get(2)?,
          indicator_dataset:  row.get(3)?,
          indicator_metadata: row.get(4)?,
          case_dataset:       row.get(5)?,
          classification:     row.get(6)?,
          case_metadata:      row.get(7)?,
        })
      },
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn like_patterns_are_escaped() {
    assert_eq!(like_escape("10%_x\\"), "10\\%\\_x\\\\");
  }

  #[test]
  fn predicate_shapes() {
    let (pred, bind) = value_predicate("i.number", "AbC", MatchMode::Exact);
    assert_eq!(pred, "lower(i.number) = ?");
    assert_eq!(bind, "abc");

    let (_, bind) = value_predicate("i.number", "12%", MatchMode::Prefix);
    assert_eq!(bind, "12\\%%");

    let (_, bind) = value_predicate("i.number", "12", MatchMode::Contains);
    assert_eq!(bind, "%12%");
  }
}
