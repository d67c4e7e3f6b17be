//! SQL schema for the casegraph SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS cases (
    case_id          TEXT PRIMARY KEY,
    ingestion_run_id TEXT,
    dataset          TEXT NOT NULL,
    source_type      TEXT NOT NULL,
    classification   TEXT NOT NULL,
    confidence       REAL,
    detected_at      TEXT,
    reported_at      TEXT,
    raw_text_sha256  TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'open',
    metadata         TEXT,            -- JSON
    is_deleted       INTEGER NOT NULL DEFAULT 0,
    deleted_at       TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE (dataset, raw_text_sha256)
);

CREATE TABLE IF NOT EXISTS source_documents (
    document_id TEXT PRIMARY KEY,
    case_id     TEXT NOT NULL REFERENCES cases(case_id),
    title       TEXT,
    source_url  TEXT,
    mime_type   TEXT,
    text        TEXT,
    text_sha256 TEXT,
    excerpt     TEXT,
    chunk_index INTEGER NOT NULL DEFAULT 0,
    chunk_count INTEGER NOT NULL DEFAULT 1,
    score       REAL,
    captured_at TEXT,
    metadata    TEXT,            -- JSON
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- One row per distinct sighting identity within a case.
CREATE TABLE IF NOT EXISTS entities (
    entity_id       TEXT PRIMARY KEY,
    case_id         TEXT NOT NULL REFERENCES cases(case_id),
    entity_type     TEXT NOT NULL,
    canonical_value TEXT NOT NULL,
    raw_value       TEXT,
    confidence      REAL,
    first_seen_at   TEXT,
    last_seen_at    TEXT,
    metadata        TEXT,            -- JSON
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (case_id, entity_type, canonical_value)
);

-- Mentions are replaced wholesale on each write; never updated in place.
CREATE TABLE IF NOT EXISTS entity_mentions (
    entity_id   TEXT NOT NULL REFERENCES entities(entity_id),
    document_id TEXT NOT NULL REFERENCES source_documents(document_id),
    span_start  INTEGER,
    span_end    INTEGER,
    sentence    TEXT,
    metadata    TEXT,            -- JSON
    created_at  TEXT NOT NULL
);

-- Indicators are shared across cases referencing the same natural key.
CREATE TABLE IF NOT EXISTS indicators (
    indicator_id  TEXT PRIMARY KEY,
    case_id       TEXT NOT NULL REFERENCES cases(case_id),
    dataset       TEXT NOT NULL,
    category      TEXT NOT NULL,
    type          TEXT NOT NULL,
    number        TEXT NOT NULL,
    item          TEXT,
    status        TEXT NOT NULL DEFAULT 'active',
    confidence    REAL,
    first_seen_at TEXT,
    last_seen_at  TEXT,
    metadata      TEXT,            -- JSON
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (dataset, category, number)
);

-- Sources are replaced wholesale per indicator, mirroring entity_mentions.
CREATE TABLE IF NOT EXISTS indicator_sources (
    indicator_id   TEXT NOT NULL REFERENCES indicators(indicator_id),
    document_id    TEXT NOT NULL REFERENCES source_documents(document_id),
    entity_id      TEXT REFERENCES entities(entity_id),
    evidence_score REAL,
    explanation    TEXT,
    metadata       TEXT,            -- JSON
    created_at     TEXT NOT NULL
);

-- At most one live row per (case_id, backend); enqueue upserts.
CREATE TABLE IF NOT EXISTS ingestion_retry_queue (
    retry_id        TEXT PRIMARY KEY,
    case_id         TEXT NOT NULL,
    backend         TEXT NOT NULL,
    payload_json    TEXT NOT NULL,
    attempt_count   INTEGER NOT NULL DEFAULT 0,
    next_attempt_at TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (case_id, backend)
);

CREATE TABLE IF NOT EXISTS ingestion_runs (
    run_id                TEXT PRIMARY KEY,
    dataset               TEXT NOT NULL,
    source_bundle         TEXT,
    status                TEXT NOT NULL DEFAULT 'running',
    case_count            INTEGER NOT NULL DEFAULT 0,
    document_count        INTEGER NOT NULL DEFAULT 0,
    entity_count          INTEGER NOT NULL DEFAULT 0,
    indicator_count       INTEGER NOT NULL DEFAULT 0,
    secondary_write_count INTEGER NOT NULL DEFAULT 0,
    retry_count           INTEGER NOT NULL DEFAULT 0,
    last_error            TEXT,
    started_at            TEXT NOT NULL,
    completed_at          TEXT,
    updated_at            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS cases_dataset_idx        ON cases(dataset);
CREATE INDEX IF NOT EXISTS documents_case_idx       ON source_documents(case_id);
CREATE INDEX IF NOT EXISTS entities_case_idx        ON entities(case_id);
CREATE INDEX IF NOT EXISTS mentions_entity_idx      ON entity_mentions(entity_id);
CREATE INDEX IF NOT EXISTS indicators_case_idx      ON indicators(case_id);
CREATE INDEX IF NOT EXISTS indicators_number_idx    ON indicators(number);
CREATE INDEX IF NOT EXISTS indicators_last_seen_idx ON indicators(last_seen_at);
CREATE INDEX IF NOT EXISTS sources_indicator_idx    ON indicator_sources(indicator_id);
CREATE INDEX IF NOT EXISTS retry_ready_idx          ON ingestion_retry_queue(next_attempt_at);

PRAGMA user_version = 1;
";
