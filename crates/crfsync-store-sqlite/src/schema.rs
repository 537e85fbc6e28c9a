//! SQL schema for the crfsync SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Patients are never deleted; only their records are.
CREATE TABLE IF NOT EXISTS patients (
    patient_id    TEXT PRIMARY KEY,
    external_key  TEXT NOT NULL UNIQUE,
    created_at    TEXT NOT NULL
);

-- One row per form instance. Soft-deleted rows are kept as history.
CREATE TABLE IF NOT EXISTS logical_records (
    record_id   TEXT PRIMARY KEY,
    patient_id  TEXT NOT NULL REFERENCES patients(patient_id),
    form_name   TEXT NOT NULL,
    instance    INTEGER,            -- NULL for non-repeating forms
    deleted     INTEGER NOT NULL DEFAULT 0,
    verified    INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,      -- ISO 8601 UTC
    updated_at  TEXT NOT NULL
);

-- At most one live record per (patient, form, instance). NULL instances are
-- folded to 0 so they collide with each other.
CREATE UNIQUE INDEX IF NOT EXISTS logical_records_live_idx
    ON logical_records(patient_id, form_name, COALESCE(instance, 0))
    WHERE deleted = 0;

CREATE INDEX IF NOT EXISTS logical_records_patient_idx
    ON logical_records(patient_id);

-- Last write wins per (record, field key).
CREATE TABLE IF NOT EXISTS fields (
    record_id  TEXT NOT NULL REFERENCES logical_records(record_id),
    field_key  TEXT NOT NULL,
    value      TEXT NOT NULL,
    PRIMARY KEY (record_id, field_key)
);

CREATE TABLE IF NOT EXISTS checkpoints (
    project_name       TEXT PRIMARY KEY,
    last_synchronized  TEXT NOT NULL
);

PRAGMA user_version = 1;
";
