//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and UUIDs as hyphenated
//! lowercase strings. Booleans and instance numbers use native integers.

use chrono::{DateTime, Utc};
use crfsync_core::{checkpoint::Checkpoint, patient::Patient, record::LogicalRecord};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc>
// ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const PATIENT_COLUMNS: &str = "patient_id, external_key, created_at";

/// Raw strings read directly from a `patients` row.
pub struct RawPatient {
  pub patient_id:   String,
  pub external_key: String,
  pub created_at:   String,
}

impl RawPatient {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      patient_id:   row.get(0)?,
      external_key: row.get(1)?,
      created_at:   row.get(2)?,
    })
  }

  pub fn into_patient(self) -> Result<Patient> {
    Ok(Patient {
      patient_id:   decode_uuid(&self.patient_id)?,
      external_key: self.external_key,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const RECORD_COLUMNS: &str = "record_id, patient_id, form_name, instance, deleted, verified, \
                                  created_at, updated_at";

/// Raw values read directly from a `logical_records` row.
pub struct RawRecord {
  pub record_id:  String,
  pub patient_id: String,
  pub form_name:  String,
  pub instance:   Option<u32>,
  pub deleted:    bool,
  pub verified:   bool,
  pub created_at: String,
  pub updated_at: String,
}

impl RawRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:  row.get(0)?,
      patient_id: row.get(1)?,
      form_name:  row.get(2)?,
      instance:   row.get(3)?,
      deleted:    row.get(4)?,
      verified:   row.get(5)?,
      created_at: row.get(6)?,
      updated_at: row.get(7)?,
    })
  }

  pub fn into_record(self) -> Result<LogicalRecord> {
    Ok(LogicalRecord {
      record_id:  decode_uuid(&self.record_id)?,
      patient_id: decode_uuid(&self.patient_id)?,
      form_name:  self.form_name,
      instance:   self.instance,
      deleted:    self.deleted,
      verified:   self.verified,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `checkpoints` row.
pub struct RawCheckpoint {
  pub project_name:      String,
  pub last_synchronized: String,
}

impl RawCheckpoint {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      project_name:      row.get(0)?,
      last_synchronized: row.get(1)?,
    })
  }

  pub fn into_checkpoint(self) -> Result<Checkpoint> {
    Ok(Checkpoint {
      project_name:      self.project_name,
      last_synchronized: decode_dt(&self.last_synchronized)?,
    })
  }
}
