//! Logical records — one filled-out form (CRF instance) for one patient.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One instance of a form for one patient.
///
/// At most one non-deleted record exists per `(patient_id, form_name,
/// instance)`. Soft-deleted rows are kept as history and are never revived; a
/// later write for the same key creates a fresh record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalRecord {
  pub record_id:  Uuid,
  pub patient_id: Uuid,
  pub form_name:  String,
  /// `None` for non-repeating forms; `Some(n >= 1)` for repeating ones.
  pub instance:   Option<u32>,
  pub deleted:    bool,
  pub verified:   bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Input to [`SyncStore::create_record`](crate::store::SyncStore::create_record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
  pub patient_id: Uuid,
  pub form_name:  String,
  pub instance:   Option<u32>,
  pub verified:   bool,
}

/// The identity a log entry is routed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
  pub patient:  String,
  pub form:     String,
  pub instance: Option<u32>,
}

impl std::fmt::Display for RecordKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.instance {
      Some(n) => write!(f, "{}/{}#{}", self.patient, self.form, n),
      None => write!(f, "{}/{}", self.patient, self.form),
    }
  }
}
