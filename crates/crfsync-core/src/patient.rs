//! Patient — the identity every logical record hangs off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A patient as known to the remote project.
///
/// Created the first time a log entry references `external_key` and never
/// deleted; deletion only ever applies to the patient's logical records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
  pub patient_id:   Uuid,
  /// The remote record identifier (e.g. `"1001"`).
  pub external_key: String,
  pub created_at:   DateTime<Utc>,
}
