//! The synchronization watermark for one remote project.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How far log synchronization has progressed for `project_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
  pub project_name:      String,
  pub last_synchronized: DateTime<Utc>,
}

impl Checkpoint {
  /// A checkpoint for a project that has never been synchronized. Its
  /// watermark predates any possible log entry.
  pub fn initial(project_name: impl Into<String>) -> Self {
    Self {
      project_name:      project_name.into(),
      last_synchronized: epoch(),
    }
  }
}

/// 1900-01-01T00:00:00Z.
pub fn epoch() -> DateTime<Utc> {
  NaiveDate::from_ymd_opt(1900, 1, 1)
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|dt| dt.and_utc())
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
