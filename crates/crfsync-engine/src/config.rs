//! Engine configuration.

use serde::{Deserialize, Deserializer};

/// How log entries are routed and how verification is detected.
///
/// Deserialised from the `[sync]`-level keys of the configuration file; every
/// field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Expected remote project title. When set, a remote reporting a different
  /// title is treated as a schema conflict.
  pub project:               Option<String>,
  /// Status-field values meaning "signed" / "signed addendum". Accepts a
  /// list or a comma-separated string (`CRFSYNC_VERIFIED_STATUS_CODES=4,5`).
  #[serde(deserialize_with = "status_codes")]
  pub verified_status_codes: Vec<String>,
  /// Suffix appended to a form name to build its status field.
  pub status_field_suffix:   String,
  /// The record-identifier field present in every form; never routed or
  /// stored as form data.
  pub record_id_field:       String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      project:               None,
      verified_status_codes: vec!["4".into(), "5".into()],
      status_field_suffix:   "_status".into(),
      record_id_field:       "record_id".into(),
    }
  }
}

impl SyncConfig {
  pub fn is_verified_code(&self, value: &str) -> bool {
    self.verified_status_codes.iter().any(|c| c == value.trim())
  }
}

fn status_codes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Codes {
    List(Vec<String>),
    Joined(String),
  }

  Ok(match Codes::deserialize(deserializer)? {
    Codes::List(codes) => codes,
    Codes::Joined(joined) => joined
      .split(',')
      .map(str::trim)
      .filter(|code| !code.is_empty())
      .map(str::to_owned)
      .collect(),
  })
}
