//! Audit-log entries and their classification into record mutations.
//!
//! The remote project logs every action as a human-oriented line such as
//! `Update record 1001` with a free-text `details` string. Only record
//! create/update/delete actions are relevant to the mirror.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Raw entry ───────────────────────────────────────────────────────────────

/// One audit-log line as exported by the remote project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLogEntry {
  pub timestamp: DateTime<Utc>,
  pub username:  String,
  pub action:    String,
  #[serde(default)]
  pub details:   String,
  /// The record the action applies to, when the export supplies it.
  #[serde(default)]
  pub record:    Option<String>,
}

// ─── Classified entry ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutation {
  Create,
  Update,
  Delete,
}

impl Mutation {
  const PREFIXES: [(&'static str, Mutation); 3] = [
    ("create record", Mutation::Create),
    ("update record", Mutation::Update),
    ("delete record", Mutation::Delete),
  ];

  /// Match the action prefix case-insensitively and return the remainder.
  fn split_action(action: &str) -> Option<(Mutation, &str)> {
    let trimmed = action.trim_start();
    Self::PREFIXES.iter().find_map(|(prefix, mutation)| {
      let head = trimmed.get(..prefix.len())?;
      head
        .eq_ignore_ascii_case(prefix)
        .then(|| (*mutation, &trimmed[prefix.len()..]))
    })
  }
}

/// A log entry known to mutate a patient record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
  pub timestamp: DateTime<Utc>,
  pub actor:     String,
  pub mutation:  Mutation,
  pub patient:   String,
  pub details:   String,
}

impl LogEntry {
  /// Classify a raw log line.
  ///
  /// Returns `Ok(None)` for actions that do not mutate records (exports,
  /// user management, …) and an error for a mutation whose patient cannot be
  /// determined.
  pub fn classify(raw: RawLogEntry) -> Result<Option<LogEntry>> {
    let Some((mutation, rest)) = Mutation::split_action(&raw.action) else {
      return Ok(None);
    };

    let patient = raw
      .record
      .as_deref()
      .map(str::trim)
      .filter(|r| !r.is_empty())
      .map(str::to_owned)
      .or_else(|| patient_from_action(rest))
      .ok_or_else(|| Error::MissingPatient(raw.action.clone()))?;

    Ok(Some(LogEntry {
      timestamp: raw.timestamp,
      actor: raw.username,
      mutation,
      patient,
      details: raw.details,
    }))
  }
}

/// `"(API) 1001 (Auto calculation)"` → `"1001"`.
fn patient_from_action(rest: &str) -> Option<String> {
  let mut depth = 0usize;
  for token in rest.split_whitespace() {
    if depth == 0 && !token.starts_with('(') {
      return Some(token.to_owned());
    }
    depth += token.matches('(').count();
    depth = depth.saturating_sub(token.matches(')').count());
  }
  None
}

// ─── Timestamps ──────────────────────────────────────────────────────────────

/// Parse a log timestamp. Accepts RFC 3339 and the minute/second-resolution
/// `YYYY-MM-DD HH:MM[:SS]` forms used by log exports, the latter taken as UTC.
pub fn parse_log_timestamp(s: &str) -> Result<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .map(|naive| naive.and_utc())
    .ok_or_else(|| Error::InvalidTimestamp(s.to_owned()))
}
