//! Per-entry outcomes, run statistics and the aggregate failure report.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::EntryFailure;

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Why an entry changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  /// The details string was empty.
  EmptyDetails,
  /// Only bookkeeping keys (record id, instance marker, …) were present.
  NothingToRoute,
  /// The remote no longer holds the record the entry refers to.
  RemoteGone,
  /// A delete for a record the mirror does not hold (or already deleted).
  NothingToDelete,
}

/// What applying one log entry did.
#[derive(Debug)]
pub enum Outcome {
  /// A new logical record was created from the remote export.
  Created { record_id: Uuid },
  /// An existing live record received the entry's values.
  Updated { record_id: Uuid, verified_now: bool },
  /// `count` live records were soft-deleted.
  Deleted { count: usize },
  Skipped(SkipReason),
  Failed(EntryFailure),
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
  /// Raw log lines in the window.
  pub fetched:  usize,
  /// Lines that were not record mutations.
  pub ignored:  usize,
  pub created:  usize,
  pub updated:  usize,
  pub verified: usize,
  pub deleted:  usize,
  pub skipped:  usize,
  pub failed:   usize,
}

impl SyncStats {
  pub fn record(&mut self, outcome: &Outcome) {
    match outcome {
      Outcome::Created { .. } => self.created += 1,
      Outcome::Updated { verified_now, .. } => {
        self.updated += 1;
        if *verified_now {
          self.verified += 1;
        }
      }
      Outcome::Deleted { count } => self.deleted += count,
      Outcome::Skipped(_) => self.skipped += 1,
      Outcome::Failed(_) => self.failed += 1,
    }
  }

  /// Entries that were handled without failure (including no-ops).
  pub fn applied(&self) -> usize {
    self.fetched - self.ignored - self.failed
  }
}

// ─── Failures ────────────────────────────────────────────────────────────────

/// A log entry that could not be applied, with enough context to fix it by
/// hand and re-run.
#[derive(Debug)]
pub struct FailedEntry {
  pub patient:   Option<String>,
  pub timestamp: DateTime<Utc>,
  pub action:    String,
  pub details:   String,
  pub reason:    EntryFailure,
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// The result of one synchronization run.
#[derive(Debug)]
pub struct SyncReport {
  pub project:  String,
  pub since:    DateTime<Utc>,
  pub until:    DateTime<Utc>,
  pub stats:    SyncStats,
  pub failures: Vec<FailedEntry>,
}

impl SyncReport {
  pub fn is_success(&self) -> bool { self.failures.is_empty() }
}

/// Lists every failed entry.
impl fmt::Display for SyncReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "------------------------------------")?;
    writeln!(f, "project:    {}", self.project)?;
    writeln!(
      f,
      "window:     {} .. {}",
      self.since.format("%Y-%m-%d %H:%M"),
      self.until.format("%Y-%m-%d %H:%M")
    )?;
    for failure in &self.failures {
      writeln!(f, "------------")?;
      writeln!(f, "patient:    {}", failure.patient.as_deref().unwrap_or("<unknown>"))?;
      writeln!(f, "timestamp:  {}", failure.timestamp.format("%Y-%m-%d %H:%M"))?;
      writeln!(f, "action:     {}", failure.action)?;
      writeln!(f, "details:    {}", failure.details)?;
      writeln!(f, "reason:     {}", failure.reason)?;
    }
    Ok(())
  }
}
