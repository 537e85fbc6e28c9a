//! Error types for the synchronization engine.
//!
//! [`Error`] aborts a run. [`EntryFailure`] is recorded against a single log
//! entry and only fails the run once the whole batch has been attempted.

use thiserror::Error;

use crate::report::SyncReport;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("schema conflict: store tracks {local:?} but the remote project is {remote:?}")]
  SchemaConflict { local: Vec<String>, remote: String },

  #[error("store error: {0}")]
  Storage(#[source] BoxError),

  #[error("remote error: {0}")]
  Remote(#[source] BoxError),

  #[error(
    "{} log entries failed to apply; checkpoint not advanced\n{}",
    .0.failures.len(),
    .0
  )]
  EntriesFailed(Box<SyncReport>),
}

impl Error {
  pub(crate) fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Storage(Box::new(e))
  }

  pub(crate) fn remote(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Remote(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why one log entry could not be applied.
#[derive(Debug, Error)]
pub enum EntryFailure {
  #[error("unparseable details: {0}")]
  Parse(#[from] crfsync_details::Error),

  #[error("no field maps to a known form: {keys:?}")]
  UnresolvedForm { keys: Vec<String> },

  #[error(transparent)]
  Log(#[from] crfsync_core::Error),
}
