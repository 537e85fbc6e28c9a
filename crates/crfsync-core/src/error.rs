//! Error types for `crfsync-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("log action {0:?} does not name a patient record")]
  MissingPatient(String),

  #[error("unrecognised log timestamp: {0:?}")]
  InvalidTimestamp(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
