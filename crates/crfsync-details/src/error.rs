//! Error types for the details parser.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("expected `key = value` at byte {offset}, found {segment:?}")]
  MissingAssignment { offset: usize, segment: String },

  #[error("empty field key at byte {offset}")]
  EmptyKey { offset: usize },

  #[error("no closing quote for {key:?} (opened at byte {offset})")]
  UnterminatedQuote { key: String, offset: usize },

  #[error("malformed instance marker: {0:?}")]
  MalformedInstance(String),

  #[error("unexpected {found:?} at byte {offset}; expected `,` or end of input")]
  UnexpectedInput { offset: usize, found: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
