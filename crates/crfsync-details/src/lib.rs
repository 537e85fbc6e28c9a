//! Parser for audit-log `details` strings.
//!
//! A details string is a comma-separated list of `key = value` assignments
//! describing what one log action changed:
//!
//! ```text
//! [instance = 2], q1 = 'a, b, c', q2(3) = checked, comments = 'it's fine'
//! ```
//!
//! Quoted values may contain commas and unescaped quotes, checkbox options
//! appear as bare `checked`/`unchecked` tokens, and repeating forms carry an
//! optional `[instance = N]` marker. Pure synchronous; no I/O.
//!
//! # Quick start
//!
//! ```
//! use crfsync_details::parse;
//!
//! let parsed = parse("q1 = 'a, b, c', q3 = checked").unwrap();
//! assert_eq!(parsed.fields.get("q1"), Some("a, b, c"));
//! assert_eq!(parsed.fields.get("q3"), Some("1"));
//! ```

pub mod error;
mod lexer;

use crfsync_core::FieldMap;
pub use error::{Error, Result};

// ─── Public types
// ─────────────────────────────────────────────────────────────

/// The result of parsing one details string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDetails {
  /// The `[instance = N]` marker, if the string carried one.
  pub instance: Option<u32>,
  /// Field assignments in order of first appearance.
  pub fields:   FieldMap,
}

impl ParsedDetails {
  /// True when the string assigned nothing (and carried no marker).
  pub fn is_empty(&self) -> bool { self.instance.is_none() && self.fields.is_empty() }
}

/// Value substituted for a bare `checked` token.
pub const CHECKED: &str = "1";
/// Value substituted for a bare `unchecked` token.
pub const UNCHECKED: &str = "0";

// ─── Public API
// ───────────────────────────────────────────────────────────────

/// Parse a details string. An empty or whitespace-only string yields an
/// empty [`ParsedDetails`].
pub fn parse(details: &str) -> Result<ParsedDetails> { lexer::lex(details) }
