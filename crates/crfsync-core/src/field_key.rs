//! Field-key conventions shared by the log format and the record export.
//!
//! Checkbox options appear in log details as `q1(3)` and in record exports
//! as `q1___3`. Both refer to option `3` of field `q1`; the store keeps the
//! log spelling.

use std::borrow::Cow;

/// Export columns starting with this prefix are bookkeeping, not form data.
pub const BOOKKEEPING_PREFIX: &str = "redcap_";

/// Strip a checkbox option suffix: `q1(3)` → `q1`. Other keys are returned
/// unchanged.
pub fn base_key(key: &str) -> &str {
  if !key.ends_with(')') {
    return key;
  }
  match key.find('(') {
    Some(open) if open > 0 => &key[..open],
    _ => key,
  }
}

/// Rewrite an export column name into the log spelling: `q1___3` → `q1(3)`.
pub fn canonical_export_key(key: &str) -> Cow<'_, str> {
  match key.split_once("___") {
    Some((field, option)) if !field.is_empty() && !option.is_empty() => {
      Cow::Owned(format!("{field}({option})"))
    }
    _ => Cow::Borrowed(key),
  }
}

pub fn is_bookkeeping_key(key: &str) -> bool { key.starts_with(BOOKKEEPING_PREFIX) }

/// The completion-state field every form carries.
pub fn complete_key(form: &str) -> String { format!("{form}_complete") }

/// The workflow status field of `form`, e.g. `baseline_status`.
pub fn status_key(form: &str, suffix: &str) -> String { format!("{form}{suffix}") }
