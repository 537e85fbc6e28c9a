//! Stored data the current form metadata no longer accounts for.

use std::{collections::BTreeMap, fmt};

use crfsync_core::store::StoredFieldKey;
use serde::Serialize;

use crate::schema::SchemaIndex;

/// Per form, the stored field keys the schema does not define on that form.
///
/// Such fields were written under an older version of the project metadata.
/// They stay in the store, but new log entries carrying only those keys can
/// no longer be routed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDrift {
  pub unknown: BTreeMap<String, Vec<String>>,
}

impl SchemaDrift {
  pub fn detect(schema: &SchemaIndex, stored: impl IntoIterator<Item = StoredFieldKey>) -> Self {
    let mut unknown: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for StoredFieldKey { form_name, field_key } in stored {
      if !schema.defines(&form_name, &field_key) {
        unknown.entry(form_name).or_default().push(field_key);
      }
    }
    Self { unknown }
  }

  pub fn is_empty(&self) -> bool { self.unknown.is_empty() }
}

impl fmt::Display for SchemaDrift {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      return writeln!(f, "no schema drift");
    }
    for (form, keys) in &self.unknown {
      writeln!(f, "{form}: {}", keys.join(", "))?;
    }
    Ok(())
  }
}
