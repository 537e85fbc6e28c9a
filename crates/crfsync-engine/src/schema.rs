//! [`SchemaIndex`] — which form owns which field.
//!
//! Built once per batch from the remote metadata export and used only to
//! route log entries; it is never a source of data.

use std::collections::{BTreeSet, HashMap, HashSet};

use crfsync_core::{
  field_key::{base_key, complete_key},
  remote::FormField,
};

#[derive(Debug, Clone, Default)]
pub struct SchemaIndex {
  owners:    HashMap<String, String>,
  repeating: HashSet<String>,
  forms:     BTreeSet<String>,
}

impl SchemaIndex {
  /// Index `fields`. Every form also owns its `<form>_complete` field. When
  /// metadata lists a key under several forms, the first listing wins.
  pub fn build(fields: &[FormField]) -> Self {
    let mut index = SchemaIndex::default();

    for field in fields {
      index.forms.insert(field.form_name.clone());
      if field.is_repeating {
        index.repeating.insert(field.form_name.clone());
      }
      index
        .owners
        .entry(field.field_key.clone())
        .or_insert_with(|| field.form_name.clone());
    }

    for form in &index.forms {
      index
        .owners
        .entry(complete_key(form))
        .or_insert_with(|| form.clone());
    }

    index
  }

  /// The form owning `field_key`. Checkbox option keys (`q1(3)`) resolve
  /// through their base field (`q1`).
  pub fn owning_form(&self, field_key: &str) -> Option<&str> {
    self
      .owners
      .get(field_key)
      .or_else(|| self.owners.get(base_key(field_key)))
      .map(String::as_str)
  }

  pub fn is_repeating(&self, form_name: &str) -> bool { self.repeating.contains(form_name) }

  /// Route a set of keys: the form owning the first key that resolves.
  pub fn resolve_form<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> Option<&str> {
    keys.into_iter().find_map(|key| self.owning_form(key))
  }

  /// Whether `field_key` is defined on `form_name`.
  pub fn defines(&self, form_name: &str, field_key: &str) -> bool {
    self.owning_form(field_key) == Some(form_name)
  }

  pub fn forms(&self) -> impl Iterator<Item = &str> { self.forms.iter().map(String::as_str) }

  pub fn is_empty(&self) -> bool { self.owners.is_empty() }
}
