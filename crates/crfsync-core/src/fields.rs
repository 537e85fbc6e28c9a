//! [`FieldMap`] — an insertion-ordered mapping of field key to raw value.
//!
//! Log details and record exports are both represented as a `FieldMap`.
//! Re-inserting an existing key overwrites its value in place, so the key
//! keeps the position of its first occurrence.

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
  entries: Vec<(String, String)>,
}

impl FieldMap {
  pub fn new() -> Self { Self::default() }

  /// Insert or overwrite `key`. Returns the previous value, if any.
  pub fn insert(
    &mut self,
    key: impl Into<String>,
    value: impl Into<String>,
  ) -> Option<String> {
    let key = key.into();
    let value = value.into();
    match self.entries.iter_mut().find(|(k, _)| *k == key) {
      Some((_, existing)) => Some(std::mem::replace(existing, value)),
      None => {
        self.entries.push((key, value));
        None
      }
    }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .entries
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  pub fn contains_key(&self, key: &str) -> bool { self.get(key).is_some() }

  /// Remove `key`, preserving the order of the remaining entries.
  pub fn remove(&mut self, key: &str) -> Option<String> {
    let pos = self.entries.iter().position(|(k, _)| k == key)?;
    Some(self.entries.remove(pos).1)
  }

  /// Keep only the entries for which `keep(key, value)` is true.
  pub fn retain<F>(&mut self, mut keep: F)
  where
    F: FnMut(&str, &str) -> bool,
  {
    self.entries.retain(|(k, v)| keep(k.as_str(), v.as_str()));
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(k, _)| k.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }
}

impl<K, V> FromIterator<(K, V)> for FieldMap
where
  K: Into<String>,
  V: Into<String>,
{
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut map = FieldMap::new();
    for (k, v) in iter {
      map.insert(k, v);
    }
    map
  }
}

impl IntoIterator for FieldMap {
  type Item = (String, String);
  type IntoIter = std::vec::IntoIter<(String, String)>;

  fn into_iter(self) -> Self::IntoIter { self.entries.into_iter() }
}

impl Serialize for FieldMap {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(self.iter())
  }
}
