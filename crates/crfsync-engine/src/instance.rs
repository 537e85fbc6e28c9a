//! Repeating-instance resolution.

/// Decide which instance a log entry addresses.
///
/// Repeating forms use the entry's `[instance = N]` marker, or `1` when the
/// marker is absent (first-instance entries omit it). Non-repeating forms
/// never carry an instance, whatever the entry says.
pub fn resolve_instance(marker: Option<u32>, repeating: bool) -> Option<u32> {
  repeating.then(|| marker.unwrap_or(1))
}
