//! The `RemoteProject` trait — the data-capture service being mirrored.
//!
//! How the remote is reached (HTTP API, export files, a test double) is the
//! implementor's concern; the engine only consumes these four exports.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{fields::FieldMap, log::RawLogEntry};

/// One field definition from the project metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
  pub field_key:    String,
  pub form_name:    String,
  /// Whether `form_name` allows several instances per patient.
  #[serde(default)]
  pub is_repeating: bool,
}

pub trait RemoteProject: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The project's display title; checked against the local checkpoint.
  fn project_title(
    &self,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;

  /// Audit-log lines with `since <= timestamp <= until`.
  fn export_logs(
    &self,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<RawLogEntry>, Self::Error>> + Send + '_;

  /// The current field values of one form instance. An empty map means the
  /// record (or the instance) no longer exists upstream.
  fn export_record<'a>(
    &'a self,
    patient: &'a str,
    form_name: &'a str,
    instance: Option<u32>,
  ) -> impl Future<Output = Result<FieldMap, Self::Error>> + Send + 'a;

  /// Field definitions of every form in the project.
  fn export_form_metadata(
    &self,
  ) -> impl Future<Output = Result<Vec<FormField>, Self::Error>> + Send + '_;
}
