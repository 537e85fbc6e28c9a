//! [`ExportDir`] — a remote project read from a directory of JSON exports.
//!
//! ```text
//! <dir>/project.json    {"title": "Study A"}
//! <dir>/metadata.json   [{"field_key": "q1", "form_name": "baseline", "is_repeating": false}, …]
//! <dir>/logs.json       [{"timestamp": "2024-09-24 11:11", "username": "alice",
//!                         "action": "Update record 1001", "details": "q1 = 'x'"}, …]
//! <dir>/records.json    [{"record": "1001", "form": "baseline", "instance": null,
//!                         "fields": {"q1": "x", "q3___2": "1"}}, …]
//! ```
//!
//! Files are re-read on every call, so a long-lived process sees fresh
//! exports.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use crfsync_core::{
  FieldMap,
  log::{RawLogEntry, parse_log_timestamp},
  remote::{FormField, RemoteProject},
};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to read {path:?}: {source}")]
  Io {
    path:   PathBuf,
    source: std::io::Error,
  },

  #[error("invalid JSON in {path:?}: {source}")]
  Json {
    path:   PathBuf,
    source: serde_json::Error,
  },

  #[error(transparent)]
  Log(#[from] crfsync_core::Error),
}

// ─── File shapes ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ProjectFile {
  title: String,
}

#[derive(Deserialize)]
struct LogLine {
  timestamp: String,
  #[serde(default)]
  username:  String,
  action:    String,
  #[serde(default)]
  details:   String,
  #[serde(default)]
  record:    Option<String>,
}

impl LogLine {
  fn into_entry(self) -> Result<RawLogEntry, Error> {
    Ok(RawLogEntry {
      timestamp: parse_log_timestamp(&self.timestamp)?,
      username:  self.username,
      action:    self.action,
      details:   self.details,
      record:    self.record,
    })
  }
}

#[derive(Deserialize)]
struct RecordRow {
  record:   String,
  form:     String,
  #[serde(default)]
  instance: Option<u32>,
  fields:   BTreeMap<String, String>,
}

// ─── Remote ──────────────────────────────────────────────────────────────────

pub struct ExportDir {
  root: PathBuf,
}

impl ExportDir {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  async fn read<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
    let path = self.root.join(name);
    let bytes = tokio::fs::read(&path)
      .await
      .map_err(|source| Error::Io { path: path.clone(), source })?;
    serde_json::from_slice(&bytes).map_err(|source| Error::Json { path, source })
  }
}

impl RemoteProject for ExportDir {
  type Error = Error;

  async fn project_title(&self) -> Result<String, Error> {
    let project: ProjectFile = self.read("project.json").await?;
    Ok(project.title)
  }

  async fn export_logs(
    &self,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> Result<Vec<RawLogEntry>, Error> {
    let lines: Vec<LogLine> = self.read("logs.json").await?;
    let mut entries = Vec::with_capacity(lines.len());
    for line in lines {
      let entry = line.into_entry()?;
      if since <= entry.timestamp && entry.timestamp <= until {
        entries.push(entry);
      }
    }
    Ok(entries)
  }

  async fn export_record(
    &self,
    patient: &str,
    form_name: &str,
    instance: Option<u32>,
  ) -> Result<FieldMap, Error> {
    let rows: Vec<RecordRow> = self.read("records.json").await?;
    Ok(
      rows
        .into_iter()
        .find(|r| r.record == patient && r.form == form_name && r.instance == instance)
        .map(|r| r.fields.into_iter().collect())
        .unwrap_or_default(),
    )
  }

  async fn export_form_metadata(&self) -> Result<Vec<FormField>, Error> {
    self.read("metadata.json").await
  }
}
