//! [`Synchronizer`] — one store, one remote project, one run at a time.

use chrono::{DateTime, Utc};
use crfsync_core::{
  checkpoint::Checkpoint,
  log::{LogEntry, RawLogEntry},
  remote::RemoteProject,
  store::SyncStore,
};
use tracing::{info, warn};

use crate::{
  Error, Result,
  checkpoint::Checkpointer,
  config::SyncConfig,
  drift::SchemaDrift,
  reconcile::Reconciler,
  report::{FailedEntry, Outcome, SyncReport, SyncStats},
  schema::SchemaIndex,
};

pub struct Synchronizer<S, R> {
  store:  S,
  remote: R,
  config: SyncConfig,
}

impl<S, R> Synchronizer<S, R>
where
  S: SyncStore,
  R: RemoteProject,
{
  pub fn new(store: S, remote: R, config: SyncConfig) -> Self {
    Self { store, remote, config }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn remote(&self) -> &R { &self.remote }

  pub fn config(&self) -> &SyncConfig { &self.config }

  /// Pull every log entry since the checkpoint up to `until` (default: now)
  /// and apply the batch.
  ///
  /// If any entry fails, the whole report comes back as
  /// [`Error::EntriesFailed`] and the checkpoint stays put; entries that did
  /// apply are kept, and re-running is safe.
  pub async fn sync(&self, until: Option<DateTime<Utc>>) -> Result<SyncReport> {
    let until = until.unwrap_or_else(Utc::now);
    let title = self.remote.project_title().await.map_err(Error::remote)?;

    let checkpointer = Checkpointer::new(&self.store);
    let checkpoint = checkpointer
      .open(&title, self.config.project.as_deref())
      .await?;
    let since = checkpoint.last_synchronized;
    info!(project = %title, %since, %until, "starting sync");

    let schema = self.load_schema().await?;
    let entries = self
      .remote
      .export_logs(since, until)
      .await
      .map_err(Error::remote)?;

    let (stats, failures) = self.apply_batch(&schema, entries).await?;
    let report = SyncReport { project: title, since, until, stats, failures };

    if !report.is_success() {
      warn!(
        project = %report.project,
        failed = report.stats.failed,
        "sync finished with failures, checkpoint not advanced"
      );
      return Err(Error::EntriesFailed(Box::new(report)));
    }

    checkpointer.advance(&checkpoint, until).await?;
    info!(
      project = %report.project,
      created = report.stats.created,
      updated = report.stats.updated,
      deleted = report.stats.deleted,
      skipped = report.stats.skipped,
      "sync finished"
    );
    Ok(report)
  }

  /// Apply raw log lines in chronological order (ties keep export order).
  ///
  /// Every entry is attempted; per-entry failures are collected and
  /// returned alongside the counters. Store and remote errors abort.
  pub async fn apply_batch(
    &self,
    schema: &SchemaIndex,
    mut entries: Vec<RawLogEntry>,
  ) -> Result<(SyncStats, Vec<FailedEntry>)> {
    entries.sort_by_key(|e| e.timestamp);

    let reconciler = Reconciler::new(&self.store, &self.remote, schema, &self.config);
    let mut stats = SyncStats { fetched: entries.len(), ..Default::default() };
    let mut failures = Vec::new();

    for raw in entries {
      let timestamp = raw.timestamp;
      let action = raw.action.clone();
      let details = raw.details.clone();

      let (patient, outcome) = match LogEntry::classify(raw) {
        Ok(None) => {
          stats.ignored += 1;
          continue;
        }
        Ok(Some(entry)) => {
          let outcome = reconciler.apply(&entry).await?;
          (Some(entry.patient), outcome)
        }
        Err(e) => (None, Outcome::Failed(e.into())),
      };

      stats.record(&outcome);
      if let Outcome::Failed(reason) = outcome {
        warn!(
          patient = patient.as_deref().unwrap_or("<unknown>"),
          %timestamp,
          %reason,
          "log entry failed"
        );
        failures.push(FailedEntry { patient, timestamp, action, details, reason });
      }
    }

    Ok((stats, failures))
  }

  /// Index the remote form metadata.
  pub async fn load_schema(&self) -> Result<SchemaIndex> {
    let fields = self
      .remote
      .export_form_metadata()
      .await
      .map_err(Error::remote)?;
    let schema = SchemaIndex::build(&fields);
    if schema.is_empty() {
      warn!("remote metadata defines no fields; no entry can be routed");
    }
    Ok(schema)
  }

  /// Stored fields the current remote metadata no longer defines.
  pub async fn schema_drift(&self) -> Result<SchemaDrift> {
    let schema = self.load_schema().await?;
    let stored = self
      .store
      .stored_field_keys()
      .await
      .map_err(Error::storage)?;
    Ok(SchemaDrift::detect(&schema, stored))
  }

  /// The checkpoint of the configured project, or of the remote's project
  /// when none is configured.
  pub async fn checkpoint(&self) -> Result<Option<Checkpoint>> {
    let project = match &self.config.project {
      Some(project) => project.clone(),
      None => self.remote.project_title().await.map_err(Error::remote)?,
    };
    self
      .store
      .get_checkpoint(&project)
      .await
      .map_err(Error::storage)
  }
}
