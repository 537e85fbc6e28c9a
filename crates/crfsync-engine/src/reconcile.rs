//! Reconciliation: one classified log entry → the store operations that
//! bring the mirror in line with it.
//!
//! Per entry, in order:
//!
//! 1. empty details → no-op;
//! 2. delete → soft-delete the matched record, or every live record of the
//!    patient when the details are free text or name no form (malformed
//!    assignments are reported);
//! 3. parse the details (failure is reported, the batch continues);
//! 4. route to a form (no owning form is reported);
//! 5. live record → upsert the logged values, maybe set `verified`;
//! 6. no live record → create one from the remote export, unless the remote
//!    no longer holds it.

use crfsync_core::{
  FieldMap,
  field_key::{canonical_export_key, is_bookkeeping_key, status_key},
  log::{LogEntry, Mutation},
  record::{NewRecord, RecordKey},
  remote::RemoteProject,
  store::SyncStore,
};
use tracing::debug;

use crate::{
  EntryFailure, Error, Result,
  config::SyncConfig,
  instance::resolve_instance,
  report::{Outcome, SkipReason},
  schema::SchemaIndex,
};

/// Applies log entries against `store`, consulting `remote` for inserts.
pub struct Reconciler<'r, S, R> {
  store:  &'r S,
  remote: &'r R,
  schema: &'r SchemaIndex,
  config: &'r SyncConfig,
}

impl<'r, S, R> Reconciler<'r, S, R>
where
  S: SyncStore,
  R: RemoteProject,
{
  pub fn new(
    store: &'r S,
    remote: &'r R,
    schema: &'r SchemaIndex,
    config: &'r SyncConfig,
  ) -> Self {
    Self { store, remote, schema, config }
  }

  /// Apply one entry.
  ///
  /// Per-entry problems come back as [`Outcome::Failed`]; `Err` means the
  /// store or the remote failed and the run must stop.
  pub async fn apply(&self, entry: &LogEntry) -> Result<Outcome> {
    if entry.details.trim().is_empty() {
      debug!(patient = %entry.patient, "empty details, skipping");
      return Ok(Outcome::Skipped(SkipReason::EmptyDetails));
    }

    if entry.mutation == Mutation::Delete {
      return self.delete(entry).await;
    }

    let parsed = match crfsync_details::parse(&entry.details) {
      Ok(parsed) => parsed,
      Err(e) => return Ok(Outcome::Failed(EntryFailure::Parse(e))),
    };

    let mut fields = parsed.fields;
    self.strip_reserved(&mut fields);
    if fields.is_empty() {
      debug!(patient = %entry.patient, "only bookkeeping keys, skipping");
      return Ok(Outcome::Skipped(SkipReason::NothingToRoute));
    }

    let Some(form) = self.schema.resolve_form(fields.keys()) else {
      let keys = fields.keys().map(str::to_owned).collect();
      return Ok(Outcome::Failed(EntryFailure::UnresolvedForm { keys }));
    };
    let key = RecordKey {
      patient:  entry.patient.clone(),
      form:     form.to_owned(),
      instance: resolve_instance(parsed.instance, self.schema.is_repeating(form)),
    };

    let patient = self
      .store
      .ensure_patient(&key.patient)
      .await
      .map_err(Error::storage)?;
    let live = self
      .store
      .find_live_record(patient.patient_id, &key.form, key.instance)
      .await
      .map_err(Error::storage)?;

    let status = fields.remove(&self.status_key(&key.form));
    let signed = status.as_deref().is_some_and(|s| self.config.is_verified_code(s));

    match live {
      Some(record) => {
        if !fields.is_empty() {
          self
            .store
            .write_fields(record.record_id, fields)
            .await
            .map_err(Error::storage)?;
        }
        let verified_now = signed && !record.verified;
        if verified_now {
          self
            .store
            .set_verified(record.record_id)
            .await
            .map_err(Error::storage)?;
        }
        debug!(record = %key, verified_now, "updated live record");
        Ok(Outcome::Updated { record_id: record.record_id, verified_now })
      }
      None => self.insert_from_remote(&key, patient.patient_id).await,
    }
  }

  /// No live record: the log only carries what changed, so the record is
  /// created from the remote's current values instead.
  async fn insert_from_remote(&self, key: &RecordKey, patient_id: uuid::Uuid) -> Result<Outcome> {
    let exported = self
      .remote
      .export_record(&key.patient, &key.form, key.instance)
      .await
      .map_err(Error::remote)?;

    let mut fields: FieldMap = exported
      .into_iter()
      .map(|(k, v)| (canonical_export_key(&k).into_owned(), v))
      .collect();
    self.strip_reserved(&mut fields);
    if fields.is_empty() {
      debug!(record = %key, "record gone upstream, skipping");
      return Ok(Outcome::Skipped(SkipReason::RemoteGone));
    }

    let verified = fields
      .remove(&self.status_key(&key.form))
      .is_some_and(|s| self.config.is_verified_code(&s));

    let record = self
      .store
      .create_record(
        NewRecord {
          patient_id,
          form_name: key.form.clone(),
          instance: key.instance,
          verified,
        },
        fields,
      )
      .await
      .map_err(Error::storage)?;

    debug!(record = %key, verified, "created record from remote export");
    Ok(Outcome::Created { record_id: record.record_id })
  }

  async fn delete(&self, entry: &LogEntry) -> Result<Outcome> {
    // Free text (`Deleted record`) or details naming no known form address
    // the whole patient. Broken assignments are failures like anywhere else.
    let parsed = match crfsync_details::parse(&entry.details) {
      Ok(parsed) => Some(parsed),
      Err(crfsync_details::Error::MissingAssignment { offset: 0, .. }) => None,
      Err(e) => return Ok(Outcome::Failed(EntryFailure::Parse(e))),
    };

    let Some(patient) = self
      .store
      .find_patient(&entry.patient)
      .await
      .map_err(Error::storage)?
    else {
      return Ok(Outcome::Skipped(SkipReason::NothingToDelete));
    };

    let target = parsed.and_then(|parsed| {
      let mut fields = parsed.fields;
      self.strip_reserved(&mut fields);
      let form = self.schema.resolve_form(fields.keys())?;
      Some((
        form.to_owned(),
        resolve_instance(parsed.instance, self.schema.is_repeating(form)),
      ))
    });

    let count = match target {
      Some((form, instance)) => {
        let live = self
          .store
          .find_live_record(patient.patient_id, &form, instance)
          .await
          .map_err(Error::storage)?;
        match live {
          Some(record) => {
            let changed = self
              .store
              .mark_deleted(record.record_id)
              .await
              .map_err(Error::storage)?;
            usize::from(changed)
          }
          None => 0,
        }
      }
      None => self
        .store
        .mark_patient_deleted(patient.patient_id)
        .await
        .map_err(Error::storage)?,
    };

    debug!(patient = %entry.patient, count, "applied delete");
    if count == 0 {
      Ok(Outcome::Skipped(SkipReason::NothingToDelete))
    } else {
      Ok(Outcome::Deleted { count })
    }
  }

  fn status_key(&self, form: &str) -> String {
    status_key(form, &self.config.status_field_suffix)
  }

  /// Drop the record-identifier field and `redcap_*` bookkeeping keys.
  fn strip_reserved(&self, fields: &mut FieldMap) {
    let record_id_field = self.config.record_id_field.as_str();
    fields.retain(|key, _| key != record_id_field && !is_bookkeeping_key(key));
  }
}
