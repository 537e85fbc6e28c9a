//! The `SyncStore` trait — the relational mirror the engine writes into.
//!
//! Implemented by storage backends (e.g. `crfsync-store-sqlite`). The engine
//! depends on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  checkpoint::Checkpoint,
  fields::FieldMap,
  patient::Patient,
  record::{LogicalRecord, NewRecord},
};

/// A stored field key together with the form of the record holding it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoredFieldKey {
  pub form_name: String,
  pub field_key: String,
}

/// Abstraction over a mirror store backend.
///
/// Every write is idempotent: replaying the same sequence of calls leaves the
/// store in the same state. There is a single writer at a time.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait SyncStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Patients ──────────────────────────────────────────────────────────

  /// Return the patient with `external_key`, creating it on first reference.
  fn ensure_patient<'a>(
    &'a self,
    external_key: &'a str,
  ) -> impl Future<Output = Result<Patient, Self::Error>> + Send + 'a;

  /// Look up a patient without creating it.
  fn find_patient<'a>(
    &'a self,
    external_key: &'a str,
  ) -> impl Future<Output = Result<Option<Patient>, Self::Error>> + Send + 'a;

  // ── Logical records ───────────────────────────────────────────────────

  /// Find the live (non-deleted) record for `(patient_id, form_name,
  /// instance)`. `instance = None` matches only records without an instance.
  fn find_live_record<'a>(
    &'a self,
    patient_id: Uuid,
    form_name: &'a str,
    instance: Option<u32>,
  ) -> impl Future<Output = Result<Option<LogicalRecord>, Self::Error>> + Send + 'a;

  /// All records of a patient, oldest first. Soft-deleted rows are included
  /// only when `include_deleted` is set.
  fn records_for_patient(
    &self,
    patient_id: Uuid,
    include_deleted: bool,
  ) -> impl Future<Output = Result<Vec<LogicalRecord>, Self::Error>> + Send + '_;

  /// Create a live record and write `fields` into it, atomically.
  fn create_record(
    &self,
    input: NewRecord,
    fields: FieldMap,
  ) -> impl Future<Output = Result<LogicalRecord, Self::Error>> + Send + '_;

  /// Set `verified = true`. Verification is never revoked by the mirror.
  fn set_verified(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Soft-delete one record. Returns `false` if it was already deleted or
  /// does not exist.
  fn mark_deleted(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Soft-delete every live record of a patient; returns how many changed.
  fn mark_patient_deleted(
    &self,
    patient_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Fields ────────────────────────────────────────────────────────────

  /// Upsert each `(key, value)` of `fields` into `record_id`: insert if
  /// absent, overwrite otherwise (last write wins).
  fn write_fields(
    &self,
    record_id: Uuid,
    fields: FieldMap,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All stored fields of a record, ordered by key.
  fn get_fields(
    &self,
    record_id: Uuid,
  ) -> impl Future<Output = Result<FieldMap, Self::Error>> + Send + '_;

  /// Distinct `(form, field key)` pairs held by live records.
  fn stored_field_keys(
    &self,
  ) -> impl Future<Output = Result<Vec<StoredFieldKey>, Self::Error>> + Send + '_;

  // ── Checkpoints ───────────────────────────────────────────────────────

  /// Every checkpoint in the store, ordered by project name.
  fn list_checkpoints(
    &self,
  ) -> impl Future<Output = Result<Vec<Checkpoint>, Self::Error>> + Send + '_;

  fn get_checkpoint<'a>(
    &'a self,
    project_name: &'a str,
  ) -> impl Future<Output = Result<Option<Checkpoint>, Self::Error>> + Send + 'a;

  /// Insert or replace the checkpoint for `checkpoint.project_name`.
  fn put_checkpoint(
    &self,
    checkpoint: Checkpoint,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
