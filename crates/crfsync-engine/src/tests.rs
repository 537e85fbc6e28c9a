//! End-to-end tests: a fake remote project mirrored into an in-memory
//! `SqliteStore`.

use std::{collections::HashMap, io, sync::Mutex};

use chrono::{DateTime, TimeZone, Utc};
use crfsync_core::{
  FieldMap,
  checkpoint::{Checkpoint, epoch},
  log::RawLogEntry,
  record::LogicalRecord,
  remote::{FormField, RemoteProject},
  store::SyncStore,
};
use crfsync_store_sqlite::SqliteStore;

use crate::{EntryFailure, Error, SyncConfig, Synchronizer, report::SkipReason};

// ─── Fake remote ─────────────────────────────────────────────────────────────

type RecordKey = (String, String, Option<u32>);

struct FakeRemote {
  title:    String,
  metadata: Vec<FormField>,
  logs:     Mutex<Vec<RawLogEntry>>,
  records:  Mutex<HashMap<RecordKey, FieldMap>>,
}

impl FakeRemote {
  fn new() -> Self {
    let field = |key: &str, form: &str, repeating: bool| FormField {
      field_key:    key.into(),
      form_name:    form.into(),
      is_repeating: repeating,
    };
    Self {
      title:    "Study A".into(),
      metadata: vec![
        field("record_id", "baseline", false),
        field("q1", "baseline", false),
        field("q2", "baseline", false),
        field("q3", "baseline", false),
        field("baseline_status", "baseline", false),
        field("ae_term", "adverse_event", true),
        field("ae_grade", "adverse_event", true),
      ],
      logs:     Mutex::new(Vec::new()),
      records:  Mutex::new(HashMap::new()),
    }
  }

  fn log(&self, timestamp: DateTime<Utc>, action: &str, details: &str) {
    self.logs.lock().unwrap().push(RawLogEntry {
      timestamp,
      username: "alice".into(),
      action: action.into(),
      details: details.into(),
      record: None,
    });
  }

  fn set_record(&self, patient: &str, form: &str, instance: Option<u32>, values: &[(&str, &str)]) {
    self
      .records
      .lock()
      .unwrap()
      .insert((patient.into(), form.into(), instance), fields(values));
  }

  fn drop_record(&self, patient: &str, form: &str, instance: Option<u32>) {
    self
      .records
      .lock()
      .unwrap()
      .remove(&(patient.into(), form.into(), instance));
  }

  fn raw_logs(&self) -> Vec<RawLogEntry> { self.logs.lock().unwrap().clone() }
}

impl RemoteProject for FakeRemote {
  type Error = io::Error;

  async fn project_title(&self) -> Result<String, io::Error> { Ok(self.title.clone()) }

  async fn export_logs(
    &self,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> Result<Vec<RawLogEntry>, io::Error> {
    Ok(
      self
        .raw_logs()
        .into_iter()
        .filter(|e| since <= e.timestamp && e.timestamp <= until)
        .collect(),
    )
  }

  async fn export_record(
    &self,
    patient: &str,
    form_name: &str,
    instance: Option<u32>,
  ) -> Result<FieldMap, io::Error> {
    Ok(
      self
        .records
        .lock()
        .unwrap()
        .get(&(patient.to_owned(), form_name.to_owned(), instance))
        .cloned()
        .unwrap_or_default(),
    )
  }

  async fn export_form_metadata(&self) -> Result<Vec<FormField>, io::Error> {
    Ok(self.metadata.clone())
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

type Harness = Synchronizer<SqliteStore, FakeRemote>;

async fn synchronizer(remote: FakeRemote) -> Harness {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  Synchronizer::new(store, remote, SyncConfig::default())
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 9, 24, hour, minute, 0).unwrap()
}

fn fields(pairs: &[(&str, &str)]) -> FieldMap { pairs.iter().copied().collect() }

async fn records(sync: &Harness, patient: &str) -> Vec<LogicalRecord> {
  match sync.store().find_patient(patient).await.unwrap() {
    Some(p) => sync.store().records_for_patient(p.patient_id, true).await.unwrap(),
    None => vec![],
  }
}

async fn live(sync: &Harness, patient: &str, form: &str, instance: Option<u32>) -> Option<(LogicalRecord, FieldMap)> {
  let p = sync.store().find_patient(patient).await.unwrap()?;
  let record = sync
    .store()
    .find_live_record(p.patient_id, form, instance)
    .await
    .unwrap()?;
  let values = sync.store().get_fields(record.record_id).await.unwrap();
  Some((record, values))
}

async fn checkpoint(sync: &Harness) -> DateTime<Utc> {
  sync
    .store()
    .get_checkpoint("Study A")
    .await
    .unwrap()
    .expect("checkpoint registered")
    .last_synchronized
}

// ─── Insert / update ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_update_leaves_one_live_record() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[
    ("record_id", "1001"),
    ("q1", "x"),
    ("q2", "b"),
  ]);
  remote.log(at(9, 0), "Create record 1001", "record_id = '1001', q1 = 'x', q2 = 'b'");
  remote.log(at(9, 5), "Update record 1001", "q1 = 'y'");
  let sync = synchronizer(remote).await;

  let report = sync.sync(Some(at(12, 0))).await.unwrap();
  assert_eq!(report.stats.created, 1);
  assert_eq!(report.stats.updated, 1);

  assert_eq!(records(&sync, "1001").await.len(), 1);
  let (record, values) = live(&sync, "1001", "baseline", None).await.unwrap();
  assert!(!record.deleted);
  assert_eq!(values, fields(&[("q1", "y"), ("q2", "b")]));
}

#[tokio::test]
async fn applying_a_batch_twice_equals_applying_it_once() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "y")]);
  remote.set_record("1001", "adverse_event", Some(2), &[("ae_term", "rash")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 1), "Update record 1001", "q1 = 'y', q3 = checked");
  remote.log(at(9, 2), "Update record 1001", "[instance = 2], ae_term = 'rash'");
  let sync = synchronizer(remote).await;
  let schema = sync.load_schema().await.unwrap();

  sync.apply_batch(&schema, sync.remote().raw_logs()).await.unwrap();
  let once = records(&sync, "1001").await;
  let once_values = live(&sync, "1001", "baseline", None).await.unwrap().1;

  sync.apply_batch(&schema, sync.remote().raw_logs()).await.unwrap();
  let twice = records(&sync, "1001").await;
  let twice_values = live(&sync, "1001", "baseline", None).await.unwrap().1;

  assert_eq!(once.len(), 2);
  assert_eq!(
    once.iter().map(|r| r.record_id).collect::<Vec<_>>(),
    twice.iter().map(|r| r.record_id).collect::<Vec<_>>()
  );
  assert_eq!(once_values, twice_values);
  assert_eq!(twice_values.get("q3"), Some("1"));
}

#[tokio::test]
async fn entries_apply_in_timestamp_order() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x")]);
  remote.log(at(9, 10), "Update record 1001", "q1 = 'late'");
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 10), "Update record 1001", "q1 = 'latest'");
  let sync = synchronizer(remote).await;

  sync.sync(Some(at(12, 0))).await.unwrap();
  let (_, values) = live(&sync, "1001", "baseline", None).await.unwrap();
  assert_eq!(values.get("q1"), Some("latest"));
}

#[tokio::test]
async fn repeating_form_without_marker_is_first_instance() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "adverse_event", Some(1), &[("ae_term", "rash"), ("ae_grade", "2")]);
  remote.log(at(9, 0), "Update record 1001", "ae_term = 'rash'");
  let sync = synchronizer(remote).await;

  sync.sync(Some(at(12, 0))).await.unwrap();
  let (record, values) = live(&sync, "1001", "adverse_event", Some(1)).await.unwrap();
  assert_eq!(record.instance, Some(1));
  assert_eq!(values, fields(&[("ae_grade", "2"), ("ae_term", "rash")]));
}

#[tokio::test]
async fn export_keys_are_canonicalized_and_bookkeeping_dropped() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[
    ("record_id", "1001"),
    ("redcap_event_name", "visit_1"),
    ("q1", "x"),
    ("q3___2", "1"),
  ]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x', q3(2) = checked");
  let sync = synchronizer(remote).await;

  sync.sync(Some(at(12, 0))).await.unwrap();
  let (_, values) = live(&sync, "1001", "baseline", None).await.unwrap();
  assert_eq!(values, fields(&[("q1", "x"), ("q3(2)", "1")]));
}

#[tokio::test]
async fn non_mutation_entries_are_ignored() {
  let remote = FakeRemote::new();
  remote.log(at(9, 0), "Data export (CSV)", "");
  remote.log(at(9, 1), "Manage/Design", "Create project field");
  let sync = synchronizer(remote).await;

  let report = sync.sync(Some(at(12, 0))).await.unwrap();
  assert_eq!(report.stats.fetched, 2);
  assert_eq!(report.stats.ignored, 2);
  assert_eq!(report.stats.applied(), 0);
}

#[tokio::test]
async fn record_id_only_entry_is_a_no_op() {
  let remote = FakeRemote::new();
  remote.log(at(9, 0), "Create record 1001", "record_id = '1001'");
  let sync = synchronizer(remote).await;

  let schema = sync.load_schema().await.unwrap();
  let (stats, failures) = sync
    .apply_batch(&schema, sync.remote().raw_logs())
    .await
    .unwrap();
  assert!(failures.is_empty());
  assert_eq!(stats.skipped, 1);
  assert!(sync.store().find_patient("1001").await.unwrap().is_none());
}

// ─── Verification ────────────────────────────────────────────────────────────

#[tokio::test]
async fn verified_status_flips_flag_and_is_not_stored() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 1), "Update record 1001", "baseline_status = '4', q2 = 'b'");
  let sync = synchronizer(remote).await;

  let report = sync.sync(Some(at(12, 0))).await.unwrap();
  assert_eq!(report.stats.verified, 1);

  let (record, values) = live(&sync, "1001", "baseline", None).await.unwrap();
  assert!(record.verified);
  assert_eq!(values, fields(&[("q1", "x"), ("q2", "b")]));
}

#[tokio::test]
async fn unverified_status_code_leaves_flag_unset() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 1), "Update record 1001", "baseline_status = '2'");
  let sync = synchronizer(remote).await;

  sync.sync(Some(at(12, 0))).await.unwrap();
  let (record, values) = live(&sync, "1001", "baseline", None).await.unwrap();
  assert!(!record.verified);
  assert!(!values.contains_key("baseline_status"));
}

#[tokio::test]
async fn record_created_from_signed_export_is_verified() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x"), ("baseline_status", "5")]);
  remote.log(at(9, 0), "Update record 1001", "q1 = 'x'");
  let sync = synchronizer(remote).await;

  sync.sync(Some(at(12, 0))).await.unwrap();
  let (record, values) = live(&sync, "1001", "baseline", None).await.unwrap();
  assert!(record.verified);
  assert_eq!(values, fields(&[("q1", "x")]));
}

// ─── Deletion ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_then_delete_leaves_record_deleted() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "y")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 1), "Update record 1001", "q1 = 'y'");
  remote.log(at(9, 2), "Delete record 1001", "record_id = '1001'");
  let sync = synchronizer(remote).await;

  let report = sync.sync(Some(at(12, 0))).await.unwrap();
  assert_eq!(report.stats.deleted, 1);
  assert!(live(&sync, "1001", "baseline", None).await.is_none());
  let all = records(&sync, "1001").await;
  assert_eq!(all.len(), 1);
  assert!(all[0].deleted);
}

#[tokio::test]
async fn delete_then_update_creates_fresh_live_record() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "y")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 1), "Delete record 1001", "record_id = '1001'");
  remote.log(at(9, 2), "Update record 1001", "q1 = 'y'");
  let sync = synchronizer(remote).await;

  sync.sync(Some(at(12, 0))).await.unwrap();
  let all = records(&sync, "1001").await;
  assert_eq!(all.len(), 2);
  assert_eq!(all.iter().filter(|r| r.deleted).count(), 1);

  let (_, values) = live(&sync, "1001", "baseline", None).await.unwrap();
  assert_eq!(values.get("q1"), Some("y"));
}

#[tokio::test]
async fn update_for_deleted_key_gone_upstream_is_a_no_op() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 1), "Delete record 1001", "record_id = '1001'");
  let sync = synchronizer(remote).await;
  sync.sync(Some(at(10, 0))).await.unwrap();

  sync.remote().drop_record("1001", "baseline", None);
  sync.remote().log(at(10, 30), "Update record 1001", "q1 = 'late'");

  let report = sync.sync(Some(at(12, 0))).await.unwrap();
  assert!(report.is_success());
  assert_eq!(report.stats.skipped, 1);
  let all = records(&sync, "1001").await;
  assert_eq!(all.len(), 1);
  assert!(all[0].deleted);
}

#[tokio::test]
async fn delete_naming_a_form_deletes_only_that_record() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x")]);
  remote.set_record("1001", "adverse_event", Some(1), &[("ae_term", "rash")]);
  remote.set_record("1001", "adverse_event", Some(2), &[("ae_term", "cough")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 1), "Update record 1001", "ae_term = 'rash'");
  remote.log(at(9, 2), "Update record 1001", "[instance = 2], ae_term = 'cough'");
  remote.log(at(9, 3), "Delete record 1001", "[instance = 2], ae_term = 'cough'");
  let sync = synchronizer(remote).await;

  let report = sync.sync(Some(at(12, 0))).await.unwrap();
  assert_eq!(report.stats.deleted, 1);
  assert!(live(&sync, "1001", "adverse_event", Some(2)).await.is_none());
  assert!(live(&sync, "1001", "adverse_event", Some(1)).await.is_some());
  assert!(live(&sync, "1001", "baseline", None).await.is_some());
}

#[tokio::test]
async fn delete_of_unknown_patient_is_a_no_op() {
  let remote = FakeRemote::new();
  remote.log(at(9, 0), "Delete record 9999", "record_id = '9999'");
  let sync = synchronizer(remote).await;

  let report = sync.sync(Some(at(12, 0))).await.unwrap();
  assert_eq!(report.stats.skipped, 1);
  assert!(sync.store().find_patient("9999").await.unwrap().is_none());
}

#[tokio::test]
async fn free_text_delete_removes_every_live_record() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x")]);
  remote.set_record("1001", "adverse_event", Some(1), &[("ae_term", "rash")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 1), "Update record 1001", "ae_term = 'rash'");
  remote.log(at(9, 2), "Delete record 1001", "Deleted record");
  let sync = synchronizer(remote).await;

  let report = sync.sync(Some(at(12, 0))).await.unwrap();
  assert_eq!(report.stats.deleted, 2);
  assert!(live(&sync, "1001", "baseline", None).await.is_none());
  assert!(live(&sync, "1001", "adverse_event", Some(1)).await.is_none());
}

#[tokio::test]
async fn malformed_delete_is_reported_and_deletes_nothing() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x")]);
  remote.set_record("1001", "adverse_event", Some(2), &[("ae_term", "cough")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(9, 1), "Update record 1001", "[instance = 2], ae_term = 'cough'");
  remote.log(at(9, 2), "Delete record 1001", "[instance = 2], ae_term = 'unterminated");
  let sync = synchronizer(remote).await;

  let Err(Error::EntriesFailed(report)) = sync.sync(Some(at(12, 0))).await else {
    panic!("expected EntriesFailed");
  };
  assert_eq!(report.stats.deleted, 0);
  assert!(matches!(report.failures[0].reason, EntryFailure::Parse(_)));
  assert!(live(&sync, "1001", "baseline", None).await.is_some());
  assert!(live(&sync, "1001", "adverse_event", Some(2)).await.is_some());
  assert_eq!(checkpoint(&sync).await, epoch());
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unresolved_entry_is_reported_and_blocks_checkpoint() {
  let remote = FakeRemote::new();
  remote.log(at(9, 0), "Update record 1001", "old_q = '1', gone = '2'");
  let sync = synchronizer(remote).await;

  let err = sync.sync(Some(at(12, 0))).await.unwrap_err();
  let Error::EntriesFailed(report) = &err else {
    panic!("expected EntriesFailed, got {err:?}");
  };
  assert_eq!(report.failures.len(), 1);
  let failure = &report.failures[0];
  assert_eq!(failure.patient.as_deref(), Some("1001"));
  assert_eq!(failure.details, "old_q = '1', gone = '2'");
  assert!(matches!(
    &failure.reason,
    EntryFailure::UnresolvedForm { keys } if keys == &["old_q", "gone"]
  ));
  assert!(err.to_string().contains("old_q = '1'"));

  assert!(records(&sync, "1001").await.is_empty());
  assert_eq!(checkpoint(&sync).await, epoch());
}

#[tokio::test]
async fn parse_error_does_not_stop_the_batch() {
  let remote = FakeRemote::new();
  remote.set_record("1002", "baseline", None, &[("q1", "z")]);
  remote.log(at(9, 0), "Update record 1001", "q1 = 'unterminated");
  remote.log(at(9, 1), "Create record 1002", "q1 = 'z'");
  let sync = synchronizer(remote).await;

  let Err(Error::EntriesFailed(report)) = sync.sync(Some(at(12, 0))).await else {
    panic!("expected EntriesFailed");
  };
  assert_eq!(report.stats.failed, 1);
  assert_eq!(report.stats.created, 1);
  assert!(matches!(report.failures[0].reason, EntryFailure::Parse(_)));
  assert!(live(&sync, "1002", "baseline", None).await.is_some());
  assert_eq!(checkpoint(&sync).await, epoch());
}

#[tokio::test]
async fn mutation_without_patient_is_reported() {
  let remote = FakeRemote::new();
  remote.log(at(9, 0), "Update record (API)", "q1 = 'x'");
  let sync = synchronizer(remote).await;

  let Err(Error::EntriesFailed(report)) = sync.sync(Some(at(12, 0))).await else {
    panic!("expected EntriesFailed");
  };
  assert!(report.failures[0].patient.is_none());
  assert!(matches!(report.failures[0].reason, EntryFailure::Log(_)));
}

// ─── Checkpoint ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn checkpoint_advances_to_window_end_and_never_back() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  remote.log(at(11, 0), "Update record 1001", "q2 = 'later'");
  let sync = synchronizer(remote).await;

  assert!(sync.checkpoint().await.unwrap().is_none());

  let report = sync.sync(Some(at(10, 0))).await.unwrap();
  assert_eq!(report.since, epoch());
  assert_eq!(checkpoint(&sync).await, at(10, 0));
  assert!(live(&sync, "1001", "baseline", None).await.unwrap().1.get("q2").is_none());

  let report = sync.sync(Some(at(12, 0))).await.unwrap();
  assert_eq!(report.since, at(10, 0));
  assert_eq!(report.stats.updated, 1);
  assert_eq!(checkpoint(&sync).await, at(12, 0));

  sync.sync(Some(at(8, 0))).await.unwrap();
  assert_eq!(checkpoint(&sync).await, at(12, 0));
  assert_eq!(
    sync.checkpoint().await.unwrap(),
    Some(Checkpoint { project_name: "Study A".into(), last_synchronized: at(12, 0) })
  );
}

#[tokio::test]
async fn store_tracking_another_project_is_a_conflict() {
  let sync = synchronizer(FakeRemote::new()).await;
  sync
    .store()
    .put_checkpoint(Checkpoint::initial("Study B"))
    .await
    .unwrap();

  let err = sync.sync(Some(at(12, 0))).await.unwrap_err();
  assert!(matches!(
    err,
    Error::SchemaConflict { ref local, ref remote } if local == &["Study B"] && remote == "Study A"
  ));
}

#[tokio::test]
async fn configured_project_must_match_remote() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let config = SyncConfig { project: Some("Study B".into()), ..Default::default() };
  let sync = Synchronizer::new(store, FakeRemote::new(), config);

  assert!(matches!(
    sync.sync(Some(at(12, 0))).await,
    Err(Error::SchemaConflict { .. })
  ));
  assert!(sync.store().list_checkpoints().await.unwrap().is_empty());
}

// ─── Drift ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn drift_lists_fields_outside_current_metadata() {
  let remote = FakeRemote::new();
  remote.set_record("1001", "baseline", None, &[("q1", "x"), ("legacy_q", "old")]);
  remote.log(at(9, 0), "Create record 1001", "q1 = 'x'");
  let sync = synchronizer(remote).await;
  sync.sync(Some(at(12, 0))).await.unwrap();

  let drift = sync.schema_drift().await.unwrap();
  assert_eq!(drift.unknown.len(), 1);
  assert_eq!(drift.unknown["baseline"], vec!["legacy_q"]);
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_details_are_skipped() {
  let remote = FakeRemote::new();
  remote.log(at(9, 0), "Update record 1001", "   ");
  let sync = synchronizer(remote).await;

  let schema = sync.load_schema().await.unwrap();
  let reconciler = crate::reconcile::Reconciler::new(
    sync.store(),
    sync.remote(),
    &schema,
    sync.config(),
  );
  let entry = crfsync_core::log::LogEntry::classify(sync.remote().raw_logs().remove(0))
    .unwrap()
    .unwrap();
  let outcome = reconciler.apply(&entry).await.unwrap();
  assert!(matches!(
    outcome,
    crate::report::Outcome::Skipped(SkipReason::EmptyDetails)
  ));
}
