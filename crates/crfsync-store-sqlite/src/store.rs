//! [`SqliteStore`] — the SQLite implementation of [`SyncStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crfsync_core::{
  FieldMap,
  checkpoint::Checkpoint,
  patient::Patient,
  record::{LogicalRecord, NewRecord},
  store::{StoredFieldKey, SyncStore},
};

use crate::{
  Error, Result,
  encode::{
    PATIENT_COLUMNS, RECORD_COLUMNS, RawCheckpoint, RawPatient, RawRecord, encode_dt,
    encode_uuid,
  },
  schema::SCHEMA,
};

const UPSERT_FIELD: &str = "INSERT INTO fields (record_id, field_key, value) VALUES (?1, ?2, ?3)
   ON CONFLICT (record_id, field_key) DO UPDATE SET value = excluded.value";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A mirror store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `UPDATE logical_records SET <assignments>, updated_at = now` for
  /// one record. Returns the number of rows changed.
  async fn touch_record(
    &self,
    record_id: Uuid,
    assignments: &'static str,
    only_live: bool,
  ) -> Result<usize> {
    let id_str = encode_uuid(record_id);
    let now_str = encode_dt(Utc::now());
    let live_clause = if only_live { " AND deleted = 0" } else { "" };
    let sql = format!(
      "UPDATE logical_records SET {assignments}, updated_at = ?1
       WHERE record_id = ?2{live_clause}"
    );

    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, rusqlite::params![now_str, id_str])?))
      .await?;
    Ok(changed)
  }
}

// ─── SyncStore impl ──────────────────────────────────────────────────────────

impl SyncStore for SqliteStore {
  type Error = Error;

  // ── Patients ──────────────────────────────────────────────────────────────

  async fn ensure_patient(&self, external_key: &str) -> Result<Patient> {
    let new_id_str = encode_uuid(Uuid::new_v4());
    let at_str = encode_dt(Utc::now());
    let key = external_key.to_owned();

    let raw: RawPatient = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO patients (patient_id, external_key, created_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT (external_key) DO NOTHING",
          rusqlite::params![new_id_str, key, at_str],
        )?;
        Ok(conn.query_row(
          &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE external_key = ?1"),
          rusqlite::params![key],
          RawPatient::from_row,
        )?)
      })
      .await?;

    raw.into_patient()
  }

  async fn find_patient(&self, external_key: &str) -> Result<Option<Patient>> {
    let key = external_key.to_owned();

    let raw: Option<RawPatient> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE external_key = ?1"),
              rusqlite::params![key],
              RawPatient::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPatient::into_patient).transpose()
  }

  // ── Logical records ───────────────────────────────────────────────────────

  async fn find_live_record(
    &self,
    patient_id: Uuid,
    form_name:  &str,
    instance:   Option<u32>,
  ) -> Result<Option<LogicalRecord>> {
    let patient_str = encode_uuid(patient_id);
    let form = form_name.to_owned();

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RECORD_COLUMNS} FROM logical_records
                 WHERE patient_id = ?1
                   AND form_name  = ?2
                   AND instance IS ?3
                   AND deleted = 0"
              ),
              rusqlite::params![patient_str, form, instance],
              RawRecord::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn records_for_patient(
    &self,
    patient_id:      Uuid,
    include_deleted: bool,
  ) -> Result<Vec<LogicalRecord>> {
    let patient_str = encode_uuid(patient_id);

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RECORD_COLUMNS} FROM logical_records
           WHERE patient_id = ?1
             AND (?2 OR deleted = 0)
           ORDER BY created_at, rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![patient_str, include_deleted], RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  async fn create_record(&self, input: NewRecord, fields: FieldMap) -> Result<LogicalRecord> {
    let now = Utc::now();
    let record = LogicalRecord {
      record_id:  Uuid::new_v4(),
      patient_id: input.patient_id,
      form_name:  input.form_name,
      instance:   input.instance,
      deleted:    false,
      verified:   input.verified,
      created_at: now,
      updated_at: now,
    };

    let record_id_str = encode_uuid(record.record_id);
    let patient_str   = encode_uuid(record.patient_id);
    let form          = record.form_name.clone();
    let instance      = record.instance;
    let verified      = record.verified;
    let at_str        = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO logical_records (
             record_id, patient_id, form_name, instance,
             deleted, verified, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)",
          rusqlite::params![record_id_str, patient_str, form, instance, verified, at_str],
        )?;
        {
          let mut stmt = tx.prepare(UPSERT_FIELD)?;
          for (key, value) in fields {
            stmt.execute(rusqlite::params![record_id_str, key, value])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn set_verified(&self, record_id: Uuid) -> Result<()> {
    match self.touch_record(record_id, "verified = 1", false).await? {
      0 => Err(Error::RecordNotFound(record_id)),
      _ => Ok(()),
    }
  }

  async fn mark_deleted(&self, record_id: Uuid) -> Result<bool> {
    Ok(self.touch_record(record_id, "deleted = 1", true).await? > 0)
  }

  async fn mark_patient_deleted(&self, patient_id: Uuid) -> Result<usize> {
    let patient_str = encode_uuid(patient_id);
    let now_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE logical_records SET deleted = 1, updated_at = ?1
           WHERE patient_id = ?2 AND deleted = 0",
          rusqlite::params![now_str, patient_str],
        )?)
      })
      .await?;
    Ok(changed)
  }

  // ── Fields ────────────────────────────────────────────────────────────────

  async fn write_fields(&self, record_id: Uuid, fields: FieldMap) -> Result<()> {
    let id_str = encode_uuid(record_id);
    let now_str = encode_dt(Utc::now());

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let touched = tx.execute(
          "UPDATE logical_records SET updated_at = ?1 WHERE record_id = ?2",
          rusqlite::params![now_str, id_str],
        )?;
        if touched == 0 {
          return Ok(false);
        }
        {
          let mut stmt = tx.prepare(UPSERT_FIELD)?;
          for (key, value) in fields {
            stmt.execute(rusqlite::params![id_str, key, value])?;
          }
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if found { Ok(()) } else { Err(Error::RecordNotFound(record_id)) }
  }

  async fn get_fields(&self, record_id: Uuid) -> Result<FieldMap> {
    let id_str = encode_uuid(record_id);

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT field_key, value FROM fields WHERE record_id = ?1 ORDER BY field_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows.into_iter().collect())
  }

  async fn stored_field_keys(&self) -> Result<Vec<StoredFieldKey>> {
    let keys = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT r.form_name, f.field_key
           FROM fields f
           JOIN logical_records r ON r.record_id = f.record_id
           WHERE r.deleted = 0
           ORDER BY r.form_name, f.field_key",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(StoredFieldKey {
              form_name: row.get(0)?,
              field_key: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(keys)
  }

  // ── Checkpoints ───────────────────────────────────────────────────────────

  async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>> {
    let raws: Vec<RawCheckpoint> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT project_name, last_synchronized FROM checkpoints ORDER BY project_name",
        )?;
        let rows = stmt
          .query_map([], RawCheckpoint::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCheckpoint::into_checkpoint).collect()
  }

  async fn get_checkpoint(&self, project_name: &str) -> Result<Option<Checkpoint>> {
    let name = project_name.to_owned();

    let raw: Option<RawCheckpoint> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT project_name, last_synchronized FROM checkpoints
               WHERE project_name = ?1",
              rusqlite::params![name],
              RawCheckpoint::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCheckpoint::into_checkpoint).transpose()
  }

  async fn put_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
    let at_str = encode_dt(checkpoint.last_synchronized);
    let name = checkpoint.project_name;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO checkpoints (project_name, last_synchronized) VALUES (?1, ?2)
           ON CONFLICT (project_name) DO UPDATE
             SET last_synchronized = excluded.last_synchronized",
          rusqlite::params![name, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
