//! Opening and advancing the synchronization watermark.

use chrono::{DateTime, Utc};
use crfsync_core::{checkpoint::Checkpoint, store::SyncStore};
use tracing::info;

use crate::{Error, Result};

/// Reads and writes the checkpoint of one store.
pub struct Checkpointer<'s, S> {
  store: &'s S,
}

impl<'s, S: SyncStore> Checkpointer<'s, S> {
  pub fn new(store: &'s S) -> Self { Self { store } }

  /// The checkpoint for `remote_title`, registering the project on first use.
  ///
  /// A store holds exactly one project. If it already tracks a different
  /// title, or `expected` names a different project than the remote reports,
  /// the run is refused with [`Error::SchemaConflict`].
  pub async fn open(&self, remote_title: &str, expected: Option<&str>) -> Result<Checkpoint> {
    match expected {
      Some(expected) if expected != remote_title => {
        return Err(Error::SchemaConflict {
          local:  vec![expected.to_owned()],
          remote: remote_title.to_owned(),
        });
      }
      _ => {}
    }

    let existing = self.store.list_checkpoints().await.map_err(Error::storage)?;
    if let Some(checkpoint) = existing.iter().find(|c| c.project_name == remote_title) {
      return Ok(checkpoint.clone());
    }
    if !existing.is_empty() {
      return Err(Error::SchemaConflict {
        local:  existing.into_iter().map(|c| c.project_name).collect(),
        remote: remote_title.to_owned(),
      });
    }

    let checkpoint = Checkpoint::initial(remote_title);
    self
      .store
      .put_checkpoint(checkpoint.clone())
      .await
      .map_err(Error::storage)?;
    info!(project = remote_title, "registered new project");
    Ok(checkpoint)
  }

  /// Move the watermark to `until`. It never moves backwards.
  pub async fn advance(&self, current: &Checkpoint, until: DateTime<Utc>) -> Result<Checkpoint> {
    if until <= current.last_synchronized {
      info!(
        project = %current.project_name,
        at = %current.last_synchronized,
        "checkpoint already at or past window end"
      );
      return Ok(current.clone());
    }

    let next = Checkpoint {
      project_name:      current.project_name.clone(),
      last_synchronized: until,
    };
    self
      .store
      .put_checkpoint(next.clone())
      .await
      .map_err(Error::storage)?;
    info!(project = %next.project_name, at = %until, "checkpoint advanced");
    Ok(next)
  }
}
