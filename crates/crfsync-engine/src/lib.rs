//! Audit-log driven synchronization engine.
//!
//! Turns the remote project's audit log into field-level mutations and
//! reconciles them against any [`SyncStore`](crfsync_core::store::SyncStore):
//!
//! ```text
//! checkpoint ─▶ export_logs ─▶ classify ─▶ parse details ─▶ route to form
//!            ─▶ resolve instance ─▶ match record ─▶ reconcile ─▶ advance
//! ```
//!
//! A batch is applied in chronological order and succeeds or fails as a
//! unit: entries that cannot be parsed or routed are collected, reported
//! together, and leave the checkpoint where it was.

pub mod checkpoint;
pub mod config;
pub mod drift;
pub mod error;
pub mod instance;
pub mod reconcile;
pub mod report;
pub mod schema;
pub mod sync;

pub use config::SyncConfig;
pub use error::{EntryFailure, Error, Result};
pub use report::SyncReport;
pub use schema::SchemaIndex;
pub use sync::Synchronizer;

#[cfg(test)]
mod tests;
