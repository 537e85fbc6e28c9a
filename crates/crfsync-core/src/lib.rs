//! Core types and trait definitions for the crfsync mirror.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! store backend, the remote project adapter and the synchronization engine
//! all depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod checkpoint;
pub mod error;
pub mod field_key;
pub mod fields;
pub mod log;
pub mod patient;
pub mod record;
pub mod remote;
pub mod store;

pub use error::{Error, Result};
pub use fields::FieldMap;
