//! # Photo Index Core
//!
//! The search-and-identity engine behind Photo Index: data models, the
//! [`store::Store`] abstraction, cosine-similarity photo search, DBSCAN
//! face clustering, and cluster labeling.
//!
//! This crate contains no tokio, sqlx, network, or filesystem code. Every
//! operation takes an explicitly constructed store handle, so the same
//! algorithms run against the SQLite backend in the `photo-index` app
//! crate and against [`store::memory::InMemoryStore`] in tests.

pub mod cluster;
pub mod embedding;
pub mod error;
pub mod label;
pub mod models;
pub mod search;
pub mod stats;
pub mod store;

pub use error::{IndexError, Result};
