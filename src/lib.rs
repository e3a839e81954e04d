//! # Photo Index
//!
//! A local-first semantic photo search and face identity index.
//!
//! Photos are imported from a JSON Lines manifest, described by a vision
//! model when they arrive without a description, and embedded with a text
//! model so they can be found with natural-language queries. Face
//! detections are imported separately, grouped into identity clusters, and
//! labeled with person names.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Manifests   │──▶│   Ingest     │──▶│  SQLite  │
//! │ photos/faces │   │ Describe+Emb │   │  Store   │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │
//!                       ┌────────────────────┼──────────────┐
//!                       ▼                    ▼              ▼
//!                  ┌──────────┐       ┌────────────┐   ┌─────────┐
//!                  │  Search  │       │ Clustering │   │ Labels  │
//!                  └──────────┘       └────────────┘   └─────────┘
//! ```
//!
//! Storage-independent logic (search ranking, DBSCAN, label propagation)
//! lives in `photo-index-core`; this crate adds the SQLite store, the model
//! providers, and the `pix` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! pix init
//! pix ingest photos photos.jsonl
//! pix ingest faces faces.jsonl
//! pix cluster
//! pix clusters
//! pix label 0 "Alice"
//! pix search "birthday cake on the beach"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` |
//! | [`embedding`] | Text embedding providers |
//! | [`describe`] | Vision-model descriptions |
//! | [`ingest`] | Photo and face manifest import |
//! | [`search`] | Query embedding and result printing |
//! | [`get`] | Photo lookup |
//! | [`cluster`] | Clustering command and run summary |
//! | [`label`] | Cluster review and labeling commands |
//! | [`stats`] | Index statistics |
//! | [`progress`] | Import progress reporting |

pub mod cluster;
pub mod config;
pub mod db;
pub mod describe;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod label;
pub mod migrate;
pub mod progress;
pub mod search;
pub mod sqlite_store;
pub mod stats;
