//! Storage abstraction for Photo Index.
//!
//! The [`Store`] trait defines every storage operation the search,
//! clustering, and labeling pipeline needs, enabling pluggable backends
//! (SQLite in the app crate, [`memory::InMemoryStore`] here).
//!
//! Implementations must be `Send + Sync` to work with async runtimes, must
//! never expose a half-written record to readers, and must report backend
//! failures as [`IndexError::Storage`](crate::error::IndexError::Storage).

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ClusterAssignment, EmbeddingDims, FaceRecord, FaceWriteMode, FaceWriteOutcome, NewFace,
    NewPhoto, PhotoRecord,
};
use crate::stats::IndexStats;

/// New cluster state for one face, produced by a clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceAssignment {
    pub face_id: String,
    pub cluster: ClusterAssignment,
    /// `Some` overwrites `person_name`; `None` leaves it untouched.
    pub relabel: Option<String>,
}

/// Abstract storage backend for Photo Index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_photo`](Store::upsert_photo) | Insert or replace a photo record |
/// | [`upsert_faces`](Store::upsert_faces) | Write the face set of a photo |
/// | [`get_all_photos`](Store::get_all_photos) | Full photo scan, record order |
/// | [`get_all_faces`](Store::get_all_faces) | Full face scan, record order |
/// | [`update_face_cluster`](Store::update_face_cluster) | Targeted cluster update |
/// | [`update_face_label`](Store::update_face_label) | Targeted label update |
/// | [`apply_cluster_run`](Store::apply_cluster_run) | Persist a clustering run atomically |
/// | [`label_cluster`](Store::label_cluster) | Label every current member atomically |
#[async_trait]
pub trait Store: Send + Sync {
    /// Embedding dimensionalities this store was constructed with.
    fn dims(&self) -> EmbeddingDims;

    /// Insert a photo or replace description, embedding, and metadata of an
    /// existing one in a single atomic write.
    ///
    /// Face bookkeeping (`has_face_data`, `face_count`) survives a replace.
    async fn upsert_photo(&self, photo: &NewPhoto) -> Result<()>;

    async fn get_photo(&self, id: &str) -> Result<Option<PhotoRecord>>;

    async fn get_all_photos(&self) -> Result<Vec<PhotoRecord>>;

    /// Write the detected faces of `photo_id`.
    ///
    /// In [`FaceWriteMode::Append`] a photo that already has face data is
    /// left alone. Otherwise previous faces of the photo are replaced, new
    /// faces start as noise without a label, and the photo is flagged as
    /// processed, all in one transaction.
    async fn upsert_faces(
        &self,
        photo_id: &str,
        faces: &[NewFace],
        mode: FaceWriteMode,
    ) -> Result<FaceWriteOutcome>;

    async fn get_face(&self, id: &str) -> Result<Option<FaceRecord>>;

    async fn get_all_faces(&self) -> Result<Vec<FaceRecord>>;

    /// Set the cluster of one face without touching its embedding.
    async fn update_face_cluster(&self, face_id: &str, cluster: ClusterAssignment)
        -> Result<()>;

    /// Set or clear the label of one face without touching its embedding.
    async fn update_face_label(&self, face_id: &str, person_name: Option<&str>) -> Result<()>;

    /// Persist every assignment of one clustering run as a single unit.
    ///
    /// Readers observe either the complete previous run or the complete
    /// new one.
    async fn apply_cluster_run(&self, assignments: &[FaceAssignment]) -> Result<()>;

    /// Set `person_name` on every face currently in `cluster_id`.
    ///
    /// Membership is read at call time inside the same write. Returns the
    /// number of faces updated.
    async fn label_cluster(&self, cluster_id: u32, person_name: &str) -> Result<u64>;

    /// Read-only counts for review tooling.
    async fn stats(&self) -> Result<IndexStats> {
        let photos = self.get_all_photos().await?;
        let faces = self.get_all_faces().await?;
        Ok(IndexStats::from_records(&photos, &faces))
    }
}
