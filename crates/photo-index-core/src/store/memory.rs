//! In-memory [`Store`] implementation for testing and embedding in other
//! programs.
//!
//! Photos and faces live behind a single `std::sync::RwLock`, so every
//! multi-record write (face replacement, clustering run, cluster labeling)
//! is atomic with respect to readers. Records are kept in insertion order.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::{check_dims, IndexError, Result};
use crate::models::{
    face_id, ClusterAssignment, EmbeddingDims, FaceRecord, FaceWriteMode, FaceWriteOutcome,
    NewFace, NewPhoto, PhotoRecord,
};

use super::{FaceAssignment, Store};

#[derive(Default)]
struct Inner {
    photos: Vec<PhotoRecord>,
    photo_pos: HashMap<String, usize>,
    faces: Vec<FaceRecord>,
}

impl Inner {
    fn face_mut(&mut self, id: &str) -> Result<&mut FaceRecord> {
        self.faces
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| IndexError::not_found("face", id))
    }
}

/// In-memory store.
pub struct InMemoryStore {
    dims: EmbeddingDims,
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new(dims: EmbeddingDims) -> Self {
        Self {
            dims,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| IndexError::storage("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| IndexError::storage("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(EmbeddingDims::default())
    }
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl Store for InMemoryStore {
    fn dims(&self) -> EmbeddingDims {
        self.dims
    }

    async fn upsert_photo(&self, photo: &NewPhoto) -> Result<()> {
        if photo.id.is_empty() {
            return Err(IndexError::precondition("photo id must not be empty"));
        }
        check_dims(
            format!("photo {}", photo.id),
            self.dims.photo,
            photo.embedding.len(),
        )?;

        let mut inner = self.write()?;
        let indexed_at = now_ts();
        match inner.photo_pos.get(&photo.id).copied() {
            Some(pos) => {
                let existing = &mut inner.photos[pos];
                existing.description = photo.description.clone();
                existing.embedding = photo.embedding.clone();
                existing.metadata = photo.metadata.clone();
                existing.indexed_at = indexed_at;
            }
            None => {
                let pos = inner.photos.len();
                inner.photos.push(PhotoRecord {
                    id: photo.id.clone(),
                    description: photo.description.clone(),
                    embedding: photo.embedding.clone(),
                    metadata: photo.metadata.clone(),
                    has_face_data: false,
                    face_count: 0,
                    indexed_at,
                });
                inner.photo_pos.insert(photo.id.clone(), pos);
            }
        }
        Ok(())
    }

    async fn get_photo(&self, id: &str) -> Result<Option<PhotoRecord>> {
        let inner = self.read()?;
        Ok(inner
            .photo_pos
            .get(id)
            .map(|&pos| inner.photos[pos].clone()))
    }

    async fn get_all_photos(&self) -> Result<Vec<PhotoRecord>> {
        Ok(self.read()?.photos.clone())
    }

    async fn upsert_faces(
        &self,
        photo_id: &str,
        faces: &[NewFace],
        mode: FaceWriteMode,
    ) -> Result<FaceWriteOutcome> {
        for (i, face) in faces.iter().enumerate() {
            check_dims(
                format!("face {} of photo {}", i, photo_id),
                self.dims.face,
                face.embedding.len(),
            )?;
        }

        let mut inner = self.write()?;
        let pos = *inner
            .photo_pos
            .get(photo_id)
            .ok_or_else(|| IndexError::not_found("photo", photo_id))?;

        if mode == FaceWriteMode::Append && inner.photos[pos].has_face_data {
            return Ok(FaceWriteOutcome::Skipped);
        }

        inner.faces.retain(|f| f.photo_id != photo_id);
        for (i, face) in faces.iter().enumerate() {
            let index = i as u32;
            inner.faces.push(FaceRecord {
                id: face_id(photo_id, index),
                photo_id: photo_id.to_string(),
                face_index: index,
                embedding: face.embedding.clone(),
                bounding_box: face.bounding_box,
                confidence: face.confidence,
                cluster: ClusterAssignment::Noise,
                person_name: None,
            });
        }

        let photo = &mut inner.photos[pos];
        photo.has_face_data = true;
        photo.face_count = faces.len() as u32;

        Ok(FaceWriteOutcome::Written(faces.len()))
    }

    async fn get_face(&self, id: &str) -> Result<Option<FaceRecord>> {
        Ok(self.read()?.faces.iter().find(|f| f.id == id).cloned())
    }

    async fn get_all_faces(&self) -> Result<Vec<FaceRecord>> {
        Ok(self.read()?.faces.clone())
    }

    async fn update_face_cluster(
        &self,
        face_id: &str,
        cluster: ClusterAssignment,
    ) -> Result<()> {
        self.write()?.face_mut(face_id)?.cluster = cluster;
        Ok(())
    }

    async fn update_face_label(&self, face_id: &str, person_name: Option<&str>) -> Result<()> {
        self.write()?.face_mut(face_id)?.person_name = person_name.map(str::to_string);
        Ok(())
    }

    async fn apply_cluster_run(&self, assignments: &[FaceAssignment]) -> Result<()> {
        let mut inner = self.write()?;

        let positions: HashMap<&str, usize> = inner
            .faces
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.as_str(), i))
            .collect();
        // Resolve everything before mutating so a missing face leaves the
        // previous run intact.
        let resolved = assignments
            .iter()
            .map(|a| {
                positions
                    .get(a.face_id.as_str())
                    .copied()
                    .ok_or_else(|| IndexError::not_found("face", a.face_id.clone()))
            })
            .collect::<Result<Vec<usize>>>()?;

        for (a, pos) in assignments.iter().zip(resolved) {
            let face = &mut inner.faces[pos];
            face.cluster = a.cluster;
            if let Some(name) = &a.relabel {
                face.person_name = Some(name.clone());
            }
        }
        Ok(())
    }

    async fn label_cluster(&self, cluster_id: u32, person_name: &str) -> Result<u64> {
        let mut inner = self.write()?;
        let mut updated = 0u64;
        for face in inner
            .faces
            .iter_mut()
            .filter(|f| f.cluster == ClusterAssignment::Member(cluster_id))
        {
            face.person_name = Some(person_name.to_string());
            updated += 1;
        }
        Ok(updated)
    }
}
