//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the `photos`, `faces`, and
//! `index_metadata` tables created by [`crate::migrate`]. Multi-row writes
//! run in a single transaction; WAL mode keeps readers on the last
//! committed state while a write is in progress.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use photo_index_core::embedding::{blob_to_vec, vec_to_blob};
use photo_index_core::error::{check_dims, IndexError, Result};
use photo_index_core::models::{
    face_id, BoundingBox, ClusterAssignment, EmbeddingDims, FaceRecord, FaceWriteMode,
    FaceWriteOutcome, Metadata, NewFace, NewPhoto, PhotoRecord,
};
use photo_index_core::stats::IndexStats;
use photo_index_core::store::{FaceAssignment, Store};

use crate::config::Config;
use crate::db;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    dims: EmbeddingDims,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, dims: EmbeddingDims) -> Self {
        Self { pool, dims }
    }

    /// Connect to the configured database and check that it was built with
    /// the configured embedding dimensionalities.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let store = Self::new(pool, config.dims());
        store
            .verify_dims()
            .await
            .with_context(|| format!("Cannot open index at {}", config.db.path.display()))?;
        Ok(store)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// All `index_metadata` entries, ordered by key.
    pub async fn metadata(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT key, value FROM index_metadata ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(IndexError::storage)?;
        rows.iter()
            .map(|r| {
                Ok((
                    r.try_get("key").map_err(IndexError::storage)?,
                    r.try_get("value").map_err(IndexError::storage)?,
                ))
            })
            .collect()
    }

    async fn metadata_value(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM index_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(IndexError::storage)
    }

    /// Fail with [`IndexError::DimensionMismatch`] when the stored index was
    /// built with different dimensionalities than this store expects.
    pub async fn verify_dims(&self) -> Result<()> {
        let initialized: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='index_metadata'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(IndexError::storage)?;
        if !initialized {
            return Err(IndexError::storage(
                "index is not initialized; run `pix init` first",
            ));
        }

        for (key, expected) in [("photo_dims", self.dims.photo), ("face_dims", self.dims.face)] {
            let Some(stored) = self.metadata_value(key).await? else {
                continue;
            };
            let got: usize = stored
                .parse()
                .map_err(|_| IndexError::storage(format!("corrupt {} value: {}", key, stored)))?;
            check_dims(format!("index {}", key), expected, got)?;
        }
        Ok(())
    }

    /// Stamp `last_updated` after a batch of writes.
    pub async fn mark_updated(&self) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO index_metadata (key, value) VALUES ('last_updated', ?)")
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(IndexError::storage)?;
        Ok(())
    }
}

fn photo_from_row(row: &SqliteRow) -> Result<PhotoRecord> {
    let blob: Vec<u8> = row.try_get("embedding").map_err(IndexError::storage)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(IndexError::storage)?;
    let metadata: Metadata = serde_json::from_str(&metadata_json).map_err(IndexError::storage)?;
    let has_face_data: i64 = row.try_get("has_face_data").map_err(IndexError::storage)?;
    let face_count: i64 = row.try_get("face_count").map_err(IndexError::storage)?;

    Ok(PhotoRecord {
        id: row.try_get("id").map_err(IndexError::storage)?,
        description: row.try_get("description").map_err(IndexError::storage)?,
        embedding: blob_to_vec(&blob),
        metadata,
        has_face_data: has_face_data != 0,
        face_count: face_count as u32,
        indexed_at: row.try_get("indexed_at").map_err(IndexError::storage)?,
    })
}

fn face_from_row(row: &SqliteRow) -> Result<FaceRecord> {
    let blob: Vec<u8> = row.try_get("embedding").map_err(IndexError::storage)?;
    let face_index: i64 = row.try_get("face_index").map_err(IndexError::storage)?;
    let confidence: f64 = row.try_get("confidence").map_err(IndexError::storage)?;
    let cluster_id: i64 = row.try_get("cluster_id").map_err(IndexError::storage)?;

    Ok(FaceRecord {
        id: row.try_get("id").map_err(IndexError::storage)?,
        photo_id: row.try_get("photo_id").map_err(IndexError::storage)?,
        face_index: face_index as u32,
        embedding: blob_to_vec(&blob),
        bounding_box: BoundingBox {
            x: row.try_get("bbox_x").map_err(IndexError::storage)?,
            y: row.try_get("bbox_y").map_err(IndexError::storage)?,
            width: row.try_get("bbox_width").map_err(IndexError::storage)?,
            height: row.try_get("bbox_height").map_err(IndexError::storage)?,
        },
        confidence: confidence as f32,
        cluster: ClusterAssignment::from_id(cluster_id),
        person_name: row.try_get("person_name").map_err(IndexError::storage)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
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
        let metadata_json = serde_json::to_string(&photo.metadata).map_err(IndexError::storage)?;

        sqlx::query(
            r#"
            INSERT INTO photos (id, description, embedding, metadata_json, indexed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                description = excluded.description,
                embedding = excluded.embedding,
                metadata_json = excluded.metadata_json,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(&photo.id)
        .bind(&photo.description)
        .bind(vec_to_blob(&photo.embedding))
        .bind(metadata_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(IndexError::storage)?;

        Ok(())
    }

    async fn get_photo(&self, id: &str) -> Result<Option<PhotoRecord>> {
        let row = sqlx::query(
            "SELECT id, description, embedding, metadata_json, has_face_data, face_count, indexed_at
             FROM photos WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(IndexError::storage)?;
        row.as_ref().map(photo_from_row).transpose()
    }

    async fn get_all_photos(&self) -> Result<Vec<PhotoRecord>> {
        let rows = sqlx::query(
            "SELECT id, description, embedding, metadata_json, has_face_data, face_count, indexed_at
             FROM photos ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(IndexError::storage)?;
        rows.iter().map(photo_from_row).collect()
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

        let mut tx = self.pool.begin().await.map_err(IndexError::storage)?;

        let has_face_data: Option<i64> =
            sqlx::query_scalar("SELECT has_face_data FROM photos WHERE id = ?")
                .bind(photo_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(IndexError::storage)?;
        let has_face_data = match has_face_data {
            Some(flag) => flag != 0,
            None => return Err(IndexError::not_found("photo", photo_id)),
        };
        if mode == FaceWriteMode::Append && has_face_data {
            return Ok(FaceWriteOutcome::Skipped);
        }

        sqlx::query("DELETE FROM faces WHERE photo_id = ?")
            .bind(photo_id)
            .execute(&mut *tx)
            .await
            .map_err(IndexError::storage)?;

        for (i, face) in faces.iter().enumerate() {
            let index = i as u32;
            sqlx::query(
                r#"
                INSERT INTO faces (id, photo_id, face_index, embedding, bbox_x, bbox_y,
                                   bbox_width, bbox_height, confidence, cluster_id, person_name)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
                "#,
            )
            .bind(face_id(photo_id, index))
            .bind(photo_id)
            .bind(index as i64)
            .bind(vec_to_blob(&face.embedding))
            .bind(face.bounding_box.x)
            .bind(face.bounding_box.y)
            .bind(face.bounding_box.width)
            .bind(face.bounding_box.height)
            .bind(face.confidence as f64)
            .bind(ClusterAssignment::NOISE_ID)
            .execute(&mut *tx)
            .await
            .map_err(IndexError::storage)?;
        }

        sqlx::query("UPDATE photos SET has_face_data = 1, face_count = ? WHERE id = ?")
            .bind(faces.len() as i64)
            .bind(photo_id)
            .execute(&mut *tx)
            .await
            .map_err(IndexError::storage)?;

        tx.commit().await.map_err(IndexError::storage)?;
        Ok(FaceWriteOutcome::Written(faces.len()))
    }

    async fn get_face(&self, id: &str) -> Result<Option<FaceRecord>> {
        let row = sqlx::query(
            "SELECT id, photo_id, face_index, embedding, bbox_x, bbox_y, bbox_width, bbox_height,
                    confidence, cluster_id, person_name
             FROM faces WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(IndexError::storage)?;
        row.as_ref().map(face_from_row).transpose()
    }

    async fn get_all_faces(&self) -> Result<Vec<FaceRecord>> {
        let rows = sqlx::query(
            "SELECT id, photo_id, face_index, embedding, bbox_x, bbox_y, bbox_width, bbox_height,
                    confidence, cluster_id, person_name
             FROM faces ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(IndexError::storage)?;
        rows.iter().map(face_from_row).collect()
    }

    async fn update_face_cluster(
        &self,
        face_id: &str,
        cluster: ClusterAssignment,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE faces SET cluster_id = ? WHERE id = ?")
            .bind(cluster.id())
            .bind(face_id)
            .execute(&self.pool)
            .await
            .map_err(IndexError::storage)?;
        if result.rows_affected() == 0 {
            return Err(IndexError::not_found("face", face_id));
        }
        Ok(())
    }

    async fn update_face_label(&self, face_id: &str, person_name: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE faces SET person_name = ? WHERE id = ?")
            .bind(person_name)
            .bind(face_id)
            .execute(&self.pool)
            .await
            .map_err(IndexError::storage)?;
        if result.rows_affected() == 0 {
            return Err(IndexError::not_found("face", face_id));
        }
        Ok(())
    }

    async fn apply_cluster_run(&self, assignments: &[FaceAssignment]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(IndexError::storage)?;

        for a in assignments {
            let query = match &a.relabel {
                Some(name) => {
                    sqlx::query("UPDATE faces SET cluster_id = ?, person_name = ? WHERE id = ?")
                        .bind(a.cluster.id())
                        .bind(name.as_str())
                        .bind(a.face_id.as_str())
                }
                None => sqlx::query("UPDATE faces SET cluster_id = ? WHERE id = ?")
                    .bind(a.cluster.id())
                    .bind(a.face_id.as_str()),
            };
            let result = query.execute(&mut *tx).await.map_err(IndexError::storage)?;
            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back the partial run.
                return Err(IndexError::not_found("face", a.face_id.clone()));
            }
        }

        tx.commit().await.map_err(IndexError::storage)?;
        Ok(())
    }

    async fn label_cluster(&self, cluster_id: u32, person_name: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE faces SET person_name = ? WHERE cluster_id = ?")
            .bind(person_name)
            .bind(cluster_id as i64)
            .execute(&self.pool)
            .await
            .map_err(IndexError::storage)?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM photos) AS total_photos,
                (SELECT COUNT(*) FROM photos WHERE has_face_data = 1) AS photos_with_face_data,
                (SELECT COUNT(*) FROM faces) AS total_faces,
                (SELECT COUNT(DISTINCT cluster_id) FROM faces WHERE cluster_id >= 0) AS cluster_count,
                (SELECT COUNT(*) FROM faces WHERE cluster_id < 0) AS outlier_count,
                (SELECT COUNT(DISTINCT cluster_id) FROM faces
                    WHERE cluster_id >= 0 AND person_name IS NOT NULL) AS labeled_cluster_count,
                (SELECT COUNT(DISTINCT person_name) FROM faces) AS distinct_people,
                (SELECT COUNT(*) FROM faces
                    WHERE cluster_id < 0 AND person_name IS NOT NULL) AS labeled_outliers
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(IndexError::storage)?;

        let count = |name: &str| -> Result<u64> {
            let n: i64 = row.try_get(name).map_err(IndexError::storage)?;
            Ok(n as u64)
        };

        Ok(IndexStats {
            total_photos: count("total_photos")?,
            photos_with_face_data: count("photos_with_face_data")?,
            total_faces: count("total_faces")?,
            cluster_count: count("cluster_count")?,
            outlier_count: count("outlier_count")?,
            labeled_cluster_count: count("labeled_cluster_count")?,
            distinct_people: count("distinct_people")?,
            labeled_outliers: count("labeled_outliers")?,
        })
    }
}
