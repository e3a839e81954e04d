//! Schema creation and index metadata.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so `pix init` is safe to
//! run repeatedly. The `index_metadata` table records which embedding model
//! and dimensionalities the index was built with; opening the store with a
//! configuration that disagrees is refused.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

pub const SCHEMA_VERSION: &str = "1";

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    seed_metadata(&pool, config).await?;
    pool.close().await;
    info!(db = %config.db.path.display(), "schema ready");
    Ok(())
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            id TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            has_face_data INTEGER NOT NULL DEFAULT 0,
            face_count INTEGER NOT NULL DEFAULT 0,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS faces (
            id TEXT PRIMARY KEY,
            photo_id TEXT NOT NULL,
            face_index INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            bbox_x INTEGER NOT NULL,
            bbox_y INTEGER NOT NULL,
            bbox_width INTEGER NOT NULL,
            bbox_height INTEGER NOT NULL,
            confidence REAL NOT NULL,
            cluster_id INTEGER NOT NULL DEFAULT -1,
            person_name TEXT,
            UNIQUE(photo_id, face_index),
            FOREIGN KEY (photo_id) REFERENCES photos(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_faces_photo_id ON faces(photo_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_faces_cluster_id ON faces(cluster_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_faces_person_name ON faces(person_name)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Record model and dimensionalities on first init. Existing values are
/// kept, so a later mismatch is detected on open instead of overwritten.
async fn seed_metadata(pool: &SqlitePool, config: &Config) -> Result<()> {
    let dims = config.dims();
    let now = chrono::Utc::now().to_rfc3339();
    let entries = [
        ("schema_version", SCHEMA_VERSION.to_string()),
        ("embedding_model", config.embedding_model().to_string()),
        ("photo_dims", dims.photo.to_string()),
        ("face_dims", dims.face.to_string()),
        ("last_updated", now),
    ];
    for (key, value) in entries {
        sqlx::query("INSERT OR IGNORE INTO index_metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }
    Ok(())
}
