//! Photo retrieval by ID.
//!
//! Fetches a stored photo and the faces detected in it. Used by the
//! `pix get` CLI command.

use anyhow::Result;
use serde::Serialize;

use photo_index_core::error::IndexError;
use photo_index_core::models::{face_id, FaceRecord, PhotoRecord};
use photo_index_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// A photo together with its detected faces.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoResponse {
    #[serde(flatten)]
    pub photo: PhotoRecord,
    pub faces: Vec<FaceRecord>,
}

/// Look up one photo; [`IndexError::NotFound`] when it was never indexed.
pub async fn get_photo<S: Store + ?Sized>(store: &S, id: &str) -> Result<PhotoResponse> {
    let photo = store
        .get_photo(id)
        .await?
        .ok_or_else(|| IndexError::not_found("photo", id))?;

    let mut faces = Vec::with_capacity(photo.face_count as usize);
    for index in 0..photo.face_count {
        if let Some(face) = store.get_face(&face_id(&photo.id, index)).await? {
            faces.push(face);
        }
    }
    Ok(PhotoResponse { photo, faces })
}

/// CLI entry point: fetch the photo and print it to stdout.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let response = get_photo(&store, id).await;
    store.close().await;
    let PhotoResponse { photo, faces } = response?;

    println!("--- Photo ---");
    println!("id:          {}", photo.id);
    println!("indexed_at:  {}", format_ts_iso(photo.indexed_at));
    for (key, value) in &photo.metadata {
        println!("{:<12} {}", format!("{}:", key), value);
    }
    println!();

    println!("--- Description ---");
    println!("{}", photo.description);
    println!();

    if !photo.has_face_data {
        println!("--- Faces (not detected yet) ---");
        return Ok(());
    }
    println!("--- Faces ({}) ---", faces.len());
    for face in &faces {
        let b = face.bounding_box;
        println!(
            "[{}] cluster {}  confidence {:.2}  bbox {},{} {}x{}  {}",
            face.id,
            face.cluster.id(),
            face.confidence,
            b.x,
            b.y,
            b.width,
            b.height,
            face.person_name.as_deref().unwrap_or("(unlabeled)")
        );
    }
    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
