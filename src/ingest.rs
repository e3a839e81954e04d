//! Manifest ingestion.
//!
//! Photos and face detections arrive as JSON Lines manifests produced by
//! the photo-library exporter and the face detector:
//!
//! ```text
//! {"id": "9F1C…", "description": "…", "image_path": "/…/IMG_0001.jpg", "metadata": {…}}
//! {"photo_id": "9F1C…", "faces": [{"embedding": […], "bbox": [x, y, w, h], "confidence": 0.98}]}
//! ```
//!
//! A photo without a description is described by the vision model; a photo
//! without an embedding is embedded with the configured text provider.
//! Every record is processed independently: failures are logged, counted,
//! and the run continues.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use photo_index_core::embedding::EmbeddingProvider;
use photo_index_core::models::{
    clean_metadata, BoundingBox, FaceWriteMode, FaceWriteOutcome, MetadataValue, NewFace,
    NewPhoto,
};
use photo_index_core::store::Store;

use crate::config::Config;
use crate::describe::Describer;
use crate::embedding;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::sqlite_store::SqliteStore;

/// A manifest record that could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("line {line}: invalid record: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("photo {id}: no description and no image_path to describe")]
    NothingToDescribe { id: String },
    #[error("photo {id}: no description and describe.provider is disabled")]
    DescribeDisabled { id: String },
    #[error("photo {id}: face {index} confidence {confidence} is outside [0, 1]")]
    ConfidenceOutOfRange {
        id: String,
        index: usize,
        confidence: f32,
    },
}

/// One line of a photo manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoEntry {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// One line of a face-detection manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct FaceEntry {
    pub photo_id: String,
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectedFace {
    pub embedding: Vec<f32>,
    /// `[x, y, width, height]` in source pixels.
    pub bbox: [i64; 4],
    pub confidence: f32,
}

/// Outcome counters for one ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub read: usize,
    pub ok: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Photos whose description came from the vision model.
    pub described: usize,
    pub faces_written: usize,
    /// Detections below the confidence floor.
    pub faces_dropped: usize,
}

/// Parse a JSON Lines manifest. Blank lines are ignored; a malformed line
/// becomes a per-record error carrying its 1-based line number.
pub fn parse_manifest<T: DeserializeOwned>(
    content: &str,
) -> Vec<std::result::Result<T, ManifestError>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| ManifestError::Parse {
                line: i + 1,
                source,
            })
        })
        .collect()
}

async fn read_manifest<T: DeserializeOwned>(
    path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<Vec<std::result::Result<T, ManifestError>>> {
    progress.report(ProgressEvent::Reading {
        manifest: path.display().to_string(),
    });
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    Ok(parse_manifest(&content))
}

// ============ Photos ============

/// Options for [`ingest_photo_entries`].
pub struct PhotoIngestOptions<'a> {
    pub describer: Option<&'a Describer>,
    /// Text provider for entries without an embedding.
    pub provider: &'a dyn EmbeddingProvider,
    /// Leave photos that are already indexed untouched.
    pub skip_existing: bool,
}

pub async fn run_ingest_photos(
    config: &Config,
    manifest: &Path,
    limit: Option<usize>,
    dry_run: bool,
    skip_existing: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let mut entries: Vec<_> = read_manifest::<PhotoEntry>(manifest, progress).await?;
    if let Some(lim) = limit {
        entries.truncate(lim);
    }

    if dry_run {
        let valid: Vec<&PhotoEntry> = entries.iter().filter_map(|e| e.as_ref().ok()).collect();
        println!("ingest photos (dry-run)");
        println!("  records: {}", entries.len());
        println!("  invalid: {}", entries.len() - valid.len());
        println!(
            "  need description: {}",
            valid.iter().filter(|e| needs_description(e)).count()
        );
        println!(
            "  need embedding: {}",
            valid.iter().filter(|e| e.embedding.is_none()).count()
        );
        return Ok(());
    }

    let store = SqliteStore::open(config).await?;
    let describer = Describer::from_config(&config.describe)?;
    let provider = embedding::create_provider(&config.embedding)?;

    let summary = ingest_photo_entries(
        &store,
        config,
        entries,
        &PhotoIngestOptions {
            describer: describer.as_ref(),
            provider: provider.as_ref(),
            skip_existing,
        },
        progress,
    )
    .await;
    store.mark_updated().await?;
    store.close().await;

    println!("ingest photos");
    println!("  read: {}", summary.read);
    println!("  indexed: {}", summary.ok);
    println!("  described: {}", summary.described);
    println!("  skipped: {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    println!("ok");
    Ok(())
}

fn needs_description(entry: &PhotoEntry) -> bool {
    entry
        .description
        .as_deref()
        .map_or(true, |d| d.trim().is_empty())
}

/// Index every parsed photo entry, continuing past failures.
pub async fn ingest_photo_entries<S: Store + ?Sized>(
    store: &S,
    config: &Config,
    entries: Vec<std::result::Result<PhotoEntry, ManifestError>>,
    opts: &PhotoIngestOptions<'_>,
    progress: &dyn ProgressReporter,
) -> IngestSummary {
    let total = entries.len() as u64;
    let mut summary = IngestSummary {
        read: entries.len(),
        ..Default::default()
    };

    for (n, entry) in entries.into_iter().enumerate() {
        let result = match entry {
            Ok(entry) => ingest_photo(store, config, entry, opts).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(PhotoOutcome::Indexed { described }) => {
                summary.ok += 1;
                if described {
                    summary.described += 1;
                }
            }
            Ok(PhotoOutcome::AlreadyIndexed) => summary.skipped += 1,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "photo not indexed");
                summary.failed += 1;
            }
        }
        progress.report(ProgressEvent::Ingesting {
            kind: "photos",
            n: n as u64 + 1,
            total,
        });
    }

    info!(
        ok = summary.ok,
        failed = summary.failed,
        skipped = summary.skipped,
        "photo ingest finished"
    );
    summary
}

enum PhotoOutcome {
    Indexed { described: bool },
    AlreadyIndexed,
}

async fn ingest_photo<S: Store + ?Sized>(
    store: &S,
    config: &Config,
    entry: PhotoEntry,
    opts: &PhotoIngestOptions<'_>,
) -> Result<PhotoOutcome> {
    if opts.skip_existing && store.get_photo(&entry.id).await?.is_some() {
        debug!(photo = %entry.id, "already indexed, skipping");
        return Ok(PhotoOutcome::AlreadyIndexed);
    }

    let described = needs_description(&entry);
    let description = if described {
        let path = entry
            .image_path
            .as_deref()
            .ok_or_else(|| ManifestError::NothingToDescribe {
                id: entry.id.clone(),
            })?;
        let describer = opts.describer.ok_or_else(|| ManifestError::DescribeDisabled {
            id: entry.id.clone(),
        })?;
        describer.describe(path).await?
    } else {
        entry.description.clone().unwrap_or_default()
    };

    let embedding = match entry.embedding {
        Some(v) => v,
        None => embedding::embed_query(opts.provider, &config.embedding, &description)
            .await
            .with_context(|| format!("photo {}: embedding failed", entry.id))?,
    };

    let mut metadata = clean_metadata(&entry.metadata);
    if let Some(path) = &entry.image_path {
        metadata
            .entry("path".to_string())
            .or_insert_with(|| MetadataValue::Text(path.display().to_string()));
    }

    store
        .upsert_photo(&NewPhoto {
            id: entry.id,
            description,
            embedding,
            metadata,
        })
        .await?;
    Ok(PhotoOutcome::Indexed { described })
}

// ============ Faces ============

pub async fn run_ingest_faces(
    config: &Config,
    manifest: &Path,
    reindex: bool,
    min_confidence: Option<f32>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let entries = read_manifest::<FaceEntry>(manifest, progress).await?;
    let min_confidence = min_confidence.unwrap_or(config.faces.min_confidence);
    let mode = if reindex {
        FaceWriteMode::Reindex
    } else {
        FaceWriteMode::Append
    };

    let store = SqliteStore::open(config).await?;
    let summary = ingest_face_entries(&store, entries, mode, min_confidence, progress).await;
    store.mark_updated().await?;
    store.close().await;

    println!("ingest faces");
    println!("  read: {}", summary.read);
    println!("  photos processed: {}", summary.ok);
    println!("  faces written: {}", summary.faces_written);
    println!(
        "  faces dropped (confidence < {}): {}",
        min_confidence, summary.faces_dropped
    );
    println!("  skipped (already processed): {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    if summary.faces_written > 0 {
        println!("  next: pix cluster");
    }
    println!("ok");
    Ok(())
}

/// Filter one record's detections and write the survivors. Returns the
/// write outcome and how many detections fell below `min_confidence`.
async fn ingest_faces_for<S: Store + ?Sized>(
    store: &S,
    entry: FaceEntry,
    mode: FaceWriteMode,
    min_confidence: f32,
) -> Result<(FaceWriteOutcome, usize)> {
    if let Some((index, face)) = entry
        .faces
        .iter()
        .enumerate()
        .find(|(_, f)| !(0.0..=1.0).contains(&f.confidence))
    {
        return Err(ManifestError::ConfidenceOutOfRange {
            id: entry.photo_id.clone(),
            index,
            confidence: face.confidence,
        }
        .into());
    }

    let (kept, dropped): (Vec<DetectedFace>, Vec<DetectedFace>) = entry
        .faces
        .into_iter()
        .partition(|f| f.confidence >= min_confidence);
    let faces: Vec<NewFace> = kept
        .into_iter()
        .map(|f| NewFace {
            embedding: f.embedding,
            bounding_box: BoundingBox {
                x: f.bbox[0],
                y: f.bbox[1],
                width: f.bbox[2],
                height: f.bbox[3],
            },
            confidence: f.confidence,
        })
        .collect();
    let outcome = store
        .upsert_faces(&entry.photo_id, &faces, mode)
        .await
        .with_context(|| format!("photo {}", entry.photo_id))?;
    Ok((outcome, dropped.len()))
}

/// Write every parsed detection record, continuing past failures.
pub async fn ingest_face_entries<S: Store + ?Sized>(
    store: &S,
    entries: Vec<std::result::Result<FaceEntry, ManifestError>>,
    mode: FaceWriteMode,
    min_confidence: f32,
    progress: &dyn ProgressReporter,
) -> IngestSummary {
    let total = entries.len() as u64;
    let mut summary = IngestSummary {
        read: entries.len(),
        ..Default::default()
    };

    for (n, entry) in entries.into_iter().enumerate() {
        let result = match entry {
            Ok(entry) => ingest_faces_for(store, entry, mode, min_confidence).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok((FaceWriteOutcome::Written(count), dropped)) => {
                summary.ok += 1;
                summary.faces_written += count;
                summary.faces_dropped += dropped;
            }
            Ok((FaceWriteOutcome::Skipped, _)) => summary.skipped += 1,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "faces not indexed");
                summary.failed += 1;
            }
        }
        progress.report(ProgressEvent::Ingesting {
            kind: "faces",
            n: n as u64 + 1,
            total,
        });
    }

    info!(
        photos = summary.ok,
        faces = summary.faces_written,
        failed = summary.failed,
        "face ingest finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;
    use crate::progress::NoProgress;
    use photo_index_core::models::EmbeddingDims;
    use photo_index_core::store::memory::InMemoryStore;

    fn config() -> Config {
        toml::from_str("[db]\npath = \"unused.sqlite\"\n").unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new(EmbeddingDims { photo: 3, face: 2 })
    }

    fn opts(provider: &DisabledProvider) -> PhotoIngestOptions<'_> {
        PhotoIngestOptions {
            describer: None,
            provider,
            skip_existing: false,
        }
    }

    #[test]
    fn parse_reports_line_numbers() {
        let content = "{\"id\": \"a\"}\n\nnot json\n{\"id\": \"b\"}\n";
        let parsed = parse_manifest::<PhotoEntry>(content);
        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_ok());
        match &parsed[1] {
            Err(ManifestError::Parse { line, .. }) => assert_eq!(*line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert_eq!(parsed[2].as_ref().unwrap().id, "b");
    }

    #[tokio::test]
    async fn photos_continue_past_failures() {
        let store = store();
        let provider = DisabledProvider;
        let manifest = concat!(
            "{\"id\": \"p1\", \"description\": \"sunset\", \"embedding\": [1, 0, 0], ",
            "\"metadata\": {\"albums\": [\"Trip\", \"Beach\"], \"place\": null}}\n",
            "{\"id\": \"p2\", \"description\": \"no vector\"}\n",
            "{\"id\": \"p3\", \"embedding\": [0, 1, 0]}\n",
            "{\"id\": \"p4\", \"description\": \"wrong dims\", \"embedding\": [1, 0]}\n",
            "garbage\n",
        );
        let summary = ingest_photo_entries(
            &store,
            &config(),
            parse_manifest(manifest),
            &opts(&provider),
            &NoProgress,
        )
        .await;

        assert_eq!(summary.read, 5);
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.failed, 4);

        let p1 = store.get_photo("p1").await.unwrap().unwrap();
        assert_eq!(
            p1.metadata.get("albums"),
            Some(&MetadataValue::Text("Trip, Beach".into()))
        );
        assert!(!p1.metadata.contains_key("place"));
        assert!(store.get_photo("p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skip_existing_leaves_indexed_photos() {
        let store = store();
        let provider = DisabledProvider;
        let first = "{\"id\": \"p1\", \"description\": \"first\", \"embedding\": [1, 0, 0]}\n";
        ingest_photo_entries(&store, &config(), parse_manifest(first), &opts(&provider), &NoProgress)
            .await;

        let second = "{\"id\": \"p1\", \"description\": \"second\", \"embedding\": [1, 0, 0]}\n";
        let summary = ingest_photo_entries(
            &store,
            &config(),
            parse_manifest(second),
            &PhotoIngestOptions {
                skip_existing: true,
                ..opts(&provider)
            },
            &NoProgress,
        )
        .await;
        assert_eq!(summary.skipped, 1);
        let p1 = store.get_photo("p1").await.unwrap().unwrap();
        assert_eq!(p1.description, "first");
    }

    #[tokio::test]
    async fn faces_respect_confidence_floor_and_append_mode() {
        let store = store();
        let provider = DisabledProvider;
        let photos = "{\"id\": \"p1\", \"description\": \"party\", \"embedding\": [1, 0, 0]}\n";
        ingest_photo_entries(&store, &config(), parse_manifest(photos), &opts(&provider), &NoProgress)
            .await;

        let faces = concat!(
            "{\"photo_id\": \"p1\", \"faces\": [",
            "{\"embedding\": [1, 0], \"bbox\": [1, 2, 3, 4], \"confidence\": 0.9},",
            "{\"embedding\": [0, 1], \"bbox\": [5, 6, 7, 8], \"confidence\": 0.3}]}\n",
            "{\"photo_id\": \"ghost\", \"faces\": []}\n",
        );
        let summary = ingest_face_entries(
            &store,
            parse_manifest(faces),
            FaceWriteMode::Append,
            0.5,
            &NoProgress,
        )
        .await;
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.faces_written, 1);
        assert_eq!(summary.faces_dropped, 1);
        assert_eq!(summary.failed, 1);

        let face = store.get_face("p1_face_0").await.unwrap().unwrap();
        assert_eq!(
            face.bounding_box,
            BoundingBox {
                x: 1,
                y: 2,
                width: 3,
                height: 4
            }
        );

        let again = ingest_face_entries(
            &store,
            parse_manifest(faces),
            FaceWriteMode::Append,
            0.5,
            &NoProgress,
        )
        .await;
        assert_eq!(again.skipped, 1);
        assert_eq!(again.faces_written, 0);
        assert_eq!(again.faces_dropped, 0);
    }

    #[tokio::test]
    async fn out_of_range_confidence_fails_the_record() {
        let store = store();
        let provider = DisabledProvider;
        let photos = concat!(
            "{\"id\": \"p1\", \"description\": \"party\", \"embedding\": [1, 0, 0]}\n",
            "{\"id\": \"p2\", \"description\": \"picnic\", \"embedding\": [0, 1, 0]}\n",
        );
        ingest_photo_entries(&store, &config(), parse_manifest(photos), &opts(&provider), &NoProgress)
            .await;

        let faces = concat!(
            "{\"photo_id\": \"p1\", \"faces\": [",
            "{\"embedding\": [1, 0], \"bbox\": [1, 2, 3, 4], \"confidence\": 0.9},",
            "{\"embedding\": [0, 1], \"bbox\": [5, 6, 7, 8], \"confidence\": 1.5}]}\n",
            "{\"photo_id\": \"p2\", \"faces\": [",
            "{\"embedding\": [1, 0], \"bbox\": [1, 2, 3, 4], \"confidence\": -0.2}]}\n",
        );
        let summary = ingest_face_entries(
            &store,
            parse_manifest(faces),
            FaceWriteMode::Append,
            0.5,
            &NoProgress,
        )
        .await;
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.ok, 0);
        assert_eq!(summary.faces_written, 0);
        assert_eq!(summary.faces_dropped, 0);
        assert!(store.get_all_faces().await.unwrap().is_empty());
        assert!(!store.get_photo("p1").await.unwrap().unwrap().has_face_data);
    }
}
