//! Integration tests for the SQLite-backed store.
//!
//! These run the storage-independent core operations (search, clustering,
//! labeling) against a real database file, proving the `Store` contract
//! holds for the persistent backend and not only the in-memory one.

use photo_index::config::Config;
use photo_index::migrate;
use photo_index::sqlite_store::SqliteStore;
use photo_index_core::cluster::{cluster_faces, ClusterParams, ClusterRun};
use photo_index_core::error::IndexError;
use photo_index_core::label::label_cluster;
use photo_index_core::models::{
    BoundingBox, ClusterAssignment, FaceWriteMode, FaceWriteOutcome, Metadata, MetadataValue,
    NewFace, NewPhoto,
};
use photo_index_core::search::search;
use photo_index_core::store::{FaceAssignment, Store};
use tempfile::TempDir;

// ─── Fixtures ───────────────────────────────────────────────────────

fn config_for(tmp: &TempDir, photo_dims: usize, face_dims: usize) -> Config {
    let toml = format!(
        "[db]\npath = \"{}/index.sqlite\"\n[embedding]\ndims = {}\n[faces]\ndims = {}\n",
        tmp.path().display(),
        photo_dims,
        face_dims
    );
    toml::from_str(&toml).unwrap()
}

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let config = config_for(tmp, 4, 4);
    migrate::run_migrations(&config).await.unwrap();
    SqliteStore::open(&config).await.unwrap()
}

fn photo(id: &str, embedding: [f32; 4]) -> NewPhoto {
    let mut metadata = Metadata::new();
    metadata.insert("filename".into(), MetadataValue::Text(format!("{}.jpg", id)));
    NewPhoto {
        id: id.to_string(),
        description: format!("description of {}", id),
        embedding: embedding.to_vec(),
        metadata,
    }
}

fn face(embedding: [f32; 4]) -> NewFace {
    NewFace {
        embedding: embedding.to_vec(),
        bounding_box: BoundingBox {
            x: 1,
            y: 2,
            width: 3,
            height: 4,
        },
        confidence: 0.9,
    }
}

/// Five tight faces (one per photo p0..p4) and three isolated ones (p5..p7).
async fn seed_faces(store: &SqliteStore) {
    let tight = [
        [1.0, 0.0, 0.0, 0.0],
        [0.99, 0.05, 0.0, 0.0],
        [0.98, 0.0, 0.05, 0.0],
        [0.99, 0.0, 0.0, 0.05],
        [0.97, 0.03, 0.03, 0.0],
    ];
    let isolated = [[0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]];
    for (i, emb) in tight.iter().chain(isolated.iter()).enumerate() {
        let id = format!("p{}", i);
        store.upsert_photo(&photo(&id, [1.0, 0.0, 0.0, 0.0])).await.unwrap();
        store
            .upsert_faces(&id, &[face(*emb)], FaceWriteMode::Append)
            .await
            .unwrap();
    }
}

fn strict_params() -> ClusterParams {
    ClusterParams {
        threshold: 0.3,
        min_cluster_size: 3,
        incremental: false,
    }
}

// ─── Photos ─────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_photo_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.upsert_photo(&photo("a", [1.0, 0.0, 0.0, 0.0])).await.unwrap();
    store.upsert_photo(&photo("a", [0.0, 1.0, 0.0, 0.0])).await.unwrap();

    let all = store.get_all_photos().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].embedding, vec![0.0, 1.0, 0.0, 0.0]);
    assert_eq!(
        all[0].metadata.get("filename"),
        Some(&MetadataValue::Text("a.jpg".into()))
    );
}

#[tokio::test]
async fn photo_dimension_mismatch_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let mut bad = photo("a", [1.0, 0.0, 0.0, 0.0]);
    bad.embedding.push(1.0);
    let err = store.upsert_photo(&bad).await.unwrap_err();
    assert!(matches!(err, IndexError::DimensionMismatch { expected: 4, got: 5, .. }));
    assert!(store.get_photo("a").await.unwrap().is_none());
}

#[tokio::test]
async fn reupsert_keeps_face_bookkeeping() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.upsert_photo(&photo("a", [1.0, 0.0, 0.0, 0.0])).await.unwrap();
    store
        .upsert_faces("a", &vec![face([1.0, 0.0, 0.0, 0.0]); 2], FaceWriteMode::Append)
        .await
        .unwrap();
    store.upsert_photo(&photo("a", [0.0, 1.0, 0.0, 0.0])).await.unwrap();

    let a = store.get_photo("a").await.unwrap().unwrap();
    assert!(a.has_face_data);
    assert_eq!(a.face_count, 2);
}

#[tokio::test]
async fn search_ranks_by_similarity() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store.upsert_photo(&photo("same", [1.0, 0.0, 0.0, 0.0])).await.unwrap();
    store.upsert_photo(&photo("orthogonal", [0.0, 1.0, 0.0, 0.0])).await.unwrap();

    let hits = search(&store, &[1.0, 0.0, 0.0, 0.0], 5).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].photo_id, "same");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[1].score.abs() < 1e-5);
}

// ─── Faces ──────────────────────────────────────────────────────────

#[tokio::test]
async fn faces_for_unknown_photo_are_not_found() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let err = store
        .upsert_faces("ghost", &[face([1.0, 0.0, 0.0, 0.0])], FaceWriteMode::Append)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::NotFound { kind: "photo", .. }));
}

#[tokio::test]
async fn append_skips_and_reindex_replaces() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.upsert_photo(&photo("a", [1.0, 0.0, 0.0, 0.0])).await.unwrap();

    let first = store
        .upsert_faces("a", &vec![face([1.0, 0.0, 0.0, 0.0]); 3], FaceWriteMode::Append)
        .await
        .unwrap();
    assert_eq!(first, FaceWriteOutcome::Written(3));

    let again = store
        .upsert_faces("a", &[face([0.0, 1.0, 0.0, 0.0])], FaceWriteMode::Append)
        .await
        .unwrap();
    assert_eq!(again, FaceWriteOutcome::Skipped);
    assert_eq!(store.get_all_faces().await.unwrap().len(), 3);

    let replaced = store
        .upsert_faces("a", &[face([0.0, 1.0, 0.0, 0.0])], FaceWriteMode::Reindex)
        .await
        .unwrap();
    assert_eq!(replaced, FaceWriteOutcome::Written(1));
    let faces = store.get_all_faces().await.unwrap();
    assert_eq!(faces.len(), 1);
    assert_eq!(faces[0].id, "a_face_0");
    assert_eq!(faces[0].cluster, ClusterAssignment::Noise);
    assert_eq!(store.get_photo("a").await.unwrap().unwrap().face_count, 1);
}

#[tokio::test]
async fn targeted_updates_leave_embedding_alone() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.upsert_photo(&photo("a", [1.0, 0.0, 0.0, 0.0])).await.unwrap();
    store
        .upsert_faces("a", &[face([0.0, 0.0, 1.0, 0.0])], FaceWriteMode::Append)
        .await
        .unwrap();

    store
        .update_face_cluster("a_face_0", ClusterAssignment::Member(7))
        .await
        .unwrap();
    store.update_face_label("a_face_0", Some("Ada")).await.unwrap();

    let f = store.get_face("a_face_0").await.unwrap().unwrap();
    assert_eq!(f.cluster, ClusterAssignment::Member(7));
    assert_eq!(f.person_name.as_deref(), Some("Ada"));
    assert_eq!(f.embedding, vec![0.0, 0.0, 1.0, 0.0]);

    let err = store.update_face_label("missing", None).await.unwrap_err();
    assert!(matches!(err, IndexError::NotFound { kind: "face", .. }));
}

#[tokio::test]
async fn failed_cluster_run_rolls_back() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.upsert_photo(&photo("a", [1.0, 0.0, 0.0, 0.0])).await.unwrap();
    store
        .upsert_faces("a", &[face([1.0, 0.0, 0.0, 0.0])], FaceWriteMode::Append)
        .await
        .unwrap();

    let run = [
        FaceAssignment {
            face_id: "a_face_0".into(),
            cluster: ClusterAssignment::Member(0),
            relabel: None,
        },
        FaceAssignment {
            face_id: "missing".into(),
            cluster: ClusterAssignment::Member(0),
            relabel: None,
        },
    ];
    assert!(store.apply_cluster_run(&run).await.is_err());
    let f = store.get_face("a_face_0").await.unwrap().unwrap();
    assert_eq!(f.cluster, ClusterAssignment::Noise);
}

// ─── Clustering and labels ──────────────────────────────────────────

#[tokio::test]
async fn clustering_separates_noise() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed_faces(&store).await;

    let report = match cluster_faces(&store, strict_params()).await.unwrap() {
        ClusterRun::Completed(report) => report,
        other => panic!("expected a completed run, got {:?}", other),
    };
    assert_eq!(report.cluster_count, 1);
    assert_eq!(report.clustered_faces, 5);
    assert_eq!(report.outliers, 3);

    let faces = store.get_all_faces().await.unwrap();
    for f in &faces[..5] {
        assert_eq!(f.cluster, ClusterAssignment::Member(0));
    }
    for f in &faces[5..] {
        assert_eq!(f.cluster, ClusterAssignment::Noise);
    }
}

#[tokio::test]
async fn labels_propagate_and_survive_reclustering() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    seed_faces(&store).await;
    cluster_faces(&store, strict_params()).await.unwrap();

    assert_eq!(label_cluster(&store, 0, "Alice").await.unwrap(), 5);
    assert_eq!(label_cluster(&store, 0, "Alice").await.unwrap(), 5);
    assert_eq!(label_cluster(&store, 9, "Nobody").await.unwrap(), 0);

    // A single stray correction is outvoted on the next run.
    store.update_face_label("p1_face_0", Some("Bob")).await.unwrap();
    cluster_faces(&store, strict_params()).await.unwrap();
    let p1 = store.get_face("p1_face_0").await.unwrap().unwrap();
    assert_eq!(p1.person_name.as_deref(), Some("Alice"));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_photos, 8);
    assert_eq!(stats.photos_with_face_data, 8);
    assert_eq!(stats.total_faces, 8);
    assert_eq!(stats.cluster_count, 1);
    assert_eq!(stats.outlier_count, 3);
    assert_eq!(stats.labeled_cluster_count, 1);
    assert_eq!(stats.distinct_people, 1);
    assert_eq!(stats.labeled_outliers, 0);
}

#[tokio::test]
async fn incremental_run_is_up_to_date_without_noise() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.upsert_photo(&photo("a", [1.0, 0.0, 0.0, 0.0])).await.unwrap();
    store
        .upsert_faces("a", &vec![face([1.0, 0.0, 0.0, 0.0]); 3], FaceWriteMode::Append)
        .await
        .unwrap();

    let params = ClusterParams {
        incremental: true,
        ..strict_params()
    };
    assert!(matches!(
        cluster_faces(&store, params).await.unwrap(),
        ClusterRun::Completed(_)
    ));
    assert!(matches!(
        cluster_faces(&store, params).await.unwrap(),
        ClusterRun::UpToDate { total_faces: 3 }
    ));
}

// ─── Opening ────────────────────────────────────────────────────────

#[tokio::test]
async fn open_refuses_changed_dimensions() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    store.close().await;

    let err = SqliteStore::open(&config_for(&tmp, 8, 4)).await.err().unwrap();
    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::DimensionMismatch { expected: 8, got: 4, .. })
    ));
}

#[tokio::test]
async fn metadata_records_model_and_dims() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let metadata = store.metadata().await.unwrap();
    let get = |key: &str| {
        metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    assert_eq!(get("photo_dims"), Some("4"));
    assert_eq!(get("face_dims"), Some("4"));
    assert_eq!(get("schema_version"), Some(migrate::SCHEMA_VERSION));
}
