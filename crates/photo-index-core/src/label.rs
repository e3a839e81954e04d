//! Identity labeling and cluster review.
//!
//! Cluster numbers only mean something for the run that produced them, so
//! labels are stored on each face. Labeling a cluster writes the name to
//! every face that is a member *right now*; the next clustering run carries
//! names over by majority vote (see [`crate::cluster`]).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cluster::majority_label;
use crate::error::{IndexError, Result};
use crate::models::{BoundingBox, ClusterAssignment, FaceRecord};
use crate::store::Store;

/// Attach `person_name` to every face currently in `cluster_id`.
///
/// Returns the number of faces updated; `0` is valid when the cluster no
/// longer exists. Negative ids (the noise bucket) and blank names are
/// rejected.
pub async fn label_cluster<S: Store + ?Sized>(
    store: &S,
    cluster_id: i64,
    person_name: &str,
) -> Result<u64> {
    if cluster_id < 0 {
        return Err(IndexError::precondition(format!(
            "cluster id {} is not a cluster; outliers cannot be labeled as a group",
            cluster_id
        )));
    }
    let cluster_id = u32::try_from(cluster_id)
        .map_err(|_| IndexError::precondition(format!("cluster id {} is out of range", cluster_id)))?;
    let name = person_name.trim();
    if name.is_empty() {
        return Err(IndexError::precondition("person name must not be empty"));
    }
    store.label_cluster(cluster_id, name).await
}

/// Set or clear the label of a single face.
pub async fn label_face<S: Store + ?Sized>(
    store: &S,
    face_id: &str,
    person_name: Option<&str>,
) -> Result<()> {
    let name = match person_name.map(str::trim) {
        Some("") => return Err(IndexError::precondition("person name must not be empty")),
        other => other,
    };
    store.update_face_label(face_id, name).await
}

/// Options for [`list_clusters`].
#[derive(Debug, Clone)]
pub struct ClusterListOptions {
    /// Include the noise bucket as a pseudo-cluster with id `-1`.
    pub include_outliers: bool,
    /// Skip clusters where any member already carries a label.
    pub unlabeled_only: bool,
    pub min_size: usize,
    /// Faces shown per cluster.
    pub sample_size: usize,
}

impl Default for ClusterListOptions {
    fn default() -> Self {
        Self {
            include_outliers: false,
            unlabeled_only: false,
            min_size: 3,
            sample_size: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceSample {
    pub face_id: String,
    pub photo_id: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    /// `-1` for the noise bucket.
    pub cluster_id: i64,
    pub size: usize,
    /// Most common label among members, if any.
    pub label: Option<String>,
    /// Highest-confidence members first.
    pub samples: Vec<FaceSample>,
}

fn summarize(cluster: ClusterAssignment, mut members: Vec<&FaceRecord>, samples: usize) -> ClusterSummary {
    let label = majority_label(members.iter().copied()).map(str::to_string);

    members.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ClusterSummary {
        cluster_id: cluster.id(),
        size: members.len(),
        label,
        samples: members
            .iter()
            .take(samples)
            .map(|f| FaceSample {
                face_id: f.id.clone(),
                photo_id: f.photo_id.clone(),
                confidence: f.confidence,
                bounding_box: f.bounding_box,
            })
            .collect(),
    }
}

/// Clusters for review, largest first (ties by id).
pub async fn list_clusters<S: Store + ?Sized>(
    store: &S,
    opts: &ClusterListOptions,
) -> Result<Vec<ClusterSummary>> {
    let faces = store.get_all_faces().await?;

    let mut groups: BTreeMap<i64, Vec<&FaceRecord>> = BTreeMap::new();
    for face in &faces {
        if face.cluster.is_noise() && !opts.include_outliers {
            continue;
        }
        groups.entry(face.cluster.id()).or_default().push(face);
    }

    let mut summaries: Vec<ClusterSummary> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= opts.min_size)
        .filter(|(_, members)| {
            !opts.unlabeled_only || members.iter().all(|f| f.person_name.is_none())
        })
        .map(|(id, members)| summarize(ClusterAssignment::from_id(id), members, opts.sample_size))
        .collect();
    summaries.sort_by(|a, b| b.size.cmp(&a.size).then(a.cluster_id.cmp(&b.cluster_id)));
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmbeddingDims, FaceWriteMode, NewFace, NewPhoto};
    use crate::store::memory::InMemoryStore;
    use crate::store::FaceAssignment;

    /// Store with faces pre-assigned: `p0` has three faces in cluster 0,
    /// `p1` has two faces in cluster 1, `p2` has one noise face.
    async fn fixture() -> InMemoryStore {
        let store = InMemoryStore::new(EmbeddingDims { photo: 2, face: 2 });
        let layout: [(&str, usize, ClusterAssignment); 3] = [
            ("p0", 3, ClusterAssignment::Member(0)),
            ("p1", 2, ClusterAssignment::Member(1)),
            ("p2", 1, ClusterAssignment::Noise),
        ];
        let mut run = Vec::new();
        for (photo_id, count, cluster) in layout {
            store
                .upsert_photo(&NewPhoto {
                    id: photo_id.to_string(),
                    description: String::new(),
                    embedding: vec![1.0, 0.0],
                    metadata: Default::default(),
                })
                .await
                .unwrap();
            let faces: Vec<NewFace> = (0..count)
                .map(|i| NewFace {
                    embedding: vec![1.0, i as f32],
                    bounding_box: BoundingBox {
                        x: i as i64,
                        y: 0,
                        width: 5,
                        height: 5,
                    },
                    confidence: 0.5 + i as f32 * 0.1,
                })
                .collect();
            store
                .upsert_faces(photo_id, &faces, FaceWriteMode::Append)
                .await
                .unwrap();
            for i in 0..count {
                run.push(FaceAssignment {
                    face_id: format!("{}_face_{}", photo_id, i),
                    cluster,
                    relabel: None,
                });
            }
        }
        store.apply_cluster_run(&run).await.unwrap();
        store
    }

    #[tokio::test]
    async fn label_propagates_to_current_members_only() {
        let store = fixture().await;
        let updated = label_cluster(&store, 0, "Alice").await.unwrap();
        assert_eq!(updated, 3);

        for f in store.get_all_faces().await.unwrap() {
            if f.cluster == ClusterAssignment::Member(0) {
                assert_eq!(f.person_name.as_deref(), Some("Alice"));
            } else {
                assert_eq!(f.person_name, None);
            }
        }
    }

    #[tokio::test]
    async fn vanished_cluster_updates_nothing() {
        let store = fixture().await;
        assert_eq!(label_cluster(&store, 42, "Ghost").await.unwrap(), 0);
    }

    fn snapshot(faces: &[FaceRecord]) -> Vec<(String, ClusterAssignment, Option<String>)> {
        faces
            .iter()
            .map(|f| (f.id.clone(), f.cluster, f.person_name.clone()))
            .collect()
    }

    #[tokio::test]
    async fn label_after_recluster_drift_touches_nothing() {
        let store = fixture().await;
        assert_eq!(label_cluster(&store, 1, "Bob").await.unwrap(), 2);

        // Second run: cluster 1 dissolves into noise, the others keep their ids.
        let rerun: Vec<FaceAssignment> = store
            .get_all_faces()
            .await
            .unwrap()
            .into_iter()
            .map(|f| FaceAssignment {
                cluster: match f.cluster {
                    ClusterAssignment::Member(1) => ClusterAssignment::Noise,
                    other => other,
                },
                face_id: f.id,
                relabel: None,
            })
            .collect();
        store.apply_cluster_run(&rerun).await.unwrap();

        let before = snapshot(&store.get_all_faces().await.unwrap());
        assert_eq!(label_cluster(&store, 1, "Eve").await.unwrap(), 0);
        let after = snapshot(&store.get_all_faces().await.unwrap());
        assert_eq!(before, after);

        let f = store.get_face("p1_face_1").await.unwrap().unwrap();
        assert_eq!(f.person_name.as_deref(), Some("Bob"));
        assert!(f.is_labeled_outlier());
    }

    #[tokio::test]
    async fn labeling_is_idempotent() {
        let store = fixture().await;
        assert_eq!(label_cluster(&store, 1, "Bob").await.unwrap(), 2);
        assert_eq!(label_cluster(&store, 1, "Bob").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn noise_and_blank_names_are_rejected() {
        let store = fixture().await;
        let err = label_cluster(&store, -1, "Nobody").await.unwrap_err();
        assert!(matches!(err, IndexError::Precondition(_)));
        let err = label_cluster(&store, 0, "   ").await.unwrap_err();
        assert!(matches!(err, IndexError::Precondition(_)));
    }

    #[tokio::test]
    async fn names_are_trimmed() {
        let store = fixture().await;
        label_cluster(&store, 1, "  Bob ").await.unwrap();
        let f = store.get_face("p1_face_0").await.unwrap().unwrap();
        assert_eq!(f.person_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn single_face_label_and_unlabel() {
        let store = fixture().await;
        label_face(&store, "p2_face_0", Some("Carol")).await.unwrap();
        let f = store.get_face("p2_face_0").await.unwrap().unwrap();
        assert!(f.is_labeled_outlier());

        label_face(&store, "p2_face_0", None).await.unwrap();
        let f = store.get_face("p2_face_0").await.unwrap().unwrap();
        assert_eq!(f.person_name, None);

        let err = label_face(&store, "missing", Some("X")).await.unwrap_err();
        assert!(matches!(err, IndexError::NotFound { .. }));
    }

    #[tokio::test]
    async fn listing_honours_filters() {
        let store = fixture().await;

        let defaults = list_clusters(&store, &ClusterListOptions::default())
            .await
            .unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].cluster_id, 0);
        assert_eq!(defaults[0].size, 3);
        assert_eq!(defaults[0].samples[0].face_id, "p0_face_2");

        let all = list_clusters(
            &store,
            &ClusterListOptions {
                include_outliers: true,
                min_size: 1,
                sample_size: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let ids: Vec<i64> = all.iter().map(|c| c.cluster_id).collect();
        assert_eq!(ids, vec![0, 1, -1]);
        assert!(all.iter().all(|c| c.samples.len() == 1));

        label_cluster(&store, 0, "Alice").await.unwrap();
        let unlabeled = list_clusters(
            &store,
            &ClusterListOptions {
                unlabeled_only: true,
                min_size: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let ids: Vec<i64> = unlabeled.iter().map(|c| c.cluster_id).collect();
        assert_eq!(ids, vec![1]);
    }
}
