//! Index statistics.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{ClusterAssignment, FaceRecord, PhotoRecord};

/// Counts that drive review tooling and progress reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_photos: u64,
    /// Photos that went through face detection.
    pub photos_with_face_data: u64,
    pub total_faces: u64,
    /// Distinct non-noise clusters.
    pub cluster_count: u64,
    /// Faces assigned to noise.
    pub outlier_count: u64,
    /// Clusters with at least one labeled member.
    pub labeled_cluster_count: u64,
    /// Distinct person names across all faces.
    pub distinct_people: u64,
    /// Noise faces that still carry a label.
    pub labeled_outliers: u64,
}

impl IndexStats {
    pub fn from_records(photos: &[PhotoRecord], faces: &[FaceRecord]) -> Self {
        let mut clusters: HashMap<u32, bool> = HashMap::new();
        let mut people: HashSet<&str> = HashSet::new();
        let mut outliers = 0u64;
        let mut labeled_outliers = 0u64;

        for face in faces {
            if let Some(name) = face.person_name.as_deref() {
                people.insert(name);
            }
            match face.cluster {
                ClusterAssignment::Noise => {
                    outliers += 1;
                    if face.person_name.is_some() {
                        labeled_outliers += 1;
                    }
                }
                ClusterAssignment::Member(id) => {
                    let labeled = clusters.entry(id).or_insert(false);
                    *labeled |= face.person_name.is_some();
                }
            }
        }

        IndexStats {
            total_photos: photos.len() as u64,
            photos_with_face_data: photos.iter().filter(|p| p.has_face_data).count() as u64,
            total_faces: faces.len() as u64,
            cluster_count: clusters.len() as u64,
            outlier_count: outliers,
            labeled_cluster_count: clusters.values().filter(|l| **l).count() as u64,
            distinct_people: people.len() as u64,
            labeled_outliers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, Metadata};

    fn face(id: &str, cluster: i64, name: Option<&str>) -> FaceRecord {
        FaceRecord {
            id: id.to_string(),
            photo_id: "p".to_string(),
            face_index: 0,
            embedding: vec![1.0],
            bounding_box: BoundingBox {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            },
            confidence: 0.9,
            cluster: ClusterAssignment::from_id(cluster),
            person_name: name.map(str::to_string),
        }
    }

    #[test]
    fn counts_clusters_outliers_and_labels() {
        let photos = vec![PhotoRecord {
            id: "p".into(),
            description: "d".into(),
            embedding: vec![1.0],
            metadata: Metadata::new(),
            has_face_data: true,
            face_count: 6,
            indexed_at: 0,
        }];
        let faces = vec![
            face("a", 0, Some("Alice")),
            face("b", 0, Some("Alice")),
            face("c", 1, None),
            face("d", 2, Some("Bob")),
            face("e", -1, None),
            face("f", -1, Some("Carol")),
        ];

        let stats = IndexStats::from_records(&photos, &faces);
        assert_eq!(stats.total_photos, 1);
        assert_eq!(stats.photos_with_face_data, 1);
        assert_eq!(stats.total_faces, 6);
        assert_eq!(stats.cluster_count, 3);
        assert_eq!(stats.outlier_count, 2);
        assert_eq!(stats.labeled_cluster_count, 2);
        assert_eq!(stats.distinct_people, 3);
        assert_eq!(stats.labeled_outliers, 1);
    }

    #[test]
    fn empty_index() {
        assert_eq!(IndexStats::from_records(&[], &[]), IndexStats::default());
    }
}
