//! Core data models used throughout Photo Index.
//!
//! These types represent the photo and face records that flow from the
//! ingestion collaborators into the store, and from the store into search,
//! clustering, and labeling.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar metadata value. Metadata never nests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

/// Photo metadata: filename, capture date, location, dimensions, flags.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Build [`Metadata`] from an arbitrary JSON object.
///
/// Photo sources hand over loosely typed metadata. Values are flattened to
/// scalars:
///
/// - `null` is dropped
/// - arrays become a `", "`-joined string (empty arrays are dropped)
/// - objects are kept as their JSON text
/// - integral numbers become [`MetadataValue::Integer`], others `Float`
pub fn clean_metadata(raw: &serde_json::Map<String, serde_json::Value>) -> Metadata {
    use serde_json::Value;

    let mut cleaned = Metadata::new();
    for (key, value) in raw {
        let scalar = match value {
            Value::Null => None,
            Value::Bool(b) => Some(MetadataValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(MetadataValue::Integer(i)),
                None => n.as_f64().map(MetadataValue::Float),
            },
            Value::String(s) => Some(MetadataValue::Text(s.clone())),
            Value::Array(items) if items.is_empty() => None,
            Value::Array(items) => Some(MetadataValue::Text(
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
            Value::Object(_) => Some(MetadataValue::Text(value.to_string())),
        };
        if let Some(v) = scalar {
            cleaned.insert(key.clone(), v);
        }
    }
    cleaned
}

/// Input tuple for [`Store::upsert_photo`](crate::store::Store::upsert_photo).
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub id: String,
    pub description: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

/// An indexed photo.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoRecord {
    pub id: String,
    pub description: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    /// Face detection has run for this photo.
    pub has_face_data: bool,
    /// Faces written by the last detection pass.
    pub face_count: u32,
    /// Unix timestamp of the last upsert.
    pub indexed_at: i64,
}

/// Face location in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Cluster membership of a face for the most recent clustering run.
///
/// Cluster numbers are run-scoped: the same person may get a different
/// number on the next run. Persisted as an integer with `-1` for noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ClusterAssignment {
    /// Unclustered, noise, or outlier.
    Noise,
    Member(u32),
}

impl ClusterAssignment {
    pub const NOISE_ID: i64 = -1;

    pub fn from_id(id: i64) -> Self {
        if id < 0 || id > u32::MAX as i64 {
            ClusterAssignment::Noise
        } else {
            ClusterAssignment::Member(id as u32)
        }
    }

    pub fn id(self) -> i64 {
        match self {
            ClusterAssignment::Noise => Self::NOISE_ID,
            ClusterAssignment::Member(n) => n as i64,
        }
    }

    pub fn is_noise(self) -> bool {
        matches!(self, ClusterAssignment::Noise)
    }
}

impl From<i64> for ClusterAssignment {
    fn from(id: i64) -> Self {
        ClusterAssignment::from_id(id)
    }
}

impl From<ClusterAssignment> for i64 {
    fn from(a: ClusterAssignment) -> Self {
        a.id()
    }
}

/// One detected face as handed over by the face detector.
#[derive(Debug, Clone)]
pub struct NewFace {
    pub embedding: Vec<f32>,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

/// A stored face.
#[derive(Debug, Clone, Serialize)]
pub struct FaceRecord {
    pub id: String,
    pub photo_id: String,
    pub face_index: u32,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    pub cluster: ClusterAssignment,
    pub person_name: Option<String>,
}

impl FaceRecord {
    /// Noise faces carrying a label. Reachable, never produced by this crate.
    pub fn is_labeled_outlier(&self) -> bool {
        self.cluster.is_noise() && self.person_name.is_some()
    }
}

/// Deterministic face id, so re-detection of the same photo is idempotent.
pub fn face_id(photo_id: &str, face_index: u32) -> String {
    format!("{}_face_{}", photo_id, face_index)
}

/// How [`Store::upsert_faces`](crate::store::Store::upsert_faces) treats a
/// photo that already has face data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceWriteMode {
    /// Write only when the photo has no face data yet.
    Append,
    /// Replace the photo's full face set.
    Reindex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceWriteOutcome {
    Written(usize),
    /// The photo already had face data and the mode was `Append`.
    Skipped,
}

/// Fixed embedding dimensionalities a store is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingDims {
    /// Photo description embeddings (e.g. 384 for all-MiniLM-L6-v2).
    pub photo: usize,
    /// Face-recognition embeddings (e.g. 512 for ArcFace).
    pub face: usize,
}

impl Default for EmbeddingDims {
    fn default() -> Self {
        Self {
            photo: 384,
            face: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_id_is_deterministic() {
        assert_eq!(face_id("ABC-123", 0), "ABC-123_face_0");
        assert_eq!(face_id("ABC-123", 2), face_id("ABC-123", 2));
    }

    #[test]
    fn cluster_assignment_sentinel() {
        assert_eq!(ClusterAssignment::from_id(-1), ClusterAssignment::Noise);
        assert_eq!(ClusterAssignment::from_id(7), ClusterAssignment::Member(7));
        assert_eq!(ClusterAssignment::Noise.id(), -1);
        assert_eq!(ClusterAssignment::Member(3).id(), 3);
    }

    #[test]
    fn cluster_assignment_serializes_as_integer() {
        let json = serde_json::to_string(&ClusterAssignment::Member(4)).unwrap();
        assert_eq!(json, "4");
        let json = serde_json::to_string(&ClusterAssignment::Noise).unwrap();
        assert_eq!(json, "-1");
    }

    #[test]
    fn clean_metadata_flattens_values() {
        let raw = serde_json::json!({
            "filename": "IMG_0001.HEIC",
            "favorite": true,
            "width": 4032,
            "ratio": 1.5,
            "albums": ["Summer", "Beach"],
            "keywords": [],
            "path_edited": null,
            "place": {"name": "Lisbon"}
        });
        let cleaned = clean_metadata(raw.as_object().unwrap());

        assert_eq!(
            cleaned.get("filename"),
            Some(&MetadataValue::Text("IMG_0001.HEIC".into()))
        );
        assert_eq!(cleaned.get("favorite"), Some(&MetadataValue::Bool(true)));
        assert_eq!(cleaned.get("width"), Some(&MetadataValue::Integer(4032)));
        assert_eq!(cleaned.get("ratio"), Some(&MetadataValue::Float(1.5)));
        assert_eq!(
            cleaned.get("albums"),
            Some(&MetadataValue::Text("Summer, Beach".into()))
        );
        assert!(!cleaned.contains_key("keywords"));
        assert!(!cleaned.contains_key("path_edited"));
        assert_eq!(
            cleaned.get("place"),
            Some(&MetadataValue::Text(r#"{"name":"Lisbon"}"#.into()))
        );
    }

    #[test]
    fn metadata_roundtrips_through_json() {
        let mut meta = Metadata::new();
        meta.insert("filename".into(), MetadataValue::Text("a.jpg".into()));
        meta.insert("width".into(), MetadataValue::Integer(640));
        meta.insert("favorite".into(), MetadataValue::Bool(false));
        let json = serde_json::to_string(&meta).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }
}
