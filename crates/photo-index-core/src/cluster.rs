//! Face clustering.
//!
//! Groups face embeddings into identity clusters with density-based
//! clustering (DBSCAN) under cosine distance, then re-attaches user labels
//! to the new run-scoped cluster numbers.
//!
//! # Algorithm
//!
//! 1. Validate parameters and load every face.
//! 2. In incremental mode, stop early when no face is noise.
//! 3. DBSCAN over all embeddings: `eps = threshold`, a face is a neighbor
//!    of another when their cosine distance is `<= eps` (every face is its
//!    own neighbor), a core face has at least `min_cluster_size` neighbors.
//!    Clusters are numbered from 0 in scan order.
//! 4. For every cluster, the majority `person_name` of its members (ties go
//!    to the lexicographically smallest name) is written to each member
//!    whose label differs. Noise faces keep their labels.
//! 5. Persist every assignment in one [`Store::apply_cluster_run`] call.
//!
//! "Incremental" is an early exit, never delta clustering: any run that
//! proceeds recomputes every face.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::embedding::{cosine_distance, normalize};
use crate::error::{check_dims, IndexError, Result};
use crate::models::{ClusterAssignment, FaceRecord};
use crate::store::{FaceAssignment, Store};

/// Clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterParams {
    /// Maximum cosine distance between neighbors, in `(0, 1]`.
    pub threshold: f32,
    /// Minimum neighborhood size of a core face.
    pub min_cluster_size: usize,
    /// Skip the run when no face is unclustered.
    pub incremental: bool,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            min_cluster_size: 3,
            incremental: false,
        }
    }
}

impl ClusterParams {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 || self.threshold > 1.0 {
            return Err(IndexError::precondition(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.min_cluster_size < 1 {
            return Err(IndexError::precondition(
                "min_cluster_size must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Outcome of [`cluster_faces`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClusterRun {
    /// Incremental mode found no unclustered face; nothing changed.
    UpToDate { total_faces: usize },
    Completed(ClusteringReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClusterSize {
    pub cluster_id: u32,
    pub size: usize,
}

/// Suggested parameter adjustment after a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TuningHint {
    /// More than half of all faces ended up as noise.
    HighOutlierRate { rate: f64 },
    /// Fewer than 10 clusters over more than 1000 faces.
    FewClusters,
    Reasonable,
}

impl TuningHint {
    fn assess(total_faces: usize, cluster_count: usize, outliers: usize) -> Self {
        if total_faces == 0 {
            return TuningHint::Reasonable;
        }
        let rate = outliers as f64 / total_faces as f64;
        if rate > 0.5 {
            TuningHint::HighOutlierRate { rate }
        } else if cluster_count < 10 && total_faces > 1000 {
            TuningHint::FewClusters
        } else {
            TuningHint::Reasonable
        }
    }
}

impl fmt::Display for TuningHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuningHint::HighOutlierRate { rate } => write!(
                f,
                "{:.1}% of faces are outliers; try a higher threshold or a lower min cluster size",
                rate * 100.0
            ),
            TuningHint::FewClusters => f.write_str(
                "few clusters for this many faces; try a lower threshold to split merged people",
            ),
            TuningHint::Reasonable => f.write_str("clustering looks reasonable"),
        }
    }
}

/// Wall-clock durations of the clustering phases, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseTimings {
    pub load_ms: u64,
    pub cluster_ms: u64,
    pub persist_ms: u64,
}

/// Summary of a completed clustering run.
#[derive(Debug, Clone, Serialize)]
pub struct ClusteringReport {
    pub params: ClusterParams,
    pub total_faces: usize,
    /// Noise faces before the run (new faces start as noise).
    pub pending_faces: usize,
    pub cluster_count: usize,
    pub clustered_faces: usize,
    pub outliers: usize,
    /// Sorted by size (desc), then cluster id.
    pub cluster_sizes: Vec<ClusterSize>,
    pub largest_cluster: usize,
    pub average_cluster_size: f64,
    /// Faces whose label was rewritten by majority re-resolution.
    pub labels_propagated: usize,
    /// Noise faces that kept a label.
    pub labeled_outliers: usize,
    pub hint: TuningHint,
    pub timings: PhaseTimings,
}

/// DBSCAN over cosine distance.
///
/// Returns one label per input, `None` for noise. Cluster numbers follow
/// the scan order of the first core point reached.
pub fn dbscan(embeddings: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<Option<u32>> {
    let unit: Vec<Vec<f32>> = embeddings.iter().map(|e| normalize(e)).collect();
    let n = unit.len();

    let neighborhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| i == j || cosine_distance(&unit[i], &unit[j]) <= eps)
                .collect()
        })
        .collect();
    let is_core: Vec<bool> = neighborhoods
        .iter()
        .map(|nb| nb.len() >= min_samples)
        .collect();

    let mut labels: Vec<Option<u32>> = vec![None; n];
    let mut next_label = 0u32;
    let mut stack = Vec::new();

    for start in 0..n {
        if labels[start].is_some() || !is_core[start] {
            continue;
        }
        stack.push(start);
        while let Some(i) = stack.pop() {
            if labels[i].is_some() {
                continue;
            }
            labels[i] = Some(next_label);
            if is_core[i] {
                stack.extend(neighborhoods[i].iter().copied().filter(|&v| labels[v].is_none()));
            }
        }
        next_label += 1;
    }

    labels
}

/// Majority label of a set of members; ties go to the smallest name.
pub(crate) fn majority_label<'a>(members: impl Iterator<Item = &'a FaceRecord>) -> Option<&'a str> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for face in members {
        if let Some(name) = face.person_name.as_deref() {
            *counts.entry(name).or_default() += 1;
        }
    }
    // BTreeMap iterates names ascending; keep the first maximum.
    let mut best: Option<(&str, usize)> = None;
    for (name, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name)
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Cluster every stored face and persist the new assignments.
pub async fn cluster_faces<S: Store + ?Sized>(store: &S, params: ClusterParams) -> Result<ClusterRun> {
    params.validate()?;

    let load_start = Instant::now();
    let faces = store.get_all_faces().await?;
    let load_ms = elapsed_ms(load_start);

    if faces.is_empty() {
        return Err(IndexError::precondition("no faces indexed; nothing to cluster"));
    }

    let dims = store.dims().face;
    for face in &faces {
        check_dims(format!("face {}", face.id), dims, face.embedding.len())?;
    }

    let pending_faces = faces.iter().filter(|f| f.cluster.is_noise()).count();
    if params.incremental && pending_faces == 0 {
        return Ok(ClusterRun::UpToDate {
            total_faces: faces.len(),
        });
    }

    let cluster_start = Instant::now();
    let embeddings: Vec<Vec<f32>> = faces.iter().map(|f| f.embedding.clone()).collect();
    let labels = dbscan(&embeddings, params.threshold, params.min_cluster_size);

    let mut members: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        if let Some(c) = label {
            members.entry(*c).or_default().push(i);
        }
    }
    let majority: HashMap<u32, String> = members
        .iter()
        .filter_map(|(c, idx)| {
            majority_label(idx.iter().map(|&i| &faces[i])).map(|name| (*c, name.to_string()))
        })
        .collect();

    let mut labels_propagated = 0usize;
    let mut labeled_outliers = 0usize;
    let assignments: Vec<FaceAssignment> = faces
        .iter()
        .zip(&labels)
        .map(|(face, label)| {
            let cluster = match label {
                Some(c) => ClusterAssignment::Member(*c),
                None => ClusterAssignment::Noise,
            };
            let relabel = label
                .and_then(|c| majority.get(&c))
                .filter(|name| face.person_name.as_deref() != Some(name.as_str()))
                .cloned();
            if relabel.is_some() {
                labels_propagated += 1;
            }
            if cluster.is_noise() && face.person_name.is_some() {
                labeled_outliers += 1;
            }
            FaceAssignment {
                face_id: face.id.clone(),
                cluster,
                relabel,
            }
        })
        .collect();
    let cluster_ms = elapsed_ms(cluster_start);

    let persist_start = Instant::now();
    store.apply_cluster_run(&assignments).await?;
    let persist_ms = elapsed_ms(persist_start);

    let mut cluster_sizes: Vec<ClusterSize> = members
        .iter()
        .map(|(c, idx)| ClusterSize {
            cluster_id: *c,
            size: idx.len(),
        })
        .collect();
    cluster_sizes.sort_by(|a, b| b.size.cmp(&a.size).then(a.cluster_id.cmp(&b.cluster_id)));

    let cluster_count = cluster_sizes.len();
    let clustered_faces: usize = cluster_sizes.iter().map(|c| c.size).sum();
    let outliers = faces.len() - clustered_faces;

    Ok(ClusterRun::Completed(ClusteringReport {
        params,
        total_faces: faces.len(),
        pending_faces,
        cluster_count,
        clustered_faces,
        outliers,
        largest_cluster: cluster_sizes.first().map_or(0, |c| c.size),
        average_cluster_size: if cluster_count == 0 {
            0.0
        } else {
            clustered_faces as f64 / cluster_count as f64
        },
        cluster_sizes,
        labels_propagated,
        labeled_outliers,
        hint: TuningHint::assess(faces.len(), cluster_count, outliers),
        timings: PhaseTimings {
            load_ms,
            cluster_ms,
            persist_ms,
        },
    }))
}
