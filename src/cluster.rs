//! `pix cluster`: run face clustering and report the outcome.
//!
//! Besides printing the report, a plain-text `cluster_stats.txt` summary is
//! written next to the database so the last run can be reviewed later.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use photo_index_core::cluster::{self, ClusterParams, ClusterRun, ClusteringReport, TuningHint};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

const TOP_CLUSTERS: usize = 20;

/// CLI overrides for the `[faces]` clustering defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterOverrides {
    pub threshold: Option<f32>,
    pub min_cluster_size: Option<usize>,
    pub incremental: bool,
}

pub fn params_from(config: &Config, overrides: ClusterOverrides) -> ClusterParams {
    ClusterParams {
        threshold: overrides.threshold.unwrap_or(config.faces.threshold),
        min_cluster_size: overrides
            .min_cluster_size
            .unwrap_or(config.faces.min_cluster_size),
        incremental: overrides.incremental,
    }
}

pub async fn run_cluster(config: &Config, overrides: ClusterOverrides) -> Result<()> {
    let params = params_from(config, overrides);
    let store = SqliteStore::open(config).await?;
    let run = cluster::cluster_faces(&store, params).await;
    if matches!(run, Ok(ClusterRun::Completed(_))) {
        store.mark_updated().await?;
    }
    store.close().await;

    let report = match run? {
        ClusterRun::UpToDate { total_faces } => {
            println!(
                "All {} faces are already clustered; nothing to do (drop --incremental to recluster).",
                total_faces
            );
            return Ok(());
        }
        ClusterRun::Completed(report) => report,
    };

    info!(
        load_ms = report.timings.load_ms,
        cluster_ms = report.timings.cluster_ms,
        persist_ms = report.timings.persist_ms,
        "clustering phases"
    );

    print_report(&report);

    let stats_path = cluster_stats_path(&config.db.path);
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    std::fs::write(&stats_path, render_cluster_stats(&report, &timestamp))
        .with_context(|| format!("Failed to write {}", stats_path.display()))?;
    println!();
    println!("Summary written to {}", stats_path.display());
    Ok(())
}

fn print_report(report: &ClusteringReport) {
    println!("Face clustering");
    println!("===============");
    println!();
    println!("  Faces:            {}", report.total_faces);
    println!("  Pending before:   {}", report.pending_faces);
    println!(
        "  Parameters:       threshold {}, min cluster size {}",
        report.params.threshold, report.params.min_cluster_size
    );
    println!();
    println!("  Clusters:         {}", report.cluster_count);
    println!("  Clustered faces:  {}", report.clustered_faces);
    println!(
        "  Outliers:         {} ({:.1}%)",
        report.outliers,
        percent(report.outliers, report.total_faces)
    );
    if report.cluster_count > 0 {
        println!("  Largest cluster:  {}", report.largest_cluster);
        println!("  Average size:     {:.1}", report.average_cluster_size);
    }
    if report.labels_propagated > 0 {
        println!("  Labels applied:   {}", report.labels_propagated);
    }
    if report.labeled_outliers > 0 {
        println!("  Labeled outliers: {}", report.labeled_outliers);
    }

    if !report.cluster_sizes.is_empty() {
        println!();
        println!("  Top clusters:");
        for c in report.cluster_sizes.iter().take(TOP_CLUSTERS) {
            println!("    cluster {:>4}  {:>6} faces", c.cluster_id, c.size);
        }
    }

    println!();
    match report.hint {
        TuningHint::Reasonable => println!("  {}", report.hint),
        hint => println!("  hint: {}", hint),
    }
    if report.cluster_count > 0 {
        println!("  next: pix clusters, then pix label <cluster_id> <name>");
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// `cluster_stats.txt` in the database directory.
pub fn cluster_stats_path(db_path: &Path) -> PathBuf {
    match db_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("cluster_stats.txt"),
        _ => PathBuf::from("cluster_stats.txt"),
    }
}

pub fn render_cluster_stats(report: &ClusteringReport, timestamp: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Face Clustering Statistics");
    let _ = writeln!(out, "Generated: {}", timestamp);
    let _ = writeln!(out);
    let _ = writeln!(out, "Total faces: {}", report.total_faces);
    let _ = writeln!(out, "Clusters: {}", report.cluster_count);
    let _ = writeln!(out, "Clustered faces: {}", report.clustered_faces);
    let _ = writeln!(out, "Outliers: {}", report.outliers);
    let _ = writeln!(out);
    let _ = writeln!(out, "Parameters:");
    let _ = writeln!(out, "  threshold: {}", report.params.threshold);
    let _ = writeln!(out, "  min_cluster_size: {}", report.params.min_cluster_size);
    let _ = writeln!(out);
    let _ = writeln!(out, "Top {} clusters:", TOP_CLUSTERS);
    for c in report.cluster_sizes.iter().take(TOP_CLUSTERS) {
        let _ = writeln!(out, "  Cluster {}: {} faces", c.cluster_id, c.size);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use photo_index_core::cluster::{ClusterSize, PhaseTimings};

    fn report() -> ClusteringReport {
        ClusteringReport {
            params: ClusterParams::default(),
            total_faces: 8,
            pending_faces: 8,
            cluster_count: 1,
            clustered_faces: 5,
            outliers: 3,
            cluster_sizes: vec![ClusterSize {
                cluster_id: 0,
                size: 5,
            }],
            largest_cluster: 5,
            average_cluster_size: 5.0,
            labels_propagated: 0,
            labeled_outliers: 0,
            hint: TuningHint::Reasonable,
            timings: PhaseTimings::default(),
        }
    }

    #[test]
    fn stats_file_sits_next_to_database() {
        assert_eq!(
            cluster_stats_path(Path::new("/data/pix/index.sqlite")),
            PathBuf::from("/data/pix/cluster_stats.txt")
        );
        assert_eq!(
            cluster_stats_path(Path::new("index.sqlite")),
            PathBuf::from("cluster_stats.txt")
        );
    }

    #[test]
    fn stats_file_lists_totals_and_clusters() {
        let text = render_cluster_stats(&report(), "2024-01-01 00:00:00");
        assert!(text.contains("Generated: 2024-01-01 00:00:00"));
        assert!(text.contains("Total faces: 8"));
        assert!(text.contains("threshold: 0.6"));
        assert!(text.contains("Cluster 0: 5 faces"));
    }

    #[test]
    fn overrides_win_over_config() {
        let config: Config = toml::from_str("[db]\npath = \"x.sqlite\"\n").unwrap();
        let params = params_from(
            &config,
            ClusterOverrides {
                threshold: Some(0.4),
                ..Default::default()
            },
        );
        assert_eq!(params.threshold, 0.4);
        assert_eq!(params.min_cluster_size, config.faces.min_cluster_size);
        assert!(!params.incremental);
    }
}
