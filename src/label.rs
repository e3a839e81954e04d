//! `pix clusters`, `pix label`, and `pix label-face`.

use anyhow::Result;

use photo_index_core::label::{self, ClusterListOptions, ClusterSummary};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Sample faces printed per line before wrapping.
const SAMPLES_PER_LINE: usize = 4;

pub async fn run_clusters(config: &Config, opts: &ClusterListOptions) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let clusters = label::list_clusters(&store, opts).await;
    store.close().await;
    let clusters = clusters?;

    if clusters.is_empty() {
        println!("No clusters. Run `pix cluster` after importing faces.");
        return Ok(());
    }

    println!("{:>8}  {:>6}  {}", "CLUSTER", "FACES", "LABEL");
    println!("{}", "-".repeat(40));
    for cluster in &clusters {
        print_cluster(cluster);
    }
    println!();
    println!("{} cluster(s)", clusters.len());
    Ok(())
}

fn print_cluster(cluster: &ClusterSummary) {
    let id = if cluster.cluster_id < 0 {
        "outliers".to_string()
    } else {
        cluster.cluster_id.to_string()
    };
    println!(
        "{:>8}  {:>6}  {}",
        id,
        cluster.size,
        cluster.label.as_deref().unwrap_or("(unlabeled)")
    );
    for chunk in cluster.samples.chunks(SAMPLES_PER_LINE) {
        let line: Vec<String> = chunk
            .iter()
            .map(|s| format!("{} ({:.2})", s.face_id, s.confidence))
            .collect();
        println!("          {}", line.join("  "));
    }
}

pub async fn run_label(config: &Config, cluster_id: i64, name: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let updated = label::label_cluster(&store, cluster_id, name).await;
    if updated.is_ok() {
        store.mark_updated().await?;
    }
    store.close().await;
    let updated = updated?;

    if updated == 0 {
        println!(
            "Cluster {} has no faces (cluster ids change between runs; check `pix clusters`).",
            cluster_id
        );
    } else {
        println!(
            "Labeled {} face(s) in cluster {} as \"{}\".",
            updated,
            cluster_id,
            name.trim()
        );
    }
    Ok(())
}

pub async fn run_label_face(config: &Config, face_id: &str, name: Option<&str>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let result = label::label_face(&store, face_id, name).await;
    if result.is_ok() {
        store.mark_updated().await?;
    }
    store.close().await;
    result?;

    match name {
        Some(name) => println!("Labeled face {} as \"{}\".", face_id, name.trim()),
        None => println!("Cleared label of face {}.", face_id),
    }
    Ok(())
}
