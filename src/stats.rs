//! Index statistics and health overview.
//!
//! Summarizes what is indexed: photos, face detection coverage, clustering
//! and labeling progress, plus the index metadata. Used by `pix stats` to
//! confirm that imports and clustering runs landed.

use anyhow::Result;

use photo_index_core::stats::IndexStats;
use photo_index_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Run the stats command: query the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let stats = store.stats().await;
    let metadata = store.metadata().await;
    store.close().await;
    let stats = stats?;
    let metadata = metadata?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Photo Index — Stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    print_counts(&stats);

    if !metadata.is_empty() {
        println!();
        println!("  Index metadata:");
        for (key, value) in &metadata {
            let shown = if key == "last_updated" {
                chrono::DateTime::parse_from_rfc3339(value)
                    .map(|dt| format_ts_relative(dt.timestamp()))
                    .unwrap_or_else(|_| value.clone())
            } else {
                value.clone()
            };
            println!("    {:<16} {}", key, shown);
        }
    }
    println!();
    Ok(())
}

fn print_counts(stats: &IndexStats) {
    println!("  Photos:      {}", stats.total_photos);
    println!(
        "  Face data:   {} / {} ({}%)",
        stats.photos_with_face_data,
        stats.total_photos,
        percent(stats.photos_with_face_data, stats.total_photos)
    );
    println!("  Faces:       {}", stats.total_faces);
    println!(
        "  Clustered:   {} / {} ({}%)",
        stats.total_faces - stats.outlier_count.min(stats.total_faces),
        stats.total_faces,
        percent(
            stats.total_faces - stats.outlier_count.min(stats.total_faces),
            stats.total_faces
        )
    );
    println!("  Clusters:    {}", stats.cluster_count);
    println!(
        "  Labeled:     {} / {} clusters, {} people",
        stats.labeled_cluster_count, stats.cluster_count, stats.distinct_people
    );
    if stats.labeled_outliers > 0 {
        println!("  Labeled outliers: {}", stats.labeled_outliers);
    }
}

fn percent(part: u64, whole: u64) -> u64 {
    if whole > 0 {
        part * 100 / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts(ts)
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
