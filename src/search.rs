use anyhow::{bail, Result};

use photo_index_core::models::{Metadata, MetadataValue};
use photo_index_core::search::{self, SearchHit};

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

const EXCERPT_CHARS: usize = 160;

/// Embed `query` with the configured text provider and rank every photo.
pub async fn search_photos(config: &Config, query: &str, limit: Option<i64>) -> Result<Vec<SearchHit>> {
    let limit = limit.unwrap_or(config.search.default_limit);
    if limit <= 0 {
        bail!("--limit must be a positive integer (got {})", limit);
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let store = SqliteStore::open(config).await?;
    let provider = embedding::create_provider(&config.embedding)?;
    let query_vec = embedding::embed_query(provider.as_ref(), &config.embedding, query).await?;
    let hits = search::search(&store, &query_vec, limit as usize).await;
    store.close().await;
    Ok(hits?)
}

pub async fn run_search(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    let hits = search_photos(config, query, limit).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}",
            i + 1,
            hit.score,
            text_field(&hit.metadata, "filename").unwrap_or("(unnamed)")
        );
        if let Some(date) = text_field(&hit.metadata, "date") {
            println!("    date: {}", date);
        }
        if let Some(place) = location(&hit.metadata) {
            println!("    location: {}", place);
        }
        println!("    excerpt: \"{}\"", excerpt(&hit.description, EXCERPT_CHARS));
        println!("    id: {}", hit.photo_id);
        println!();
    }
    Ok(())
}

fn text_field<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(MetadataValue::as_str)
}

/// Place name when present, otherwise the raw coordinates.
fn location(metadata: &Metadata) -> Option<String> {
    if let Some(place) = text_field(metadata, "place") {
        return Some(place.to_string());
    }
    match (metadata.get("latitude"), metadata.get("longitude")) {
        (Some(lat), Some(lon)) => Some(format!("{}, {}", lat, lon)),
        _ => None,
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
