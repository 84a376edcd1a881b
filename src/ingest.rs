//! Index build pipeline.
//!
//! Coordinates the offline build: CSV sources → rendered rows → chunking →
//! embedding → persisted vector index. Any read or embedding failure aborts
//! the run before the index file is touched.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::csv_source;
use crate::embedding::{self, Embedder};
use crate::index::VectorIndex;
use crate::models::{Chunk, IndexedChunk};

/// Counters reported after a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub sources: usize,
    pub rows: usize,
    pub chunks: usize,
    pub index_path: PathBuf,
}

/// Build the index using the configured embedding API and print a summary.
pub async fn run_build_index(config: &Config) -> Result<()> {
    let embedder = embedding::create_embedder(&config.embedding)?;
    let summary = build_index_with(config, embedder.as_ref()).await?;

    println!("build-index");
    println!("  sources: {}", summary.sources);
    println!("  rows: {}", summary.rows);
    println!("  chunks: {}", summary.chunks);
    println!("  index: {}", summary.index_path.display());
    println!("ok");
    Ok(())
}

/// Build the index with an explicit embedder.
pub async fn build_index_with(config: &Config, embedder: &dyn Embedder) -> Result<BuildSummary> {
    if config.sources.is_empty() {
        bail!("no [[sources]] configured; nothing to index");
    }

    let mut rows = 0usize;
    let mut chunks: Vec<Chunk> = Vec::new();

    for source in &config.sources {
        let records = csv_source::load_records(source)?;
        tracing::info!(source = %source.name, rows = records.len(), "loaded source");
        rows += records.len();

        for record in &records {
            let text = csv_source::render_record(record);
            let metadata = csv_source::record_metadata(record);
            chunks.extend(chunk_text(
                &record.source,
                &text,
                &metadata,
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            ));
        }
    }

    if chunks.is_empty() {
        bail!("configured sources produced no chunks to index");
    }

    tracing::info!(
        chunks = chunks.len(),
        model = embedder.model_name(),
        "embedding chunks"
    );
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedding::embed_in_batches(embedder, &texts, config.embedding.batch_size)
        .await
        .context("Failed to embed chunks")?;

    let indexed: Vec<IndexedChunk> = chunks
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(position, (chunk, embedding))| IndexedChunk {
            id: chunk.id,
            position: position as i64,
            source: chunk.source,
            text: chunk.text,
            hash: chunk.hash,
            metadata: chunk.metadata,
            embedding,
        })
        .collect();

    let index_path = config.index.db_path();
    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create index directory {}", parent.display()))?;
    }
    VectorIndex::persist(&index_path, embedder.model_name(), &indexed).await?;
    tracing::info!(path = %index_path.display(), "vector index written");

    Ok(BuildSummary {
        sources: config.sources.len(),
        rows,
        chunks: indexed.len(),
        index_path,
    })
}
