//! Persisted vector index.
//!
//! The index is a single SQLite file holding every chunk with its metadata
//! and embedding. [`VectorIndex::persist`] writes a complete index to a
//! temporary file and renames it over the target, so a rebuild replaces the
//! old index in one step and a failed build leaves it untouched.
//! [`VectorIndex::load`] reads the whole file into memory; similarity search
//! is a brute-force cosine scan.

use anyhow::{bail, Context, Result};
use sqlx::Row;
use std::path::{Path, PathBuf};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{IndexedChunk, Metadata};

/// An in-memory, read-only view of a persisted index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    chunks: Vec<IndexedChunk>,
}

/// A search hit borrowed from the index.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a IndexedChunk,
    pub score: f32,
}

impl VectorIndex {
    /// Build an index directly from chunks (used by tests and after a build).
    pub fn new(model: impl Into<String>, chunks: Vec<IndexedChunk>) -> Self {
        let dims = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        Self {
            model: model.into(),
            dims,
            chunks,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    /// Rank every chunk by cosine similarity to `query_vec` and return the
    /// best `limit`. Ties keep index order.
    pub fn search(&self, query_vec: &[f32], limit: usize) -> Vec<ScoredChunk<'_>> {
        let mut scored: Vec<ScoredChunk<'_>> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                chunk,
                score: cosine_similarity(query_vec, &chunk.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.position.cmp(&b.chunk.position))
        });
        scored.truncate(limit);
        scored
    }

    /// Load the index stored at `db_path`.
    pub async fn load(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            bail!(
                "vector index not found at {} (run `ragchat build-index` first)",
                db_path.display()
            );
        }

        let pool = db::connect_read_only(db_path).await?;

        let meta_rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&pool)
            .await
            .context("Failed to read index metadata")?;
        let mut model = String::new();
        let mut dims = 0usize;
        for row in &meta_rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "model" => model = value,
                "dims" => dims = value.parse().unwrap_or(0),
                _ => {}
            }
        }

        let rows = sqlx::query(
            r#"
            SELECT id, position, source, text, hash, metadata_json, embedding
            FROM chunks
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&pool)
        .await
        .context("Failed to read index chunks")?;

        let mut chunks = Vec::with_capacity(rows.len());
        for row in &rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: Metadata = serde_json::from_str(&metadata_json)
                .with_context(|| "Corrupt chunk metadata in vector index")?;
            let blob: Vec<u8> = row.get("embedding");
            chunks.push(IndexedChunk {
                id: row.get("id"),
                position: row.get("position"),
                source: row.get("source"),
                text: row.get("text"),
                hash: row.get("hash"),
                metadata,
                embedding: blob_to_vec(&blob),
            });
        }

        pool.close().await;

        if dims == 0 {
            dims = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        }

        Ok(Self {
            model,
            dims,
            chunks,
        })
    }

    /// Write `chunks` as the complete index at `db_path`, replacing any
    /// existing index.
    pub async fn persist(db_path: &Path, model: &str, chunks: &[IndexedChunk]) -> Result<()> {
        let dims = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dims) {
            bail!(
                "inconsistent embedding dimensions: chunk {} has {}, expected {}",
                bad.id,
                bad.embedding.len(),
                dims
            );
        }

        let tmp_path = temp_path(db_path);
        if tmp_path.exists() {
            std::fs::remove_file(&tmp_path)?;
        }

        let pool = db::connect(&tmp_path).await?;
        migrate::run_migrations(&pool).await?;

        let mut tx = pool.begin().await?;

        for chunk in chunks {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, position, source, text, hash, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(chunk.position)
            .bind(&chunk.source)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(&metadata_json)
            .bind(vec_to_blob(&chunk.embedding))
            .execute(&mut *tx)
            .await?;
        }

        let built_at = chrono::Utc::now().to_rfc3339();
        let meta = [
            ("model", model.to_string()),
            ("dims", dims.to_string()),
            ("chunk_count", chunks.len().to_string()),
            ("built_at", built_at),
        ];
        for (key, value) in meta {
            sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        pool.close().await;

        std::fs::rename(&tmp_path, db_path).with_context(|| {
            format!("Failed to move new index into place at {}", db_path.display())
        })?;

        Ok(())
    }
}

fn temp_path(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index.sqlite".into());
    name.push(".tmp");
    db_path.with_file_name(name)
}
