//! Similarity retriever over the persisted vector index.
//!
//! [`Retriever::search`] never fails: an empty query returns nothing without
//! touching the embedding API, and any embedding or search failure is logged
//! and degrades to an empty result so the caller answers without context.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::index::VectorIndex;
use crate::models::{IndexedChunk, Metadata, RetrievedDocument};

pub struct Retriever {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: VectorIndex, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k: top_k.max(1),
        }
    }

    /// Load the configured index and construct the embedding client.
    ///
    /// Errors here are startup errors (missing credentials, unreadable
    /// index) and should abort the process.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = embedding::create_embedder(&config.embedding)?;
        let index = VectorIndex::load(&config.index.db_path()).await?;

        if !index.model_name().is_empty() && index.model_name() != embedder.model_name() {
            tracing::warn!(
                "index was built with embedding model '{}' but '{}' is configured; results may be meaningless",
                index.model_name(),
                embedder.model_name()
            );
        }
        tracing::info!(
            "loaded vector index: {} chunks, {} dims",
            index.len(),
            index.dims()
        );

        Ok(Self::new(index, embedder, config.retrieval.top_k))
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Return up to `k` documents most similar to `query`, best first.
    ///
    /// `k` of `None`, zero, or negative falls back to the configured top-k.
    pub async fn search(&self, query: &str, k: Option<i64>) -> Vec<RetrievedDocument> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        let k = effective_k(k, self.top_k);

        let query_vec = match embedding::embed_query(self.embedder.as_ref(), query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("retrieval failed while embedding query: {:#}", e);
                return Vec::new();
            }
        };

        if !self.index.is_empty() && query_vec.len() != self.index.dims() {
            tracing::error!(
                "retrieval failed: query vector has {} dims, index has {}",
                query_vec.len(),
                self.index.dims()
            );
            return Vec::new();
        }

        self.index
            .search(&query_vec, k)
            .into_iter()
            .enumerate()
            .map(|(i, hit)| project(hit.chunk, i + 1))
            .collect()
    }
}

fn effective_k(k: Option<i64>, default: usize) -> usize {
    match k {
        Some(k) if k > 0 => k as usize,
        _ => default,
    }
}

/// Project an indexed chunk into a [`RetrievedDocument`]; `rank` is its
/// 1-based position in the result list.
fn project(chunk: &IndexedChunk, rank: usize) -> RetrievedDocument {
    let id = meta_text(&chunk.metadata, "id")
        .or_else(|| meta_text(&chunk.metadata, "source"))
        .unwrap_or_else(|| format!("doc_{}", rank));
    let title = meta_text(&chunk.metadata, "title")
        .or_else(|| meta_text(&chunk.metadata, "header"))
        .unwrap_or_else(|| id.clone());

    RetrievedDocument {
        id,
        title,
        content: chunk.text.clone(),
        metadata: chunk.metadata.clone(),
    }
}

/// A metadata value usable as an identifier: a non-empty string or a
/// non-zero number.
fn meta_text(meta: &Metadata, key: &str) -> Option<String> {
    match meta.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text as counts of the letters a, b, c.
    struct LetterEmbedder {
        calls: AtomicUsize,
    }

    impl LetterEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    ['a', 'b', 'c']
                        .iter()
                        .map(|l| t.chars().filter(|c| c == l).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("OpenAI API error 401 Unauthorized")
        }
    }

    fn chunk(position: i64, text: &str, metadata: serde_json::Value) -> IndexedChunk {
        let metadata = metadata.as_object().cloned().unwrap_or_default();
        let embedding = ['a', 'b', 'c']
            .iter()
            .map(|l| text.chars().filter(|c| c == l).count() as f32)
            .collect();
        IndexedChunk {
            id: format!("c{}", position),
            position,
            source: "T".to_string(),
            text: text.to_string(),
            hash: String::new(),
            metadata,
            embedding,
        }
    }

    fn index() -> VectorIndex {
        VectorIndex::new(
            "letters",
            vec![
                chunk(0, "aaaa", json!({ "id": "A1", "title": "All a" })),
                chunk(1, "bbbb", json!({ "source": "B-table" })),
                chunk(2, "cccc", json!({ "header": "Sea" })),
                chunk(3, "aabb", json!({})),
            ],
        )
    }

    #[tokio::test]
    async fn test_empty_query_skips_embedding() {
        let embedder = LetterEmbedder::new();
        let retriever = Retriever::new(index(), embedder.clone(), 7);
        assert!(retriever.search("", None).await.is_empty());
        assert!(retriever.search("   ", Some(3)).await.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_results_bounded_by_k_and_corpus() {
        let retriever = Retriever::new(index(), LetterEmbedder::new(), 7);
        assert_eq!(retriever.search("abc", Some(2)).await.len(), 2);
        assert_eq!(retriever.search("abc", None).await.len(), 4);
        assert_eq!(retriever.search("abc", Some(100)).await.len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_k_falls_back_to_default() {
        let retriever = Retriever::new(index(), LetterEmbedder::new(), 1);
        assert_eq!(retriever.search("a", Some(0)).await.len(), 1);
        assert_eq!(retriever.search("a", Some(-5)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_best_match_first_with_projected_fields() {
        let retriever = Retriever::new(index(), LetterEmbedder::new(), 7);
        let docs = retriever.search("a", Some(1)).await;
        assert_eq!(docs[0].id, "A1");
        assert_eq!(docs[0].title, "All a");
        assert_eq!(docs[0].content, "aaaa");
        assert_eq!(docs[0].metadata["id"], json!("A1"));
    }

    #[tokio::test]
    async fn test_id_and_title_fallbacks() {
        let retriever = Retriever::new(index(), LetterEmbedder::new(), 7);

        let docs = retriever.search("b", Some(1)).await;
        assert_eq!(docs[0].id, "B-table");
        assert_eq!(docs[0].title, "B-table");

        let docs = retriever.search("c", Some(1)).await;
        assert_eq!(docs[0].id, "doc_1");
        assert_eq!(docs[0].title, "Sea");
    }

    #[tokio::test]
    async fn test_positional_ids_follow_result_order() {
        let index = VectorIndex::new(
            "letters",
            vec![chunk(0, "ab", json!({})), chunk(1, "aab", json!({}))],
        );
        let retriever = Retriever::new(index, LetterEmbedder::new(), 7);
        let docs = retriever.search("aab", None).await;
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["doc_1", "doc_2"]);
        assert_eq!(docs[0].content, "aab");
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_empty() {
        let retriever = Retriever::new(index(), Arc::new(BrokenEmbedder), 7);
        assert!(retriever.search("anything", None).await.is_empty());
    }

    #[test]
    fn test_meta_text_rules() {
        let meta = json!({ "s": "x", "blank": " ", "zero": 0, "n": 12, "b": true })
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(meta_text(&meta, "s").as_deref(), Some("x"));
        assert_eq!(meta_text(&meta, "blank"), None);
        assert_eq!(meta_text(&meta, "zero"), None);
        assert_eq!(meta_text(&meta, "n").as_deref(), Some("12"));
        assert_eq!(meta_text(&meta, "b"), None);
        assert_eq!(meta_text(&meta, "missing"), None);
    }
}
