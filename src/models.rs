//! Core data models used throughout the service.
//!
//! These types represent the rows, chunks, and retrieved documents that flow
//! through the ingestion and retrieval pipeline.

use serde::Serialize;
use serde_json::{Map, Value};

/// Column-ordered metadata record attached to chunks.
pub type Metadata = Map<String, Value>;

/// One row from a tabular source, before rendering and chunking.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// Source tag (the configured source name).
    pub source: String,
    /// `(column, value)` pairs in header order.
    pub fields: Vec<(String, Value)>,
}

/// A bounded-length fragment of a rendered record.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub metadata: Metadata,
}

/// A chunk as stored in (and loaded from) the vector index.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub id: String,
    /// Insertion order in the index; used to break similarity ties.
    pub position: i64,
    pub source: String,
    pub text: String,
    pub hash: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// A retrieved chunk projected for consumption by a generator and for the
/// `context` field of chat responses.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetrievedDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub metadata: Metadata,
}
