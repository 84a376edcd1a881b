//! # ragchat
//!
//! A small retrieval-augmented chat service over tabular data.
//!
//! CSV sources are flattened into text, chunked, embedded through a hosted
//! embedding API and persisted as a SQLite vector index. At query time the
//! retriever embeds the question, ranks chunks by cosine similarity, and the
//! generator answers through a hosted chat model, optionally grounded in the
//! retrieved chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │ CSV sources │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! └─────────────┘   └──────────────┘   │  index    │
//!                                      └─────┬─────┘
//!                                            ▼
//!                   ┌──────────┐       ┌───────────┐
//!                   │ Chat bot │◀──────│ Retriever │
//!                   └────┬─────┘       └───────────┘
//!                  ┌─────┴──────┐
//!                  ▼            ▼
//!             ┌────────┐   ┌────────┐
//!             │  CLI   │   │  HTTP  │
//!             └────────┘   └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragchat build-index           # embed the CSV sources
//! ragchat search "credits"      # inspect retrieval
//! ragchat chat --rag            # terminal chat with context
//! ragchat serve                 # HTTP API on 127.0.0.1:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with defaults |
//! | [`models`] | Core data types |
//! | [`csv_source`] | CSV loading and row rendering |
//! | [`chunk`] | Recursive character splitting |
//! | [`embedding`] | Embedding client and vector utilities |
//! | [`index`] | Persisted vector index |
//! | [`ingest`] | Index build pipeline |
//! | [`retriever`] | Similarity search |
//! | [`llm`] | Chat-completion client |
//! | [`generator`] | Bots with conversation memory |
//! | [`chat_loop`] | Interactive terminal chat |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Index schema |

pub mod chat_loop;
pub mod chunk;
pub mod config;
pub mod csv_source;
pub mod db;
pub mod embedding;
pub mod generator;
pub mod http;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod retriever;
pub mod server;
