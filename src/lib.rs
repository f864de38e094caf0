//! # tell-me-why
//!
//! A local-first retrieval-augmented code assistant. Point it at a tree of
//! private source code and documentation, and it answers questions about
//! that tree with a local model (Ollama) or, on request, a cloud model
//! (Anthropic), always citing the chunks it used.
//!
//! ## Architecture
//!
//! ```text
//!  Loader ──▶ Splitter ──▶ VectorStoreGateway ◀── RagChain ◀── ChainManager
//!  (walk)     (per-lang)   (embed + SQLite)       (prompt+LLM)       │
//!                                                                    ▼
//!                                               CLI (tmw) ──▶ Assistant ◀── HTTP (axum)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tmw init                          # create the index
//! tmw ingest --path ./rag_documents # load, split, embed, store
//! tmw query "How is email validated?"
//! tmw query "..." --provider claude # send context to the cloud model
//! tmw serve                         # HTTP API on 127.0.0.1:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed error taxonomy |
//! | [`models`] | Core data types |
//! | [`loader`] | Directory walk and document classification |
//! | [`extract`] | PDF/DOCX text extraction |
//! | [`chunk`] | Language-aware recursive splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector store trait, SQLite and in-memory backends |
//! | [`gateway`] | Embed-and-store / embed-and-search |
//! | [`ingest`] | Ingestion pipeline |
//! | [`llm`] | Local and cloud LLM providers |
//! | [`chain`] | Retrieval-augmented answer chain |
//! | [`manager`] | Per-provider chain cache |
//! | [`assistant`] | `ingest` / `query` facade |
//! | [`server`] | HTTP API |
//! | [`stats`] | CLI stats rendering |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assistant;
pub mod chain;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod manager;
pub mod migrate;
pub mod models;
pub mod server;
pub mod stats;
pub mod store;
