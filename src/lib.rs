//! # health-rag
//!
//! A local retrieval-augmented generation toolkit.
//!
//! Documents of mixed formats are extracted, chunked, embedded with a local
//! Ollama model and saved as an exact vector index. Queries retrieve the
//! closest chunks and hand them to a chat model as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Files/dirs  │──▶│ Extract      │──▶│ VectorIndex  │
//! │ pdf/docx/…  │   │ Chunk+Embed  │   │ (directory)  │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                         ┌───────────────────┤
//!                         ▼                   ▼
//!                   ┌──────────┐        ┌──────────┐
//!                   │  query   │───────▶│  Ollama  │
//!                   │ chat_mode│        │  /api/*  │
//!                   └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! health-rag pull_model nomic-embed-text
//! health-rag create_context ./reports --save_dir vector_store
//! health-rag query what was my ferritin level --vectorstore_path vector_store
//! health-rag chat_mode --session-id morning
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`format`] | Extension → format routing |
//! | [`extract`] | Per-format text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`service`] | HTTP transport with timeout and retry |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat model abstraction |
//! | [`index`] | Persisted vector index |
//! | [`ingest`] | Ingestion pipeline |
//! | [`query`] | Retrieval-augmented answering |
//! | [`chat`] | Interactive chat with session memory |
//! | [`ollama_cli`] | Model pull/remove via the `ollama` CLI |
//! | [`paths`] | User path resolution |
//! | [`progress`] | Ingest progress reporting |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod format;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod ollama_cli;
pub mod paths;
pub mod progress;
pub mod query;
pub mod service;
