//! Core data models used throughout the toolkit.
//!
//! These types represent the documents, extracted segments, chunks, and
//! search hits that flow through the ingestion and retrieval pipelines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::format::DocumentFormat;

/// Loader-provided metadata attached to segments and inherited by chunks.
///
/// The `source` key always holds the originating file path.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key holding the originating file path.
pub const META_SOURCE: &str = "source";

/// A file selected for ingestion, with its routed format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub format: DocumentFormat,
}

/// Raw text produced by an extractor from one [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSegment {
    pub text: String,
    pub metadata: Metadata,
}

impl ExtractedSegment {
    /// Create a segment tagged with its source path.
    pub fn new(text: impl Into<String>, source: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), source.to_string());
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// A bounded slice of a segment's text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
    /// Char offset of this chunk inside its parent segment.
    #[serde(default)]
    pub start: usize,
}

impl Chunk {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).map(String::as_str)
    }
}

/// A chunk returned from a similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity to the query vector, in `[-1.0, 1.0]`.
    pub score: f32,
}
