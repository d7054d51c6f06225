//! Query pipeline: retrieval-augmented answers with a direct fallback.
//!
//! With a usable index the query is embedded, the `top_k` nearest chunks
//! are stuffed into the system prompt, and the model answers from them.
//! Without one (no path given, path missing, or an index that fails to
//! load) the query goes to the model as-is.

use anyhow::Result;
use std::path::Path;

use crate::config::{Config, DEFAULT_EMBEDDING_MODEL};
use crate::embedding::{create_provider, embed_query, EmbeddingProvider};
use crate::index::{IndexError, VectorIndex};
use crate::llm::{ChatMessage, GenerationOptions, LanguageModel, OllamaChat};
use crate::models::SearchHit;
use crate::paths::normalize_path;

const RAG_INSTRUCTIONS: &str = "Use the following pieces of context to answer the user's question.\n\
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
----------------\n";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    pub generation: GenerationOptions,
}

impl QueryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            generation: GenerationOptions {
                temperature: config.llm.temperature,
                num_predict: Some(config.llm.num_predict),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryAnswer {
    pub answer: String,
    /// Retrieved chunks, best first. Empty for a direct answer.
    pub sources: Vec<SearchHit>,
}

impl QueryAnswer {
    pub fn used_retrieval(&self) -> bool {
        !self.sources.is_empty()
    }
}

/// Answer `query`, using the index at `store_path` when one can be loaded.
///
/// A missing or unloadable index is logged and falls back to a direct
/// model call; the embedder is never used in that case. An embedder whose
/// model name or dimension disagrees with the index is an error.
pub async fn answer_query(
    query: &str,
    store_path: Option<&Path>,
    embedder: &dyn EmbeddingProvider,
    llm: &dyn LanguageModel,
    options: &QueryOptions,
) -> Result<QueryAnswer> {
    if let Some(path) = store_path {
        match VectorIndex::load(path) {
            Ok(index) => return answer_with_index(query, &index, embedder, llm, options).await,
            Err(e) if e.is_unavailable() => {
                tracing::warn!("{}; answering without retrieval", e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let answer = llm
        .chat(&[ChatMessage::user(query)], options.generation)
        .await?;
    Ok(QueryAnswer {
        answer,
        sources: Vec::new(),
    })
}

async fn answer_with_index(
    query: &str,
    index: &VectorIndex,
    embedder: &dyn EmbeddingProvider,
    llm: &dyn LanguageModel,
    options: &QueryOptions,
) -> Result<QueryAnswer> {
    if embedder.model_name() != index.embedding_model() {
        return Err(IndexError::ModelMismatch {
            index: index.embedding_model().to_string(),
            query: embedder.model_name().to_string(),
        }
        .into());
    }
    if let Some(dims) = embedder.dims() {
        if dims != index.dims() {
            return Err(IndexError::DimensionMismatch {
                index: index.dims(),
                query: dims,
            }
            .into());
        }
    }

    let vector = embed_query(embedder, query).await?;
    let hits = index.search(&vector, options.top_k)?;
    for hit in &hits {
        tracing::debug!(
            source = hit.chunk.source().unwrap_or("?"),
            score = hit.score,
            "retrieved chunk"
        );
    }

    let messages = [
        ChatMessage::system(rag_system_prompt(&hits)),
        ChatMessage::user(query),
    ];
    let answer = llm.chat(&messages, options.generation).await?;
    Ok(QueryAnswer {
        answer,
        sources: hits,
    })
}

/// The retrieval instructions followed by the chunk texts, blank-line separated.
pub fn rag_system_prompt(hits: &[SearchHit]) -> String {
    let context = hits
        .iter()
        .map(|h| h.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}{}", RAG_INSTRUCTIONS, context)
}

/// `query` command: join the words, answer, print the answer to stdout.
///
/// The query embedder uses `embedding.model` when configured, otherwise
/// the model recorded in the index manifest.
pub async fn run_query(config: &Config, words: &[String], store_path: Option<&Path>) -> Result<()> {
    let query = words.join(" ");
    let store_path = store_path.map(normalize_path);

    let model = match (&config.embedding.model, &store_path) {
        (Some(model), _) => model.clone(),
        (None, Some(path)) => VectorIndex::read_manifest(path)
            .map(|m| m.embedding_model)
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string()),
        (None, None) => DEFAULT_EMBEDDING_MODEL.to_string(),
    };
    let embedder = create_provider(&config.embedding, &model)?;
    let llm = OllamaChat::new(&config.llm)?;

    let answer = answer_query(
        &query,
        store_path.as_deref(),
        embedder.as_ref(),
        &llm,
        &QueryOptions::from_config(config),
    )
    .await?;
    println!("{}", answer.answer);
    Ok(())
}
