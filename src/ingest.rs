//! Ingestion pipeline orchestration.
//!
//! Coordinates the full `create_context` flow: path discovery → routing →
//! extraction → chunking → batched embedding → index build → save.
//!
//! Per-file problems (missing path, unsupported type, extraction failure)
//! are [`IngestWarning`]s: reported, then skipped. Embedding and save
//! failures abort the run. The index is always rebuilt from scratch.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::TextSplitter;
use crate::config::{Config, ExtractConfig, DEFAULT_EMBEDDING_MODEL};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::extract::{extract, ExtractError};
use crate::format::{route, DocumentFormat, UnsupportedFormat};
use crate::index::VectorIndex;
use crate::models::{Document, ExtractedSegment};
use crate::paths::normalize_path;
use crate::progress::{IngestProgressEvent, IngestProgressReporter, ProgressMode};

/// Directories never descended into during discovery.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Inputs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Files and directories to ingest. Relative paths are resolved with
    /// [`normalize_path`].
    pub paths: Vec<PathBuf>,
    pub save_dir: PathBuf,
    pub splitter: TextSplitter,
    pub batch_size: usize,
    pub extract: ExtractConfig,
    /// Extra glob patterns, matched against paths relative to each input
    /// directory.
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
}

impl IngestRequest {
    pub fn from_config(config: &Config, paths: Vec<PathBuf>, save_dir: PathBuf) -> Result<Self> {
        Ok(Self {
            paths,
            save_dir,
            splitter: TextSplitter::new(
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            )?,
            batch_size: config.embedding.batch_size,
            extract: config.extract.clone(),
            exclude_globs: config.ingest.exclude_globs.clone(),
            follow_symlinks: config.ingest.follow_symlinks,
        })
    }
}

/// A non-fatal problem with one input.
#[derive(Debug, thiserror::Error)]
pub enum IngestWarning {
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),
    #[error("Unsupported file type: {}", .0.path)]
    Unsupported(UnsupportedFormat),
    #[error("Failed to load {}: {error}", path.display())]
    Extraction { path: PathBuf, error: ExtractError },
    #[error("Failed to read {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },
}

#[derive(Debug)]
pub enum IngestOutcome {
    /// An index was written.
    Indexed {
        files: usize,
        chunks: usize,
        save_dir: PathBuf,
        warnings: Vec<IngestWarning>,
    },
    /// Nothing produced any text. The save directory was not touched.
    Empty {
        files_found: usize,
        warnings: Vec<IngestWarning>,
    },
}

impl IngestOutcome {
    pub fn warnings(&self) -> &[IngestWarning] {
        match self {
            IngestOutcome::Indexed { warnings, .. } | IngestOutcome::Empty { warnings, .. } => {
                warnings
            }
        }
    }
}

/// Run the ingestion pipeline.
///
/// `on_warning` sees each warning as soon as it occurs; the same warnings
/// are also returned in the outcome.
pub async fn ingest(
    request: &IngestRequest,
    embedder: &dyn EmbeddingProvider,
    progress: &dyn IngestProgressReporter,
    mut on_warning: impl FnMut(&IngestWarning),
) -> Result<IngestOutcome> {
    let mut warnings = Vec::new();
    let mut warn = |warning: IngestWarning| {
        tracing::debug!("{}", warning);
        on_warning(&warning);
        warnings.push(warning);
    };

    let inputs: Vec<PathBuf> = request.paths.iter().map(|p| normalize_path(p)).collect();
    progress.report(IngestProgressEvent::Discovering {
        inputs: inputs.len(),
    });
    let excludes = build_excludes(&request.exclude_globs)?;
    let files = discover(&inputs, &excludes, request.follow_symlinks, &mut warn);
    tracing::info!(files = files.len(), "discovered input files");

    let total = files.len() as u64;
    let mut segments: Vec<ExtractedSegment> = Vec::new();
    let mut files_with_text = 0usize;
    for (i, path) in files.iter().enumerate() {
        match load_file(path, &request.extract) {
            Ok(found) => {
                tracing::debug!(path = %path.display(), segments = found.len(), "extracted");
                if !found.is_empty() {
                    files_with_text += 1;
                }
                segments.extend(found);
            }
            Err(warning) => warn(warning),
        }
        progress.report(IngestProgressEvent::Extracting {
            n: i as u64 + 1,
            total,
        });
    }

    let chunks = request.splitter.split_segments(&segments);
    drop(warn);
    if chunks.is_empty() {
        return Ok(IngestOutcome::Empty {
            files_found: files.len(),
            warnings,
        });
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let total = texts.len() as u64;
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(request.batch_size.max(1)) {
        let embedded = embedder
            .embed(batch)
            .await
            .with_context(|| format!("Embedding with model '{}' failed", embedder.model_name()))?;
        vectors.extend(embedded);
        tracing::debug!(done = vectors.len(), total, "embedded batch");
        progress.report(IngestProgressEvent::Embedding {
            n: vectors.len() as u64,
            total,
        });
    }

    let count = chunks.len();
    let index = VectorIndex::build(embedder.model_name(), chunks, vectors)?;
    index.save(&request.save_dir)?;
    tracing::info!(chunks = count, dir = %request.save_dir.display(), "index saved");

    Ok(IngestOutcome::Indexed {
        files: files_with_text,
        chunks: count,
        save_dir: request.save_dir.clone(),
        warnings,
    })
}

fn load_file(path: &Path, config: &ExtractConfig) -> Result<Vec<ExtractedSegment>, IngestWarning> {
    let format = route(path).map_err(IngestWarning::Unsupported)?;
    let doc = Document {
        path: path.to_path_buf(),
        format,
    };
    extract(&doc, config).map_err(|error| IngestWarning::Extraction {
        path: path.to_path_buf(),
        error,
    })
}

fn build_excludes(extra: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES.iter().copied().chain(extra.iter().map(String::as_str)) {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid exclude glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

/// Expand inputs into the ordered, de-duplicated list of files to load.
///
/// Explicit files are kept whatever their extension, so that an
/// unsupported one is reported rather than silently ignored. Directory
/// walks keep only files with a recognized extension and are sorted by
/// file name.
pub fn discover(
    inputs: &[PathBuf],
    excludes: &GlobSet,
    follow_symlinks: bool,
    warn: &mut dyn FnMut(IngestWarning),
) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    let mut keep = |path: PathBuf, files: &mut Vec<PathBuf>| {
        if seen.insert(path.clone()) {
            files.push(path);
        }
    };

    for input in inputs {
        if !input.exists() {
            warn(IngestWarning::PathNotFound(input.clone()));
            continue;
        }
        if input.is_file() {
            keep(input.clone(), &mut files);
            continue;
        }

        let walker = WalkDir::new(input)
            .follow_links(follow_symlinks)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn(IngestWarning::Unreadable {
                        path: e.path().unwrap_or(input).to_path_buf(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(input).unwrap_or(path);
            if excludes.is_match(relative) {
                continue;
            }
            if DocumentFormat::from_path(path).is_some() {
                keep(path.to_path_buf(), &mut files);
            }
        }
    }
    files
}

/// `create_context` command: ingest `paths` into `save_dir`.
///
/// Prints each warning to stdout as it happens, then a one-line summary.
/// The embedding model is `model`, else `embedding.model`, else
/// `nomic-embed-text`.
pub async fn run_create_context(
    config: &Config,
    paths: Vec<PathBuf>,
    save_dir: &Path,
    model: Option<&str>,
    progress: ProgressMode,
) -> Result<IngestOutcome> {
    let model = model
        .or(config.embedding.model.as_deref())
        .unwrap_or(DEFAULT_EMBEDDING_MODEL);
    let embedder = create_provider(&config.embedding, model)?;
    let save_dir = normalize_path(save_dir);
    let request = IngestRequest::from_config(config, paths, save_dir)?;

    let reporter = progress.reporter();
    let outcome = ingest(&request, embedder.as_ref(), reporter.as_ref(), |w| {
        println!("{}", w)
    })
    .await?;

    match &outcome {
        IngestOutcome::Indexed {
            chunks, save_dir, ..
        } => println!(
            "Vector store saved to '{}' with {} chunks.",
            save_dir.display(),
            chunks
        ),
        IngestOutcome::Empty { files_found: 0, .. } => {
            println!("No valid files found to process.")
        }
        IngestOutcome::Empty { .. } => println!("No valid documents processed."),
    }
    Ok(outcome)
}
