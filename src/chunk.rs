//! Boundary-aware text chunker with overlap.
//!
//! Splits [`ExtractedSegment`]s into [`Chunk`]s of at most `chunk_size`
//! characters, where each chunk after the first begins within the last
//! `chunk_overlap` characters of its predecessor.
//!
//! # Algorithm
//!
//! Lengths are counted in `char`s, never bytes.
//!
//! 1. Skip leading whitespace; that is where the first chunk starts.
//! 2. If the rest of the segment fits in `chunk_size`, emit it and stop.
//! 3. Otherwise pick an end in `(start + overlap, start + chunk_size]`,
//!    preferring (latest first) a paragraph break, a line break, a sentence
//!    end, then any whitespace. With none available, cut hard at
//!    `start + chunk_size`.
//! 4. Start the next chunk at the first word start inside the last
//!    `overlap` characters of the chunk just emitted, and repeat.
//!
//! Stored chunk text has trailing whitespace trimmed. Segment metadata is
//! copied unmodified into every chunk.
//!
//! # Example
//!
//! ```rust
//! use health_rag::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(40, 10).unwrap();
//! let pieces = splitter.split_text("Anemia is a low red cell count. It causes fatigue and pallor.");
//! assert_eq!(pieces.len(), 2);
//! assert!(pieces.iter().all(|(_, text)| text.chars().count() <= 40));
//! ```

use crate::models::{Chunk, ExtractedSegment};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Rejected chunker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkConfigError {
    #[error("chunk size must be > 0")]
    ZeroSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Splits text into bounded, overlapping passages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkConfigError> {
        if chunk_size == 0 {
            return Err(ChunkConfigError::ZeroSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkConfigError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunk every segment in order, inheriting each segment's metadata.
    pub fn split_segments(&self, segments: &[ExtractedSegment]) -> Vec<Chunk> {
        segments
            .iter()
            .flat_map(|segment| {
                self.split_text(&segment.text)
                    .into_iter()
                    .map(|(start, text)| Chunk {
                        text,
                        metadata: segment.metadata.clone(),
                        start,
                    })
            })
            .collect()
    }

    /// Split raw text into `(char_offset, text)` pieces.
    ///
    /// Returns an empty vector for empty or whitespace-only input.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut pieces = Vec::new();

        let mut start = skip_whitespace(&chars, 0);
        while start < len {
            let hard_end = start + self.chunk_size;
            let end = if hard_end >= len {
                len
            } else {
                find_break(&chars, start + self.chunk_overlap + 1, hard_end)
            };

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim_end();
            if !piece.is_empty() {
                pieces.push((start, piece.to_string()));
            }

            if end >= len {
                break;
            }
            start = self.next_start(&chars, start, end);
        }

        pieces
    }

    /// First word start inside the overlap window `[end - overlap, end)`.
    ///
    /// Always strictly greater than `start`, which guarantees progress.
    fn next_start(&self, chars: &[char], start: usize, end: usize) -> usize {
        if self.chunk_overlap == 0 {
            return skip_whitespace(chars, end);
        }
        let lo = end.saturating_sub(self.chunk_overlap).max(start + 1);
        (lo..end)
            .find(|&p| !chars[p].is_whitespace() && chars[p - 1].is_whitespace())
            .unwrap_or_else(|| skip_whitespace(chars, lo))
    }
}

/// Pick a chunk end in `[lo, hi]`, `hi < chars.len()`. The char at the
/// returned index is the first one excluded from the chunk.
fn find_break(chars: &[char], lo: usize, hi: usize) -> usize {
    let len = chars.len();
    let paragraph = |b: usize| chars[b] == '\n' && b + 1 < len && chars[b + 1] == '\n';
    let line = |b: usize| chars[b] == '\n';
    let sentence =
        |b: usize| matches!(chars[b - 1], '.' | '!' | '?') && chars[b].is_whitespace();
    let word = |b: usize| chars[b].is_whitespace();

    rfind(lo, hi, paragraph)
        .or_else(|| rfind(lo, hi, line))
        .or_else(|| rfind(lo, hi, sentence))
        .or_else(|| rfind(lo, hi, word))
        .unwrap_or(hi)
}

fn rfind(lo: usize, hi: usize, pred: impl Fn(usize) -> bool) -> Option<usize> {
    (lo..=hi).rev().find(|&b| pred(b))
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}
