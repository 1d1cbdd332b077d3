//! Fixed-size sliding-window chunking.
//!
//! Windows are measured in characters (Unicode scalar values), start at
//! offset 0 and advance by `chunk_size - overlap`. Windows with no
//! non-whitespace character are dropped, so a whitespace-only tail never
//! becomes a chunk.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_OVERLAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, overlap: DEFAULT_OVERLAP }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self { chunk_size, overlap }
    }

    /// Distance between consecutive window starts. Requires `chunk_size > overlap`.
    pub fn step(&self) -> Result<usize> {
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfiguration(format!(
                "chunk_size ({}) must be greater than overlap ({})",
                self.chunk_size, self.overlap
            )));
        }
        Ok(self.chunk_size - self.overlap)
    }

    pub fn validate(&self) -> Result<()> {
        self.step().map(|_| ())
    }
}

/// Character ranges of the kept windows, in traversal order.
pub fn chunk_spans(text: &str, size: usize, overlap: usize) -> Result<Vec<Range<usize>>> {
    let step = ChunkingConfig::new(size, overlap).step()?;
    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = start.saturating_add(size).min(chars.len());
        if chars[start..end].iter().any(|c| !c.is_whitespace()) {
            spans.push(start..end);
        }
        start += step;
    }
    Ok(spans)
}

/// Split `text` into overlapping windows of at most `size` characters.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    let spans = chunk_spans(text, size, overlap)?;
    // Byte offset of every character boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    Ok(spans
        .into_iter()
        .map(|r| text[bounds[r.start]..bounds[r.end]].to_string())
        .collect())
}

/// Chunk one document and stamp each piece with its position and the
/// document's total chunk count.
pub fn chunk_document(source_id: &str, text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let pieces = chunk(text, config.chunk_size, config.overlap)?;
    let total_chunks = pieces.len();
    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(position_index, text)| Chunk {
            text,
            source_id: source_id.to_string(),
            position_index,
            total_chunks,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_hundred_chars_make_three_windows() {
        let text = "A".repeat(1200);
        let spans = chunk_spans(&text, 500, 100).unwrap();
        let starts: Vec<usize> = spans.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![0, 400, 800]);

        let chunks = chunk_document("doc1", &text, &ChunkingConfig::new(500, 100)).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text.len(), 400);
        assert!(chunks.iter().all(|c| c.total_chunks == 3));
        let positions: Vec<usize> = chunks.iter().map(|c| c.position_index).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        for (size, overlap) in [(100, 100), (100, 150), (0, 0)] {
            match chunk("some text", size, overlap) {
                Err(Error::InvalidConfiguration(_)) => {}
                other => panic!("expected InvalidConfiguration, got {other:?}"),
            }
        }
    }

    #[test]
    fn whitespace_windows_are_dropped() {
        let text = format!("{}{}", "x".repeat(10), " ".repeat(30));
        let chunks = chunk(&text, 10, 0).unwrap();
        assert_eq!(chunks, vec!["x".repeat(10)]);
        assert!(chunk("   \n\t  ", 4, 1).unwrap().is_empty());
        assert!(chunk("", 4, 1).unwrap().is_empty());
    }

    #[test]
    fn consecutive_windows_share_overlap() {
        let text: String = ('a'..='z').collect();
        let chunks = chunk(&text, 10, 3).unwrap();
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(7).collect();
            assert!(pair[1].starts_with(&tail), "{:?} / {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn multibyte_text_is_split_on_characters() {
        let text = "საგადასახადო კოდექსი".repeat(20);
        let chunks = chunk(&text, 50, 10).unwrap();
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
        assert_eq!(chunks[0].chars().count(), 50);
    }

    #[test]
    fn every_non_whitespace_char_is_covered() {
        let text = "Lorem ipsum dolor sit amet,\n\n   consectetur adipiscing elit.   \n".repeat(7);
        for (size, overlap) in [(7, 0), (13, 5), (40, 39), (500, 100)] {
            let spans = chunk_spans(&text, size, overlap).unwrap();
            for (i, c) in text.chars().enumerate() {
                if c.is_whitespace() {
                    continue;
                }
                assert!(
                    spans.iter().any(|r| r.contains(&i)),
                    "char {i} uncovered for size={size} overlap={overlap}"
                );
            }
        }
    }

    #[test]
    fn huge_window_sizes_do_not_overflow() {
        let spans = chunk_spans("abcdef", usize::MAX, usize::MAX - 1).unwrap();
        assert_eq!(spans, vec![0..6, 1..6, 2..6, 3..6, 4..6, 5..6]);
        assert_eq!(chunk("abcdef", usize::MAX, 0).unwrap(), vec!["abcdef"]);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
        assert_eq!(chunk(&text, 64, 16).unwrap(), chunk(&text, 64, 16).unwrap());
    }
}
