//! Fixed-size character windowing with overlap.
//!
//! Windows are measured in Unicode scalar values, not bytes, so a multi-byte
//! character is never cut in half.

use serde::Serialize;

use crate::config::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::error::SegmentError;
use crate::model::Document;

/// A trimmed window of the source document. `start..end` is the untrimmed
/// window in character offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub page: Option<usize>,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

struct Window<'a> {
    start: usize,
    end: usize,
    start_byte: usize,
    raw: &'a str,
}

impl Segmenter {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, SegmentError> {
        if overlap >= chunk_size {
            return Err(SegmentError::InvalidWindow {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    fn windows<'a>(&self, text: &'a str) -> Vec<Window<'a>> {
        let mut windows = Vec::new();
        if text.is_empty() {
            return windows;
        }

        // Byte offset of every char boundary, including the end of the text.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = bounds.len() - 1;

        let mut start = 0;
        while start < len {
            let end = len.min(start + self.chunk_size);
            windows.push(Window {
                start,
                end,
                start_byte: bounds[start],
                raw: &text[bounds[start]..bounds[end]],
            });
            if end == len {
                break;
            }
            start = end.saturating_sub(self.overlap);
        }
        windows
    }

    /// Splits `text` into trimmed, non-empty windows in document order.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.windows(text)
            .into_iter()
            .filter_map(|w| {
                let trimmed = w.raw.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect()
    }

    /// Segments a document into identified chunks (`chunk-0`, `chunk-1`, ...).
    /// Ids are assigned after empty windows are dropped, so they stay dense.
    pub fn chunks(&self, document: &Document) -> Vec<Chunk> {
        self.windows(&document.text)
            .into_iter()
            .filter_map(|w| {
                let trimmed = w.raw.trim();
                if trimmed.is_empty() {
                    return None;
                }
                let leading = w.raw.len() - w.raw.trim_start().len();
                Some((w.start_byte + leading, w.start, w.end, trimmed))
            })
            .enumerate()
            .map(|(i, (byte, start, end, text))| Chunk {
                id: format!("chunk-{}", i),
                text: text.to_string(),
                page: document.page_at(byte),
                start,
                end,
            })
            .collect()
    }
}

/// Convenience wrapper over [`Segmenter::split`].
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>, SegmentError> {
    Ok(Segmenter::new(chunk_size, overlap)?.split(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";

    #[test]
    fn alphabet_windows() {
        let chunks = split(ALPHABET, 10, 3).unwrap();
        assert_eq!(
            chunks,
            vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]
        );

        let spans: Vec<(usize, usize)> = Segmenter::new(10, 3)
            .unwrap()
            .chunks(&Document::plain(ALPHABET))
            .iter()
            .map(|c| (c.start, c.end))
            .collect();
        assert_eq!(spans, vec![(0, 10), (7, 17), (14, 24), (21, 26)]);
    }

    #[test]
    fn windows_cover_text_and_overlap_exactly() {
        let text: String = (0..347).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        for (size, overlap) in [(10, 0), (10, 9), (50, 7), (100, 99), (400, 10)] {
            let chunks = Segmenter::new(size, overlap)
                .unwrap()
                .chunks(&Document::plain(text.clone()));
            assert_eq!(chunks.first().map(|c| c.start), Some(0));
            assert_eq!(chunks.last().map(|c| c.end), Some(text.len()));
            for pair in chunks.windows(2) {
                assert!(pair[1].start <= pair[0].end, "gap between windows");
                if pair[1].end < text.len() {
                    assert_eq!(pair[0].end - pair[1].start, overlap);
                }
            }
            for chunk in &chunks {
                assert_eq!(chunk.text, &text[chunk.start..chunk.end]);
            }
        }
    }

    #[test]
    fn empty_and_short_inputs() {
        assert!(split("", 10, 3).unwrap().is_empty());
        assert!(split("   \n\t ", 10, 3).unwrap().is_empty());
        assert_eq!(split("  short text \n", 100, 10).unwrap(), vec!["short text"]);
    }

    #[test]
    fn blank_windows_are_dropped_but_walk_continues() {
        let text = format!("{}{}", " ".repeat(20), "tail");
        let segmenter = Segmenter::new(10, 2).unwrap();
        let chunks = segmenter.chunks(&Document::plain(text));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "chunk-0");
        assert_eq!(chunks[0].text, "tail");
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        assert_eq!(
            Segmenter::new(10, 10),
            Err(SegmentError::InvalidWindow {
                chunk_size: 10,
                overlap: 10
            })
        );
        assert!(Segmenter::new(0, 0).is_err());
        assert!(split("abc", 5, 8).is_err());
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "ééééé";
        let chunks = split(text, 2, 0).unwrap();
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn chunks_record_starting_page() {
        let document = Document::from_pages(vec![
            "first page text".to_string(),
            "second page".to_string(),
        ]);
        let chunks = Segmenter::new(10, 0).unwrap().chunks(&document);
        let pages: Vec<Option<usize>> = chunks.iter().map(|c| c.page).collect();
        // "first page" | " text\nseco" | "nd page"
        assert_eq!(pages, vec![Some(1), Some(1), Some(2)]);
        assert!(Document::plain("x").page_at(0).is_none());
    }
}
