//! Fixed-size chunking with configurable overlap.

use folio_protocol::Span;
use serde::{Deserialize, Serialize};

/// One chunk of the normalized text, in char offsets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub span: Span,
    /// Characters shared with the following chunk; zero on the last chunk.
    pub overlap_with_next: usize,
}

/// Split `text_char_len` characters into chunks of at most `max_chars` with
/// `overlap` characters shared between neighbors.
///
/// Chunk bounds prefer whitespace: a chunk end backs up to the nearest
/// whitespace within the trailing 10% of the window so LM stages rarely see
/// words cut in half. Offsets are characters, not bytes.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    assert!(max_chars > 0, "max_chars must be positive");
    let overlap = overlap.min(max_chars / 2);
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;
    while start < total {
        let hard_end = (start + max_chars).min(total);
        let end = if hard_end == total {
            total
        } else {
            soften_end(&chars, start, hard_end, max_chars)
        };
        chunks.push(Chunk {
            index,
            span: Span::new(start, end),
            overlap_with_next: 0,
        });
        index += 1;
        if end == total {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    for i in 0..chunks.len().saturating_sub(1) {
        let next_start = chunks[i + 1].span.start;
        chunks[i].overlap_with_next = chunks[i].span.end.saturating_sub(next_start);
    }
    chunks
}

/// Back up from `hard_end` to the nearest whitespace within the trailing 10%
/// of the window; fall back to the hard cut when none is found.
fn soften_end(chars: &[char], start: usize, hard_end: usize, max_chars: usize) -> usize {
    let floor = hard_end.saturating_sub(max_chars / 10).max(start + 1);
    let mut pos = hard_end;
    while pos > floor {
        if chars[pos - 1].is_whitespace() {
            return pos;
        }
        pos -= 1;
    }
    hard_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("a short document", 3000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].span, Span::new(0, 16));
        assert_eq!(chunks[0].overlap_with_next, 0);
    }

    #[test]
    fn test_chunks_cover_text_with_overlap() {
        let text = "word ".repeat(1000); // 5000 chars
        let chunks = chunk_text(&text, 3000, 200);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].span.start, 0);
        assert_eq!(chunks.last().unwrap().span.end, 5000);
        for pair in chunks.windows(2) {
            let overlap = pair[0].span.end.saturating_sub(pair[1].span.start);
            assert_eq!(pair[0].overlap_with_next, overlap);
            assert!(overlap <= 200);
            assert!(pair[1].span.start < pair[0].span.end, "chunks must overlap");
        }
        for c in &chunks {
            assert!(c.span.len() <= 3000);
        }
    }

    #[test]
    fn test_chunk_ends_prefer_whitespace() {
        let text = format!("{} {}", "a".repeat(2990), "b".repeat(100));
        let chunks = chunk_text(&text, 3000, 0);
        assert_eq!(chunks[0].span.end, 2991); // cut after the space
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 3000, 200).is_empty());
    }
}
