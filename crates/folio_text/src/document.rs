//! The immutable normalized document shared read-only by every stage.

use folio_protocol::Span;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::chunk::{chunk_text, Chunk};
use crate::sentence::SentenceIndex;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("document exceeds maximum upload size: {size} > {limit} bytes")]
    Oversize { size: usize, limit: usize },
    #[error("document is not valid UTF-8")]
    InvalidUtf8,
    #[error("document is empty after normalization")]
    Empty,
}

/// Normalized text plus its chunked view and sentence index. Immutable after
/// construction; stages share it behind an `Arc`.
#[derive(Debug)]
pub struct Document {
    text: String,
    chunks: Vec<Chunk>,
    sentences: SentenceIndex,
    /// Byte offset of each char, one extra entry for the text length.
    char_to_byte: Vec<usize>,
    text_hash: String,
}

impl Document {
    /// Normalize raw bytes: UTF-8 validation, NFKC, CRLF to LF, size check.
    pub fn from_bytes(
        raw: &[u8],
        max_upload_bytes: usize,
        max_chunk_chars: usize,
        chunk_overlap_chars: usize,
    ) -> Result<Self, NormalizeError> {
        if raw.len() > max_upload_bytes {
            return Err(NormalizeError::Oversize {
                size: raw.len(),
                limit: max_upload_bytes,
            });
        }
        let text = std::str::from_utf8(raw).map_err(|_| NormalizeError::InvalidUtf8)?;
        Self::from_text(text, max_chunk_chars, chunk_overlap_chars)
    }

    /// Normalize text that is already UTF-8.
    pub fn from_text(
        raw: &str,
        max_chunk_chars: usize,
        chunk_overlap_chars: usize,
    ) -> Result<Self, NormalizeError> {
        let unixized = raw.replace("\r\n", "\n").replace('\r', "\n");
        let text: String = unixized.nfkc().collect();
        if text.trim().is_empty() {
            return Err(NormalizeError::Empty);
        }

        let mut char_to_byte: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        char_to_byte.push(text.len());

        let chunks = chunk_text(&text, max_chunk_chars, chunk_overlap_chars);
        let sentences = SentenceIndex::build(&text);
        let text_hash = blake3::hash(text.as_bytes()).to_hex().to_string();

        Ok(Self {
            text,
            chunks,
            sentences,
            char_to_byte,
            text_hash,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_len(&self) -> usize {
        self.char_to_byte.len() - 1
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn sentences(&self) -> &SentenceIndex {
        &self.sentences
    }

    /// blake3 hex digest of the normalized text.
    pub fn text_hash(&self) -> &str {
        &self.text_hash
    }

    /// Slice the normalized text by a char span. Out-of-range spans clamp to
    /// the document end.
    pub fn slice(&self, span: &Span) -> &str {
        let start = span.start.min(self.char_len());
        let end = span.end.min(self.char_len()).max(start);
        &self.text[self.char_to_byte[start]..self.char_to_byte[end]]
    }

    pub fn chunk_text(&self, chunk: &Chunk) -> &str {
        self.slice(&chunk.span)
    }

    /// Convert a half-open byte range (e.g. from a regex match on `text()`)
    /// into a char span. Byte offsets must lie on char boundaries.
    pub fn byte_range_to_span(&self, byte_start: usize, byte_end: usize) -> Span {
        let start = self.char_to_byte.partition_point(|&b| b < byte_start);
        let end = self.char_to_byte.partition_point(|&b| b < byte_end);
        Span::new(start, end)
    }
}
