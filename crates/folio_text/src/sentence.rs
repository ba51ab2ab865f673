//! Sentence index: offset-to-sentence mapping over the normalized text.

use folio_protocol::Span;
use unicode_segmentation::UnicodeSegmentation;

/// Abbreviations that commonly end with a period mid-sentence in legal text.
/// A sentence break right after one of these is merged with the next piece.
const NON_TERMINAL_ABBREVIATIONS: &[&str] = &[
    "v.", "no.", "nos.", "inc.", "corp.", "co.", "ltd.", "llc.", "u.s.", "cir.", "dist.", "jr.",
    "sr.", "dr.", "mr.", "mrs.", "ms.", "st.", "sec.", "art.", "para.", "fed.", "cal.", "f.",
    "supp.", "ch.", "reg.", "stat.", "approx.", "e.g.", "i.e.", "etc.",
];

/// Ordered, non-overlapping sentence spans covering the document.
#[derive(Debug, Clone, Default)]
pub struct SentenceIndex {
    sentences: Vec<Span>,
}

impl SentenceIndex {
    /// Build the index from text that is already NFKC-normalized.
    pub fn build(text: &str) -> Self {
        let mut raw: Vec<(usize, &str)> = Vec::new();
        for (byte_start, sentence) in text.split_sentence_bound_indices() {
            raw.push((byte_start, sentence));
        }

        // Convert byte offsets to char offsets in one pass.
        let mut byte_to_char = vec![0usize; text.len() + 1];
        for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
            byte_to_char[byte_idx] = char_idx;
        }
        byte_to_char[text.len()] = text.chars().count();

        let mut sentences: Vec<Span> = Vec::new();
        for (byte_start, sentence) in raw {
            let start = byte_to_char[byte_start];
            let end = byte_to_char[byte_start + sentence.len()];
            if sentence.trim().is_empty() {
                continue;
            }
            let merge = sentences
                .last()
                .map(|prev| ends_with_abbreviation(text, prev))
                .unwrap_or(false);
            if merge {
                let prev = sentences.last_mut().unwrap();
                prev.end = end;
            } else {
                sentences.push(Span::new(start, end));
            }
        }
        Self { sentences }
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn spans(&self) -> &[Span] {
        &self.sentences
    }

    pub fn get(&self, index: usize) -> Option<Span> {
        self.sentences.get(index).copied()
    }

    /// Index of the sentence containing the char offset, by binary search.
    pub fn sentence_at(&self, char_offset: usize) -> Option<usize> {
        let idx = self
            .sentences
            .partition_point(|s| s.end <= char_offset);
        self.sentences.get(idx).and_then(|s| {
            (s.start <= char_offset && char_offset < s.end).then_some(idx)
        })
    }

    /// Index of the sentence containing a span (by its start offset).
    pub fn sentence_for_span(&self, span: &Span) -> Option<usize> {
        self.sentence_at(span.start)
    }

    /// Char span covering `before` sentences before and `after` sentences
    /// after the given sentence, clamped to the document.
    pub fn context_window(&self, index: usize, before: usize, after: usize) -> Option<Span> {
        let target = self.sentences.get(index)?;
        let first = index.saturating_sub(before);
        let last = (index + after).min(self.sentences.len() - 1);
        Some(Span::new(self.sentences[first].start, self.sentences[last].end.max(target.end)))
    }
}

fn ends_with_abbreviation(text: &str, sentence: &Span) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let end = sentence.end.min(chars.len());
    let slice: String = chars[sentence.start..end].iter().collect();
    let trimmed = slice.trim_end();
    let last_word = trimmed.rsplit(char::is_whitespace).next().unwrap_or("");
    let lowered = last_word.to_lowercase();
    NON_TERMINAL_ABBREVIATIONS.contains(&lowered.as_str())
        // Single capital followed by a period ("John Q. Public").
        || (last_word.len() == 2
            && last_word.ends_with('.')
            && last_word.chars().next().is_some_and(|c| c.is_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_segmentation() {
        let text = "The Court denied the motion. The plaintiff appealed. Costs were awarded.";
        let index = SentenceIndex::build(text);
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(0), Some(Span::new(0, 29)));
    }

    #[test]
    fn test_sentence_at_lookup() {
        let text = "First sentence here. Second sentence there.";
        let index = SentenceIndex::build(text);
        assert_eq!(index.sentence_at(5), Some(0));
        assert_eq!(index.sentence_at(25), Some(1));
        assert_eq!(index.sentence_at(999), None);
    }

    #[test]
    fn test_citation_abbreviation_does_not_split() {
        let text = "See Smith v. Jones, 123 F.3d 456 (9th Cir. 1999). The motion was denied.";
        let index = SentenceIndex::build(text);
        assert_eq!(index.len(), 2, "sentences: {:?}", index.spans());
    }

    #[test]
    fn test_context_window_clamps() {
        let text = "One. Two. Three. Four.";
        let index = SentenceIndex::build(text);
        let window = index.context_window(0, 1, 1).unwrap();
        assert_eq!(window.start, 0);
        // target sentence plus the next one
        assert!(window.end >= index.get(1).unwrap().end - 1);
        let last = index.len() - 1;
        let tail = index.context_window(last, 1, 1).unwrap();
        assert_eq!(tail.end, index.get(last).unwrap().end);
    }
}
