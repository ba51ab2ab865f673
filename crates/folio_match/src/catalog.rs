//! Label automaton: the shared multi-pattern scanner behind the ruler, the
//! property matcher, and the string-match expander.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use thiserror::Error;

use folio_protocol::{BoundaryPolicy, ConceptIri, Span};
use folio_text::{fold_key, FoldedText};

use crate::boundary::is_boundary_valid;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to build label automaton: {0}")]
    Build(String),
    #[error("label catalog is empty")]
    Empty,
}

/// Which label stratum a pattern came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelStratum {
    Preferred,
    Alternative,
}

/// One `(iri, label variant)` a pattern resolves to. The same folded pattern
/// can map to several entries when different concepts share a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub iri: ConceptIri,
    /// The label as it appears in the ontology (unfolded).
    pub label: String,
    pub stratum: LabelStratum,
    /// The label contains whitespace after folding.
    pub multi_word: bool,
}

/// One boundary-valid automaton hit mapped back to char offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHit {
    pub span: Span,
    pub entry: LabelEntry,
}

/// Case-insensitive word-boundary multi-pattern matcher over a label set.
///
/// Patterns are folded (NFKC + lowercase + whitespace-collapsed) at build
/// time; the haystack is folded at scan time with an offset map back to the
/// source text. Scanning is a single overlapping pass.
pub struct LabelAutomaton {
    automaton: AhoCorasick,
    /// Entries per pattern id, in pattern order.
    entries: Vec<Vec<LabelEntry>>,
}

impl LabelAutomaton {
    /// Build from `(iri, label, stratum)` triples. Labels folding to the
    /// same pattern are merged under one pattern id; empty labels are
    /// skipped.
    pub fn build(
        labels: impl IntoIterator<Item = (ConceptIri, String, LabelStratum)>,
    ) -> Result<Self, CatalogError> {
        let mut patterns: Vec<String> = Vec::new();
        let mut entries: Vec<Vec<LabelEntry>> = Vec::new();
        let mut index_by_pattern: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();

        for (iri, label, stratum) in labels {
            let folded = fold_key(&label);
            if folded.is_empty() {
                continue;
            }
            let entry = LabelEntry {
                iri,
                multi_word: folded.contains(' '),
                label,
                stratum,
            };
            match index_by_pattern.get(&folded) {
                Some(&idx) => {
                    if !entries[idx].contains(&entry) {
                        entries[idx].push(entry);
                    }
                }
                None => {
                    index_by_pattern.insert(folded.clone(), patterns.len());
                    patterns.push(folded);
                    entries.push(vec![entry]);
                }
            }
        }

        if patterns.is_empty() {
            return Err(CatalogError::Empty);
        }

        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .build(&patterns)
            .map_err(|e| CatalogError::Build(e.to_string()))?;

        Ok(Self { automaton, entries })
    }

    pub fn pattern_count(&self) -> usize {
        self.entries.len()
    }

    /// Scan a folded haystack, returning every boundary-valid hit for every
    /// entry of every matched pattern, as char spans into the source text.
    ///
    /// Overlapping matches are reported; containment policy is applied by
    /// the caller, not here.
    pub fn scan(&self, folded: &FoldedText, policy: BoundaryPolicy) -> Vec<RawHit> {
        let haystack = folded.as_str();
        let mut hits = Vec::new();
        for m in self.automaton.find_overlapping_iter(haystack) {
            let before = folded.char_before(m.start());
            let after = folded.char_at(m.end());
            if !is_boundary_valid(before, after, policy) {
                continue;
            }
            let (start, end) = folded.to_source_chars(m.start(), m.end());
            for entry in &self.entries[m.pattern().as_usize()] {
                hits.push(RawHit {
                    span: Span::new(start, end),
                    entry: entry.clone(),
                });
            }
        }
        hits.sort_by(|a, b| {
            (a.span.start, a.span.end, a.entry.iri.as_str())
                .cmp(&(b.span.start, b.span.end, b.entry.iri.as_str()))
        });
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn automaton(labels: &[(&str, &str, LabelStratum)]) -> LabelAutomaton {
        LabelAutomaton::build(
            labels
                .iter()
                .map(|(iri, label, s)| (ConceptIri::from(*iri), label.to_string(), *s)),
        )
        .unwrap()
    }

    #[test]
    fn test_case_insensitive_word_boundary_hit() {
        let auto = automaton(&[("folio:c", "Contract", LabelStratum::Preferred)]);
        let folded = FoldedText::new("The CONTRACT was signed. Contractual terms follow.");
        let hits = auto.scan(&folded, BoundaryPolicy::HyphenIsWord);
        // "Contractual" must not match; boundary check rejects it.
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(4, 12));
    }

    #[test]
    fn test_nested_patterns_both_reported() {
        let auto = automaton(&[
            ("folio:boc", "breach of contract", LabelStratum::Preferred),
            ("folio:c", "contract", LabelStratum::Preferred),
        ]);
        let folded = FoldedText::new("A claim for breach of contract was filed.");
        let hits = auto.scan(&folded, BoundaryPolicy::HyphenIsWord);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].span, Span::new(12, 30));
        assert_eq!(hits[0].entry.iri.as_str(), "folio:boc");
        assert_eq!(hits[1].span, Span::new(22, 30));
        assert_eq!(hits[1].entry.iri.as_str(), "folio:c");
    }

    #[test]
    fn test_shared_label_emits_one_hit_per_iri() {
        let auto = automaton(&[
            ("folio:interest_fin", "interest", LabelStratum::Preferred),
            ("folio:interest_cur", "interest", LabelStratum::Preferred),
        ]);
        let folded = FoldedText::new("The interest accrued.");
        let hits = auto.scan(&folded, BoundaryPolicy::HyphenIsWord);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].span, hits[1].span);
        assert_ne!(hits[0].entry.iri, hits[1].entry.iri);
    }

    #[test]
    fn test_hyphen_blocks_inner_word() {
        let auto = automaton(&[("folio:claim", "claim", LabelStratum::Preferred)]);
        let folded = FoldedText::new("The cross-claim and the claim.");
        let hits = auto.scan(&folded, BoundaryPolicy::HyphenIsWord);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(24, 29));
    }

    #[test]
    fn test_multi_word_flag() {
        let auto = automaton(&[("folio:mtd", "Motion  to\tDismiss", LabelStratum::Preferred)]);
        let folded = FoldedText::new("the motion to dismiss is granted");
        let hits = auto.scan(&folded, BoundaryPolicy::HyphenIsWord);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].entry.multi_word);
    }
}
