//! Dependency relation extraction: SPO triples from sentences that carry at
//! least two concept annotations and a verbal predicate. No LM involved.

use std::collections::BTreeMap;

use folio_ontology::OntologyAccessor;
use folio_protocol::{
    AnnotationState, ConceptIri, ConceptMatch, Span, Triple, TriplePredicate,
};
use folio_text::{fold_key, Document};

/// Verbs that act as legal predicates. Kept small and high-precision; the
/// property-label index below extends coverage to ontology relations.
const LEGAL_VERBS: &[&str] = &[
    "affirm", "allege", "amend", "appeal", "arbitrate", "assign", "award", "breach", "bring",
    "certify", "claim", "compel", "convey", "deny", "dismiss", "enjoin", "execute", "file",
    "find", "govern", "grant", "hold", "indemnify", "issue", "move", "notify", "order",
    "overrule", "pay", "remand", "reverse", "rule", "seek", "serve", "sign", "sue", "sustain",
    "terminate", "vacate", "waive",
];

/// Irregular past forms that the suffix rules below cannot recover.
const IRREGULAR_PAST: &[(&str, &str)] = &[
    ("brought", "bring"),
    ("found", "find"),
    ("held", "hold"),
    ("paid", "pay"),
    ("sought", "seek"),
    ("sued", "sue"),
];

/// Extracts triples from the document using the sentence index and the live
/// concept annotations.
pub struct DependencyExtractor {
    /// folded single-word property label -> property IRI.
    property_verbs: BTreeMap<String, ConceptIri>,
}

impl DependencyExtractor {
    pub fn from_ontology(ontology: &dyn OntologyAccessor) -> Self {
        let mut property_verbs = BTreeMap::new();
        for property in ontology.iterate_object_properties() {
            for label in std::iter::once(&property.preferred_label).chain(&property.alt_labels) {
                let folded = fold_key(label);
                if !folded.contains(' ') && !folded.is_empty() {
                    property_verbs
                        .entry(folded)
                        .or_insert_with(|| property.iri.clone());
                }
            }
        }
        Self { property_verbs }
    }

    /// For every sentence with two or more live annotations and a verbal
    /// predicate between two of them, emit one triple per predicate. The
    /// subject is the nearest annotation ending before the verb, the object
    /// the nearest starting after it.
    pub fn extract(&self, document: &Document, annotations: &[ConceptMatch]) -> Vec<Triple> {
        let mut triples = Vec::new();
        for (idx, sentence) in document.sentences().spans().iter().enumerate() {
            let in_sentence: Vec<&ConceptMatch> = annotations
                .iter()
                .filter(|a| {
                    a.state != AnnotationState::Rejected
                        && document.sentences().sentence_for_span(&a.span) == Some(idx)
                })
                .collect();
            if in_sentence.len() < 2 {
                continue;
            }
            for (verb_span, lemma) in self.verbs_in(document, sentence) {
                let subject = in_sentence
                    .iter()
                    .filter(|a| a.span.end <= verb_span.start)
                    .max_by_key(|a| a.span.end);
                let object = in_sentence
                    .iter()
                    .filter(|a| a.span.start >= verb_span.end)
                    .min_by_key(|a| a.span.start);
                if let (Some(subject), Some(object)) = (subject, object) {
                    let predicate = match self.property_verbs.get(&lemma) {
                        Some(iri) => TriplePredicate::Property { iri: iri.clone() },
                        None => TriplePredicate::Verb {
                            lemma: lemma.clone(),
                        },
                    };
                    triples.push(Triple {
                        subject: subject.id,
                        predicate,
                        object: object.id,
                        evidence: *sentence,
                    });
                }
            }
        }
        triples
    }

    /// Word tokens in the sentence whose lemma is a known verb, with char
    /// spans.
    fn verbs_in(&self, document: &Document, sentence: &Span) -> Vec<(Span, String)> {
        let text = document.slice(sentence);
        let mut verbs = Vec::new();
        let mut char_offset = sentence.start;
        for token in split_tokens(text) {
            let token_chars = token.chars().count();
            if let Some(lemma) = self.lemmatize(token) {
                verbs.push((
                    Span::new(char_offset, char_offset + token_chars),
                    lemma,
                ));
            }
            char_offset += token_chars + 1;
        }
        verbs
    }

    /// Candidate-form lemmatization: generate plausible base forms and keep
    /// the first that is a known verb (lexicon or property label).
    fn lemmatize(&self, word: &str) -> Option<String> {
        let lowered = word.to_lowercase();
        if lowered.len() < 3 {
            return None;
        }
        for (inflected, base) in IRREGULAR_PAST {
            if lowered == *inflected {
                return self.known(base);
            }
        }
        let mut candidates: Vec<String> = vec![lowered.clone()];
        if let Some(stem) = lowered.strip_suffix("ies") {
            candidates.push(format!("{stem}y"));
        }
        if let Some(stem) = lowered.strip_suffix("ied") {
            candidates.push(format!("{stem}y"));
        }
        if let Some(stem) = lowered.strip_suffix("es") {
            candidates.push(stem.to_string());
        }
        if let Some(stem) = lowered.strip_suffix('s') {
            candidates.push(stem.to_string());
        }
        if let Some(stem) = lowered.strip_suffix("ed") {
            candidates.push(stem.to_string());
            candidates.push(format!("{stem}e"));
        }
        if let Some(stem) = lowered.strip_suffix('d') {
            candidates.push(stem.to_string());
        }
        if let Some(stem) = lowered.strip_suffix("ing") {
            candidates.push(stem.to_string());
            candidates.push(format!("{stem}e"));
        }
        candidates.into_iter().find_map(|c| self.known(&c))
    }

    fn known(&self, candidate: &str) -> Option<String> {
        if LEGAL_VERBS.contains(&candidate) || self.property_verbs.contains_key(candidate) {
            Some(candidate.to_string())
        } else {
            None
        }
    }
}

/// Split into word tokens on single non-word separators. Token boundaries
/// here only feed verb detection, so simple whitespace/punctuation splitting
/// is enough.
fn split_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_protocol::{AnnotationId, MatchSource, MatchType};
    use folio_test_utils::fixture_ontology;

    fn annotation(id: u64, span: (usize, usize), surface: &str, iri: &str) -> ConceptMatch {
        ConceptMatch {
            id: AnnotationId::new(id),
            span: Span::new(span.0, span.1),
            surface_text: surface.into(),
            concept_iri: ConceptIri::from(iri),
            preferred_label: surface.into(),
            branches: Default::default(),
            backup_branches: Default::default(),
            match_type: MatchType::PreferredLabel,
            confidence: 0.8,
            backup_candidates: vec![],
            sources: vec![MatchSource::Ruler],
            state: AnnotationState::Preliminary,
            lineage: vec![],
        }
    }

    #[test]
    fn test_court_denied_motion_uses_property_iri() {
        let doc = Document::from_text("The Court denied the motion.", 3000, 200).unwrap();
        let annotations = vec![
            annotation(1, (4, 9), "Court", "folio:court"),
            annotation(2, (21, 27), "motion", "folio:motion"),
        ];
        let extractor = DependencyExtractor::from_ontology(&fixture_ontology());
        let triples = extractor.extract(&doc, &annotations);
        assert_eq!(triples.len(), 1);
        let t = &triples[0];
        assert_eq!(t.subject, AnnotationId::new(1));
        assert_eq!(t.object, AnnotationId::new(2));
        assert_eq!(
            t.predicate,
            TriplePredicate::Property {
                iri: ConceptIri::from("folio:denies")
            }
        );
    }

    #[test]
    fn test_unknown_property_falls_back_to_lemma() {
        let doc = Document::from_text("The plaintiff dismissed the claim.", 3000, 200).unwrap();
        let annotations = vec![
            annotation(1, (4, 13), "plaintiff", "folio:actor"),
            annotation(2, (28, 33), "claim", "folio:claim"),
        ];
        let extractor = DependencyExtractor::from_ontology(&fixture_ontology());
        let triples = extractor.extract(&doc, &annotations);
        assert_eq!(triples.len(), 1);
        assert_eq!(
            triples[0].predicate,
            TriplePredicate::Verb {
                lemma: "dismiss".into()
            }
        );
    }

    #[test]
    fn test_sentence_with_one_annotation_yields_nothing() {
        let doc = Document::from_text("The Court denied it.", 3000, 200).unwrap();
        let annotations = vec![annotation(1, (4, 9), "Court", "folio:court")];
        let extractor = DependencyExtractor::from_ontology(&fixture_ontology());
        assert!(extractor.extract(&doc, &annotations).is_empty());
    }

    #[test]
    fn test_no_verb_between_annotations_yields_nothing() {
        let doc = Document::from_text("The Court and the motion.", 3000, 200).unwrap();
        let annotations = vec![
            annotation(1, (4, 9), "Court", "folio:court"),
            annotation(2, (18, 24), "motion", "folio:motion"),
        ];
        let extractor = DependencyExtractor::from_ontology(&fixture_ontology());
        assert!(extractor.extract(&doc, &annotations).is_empty());
    }

    #[test]
    fn test_rejected_annotations_ignored() {
        let doc = Document::from_text("The Court denied the motion.", 3000, 200).unwrap();
        let mut rejected = annotation(2, (21, 27), "motion", "folio:motion");
        rejected.state = AnnotationState::Rejected;
        let annotations = vec![annotation(1, (4, 9), "Court", "folio:court"), rejected];
        let extractor = DependencyExtractor::from_ontology(&fixture_ontology());
        assert!(extractor.extract(&doc, &annotations).is_empty());
    }
}
