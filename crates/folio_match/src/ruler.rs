//! The ruler: deterministic concept matcher over preferred and alternative
//! ontology labels.

use folio_ontology::OntologyAccessor;
use folio_protocol::{defaults, BoundaryPolicy, ConceptIri, MatchType, Span};
use folio_text::{Document, FoldedText};
use tracing::debug;

use crate::catalog::{CatalogError, LabelAutomaton, LabelStratum};

/// One ruler hit, before reconciliation and id assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct RulerMatch {
    pub span: Span,
    pub surface_text: String,
    pub iri: ConceptIri,
    pub label: String,
    pub match_type: MatchType,
    pub confidence: f64,
}

/// Deterministic multi-pattern matcher over the ontology label set.
/// Constructed once at startup and shared read-only across jobs.
pub struct Ruler {
    automaton: LabelAutomaton,
}

impl Ruler {
    /// Build the two-strata automaton from every class label in the
    /// ontology.
    pub fn from_ontology(ontology: &dyn OntologyAccessor) -> Result<Self, CatalogError> {
        let mut labels: Vec<(ConceptIri, String, LabelStratum)> = Vec::new();
        for class in ontology.iterate_classes() {
            labels.push((
                class.iri.clone(),
                class.preferred_label.clone(),
                LabelStratum::Preferred,
            ));
            for alt in &class.alt_labels {
                labels.push((class.iri.clone(), alt.clone(), LabelStratum::Alternative));
            }
        }
        let automaton = LabelAutomaton::build(labels)?;
        debug!(patterns = automaton.pattern_count(), "ruler automaton built");
        Ok(Self { automaton })
    }

    /// Scan the whole document. A surface matching several concepts emits
    /// one match per candidate IRI on the identical span.
    pub fn scan(
        &self,
        document: &Document,
        folded: &FoldedText,
        policy: BoundaryPolicy,
    ) -> Vec<RulerMatch> {
        self.automaton
            .scan(folded, policy)
            .into_iter()
            .map(|hit| {
                let (match_type, confidence) = grade(hit.entry.stratum, hit.entry.multi_word);
                RulerMatch {
                    surface_text: document.slice(&hit.span).to_string(),
                    span: hit.span,
                    iri: hit.entry.iri,
                    label: hit.entry.label,
                    match_type,
                    confidence,
                }
            })
            .collect()
    }
}

/// The graduated initial confidence schedule.
fn grade(stratum: LabelStratum, multi_word: bool) -> (MatchType, f64) {
    match (stratum, multi_word) {
        (LabelStratum::Preferred, true) => {
            (MatchType::PreferredLabel, defaults::RULER_CONF_MULTI_PREFERRED)
        }
        (LabelStratum::Preferred, false) => {
            (MatchType::PreferredLabel, defaults::RULER_CONF_SINGLE_PREFERRED)
        }
        (LabelStratum::Alternative, true) => (MatchType::AltLabel, defaults::RULER_CONF_MULTI_ALT),
        (LabelStratum::Alternative, false) => {
            (MatchType::AltLabel, defaults::RULER_CONF_SINGLE_ALT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_ontology::{InMemoryOntology, OntologyClass};
    use std::collections::BTreeSet;

    fn ontology() -> InMemoryOntology {
        let classes = vec![
            OntologyClass {
                iri: ConceptIri::from("folio:boc"),
                preferred_label: "Breach of Contract".into(),
                alt_labels: vec!["contractual breach".into()],
                branches: BTreeSet::from(["Event".to_string()]),
                parent_iris: vec![],
                definition: None,
            },
            OntologyClass {
                iri: ConceptIri::from("folio:contract"),
                preferred_label: "Contract".into(),
                alt_labels: vec!["agreement".into()],
                branches: BTreeSet::from(["Document".to_string()]),
                parent_iris: vec![],
                definition: None,
            },
        ];
        InMemoryOntology::new(classes, vec![])
    }

    fn scan(text: &str) -> Vec<RulerMatch> {
        let ruler = Ruler::from_ontology(&ontology()).unwrap();
        let doc = Document::from_text(text, 3000, 200).unwrap();
        let folded = FoldedText::new(doc.text());
        ruler.scan(&doc, &folded, BoundaryPolicy::HyphenIsWord)
    }

    #[test]
    fn test_confidence_schedule() {
        let matches = scan("The breach of contract claim rests on the agreement.");
        let boc = matches
            .iter()
            .find(|m| m.iri.as_str() == "folio:boc")
            .unwrap();
        assert_eq!(boc.match_type, MatchType::PreferredLabel);
        assert!((boc.confidence - 0.90).abs() < 1e-12);

        let contract = matches
            .iter()
            .find(|m| m.iri.as_str() == "folio:contract" && m.surface_text == "contract")
            .unwrap();
        assert!((contract.confidence - 0.72).abs() < 1e-12);

        let agreement = matches
            .iter()
            .find(|m| m.surface_text == "agreement")
            .unwrap();
        assert_eq!(agreement.match_type, MatchType::AltLabel);
        assert!((agreement.confidence - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_multi_word_alt_label() {
        let matches = scan("A contractual breach occurred.");
        let alt = matches
            .iter()
            .find(|m| m.iri.as_str() == "folio:boc")
            .unwrap();
        assert_eq!(alt.match_type, MatchType::AltLabel);
        assert!((alt.confidence - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_surface_preserves_document_casing() {
        let matches = scan("BREACH OF CONTRACT alleged.");
        let boc = matches
            .iter()
            .find(|m| m.iri.as_str() == "folio:boc")
            .unwrap();
        assert_eq!(boc.surface_text, "BREACH OF CONTRACT");
    }
}
