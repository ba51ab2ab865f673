//! Deterministic matcher over OWL object-property labels (legal verbs and
//! relations).

use folio_ontology::OntologyAccessor;
use folio_protocol::{defaults, BoundaryPolicy, ConceptIri, Span};
use folio_text::{Document, FoldedText};
use tracing::debug;

use crate::catalog::{CatalogError, LabelAutomaton, LabelStratum};
use crate::overlap::resolve_overlaps;

/// One property hit, before linking and id assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMatch {
    pub span: Span,
    pub surface_text: String,
    pub iri: ConceptIri,
    pub label: String,
    pub confidence: f64,
}

/// Multi-pattern matcher over object-property labels. Applies the same
/// containment-aware overlap policy as the string-match expander.
pub struct PropertyMatcher {
    automaton: LabelAutomaton,
}

impl PropertyMatcher {
    pub fn from_ontology(ontology: &dyn OntologyAccessor) -> Result<Self, CatalogError> {
        let mut labels: Vec<(ConceptIri, String, LabelStratum)> = Vec::new();
        for property in ontology.iterate_object_properties() {
            labels.push((
                property.iri.clone(),
                property.preferred_label.clone(),
                LabelStratum::Preferred,
            ));
            for alt in &property.alt_labels {
                labels.push((property.iri.clone(), alt.clone(), LabelStratum::Alternative));
            }
        }
        let automaton = LabelAutomaton::build(labels)?;
        debug!(patterns = automaton.pattern_count(), "property automaton built");
        Ok(Self { automaton })
    }

    pub fn scan(
        &self,
        document: &Document,
        folded: &FoldedText,
        policy: BoundaryPolicy,
    ) -> Vec<PropertyMatch> {
        let hits = resolve_overlaps(self.automaton.scan(folded, policy));
        hits.into_iter()
            .map(|hit| {
                let confidence = match (hit.entry.stratum, hit.entry.multi_word) {
                    (LabelStratum::Preferred, true) => defaults::RULER_CONF_MULTI_PREFERRED,
                    (LabelStratum::Preferred, false) => defaults::RULER_CONF_SINGLE_PREFERRED,
                    (LabelStratum::Alternative, true) => defaults::RULER_CONF_MULTI_ALT,
                    (LabelStratum::Alternative, false) => defaults::RULER_CONF_SINGLE_ALT,
                };
                PropertyMatch {
                    surface_text: document.slice(&hit.span).to_string(),
                    span: hit.span,
                    iri: hit.entry.iri,
                    label: hit.entry.label,
                    confidence,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_ontology::{InMemoryOntology, ObjectProperty};

    fn ontology() -> InMemoryOntology {
        let properties = vec![
            ObjectProperty {
                iri: ConceptIri::from("folio:denies"),
                preferred_label: "denies".into(),
                alt_labels: vec!["denied".into(), "deny".into()],
                domain_iris: vec![ConceptIri::from("folio:court")],
                range_iris: vec![ConceptIri::from("folio:motion")],
                inverse_iri: None,
                definition: None,
            },
            ObjectProperty {
                iri: ConceptIri::from("folio:files_against"),
                preferred_label: "files against".into(),
                alt_labels: vec![],
                domain_iris: vec![],
                range_iris: vec![],
                inverse_iri: None,
                definition: None,
            },
        ];
        InMemoryOntology::new(vec![], properties)
    }

    #[test]
    fn test_property_scan_finds_alt_form() {
        let matcher = PropertyMatcher::from_ontology(&ontology()).unwrap();
        let doc = Document::from_text("The Court denied the motion.", 3000, 200).unwrap();
        let folded = FoldedText::new(doc.text());
        let matches = matcher.scan(&doc, &folded, BoundaryPolicy::HyphenIsWord);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].iri.as_str(), "folio:denies");
        assert_eq!(matches[0].surface_text, "denied");
        assert!((matches[0].confidence - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_property_overlap_resolution_applies() {
        let matcher = PropertyMatcher::from_ontology(&ontology()).unwrap();
        let doc = Document::from_text("He files against the estate.", 3000, 200).unwrap();
        let folded = FoldedText::new(doc.text());
        let matches = matcher.scan(&doc, &folded, BoundaryPolicy::HyphenIsWord);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].surface_text, "files against");
    }
}
