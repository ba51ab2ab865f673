//! String-match expansion: apply each resolved concept to every occurrence
//! of its labels across the whole document.

use folio_protocol::{BoundaryPolicy, ConceptIri, Span};
use folio_text::{Document, FoldedText};
use tracing::debug;

use crate::catalog::{CatalogError, LabelAutomaton, LabelStratum};
use crate::overlap::resolve_overlaps;

/// One resolved concept to expand: its labels and the confidence the
/// pipeline resolved it at.
#[derive(Debug, Clone)]
pub struct ExpansionSeed {
    pub iri: ConceptIri,
    pub preferred_label: String,
    pub alt_labels: Vec<String>,
    pub confidence: f64,
}

/// One surviving occurrence after overlap resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedHit {
    pub span: Span,
    pub surface_text: String,
    pub iri: ConceptIri,
    pub label: String,
    pub via_alt_label: bool,
    pub confidence: f64,
}

/// Expands resolved discoveries into all document occurrences. Built per
/// job from that job's resolved concept set; one automaton, one scan.
pub struct StringMatchExpander {
    automaton: LabelAutomaton,
    confidence_by_iri: std::collections::HashMap<ConceptIri, f64>,
    alt_scale: f64,
}

impl StringMatchExpander {
    pub fn new(seeds: &[ExpansionSeed], alt_scale: f64) -> Result<Self, CatalogError> {
        let mut labels: Vec<(ConceptIri, String, LabelStratum)> = Vec::new();
        let mut confidence_by_iri = std::collections::HashMap::new();
        for seed in seeds {
            confidence_by_iri.insert(seed.iri.clone(), seed.confidence);
            labels.push((
                seed.iri.clone(),
                seed.preferred_label.clone(),
                LabelStratum::Preferred,
            ));
            for alt in &seed.alt_labels {
                labels.push((seed.iri.clone(), alt.clone(), LabelStratum::Alternative));
            }
        }
        let automaton = LabelAutomaton::build(labels)?;
        debug!(
            seeds = seeds.len(),
            patterns = automaton.pattern_count(),
            "expansion automaton built"
        );
        Ok(Self {
            automaton,
            confidence_by_iri,
            alt_scale,
        })
    }

    /// One O(n + z) pass over the folded text, then the containment-aware
    /// overlap policy. Contained occurrences survive; partial overlaps keep
    /// the longer match; identical spans keep all distinct IRIs.
    pub fn expand(
        &self,
        document: &Document,
        folded: &FoldedText,
        policy: BoundaryPolicy,
    ) -> Vec<ExpandedHit> {
        let hits = resolve_overlaps(self.automaton.scan(folded, policy));
        hits.into_iter()
            .map(|hit| {
                let base = self
                    .confidence_by_iri
                    .get(&hit.entry.iri)
                    .copied()
                    .unwrap_or(0.0);
                let via_alt = hit.entry.stratum == LabelStratum::Alternative;
                let confidence = if via_alt { base * self.alt_scale } else { base };
                ExpandedHit {
                    surface_text: document.slice(&hit.span).to_string(),
                    span: hit.span,
                    iri: hit.entry.iri,
                    label: hit.entry.label,
                    via_alt_label: via_alt,
                    confidence,
                }
            })
            .collect()
    }
}
