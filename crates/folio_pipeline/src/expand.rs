//! Expansion stage: apply every resolved concept to all occurrences of its
//! labels and fold the results into the working set.

use std::collections::HashMap;

use tracing::debug;

use folio_match::{ExpandedHit, StringMatchExpander};
use folio_match::expander::ExpansionSeed;
use folio_ontology::OntologyAccessor;
use folio_protocol::{
    AnnotationState, ConceptIri, ConceptMatch, EnrichConfig, LineageEvent, MatchSource, MatchType,
    QualitySignal, Span, Stage,
};
use folio_text::{Document, FoldedText};

use crate::working::WorkingSet;

/// Build the per-job expansion automaton from the live annotations, scan
/// once, and merge. Identical `(span, iri)` occurrences fold a
/// `string_match` source into the existing annotation; new occurrences
/// become `expanded` annotations inheriting the resolved confidence
/// (scaled by the configured factor when matched via an alternative label).
pub fn expand_annotations(
    ontology: &dyn OntologyAccessor,
    document: &Document,
    folded: &FoldedText,
    config: &EnrichConfig,
    ws: &mut WorkingSet,
) -> Vec<QualitySignal> {
    let mut signals = Vec::new();

    // One seed per unique resolved IRI; confidence is the best live
    // annotation's.
    let mut seed_conf: HashMap<ConceptIri, f64> = HashMap::new();
    let mut seed_branches: HashMap<ConceptIri, std::collections::BTreeSet<String>> = HashMap::new();
    for annotation in &ws.annotations {
        if annotation.state == AnnotationState::Rejected {
            continue;
        }
        let entry = seed_conf.entry(annotation.concept_iri.clone()).or_insert(0.0);
        if annotation.confidence > *entry {
            *entry = annotation.confidence;
        }
        seed_branches
            .entry(annotation.concept_iri.clone())
            .or_insert_with(|| annotation.branches.clone());
    }
    if seed_conf.is_empty() {
        return signals;
    }

    let mut seeds: Vec<ExpansionSeed> = Vec::new();
    let mut seed_iris: Vec<&ConceptIri> = seed_conf.keys().collect();
    seed_iris.sort();
    for iri in seed_iris {
        match ontology.get_class(iri) {
            Ok(class) => seeds.push(ExpansionSeed {
                iri: iri.clone(),
                preferred_label: class.preferred_label.clone(),
                alt_labels: class.alt_labels.clone(),
                confidence: seed_conf[iri],
            }),
            Err(e) => {
                signals.push(
                    QualitySignal::new(Stage::StringMatchExpander, "unresolved_iri")
                        .with_detail(e.to_string()),
                );
            }
        }
    }
    if seeds.is_empty() {
        return signals;
    }

    let expander = match StringMatchExpander::new(&seeds, config.alt_label_expansion_scale) {
        Ok(expander) => expander,
        Err(e) => {
            signals.push(
                QualitySignal::new(Stage::StringMatchExpander, "automaton_build_failed")
                    .with_detail(e.to_string()),
            );
            return signals;
        }
    };
    let hits = expander.expand(document, folded, config.boundary_policy);
    debug!(seeds = seeds.len(), hits = hits.len(), "expansion scan complete");

    // Index existing annotations by (span, iri).
    let mut by_key: HashMap<(Span, ConceptIri), usize> = HashMap::new();
    for (idx, annotation) in ws.annotations.iter().enumerate() {
        by_key.insert((annotation.span, annotation.concept_iri.clone()), idx);
    }

    for hit in hits {
        match by_key.get(&(hit.span, hit.iri.clone())) {
            Some(&idx) => {
                let annotation = &mut ws.annotations[idx];
                if !annotation.has_source(MatchSource::StringMatch) {
                    annotation.add_source(MatchSource::StringMatch);
                    annotation.lineage.push(LineageEvent::new(
                        Stage::StringMatchExpander.as_str(),
                        "occurrence_confirmed",
                    ));
                }
            }
            None => {
                let annotation = new_expanded_annotation(ws, &hit, &seed_branches);
                ws.annotations.push(annotation);
            }
        }
    }
    signals
}

fn new_expanded_annotation(
    ws: &mut WorkingSet,
    hit: &ExpandedHit,
    seed_branches: &HashMap<ConceptIri, std::collections::BTreeSet<String>>,
) -> ConceptMatch {
    let id = ws.next_annotation_id();
    ConceptMatch {
        id,
        span: hit.span,
        surface_text: hit.surface_text.clone(),
        concept_iri: hit.iri.clone(),
        preferred_label: hit.label.clone(),
        branches: seed_branches.get(&hit.iri).cloned().unwrap_or_default(),
        backup_branches: Default::default(),
        match_type: MatchType::Expanded,
        confidence: hit.confidence,
        backup_candidates: Vec::new(),
        sources: vec![MatchSource::StringMatch],
        state: AnnotationState::Preliminary,
        lineage: vec![LineageEvent::new(
            Stage::StringMatchExpander.as_str(),
            "occurrence_expanded",
        )],
    }
}
