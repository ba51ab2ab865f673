//! Individual and property linking: nearest-in-sentence heuristics with
//! optional LM validation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use folio_inference::{
    call_structured, CallBudget, LanguageModel, LinkerResponse, LmTask, StructuredRequest,
};
use folio_ontology::OntologyAccessor;
use folio_protocol::{
    AnnotationState, ConceptIri, ConceptMatch, EnrichConfig, Individual, LineageEvent,
    PropertyAnnotation, QualitySignal, Span, Stage,
};
use folio_text::Document;

use crate::cancel::CancellationToken;

/// Concept annotations in the same sentence as `span`, split into those
/// ending at or before it and those starting at or after it, each ordered by
/// distance.
fn sentence_neighbors<'a>(
    document: &Document,
    annotations: &'a [ConceptMatch],
    span: &Span,
) -> (Vec<&'a ConceptMatch>, Vec<&'a ConceptMatch>) {
    let Some(sentence_idx) = document.sentences().sentence_for_span(span) else {
        return (Vec::new(), Vec::new());
    };
    let mut preceding: Vec<&ConceptMatch> = Vec::new();
    let mut following: Vec<&ConceptMatch> = Vec::new();
    for annotation in annotations {
        if annotation.state == AnnotationState::Rejected || annotation.span.overlaps(span) {
            continue;
        }
        if document.sentences().sentence_for_span(&annotation.span) != Some(sentence_idx) {
            continue;
        }
        if annotation.span.end <= span.start {
            preceding.push(annotation);
        } else if annotation.span.start >= span.end {
            following.push(annotation);
        }
    }
    preceding.sort_by_key(|a| std::cmp::Reverse(a.span.end));
    following.sort_by_key(|a| a.span.start);
    (preceding, following)
}

/// Prefer the nearest candidate whose IRI descends from one of the allowed
/// classes; fall back to the nearest candidate outright.
fn pick_constrained<'a>(
    ontology: &dyn OntologyAccessor,
    candidates: &[&'a ConceptMatch],
    allowed: &[ConceptIri],
) -> Option<&'a ConceptMatch> {
    if allowed.is_empty() {
        return candidates.first().copied();
    }
    candidates
        .iter()
        .find(|c| {
            allowed
                .iter()
                .any(|ancestor| ontology.is_descendant(&c.concept_iri, ancestor))
        })
        .copied()
        .or_else(|| candidates.first().copied())
}

/// Bind each individual to the nearest concept annotation in its sentence.
/// The LM, when it answers, may override the heuristic choice with another
/// in-sentence candidate.
pub async fn link_individuals(
    lm: Arc<dyn LanguageModel>,
    document: &Document,
    config: &EnrichConfig,
    annotations: &[ConceptMatch],
    individuals: &mut [Individual],
    cancel: &CancellationToken,
) -> Vec<QualitySignal> {
    let mut signals = Vec::new();
    for individual in individuals.iter_mut() {
        if cancel.is_cancelled() {
            break;
        }
        let (preceding, following) = sentence_neighbors(document, annotations, &individual.span);
        let heuristic = match (preceding.first(), following.first()) {
            (Some(p), Some(f)) => {
                // Closer wins; the preceding annotation on a tie.
                let before_gap = individual.span.start - p.span.end;
                let after_gap = f.span.start - individual.span.end;
                Some(if after_gap < before_gap { *f } else { *p })
            }
            (Some(p), None) => Some(*p),
            (None, Some(f)) => Some(*f),
            (None, None) => None,
        };
        let Some(heuristic) = heuristic else {
            continue;
        };

        let mut chosen = heuristic.concept_iri.clone();
        let candidates: Vec<&ConceptMatch> =
            preceding.iter().chain(following.iter()).copied().collect();
        match validate_link(
            lm.as_ref(),
            document,
            config,
            LmTask::IndividualLinker,
            &individual.span,
            &individual.surface_text,
            &candidates,
        )
        .await
        {
            Ok(Some(override_iri)) => {
                if candidates.iter().any(|c| c.concept_iri == override_iri) {
                    chosen = override_iri;
                }
            }
            Ok(None) => {}
            Err(signal) => signals.push(signal),
        }

        individual.linked_concept_iri = Some(chosen.clone());
        individual.lineage.push(
            LineageEvent::new(Stage::IndividualLinker.as_str(), "linked_to_concept")
                .with_change(serde_json::Value::Null, serde_json::json!(chosen.as_str())),
        );
    }
    signals
}

/// Bind each property occurrence to subject/object concept annotations,
/// honoring ontology domain/range constraints where declared.
pub async fn link_properties(
    lm: Arc<dyn LanguageModel>,
    ontology: &dyn OntologyAccessor,
    document: &Document,
    config: &EnrichConfig,
    annotations: &[ConceptMatch],
    properties: &mut [PropertyAnnotation],
    cancel: &CancellationToken,
) -> Vec<QualitySignal> {
    let mut signals = Vec::new();
    for property in properties.iter_mut() {
        if cancel.is_cancelled() {
            break;
        }
        let (preceding, following) = sentence_neighbors(document, annotations, &property.span);
        let subject = pick_constrained(ontology, &preceding, &property.domain_classes);
        let object = pick_constrained(ontology, &following, &property.range_classes);
        let mut subject_iri = subject.map(|s| s.concept_iri.clone());
        let mut object_iri = object.map(|o| o.concept_iri.clone());
        if subject_iri.is_none() && object_iri.is_none() {
            continue;
        }

        let candidates: Vec<&ConceptMatch> =
            preceding.iter().chain(following.iter()).copied().collect();
        match validate_link(
            lm.as_ref(),
            document,
            config,
            LmTask::PropertyLinker,
            &property.span,
            &property.surface_text,
            &candidates,
        )
        .await
        {
            Ok(Some(override_iri)) => {
                // An LM override replaces whichever side it names.
                if preceding.iter().any(|c| c.concept_iri == override_iri) {
                    subject_iri = Some(override_iri);
                } else if following.iter().any(|c| c.concept_iri == override_iri) {
                    object_iri = Some(override_iri);
                }
            }
            Ok(None) => {}
            Err(signal) => signals.push(signal),
        }

        debug!(property = %property.property_iri, subject = ?subject_iri, object = ?object_iri, "property linked");
        property.linked_subject_iri = subject_iri;
        property.linked_object_iri = object_iri;
        property.lineage.push(LineageEvent::new(
            Stage::PropertyLinker.as_str(),
            "domain_range_linked",
        ));
    }
    signals
}

/// One LM validation call. `Ok(None)` means the LM declined to override.
/// An error is returned as the quality signal to record; the heuristic
/// result stands.
async fn validate_link(
    lm: &dyn LanguageModel,
    document: &Document,
    config: &EnrichConfig,
    task: LmTask,
    span: &Span,
    surface: &str,
    candidates: &[&ConceptMatch],
) -> Result<Option<ConceptIri>, QualitySignal> {
    if candidates.is_empty() {
        return Ok(None);
    }
    let sentence = document
        .sentences()
        .sentence_for_span(span)
        .and_then(|idx| document.sentences().get(idx))
        .map(|s| document.slice(&s).to_string())
        .unwrap_or_else(|| surface.to_string());
    let candidate_list = candidates
        .iter()
        .map(|c| format!("{} ({})", c.preferred_label, c.concept_iri))
        .collect::<Vec<_>>()
        .join("; ");
    let bindings = BTreeMap::from([
        ("surface", surface.to_string()),
        ("sentence", sentence),
        ("candidates", candidate_list),
    ]);
    let stage = match task {
        LmTask::PropertyLinker => Stage::PropertyLinker,
        _ => Stage::IndividualLinker,
    };
    let request = StructuredRequest {
        task,
        routing_key: config.lm_task_routing.get(task.as_str()).cloned(),
        prompt: folio_inference::prompt::LINKER.render(&bindings),
        schema_name: "linker_response",
        schema_version: folio_inference::prompt::LINKER.version,
        budget: CallBudget {
            max_tokens: 256,
            timeout: std::time::Duration::from_secs(config.lm_timeout_secs),
        },
    };
    match call_structured::<LinkerResponse>(lm, &request).await {
        Ok(response) => Ok(response
            .subject_iri
            .or(response.object_iri)
            .map(ConceptIri::from)),
        Err(e) => Err(QualitySignal::new(stage, "link_validation_failed")
            .with_detail(e.to_string())
            .with_span(*span)),
    }
}
