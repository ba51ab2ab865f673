//! Contextual rerank: a 50/50 blend of the pipeline score and an LM rubric
//! score over a three-sentence window.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use folio_inference::{
    call_structured, CallBudget, LanguageModel, LmTask, RerankResponse, StructuredRequest,
};
use folio_protocol::{
    defaults, AnnotationState, ConceptMatch, EnrichConfig, LineageEvent, QualitySignal, Stage,
};
use folio_text::Document;

use crate::cancel::CancellationToken;
use crate::working::WorkingSet;

/// Fused confidence below this marks the annotation rejected.
const REJECT_BELOW: f64 = 0.4;

/// Rerank every live annotation in place. Annotations the LM fails to score
/// retain their prior and produce a quality signal.
pub async fn rerank_annotations(
    lm: Arc<dyn LanguageModel>,
    document: &Document,
    config: &EnrichConfig,
    annotations: &mut [ConceptMatch],
    cancel: &CancellationToken,
) -> Vec<QualitySignal> {
    let mut signals = Vec::new();
    let budget = CallBudget {
        max_tokens: 256,
        timeout: std::time::Duration::from_secs(config.lm_timeout_secs),
    };
    let routing_key = config.lm_task_routing.get("rerank").cloned();

    for annotation in annotations.iter_mut() {
        if cancel.is_cancelled() {
            break;
        }
        if annotation.state == AnnotationState::Rejected {
            continue;
        }
        let context = context_window(document, annotation);
        let bindings = BTreeMap::from([
            ("label", annotation.preferred_label.clone()),
            ("surface", annotation.surface_text.clone()),
            ("context", context),
        ]);
        let request = StructuredRequest {
            task: LmTask::Rerank,
            routing_key: routing_key.clone(),
            prompt: folio_inference::prompt::RERANK.render(&bindings),
            schema_name: "rerank_response",
            schema_version: folio_inference::prompt::RERANK.version,
            budget,
        };
        match call_structured::<RerankResponse>(lm.as_ref(), &request).await {
            Ok(response) => {
                let context_score = response.score.clamp(0.0, 1.0);
                let fused = defaults::RERANK_PRIOR_WEIGHT * annotation.confidence
                    + (1.0 - defaults::RERANK_PRIOR_WEIGHT) * context_score;
                WorkingSet::update_confidence(annotation, Stage::Reranker, fused, "rerank_blend");
                if fused < REJECT_BELOW {
                    let before = annotation.state;
                    annotation.state = AnnotationState::Rejected;
                    annotation.lineage.push(
                        LineageEvent::new(Stage::Reranker.as_str(), "rerank_low_confidence")
                            .with_change(
                                serde_json::json!(before.as_str()),
                                serde_json::json!(annotation.state.as_str()),
                            ),
                    );
                    debug!(id = %annotation.id, fused, "annotation rejected by reranker");
                }
            }
            Err(e) => {
                signals.push(
                    QualitySignal::new(Stage::Reranker, "annotation_not_scored")
                        .with_detail(e.to_string())
                        .with_span(annotation.span),
                );
            }
        }
    }
    signals
}

/// Target sentence plus one before and one after.
fn context_window(document: &Document, annotation: &ConceptMatch) -> String {
    match document.sentences().sentence_for_span(&annotation.span) {
        Some(idx) => match document.sentences().context_window(idx, 1, 1) {
            Some(window) => document.slice(&window).to_string(),
            None => annotation.surface_text.clone(),
        },
        None => annotation.surface_text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_inference::InferenceError;
    use folio_protocol::{AnnotationId, ConceptIri, MatchSource, MatchType, Span};
    use folio_test_utils::ScriptedLm;

    fn annotation(span: (usize, usize), confidence: f64) -> ConceptMatch {
        ConceptMatch {
            id: AnnotationId::new(1),
            span: Span::new(span.0, span.1),
            surface_text: "contract".into(),
            concept_iri: ConceptIri::from("folio:contract"),
            preferred_label: "Contract".into(),
            branches: Default::default(),
            backup_branches: Default::default(),
            match_type: MatchType::PreferredLabel,
            confidence,
            backup_candidates: vec![],
            sources: vec![MatchSource::Ruler],
            state: AnnotationState::Preliminary,
            lineage: vec![],
        }
    }

    #[tokio::test]
    async fn test_blend_is_half_prior_half_context() {
        let lm = Arc::new(
            ScriptedLm::new().with_fixed(LmTask::Rerank, serde_json::json!({"score": 0.95})),
        );
        let doc = Document::from_text("The contract was signed. It bound both parties.", 3000, 200)
            .unwrap();
        let mut annotations = vec![annotation((4, 12), 0.72)];
        let signals = rerank_annotations(
            lm,
            &doc,
            &EnrichConfig::default(),
            &mut annotations,
            &CancellationToken::new(),
        )
        .await;
        assert!(signals.is_empty());
        assert!((annotations[0].confidence - (0.5 * 0.72 + 0.5 * 0.95)).abs() < 1e-9);
        assert_eq!(annotations[0].lineage.len(), 1);
        assert_eq!(annotations[0].state, AnnotationState::Preliminary);
    }

    #[tokio::test]
    async fn test_low_fused_score_rejects() {
        let lm = Arc::new(
            ScriptedLm::new().with_fixed(LmTask::Rerank, serde_json::json!({"score": 0.2})),
        );
        let doc = Document::from_text("The contract was signed.", 3000, 200).unwrap();
        let mut annotations = vec![annotation((4, 12), 0.35)];
        rerank_annotations(
            lm,
            &doc,
            &EnrichConfig::default(),
            &mut annotations,
            &CancellationToken::new(),
        )
        .await;
        // 0.5*0.35 + 0.5*0.2 = 0.275 < 0.4
        assert_eq!(annotations[0].state, AnnotationState::Rejected);
        // One event for the score change, one for the state transition.
        assert_eq!(annotations[0].lineage.len(), 2);
    }

    #[tokio::test]
    async fn test_unscored_annotation_keeps_prior() {
        let lm = Arc::new(ScriptedLm::new().with_handler(LmTask::Rerank, |_| {
            Err(InferenceError::Provider("no".into()))
        }));
        let doc = Document::from_text("The contract was signed.", 3000, 200).unwrap();
        let mut annotations = vec![annotation((4, 12), 0.72)];
        let signals = rerank_annotations(
            lm,
            &doc,
            &EnrichConfig::default(),
            &mut annotations,
            &CancellationToken::new(),
        )
        .await;
        assert!((annotations[0].confidence - 0.72).abs() < 1e-12);
        assert!(annotations[0].lineage.is_empty());
        assert_eq!(signals.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_annotations_skipped() {
        let lm = Arc::new(
            ScriptedLm::new().with_fixed(LmTask::Rerank, serde_json::json!({"score": 0.95})),
        );
        let doc = Document::from_text("The contract was signed.", 3000, 200).unwrap();
        let mut rejected = annotation((4, 12), 0.3);
        rejected.state = AnnotationState::Rejected;
        let mut annotations = vec![rejected];
        rerank_annotations(
            lm.clone(),
            &doc,
            &EnrichConfig::default(),
            &mut annotations,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(lm.call_count(), 0);
        assert!((annotations[0].confidence - 0.3).abs() < 1e-12);
    }
}
