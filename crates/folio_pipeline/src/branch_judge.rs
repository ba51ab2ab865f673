//! Branch disambiguation for concepts that belong to more than one
//! ontology branch. 70/30 blend of the existing score and the judge score.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use folio_inference::{
    call_structured, BranchJudgeResponse, CallBudget, LanguageModel, LmTask, StructuredRequest,
};
use folio_protocol::{
    defaults, AnnotationState, ConceptMatch, EnrichConfig, LineageEvent, QualitySignal, Stage,
};
use folio_text::Document;

use crate::cancel::CancellationToken;
use crate::working::WorkingSet;

/// Judge every live annotation whose resolved concept carries two or more
/// plausible branches. When the judge score is absent (LM failure for the
/// item) no fusion is applied and the prior is preserved unchanged.
pub async fn judge_branches(
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
    let routing_key = config.lm_task_routing.get("branch_judge").cloned();

    for annotation in annotations.iter_mut() {
        if cancel.is_cancelled() {
            break;
        }
        if annotation.state == AnnotationState::Rejected || annotation.branches.len() < 2 {
            continue;
        }
        let sentence = enclosing_sentence(document, annotation);
        let candidates = annotation
            .branches
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let bindings = BTreeMap::from([
            ("surface", annotation.surface_text.clone()),
            ("sentence", sentence),
            ("candidates", candidates),
        ]);
        let request = StructuredRequest {
            task: LmTask::BranchJudge,
            routing_key: routing_key.clone(),
            prompt: folio_inference::prompt::BRANCH_JUDGE.render(&bindings),
            schema_name: "branch_judge_response",
            schema_version: folio_inference::prompt::BRANCH_JUDGE.version,
            budget,
        };
        match call_structured::<BranchJudgeResponse>(lm.as_ref(), &request).await {
            Ok(response) => {
                let chosen = annotation
                    .branches
                    .iter()
                    .find(|b| b.eq_ignore_ascii_case(&response.branch))
                    .cloned();
                let Some(chosen) = chosen else {
                    signals.push(
                        QualitySignal::new(Stage::BranchJudge, "unknown_branch_choice")
                            .with_detail(response.branch.clone())
                            .with_span(annotation.span),
                    );
                    continue;
                };
                let judge_score = response.score.clamp(0.0, 1.0);
                let fused = defaults::BRANCH_JUDGE_PRIOR_WEIGHT * annotation.confidence
                    + (1.0 - defaults::BRANCH_JUDGE_PRIOR_WEIGHT) * judge_score;
                WorkingSet::update_confidence(
                    annotation,
                    Stage::BranchJudge,
                    fused,
                    "branch_judge_blend",
                );
                let losers: Vec<String> = annotation
                    .branches
                    .iter()
                    .filter(|b| **b != chosen)
                    .cloned()
                    .collect();
                annotation.backup_branches.extend(losers.clone());
                annotation.branches = std::iter::once(chosen.clone()).collect();
                annotation.lineage.push(
                    LineageEvent::new(Stage::BranchJudge.as_str(), "branch_chosen").with_change(
                        serde_json::json!(losers),
                        serde_json::json!(chosen),
                    ),
                );
                debug!(id = %annotation.id, branch = %chosen, "branch disambiguated");
            }
            Err(e) => {
                // No fusion applied; prior preserved unchanged.
                signals.push(
                    QualitySignal::new(Stage::BranchJudge, "judge_score_absent")
                        .with_detail(e.to_string())
                        .with_span(annotation.span),
                );
            }
        }
    }
    signals
}

fn enclosing_sentence(document: &Document, annotation: &ConceptMatch) -> String {
    match document
        .sentences()
        .sentence_for_span(&annotation.span)
        .and_then(|idx| document.sentences().get(idx))
    {
        Some(sentence) => document.slice(&sentence).to_string(),
        None => annotation.surface_text.clone(),
    }
}
