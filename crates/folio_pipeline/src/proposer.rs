//! Concept proposer: per-chunk contextual extraction through the language
//! model, fanned out under the configured per-stage concurrency.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use folio_inference::{
    call_structured, CallBudget, LanguageModel, LmTask, ProposerResponse, StructuredRequest,
};
use folio_protocol::{EnrichConfig, QualitySignal, Span, Stage};
use folio_text::Document;

use crate::cancel::CancellationToken;

/// One validated proposer tuple, located in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub span: Span,
    pub surface: String,
    pub branch_hint: Option<String>,
    pub confidence: f64,
    pub chunk_index: usize,
}

/// Run the proposer over every chunk concurrently. Tuples whose text is not
/// a verbatim substring of their chunk are discarded; failed chunks yield an
/// empty result plus a quality signal. Output is ordered by chunk then span
/// so downstream stages see a deterministic stream.
pub async fn propose_concepts(
    lm: Arc<dyn LanguageModel>,
    document: Arc<Document>,
    config: &EnrichConfig,
    branch_names: &[String],
    cancel: &CancellationToken,
) -> (Vec<Proposal>, Vec<QualitySignal>) {
    let semaphore = Arc::new(Semaphore::new(config.lm_concurrency.max(1)));
    let branches_csv = branch_names.join(", ");
    let budget = CallBudget {
        max_tokens: 2048,
        timeout: std::time::Duration::from_secs(config.lm_timeout_secs),
    };
    let routing_key = config.lm_task_routing.get("concept_proposer").cloned();

    let mut tasks: JoinSet<(usize, Result<ProposerResponse, folio_inference::InferenceError>)> =
        JoinSet::new();
    for chunk in document.chunks() {
        if cancel.is_cancelled() {
            break;
        }
        let chunk_index = chunk.index;
        let chunk_text = document.chunk_text(chunk).to_string();
        let lm = Arc::clone(&lm);
        let semaphore = Arc::clone(&semaphore);
        let branches_csv = branches_csv.clone();
        let routing_key = routing_key.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let bindings = BTreeMap::from([
                ("branches", branches_csv),
                ("chunk", chunk_text),
            ]);
            let request = StructuredRequest {
                task: LmTask::ConceptProposer,
                routing_key,
                prompt: folio_inference::prompt::CONCEPT_PROPOSER.render(&bindings),
                schema_name: "proposer_response",
                schema_version: folio_inference::prompt::CONCEPT_PROPOSER.version,
                budget,
            };
            let response = call_structured::<ProposerResponse>(lm.as_ref(), &request).await;
            (chunk_index, response)
        });
    }

    let mut by_chunk: BTreeMap<usize, Result<ProposerResponse, folio_inference::InferenceError>> =
        BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((chunk_index, response)) => {
                by_chunk.insert(chunk_index, response);
            }
            Err(e) => warn!(error = %e, "proposer chunk task aborted"),
        }
    }

    let mut proposals = Vec::new();
    let mut signals = Vec::new();
    for (chunk_index, response) in by_chunk {
        let chunk = &document.chunks()[chunk_index];
        match response {
            Ok(parsed) => {
                let chunk_text = document.chunk_text(chunk);
                for tuple in parsed.concepts {
                    // Verbatim check: the concept text must appear in the
                    // chunk exactly.
                    let Some(byte_pos) = chunk_text.find(tuple.concept_text.as_str()) else {
                        debug!(
                            chunk = chunk_index,
                            text = %tuple.concept_text,
                            "proposer tuple not a chunk substring, discarded"
                        );
                        continue;
                    };
                    if tuple.concept_text.trim().is_empty() {
                        continue;
                    }
                    let char_offset = chunk_text[..byte_pos].chars().count();
                    let start = chunk.span.start + char_offset;
                    let end = start + tuple.concept_text.chars().count();
                    proposals.push(Proposal {
                        span: Span::new(start, end),
                        surface: tuple.concept_text,
                        branch_hint: tuple.branch_hint,
                        confidence: tuple.confidence.clamp(0.1, 0.99),
                        chunk_index,
                    });
                }
            }
            Err(e) => {
                signals.push(
                    QualitySignal::new(Stage::ConceptProposer, "chunk_failed")
                        .with_detail(e.to_string())
                        .with_chunk(chunk_index),
                );
            }
        }
    }
    proposals.sort_by(|a, b| {
        (a.chunk_index, a.span.start, a.span.end).cmp(&(b.chunk_index, b.span.start, b.span.end))
    });
    (proposals, signals)
}
