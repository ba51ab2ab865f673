//! Document-type classification from the document opening.

use std::collections::BTreeMap;
use std::sync::Arc;

use folio_inference::{
    call_structured, CallBudget, DocTypeResponse, LanguageModel, LmTask, StructuredRequest,
};
use folio_protocol::{EnrichConfig, QualitySignal, Stage};
use folio_text::Document;

/// Single-shot classification. Returns `None` plus a quality signal when the
/// call fails after its retry.
pub async fn classify_doc_type(
    lm: Arc<dyn LanguageModel>,
    document: &Document,
    config: &EnrichConfig,
) -> (Option<DocTypeResponse>, Vec<QualitySignal>) {
    let opening: String = document
        .text()
        .chars()
        .take(folio_protocol::defaults::DOC_TYPE_WINDOW_CHARS)
        .collect();
    let bindings = BTreeMap::from([("opening", opening)]);
    let request = StructuredRequest {
        task: LmTask::DocTypeClassifier,
        routing_key: config.lm_task_routing.get("doc_type_classifier").cloned(),
        prompt: folio_inference::prompt::DOC_TYPE_CLASSIFIER.render(&bindings),
        schema_name: "doc_type_response",
        schema_version: folio_inference::prompt::DOC_TYPE_CLASSIFIER.version,
        budget: CallBudget {
            max_tokens: 256,
            timeout: std::time::Duration::from_secs(config.lm_timeout_secs),
        },
    };
    match call_structured::<DocTypeResponse>(lm.as_ref(), &request).await {
        Ok(response) => (Some(response), Vec::new()),
        Err(e) => (
            None,
            vec![QualitySignal::new(Stage::DocTypeClassifier, "classification_failed")
                .with_detail(e.to_string())],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_test_utils::ScriptedLm;

    #[tokio::test]
    async fn test_classification_parses() {
        let lm = Arc::new(ScriptedLm::new().with_fixed(
            LmTask::DocTypeClassifier,
            serde_json::json!({"document_type": "motion to dismiss", "confidence": 0.9}),
        ));
        let doc = Document::from_text("MOTION TO DISMISS. Comes now the defendant.", 3000, 200)
            .unwrap();
        let (response, signals) = classify_doc_type(lm, &doc, &EnrichConfig::default()).await;
        assert!(signals.is_empty());
        assert_eq!(response.unwrap().document_type, "motion to dismiss");
    }

    #[tokio::test]
    async fn test_failure_degrades_to_none() {
        let lm = Arc::new(ScriptedLm::new());
        let doc = Document::from_text("Some document.", 3000, 200).unwrap();
        let (response, signals) = classify_doc_type(lm, &doc, &EnrichConfig::default()).await;
        assert!(response.is_none());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].stage, Stage::DocTypeClassifier);
    }
}
