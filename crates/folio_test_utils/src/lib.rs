//! Shared test fixtures: a small legal ontology and deterministic LM and
//! embedding stubs. No mocks of internal components; tests drive the real
//! pipeline against these collaborators.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use folio_inference::{
    CallBudget, EmbeddingService, InferenceError, LanguageModel, LmTask, NearestHit,
    StructuredRequest,
};
use folio_ontology::{InMemoryOntology, ObjectProperty, OntologyClass};
use folio_protocol::ConceptIri;

/// A small legal ontology covering the concepts the end-to-end scenarios
/// exercise: nested terms, ambiguous labels, multi-branch concepts, and one
/// object property.
pub fn fixture_ontology() -> InMemoryOntology {
    let classes = vec![
        class("folio:event", "Legal Event", &[], &[], &["Event"]),
        class("folio:document", "Legal Document", &[], &[], &["Document"]),
        class("folio:actor", "Legal Actor", &[], &[], &["Actor"]),
        class(
            "folio:breach-of-contract",
            "Breach of Contract",
            &["contractual breach"],
            &["folio:event"],
            &["Event"],
        ),
        class(
            "folio:contract",
            "Contract",
            &["agreement"],
            &["folio:document"],
            &["Document"],
        ),
        class(
            "folio:motion",
            "Motion",
            &[],
            &["folio:document"],
            &["Document"],
        ),
        class(
            "folio:motion-to-dismiss",
            "Motion to Dismiss",
            &[],
            &["folio:motion"],
            &["Document"],
        ),
        class(
            "folio:court",
            "Court",
            &["tribunal"],
            &["folio:actor"],
            &["Actor"],
        ),
        class(
            "folio:interest-financial",
            "Interest",
            &["financial interest"],
            &[],
            &["Asset"],
        ),
        class(
            "folio:interest-curiosity",
            "Interest",
            &["curiosity"],
            &[],
            &["Concept"],
        ),
        // Multi-branch concept for branch-judge scenarios.
        class(
            "folio:filing",
            "Filing",
            &[],
            &["folio:event", "folio:document"],
            &["Event", "Document"],
        ),
        class("folio:claim", "Claim", &[], &["folio:event"], &["Event"]),
    ];
    let properties = vec![ObjectProperty {
        iri: ConceptIri::from("folio:denies"),
        preferred_label: "denies".into(),
        alt_labels: vec!["denied".into(), "deny".into()],
        domain_iris: vec![ConceptIri::from("folio:actor")],
        range_iris: vec![ConceptIri::from("folio:document")],
        inverse_iri: None,
        definition: Some("An actor denies a filing or request.".into()),
    }];
    InMemoryOntology::new(classes, properties)
}

fn class(
    iri: &str,
    label: &str,
    alts: &[&str],
    parents: &[&str],
    branches: &[&str],
) -> OntologyClass {
    OntologyClass {
        iri: ConceptIri::from(iri),
        preferred_label: label.to_string(),
        alt_labels: alts.iter().map(|s| s.to_string()).collect(),
        branches: branches.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        parent_iris: parents.iter().map(|s| ConceptIri::from(*s)).collect(),
        definition: None,
    }
}

// ============================================================================
// Scripted language model
// ============================================================================

type Handler =
    Box<dyn Fn(&StructuredRequest) -> Result<serde_json::Value, InferenceError> + Send + Sync>;

/// Deterministic LM: per-task handlers compute a response from the request.
/// Tasks without a handler fail as unavailable, which exercises the
/// degradation paths.
#[derive(Default)]
pub struct ScriptedLm {
    handlers: HashMap<&'static str, Handler>,
    calls: AtomicUsize,
}

impl ScriptedLm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<F>(mut self, task: LmTask, handler: F) -> Self
    where
        F: Fn(&StructuredRequest) -> Result<serde_json::Value, InferenceError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(task.as_str(), Box::new(handler));
        self
    }

    /// Fixed JSON for every call of a task.
    pub fn with_fixed(self, task: LmTask, value: serde_json::Value) -> Self {
        self.with_handler(task, move |_| Ok(value.clone()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedLm {
    async fn structured(
        &self,
        request: &StructuredRequest,
    ) -> Result<serde_json::Value, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.handlers.get(request.task.as_str()) {
            Some(handler) => handler(request),
            None => Err(InferenceError::Unavailable(format!(
                "no scripted handler for task {}",
                request.task
            ))),
        }
    }

    async fn complete(&self, _prompt: &str, _budget: CallBudget) -> Result<String, InferenceError> {
        Err(InferenceError::Unavailable("complete not scripted".into()))
    }
}

// ============================================================================
// Deterministic embedding stub
// ============================================================================

/// Embeddings from character trigram hashing: fully deterministic, stable
/// across runs, and similar strings land near each other. Specific
/// `(text, iri)` similarity overrides steer triage in tests.
pub struct StubEmbedder {
    labels: Vec<(ConceptIri, String)>,
    overrides: Mutex<HashMap<(String, ConceptIri), f64>>,
}

const DIM: usize = 64;

impl StubEmbedder {
    pub fn new(labels: Vec<(ConceptIri, String)>) -> Self {
        Self {
            labels,
            overrides: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_ontology(ontology: &InMemoryOntology) -> Self {
        use folio_ontology::OntologyAccessor;
        let labels = ontology
            .iterate_classes()
            .map(|c| (c.iri.clone(), c.preferred_label.clone()))
            .collect();
        Self::new(labels)
    }

    /// Force the similarity between any query containing `needle` and the
    /// given IRI.
    pub fn with_override(self, needle: &str, iri: &str, score: f64) -> Self {
        self.overrides
            .lock()
            .expect("override table poisoned")
            .insert((needle.to_lowercase(), ConceptIri::from(iri)), score);
        self
    }

    fn vector(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let bytes = lowered.as_bytes();
        let mut v = vec![0.0f32; DIM];
        if bytes.len() < 3 {
            if !bytes.is_empty() {
                v[bytes[0] as usize % DIM] = 1.0;
            }
            return v;
        }
        for w in bytes.windows(3) {
            let h = (w[0] as usize)
                .wrapping_mul(31)
                .wrapping_add(w[1] as usize)
                .wrapping_mul(31)
                .wrapping_add(w[2] as usize);
            v[h % DIM] += 1.0;
        }
        v
    }

    fn score(&self, text: &str, iri: &ConceptIri, label: &str) -> f64 {
        let lowered = text.to_lowercase();
        let overrides = self.overrides.lock().expect("override table poisoned");
        for ((needle, override_iri), score) in overrides.iter() {
            if override_iri == iri && lowered.contains(needle.as_str()) {
                return *score;
            }
        }
        folio_inference::cosine_similarity(&Self::vector(text), &Self::vector(label))
    }
}

#[async_trait]
impl EmbeddingService for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        Ok(Self::vector(text))
    }

    async fn nearest(&self, text: &str, k: usize) -> Result<Vec<NearestHit>, InferenceError> {
        let mut hits: Vec<NearestHit> = self
            .labels
            .iter()
            .map(|(iri, label)| NearestHit {
                iri: iri.clone(),
                label: label.clone(),
                score: self.score(text, iri, label),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.iri.cmp(&b.iri))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn nearest_in(
        &self,
        text: &str,
        candidate_iris: &[ConceptIri],
        k: usize,
    ) -> Result<Vec<NearestHit>, InferenceError> {
        let mut hits: Vec<NearestHit> = self
            .labels
            .iter()
            .filter(|(iri, _)| candidate_iris.contains(iri))
            .map(|(iri, label)| NearestHit {
                iri: iri.clone(),
                label: label.clone(),
                score: self.score(text, iri, label),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.iri.cmp(&b.iri))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_ontology::OntologyAccessor;

    #[test]
    fn test_fixture_ontology_shape() {
        let onto = fixture_ontology();
        assert!(onto.class_count() >= 10);
        assert_eq!(onto.property_count(), 1);
        let filing = onto
            .get_class(&ConceptIri::from("folio:filing"))
            .unwrap();
        assert_eq!(filing.branches.len(), 2);
        assert!(onto.is_descendant(
            &ConceptIri::from("folio:motion-to-dismiss"),
            &ConceptIri::from("folio:document")
        ));
    }

    #[tokio::test]
    async fn test_stub_embedder_is_deterministic() {
        let embedder = StubEmbedder::from_ontology(&fixture_ontology());
        let a = embedder.embed("breach of contract").await.unwrap();
        let b = embedder.embed("breach of contract").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_stub_embedder_override_steers_nearest_in() {
        let embedder = StubEmbedder::from_ontology(&fixture_ontology())
            .with_override("accrued", "folio:interest-financial", 0.95);
        let candidates = vec![
            ConceptIri::from("folio:interest-financial"),
            ConceptIri::from("folio:interest-curiosity"),
        ];
        let hits = embedder
            .nearest_in("the accrued Interest on the loan", &candidates, 2)
            .await
            .unwrap();
        assert_eq!(hits[0].iri.as_str(), "folio:interest-financial");
        assert!((hits[0].score - 0.95).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_scripted_lm_unhandled_task_unavailable() {
        let lm = ScriptedLm::new();
        let request = StructuredRequest {
            task: LmTask::Rerank,
            routing_key: None,
            prompt: String::new(),
            schema_name: "rerank",
            schema_version: 1,
            budget: CallBudget::default(),
        };
        assert!(matches!(
            lm.structured(&request).await,
            Err(InferenceError::Unavailable(_))
        ));
        assert_eq!(lm.call_count(), 1);
    }
}
