//! Reconciliation: merge ruler matches and proposer tuples into a unified
//! set of discoveries.
//!
//! Alignment is by normalized surface text (NFKC + lowercase + whitespace
//! collapsed). Branch conflicts go through embedding triage; when the
//! embedding index is absent both arms are kept and the reranker arbitrates
//! later.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use folio_inference::EmbeddingService;
use folio_match::ruler::RulerMatch;
use folio_ontology::OntologyAccessor;
use folio_protocol::{
    defaults, ConceptIri, MatchSource, MatchType, QualitySignal, Span, Stage,
};
use folio_text::{fold_key, Document};

use crate::proposer::Proposal;

/// A (surface, branch, sources) discovery awaiting resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    /// Representative surface form (first occurrence in document order).
    pub surface: String,
    pub normalized_surface: String,
    /// Document occurrences known at reconciliation time, ordered.
    pub spans: Vec<Span>,
    /// Candidate IRIs from the ruler arm, unique and ordered.
    pub candidate_iris: Vec<ConceptIri>,
    pub branch_hint: Option<String>,
    pub match_type: MatchType,
    pub confidence: f64,
    pub sources: Vec<MatchSource>,
}

pub struct Reconciler {
    ontology: Arc<dyn OntologyAccessor>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    t_conflict: f64,
}

impl Reconciler {
    pub fn new(
        ontology: Arc<dyn OntologyAccessor>,
        embedder: Option<Arc<dyn EmbeddingService>>,
        t_conflict: f64,
    ) -> Self {
        Self {
            ontology,
            embedder,
            t_conflict,
        }
    }

    /// Merge the two arms. Output is ordered by normalized surface so the
    /// resolver sees a deterministic stream regardless of Phase 2 completion
    /// order.
    pub async fn reconcile(
        &self,
        document: &Document,
        ruler_matches: &[RulerMatch],
        proposals: &[Proposal],
    ) -> (Vec<Discovery>, Vec<QualitySignal>) {
        let mut ruler_groups: BTreeMap<String, Vec<&RulerMatch>> = BTreeMap::new();
        for m in ruler_matches {
            ruler_groups
                .entry(fold_key(&m.surface_text))
                .or_default()
                .push(m);
        }
        let mut proposal_groups: BTreeMap<String, Vec<&Proposal>> = BTreeMap::new();
        for p in proposals {
            proposal_groups
                .entry(fold_key(&p.surface))
                .or_default()
                .push(p);
        }

        let keys: BTreeSet<String> = ruler_groups
            .keys()
            .chain(proposal_groups.keys())
            .cloned()
            .collect();

        let mut discoveries = Vec::new();
        let mut signals = Vec::new();
        for key in keys {
            match (ruler_groups.get(&key), proposal_groups.get(&key)) {
                (Some(ruler_arm), None) => {
                    discoveries.push(self.from_ruler(&key, ruler_arm));
                }
                (None, Some(llm_arm)) => {
                    discoveries.push(from_proposals(&key, llm_arm));
                }
                (Some(ruler_arm), Some(llm_arm)) => {
                    self.merge_arms(
                        document,
                        &key,
                        ruler_arm,
                        llm_arm,
                        &mut discoveries,
                        &mut signals,
                    )
                    .await;
                }
                (None, None) => unreachable!("key came from one of the maps"),
            }
        }
        (discoveries, signals)
    }

    fn from_ruler(&self, key: &str, arm: &[&RulerMatch]) -> Discovery {
        let mut spans: Vec<Span> = arm.iter().map(|m| m.span).collect();
        spans.sort();
        spans.dedup();
        let mut iris: Vec<ConceptIri> = arm.iter().map(|m| m.iri.clone()).collect();
        iris.sort();
        iris.dedup();
        let best = arm
            .iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("ruler arm is non-empty");
        Discovery {
            surface: arm[0].surface_text.clone(),
            normalized_surface: key.to_string(),
            spans,
            candidate_iris: iris,
            branch_hint: None,
            match_type: best.match_type,
            confidence: best.confidence,
            sources: vec![MatchSource::Ruler],
        }
    }

    async fn merge_arms(
        &self,
        document: &Document,
        key: &str,
        ruler_arm: &[&RulerMatch],
        llm_arm: &[&Proposal],
        discoveries: &mut Vec<Discovery>,
        signals: &mut Vec<QualitySignal>,
    ) {
        let ruler_discovery = self.from_ruler(key, ruler_arm);
        let llm_discovery = from_proposals(key, llm_arm);

        let ruler_branches: BTreeSet<String> = ruler_discovery
            .candidate_iris
            .iter()
            .flat_map(|iri| self.ontology.branches_for(iri))
            .collect();
        let branches_agree = match llm_discovery.branch_hint.as_deref() {
            None => true,
            Some(hint) => ruler_branches.iter().any(|b| b.eq_ignore_ascii_case(hint)),
        };

        if branches_agree {
            discoveries.push(merged(ruler_discovery, llm_discovery));
            return;
        }

        // Branch conflict: embedding triage over the ruler's candidates.
        if let Some(embedder) = &self.embedder {
            let context = self.sentence_context(document, &ruler_discovery);
            match embedder
                .nearest_in(&context, &ruler_discovery.candidate_iris, 2)
                .await
            {
                Ok(hits) if !hits.is_empty() => {
                    let top = &hits[0];
                    let margin = hits
                        .get(1)
                        .map(|second| top.score - second.score)
                        .unwrap_or(top.score);
                    if top.score >= self.t_conflict && margin >= defaults::TRIAGE_MARGIN {
                        debug!(surface = %key, iri = %top.iri, "triage resolved branch conflict");
                        let mut resolved = merged(ruler_discovery, llm_discovery);
                        resolved.candidate_iris = vec![top.iri.clone()];
                        resolved.sources.push(MatchSource::Semantic);
                        resolved.sources.sort();
                        discoveries.push(resolved);
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    signals.push(
                        QualitySignal::new(Stage::Reconciler, "triage_failed")
                            .with_detail(e.to_string()),
                    );
                }
            }
        }

        // Unresolved conflict (or no embedding index): keep both arms; the
        // reranker arbitrates with context.
        discoveries.push(ruler_discovery);
        discoveries.push(llm_discovery);
    }

    fn sentence_context(&self, document: &Document, discovery: &Discovery) -> String {
        let span = discovery.spans.first().copied().unwrap_or(Span::new(0, 0));
        match document
            .sentences()
            .sentence_for_span(&span)
            .and_then(|idx| document.sentences().get(idx))
        {
            Some(sentence) => document.slice(&sentence).to_string(),
            None => discovery.surface.clone(),
        }
    }
}

fn from_proposals(key: &str, arm: &[&Proposal]) -> Discovery {
    let mut spans: Vec<Span> = arm.iter().map(|p| p.span).collect();
    spans.sort();
    spans.dedup();
    let best = arm
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("proposal arm is non-empty");
    Discovery {
        surface: arm[0].surface.clone(),
        normalized_surface: key.to_string(),
        spans,
        candidate_iris: Vec::new(),
        branch_hint: best.branch_hint.clone(),
        match_type: MatchType::Llm,
        confidence: best.confidence,
        sources: vec![MatchSource::Llm],
    }
}

/// Agreement: one discovery carrying both sources and the higher of the two
/// confidences.
fn merged(ruler: Discovery, llm: Discovery) -> Discovery {
    let mut spans = ruler.spans;
    spans.extend(llm.spans);
    spans.sort();
    spans.dedup();
    let mut sources = ruler.sources;
    sources.extend(llm.sources);
    sources.sort();
    Discovery {
        surface: ruler.surface,
        normalized_surface: ruler.normalized_surface,
        spans,
        candidate_iris: ruler.candidate_iris,
        branch_hint: llm.branch_hint,
        match_type: ruler.match_type,
        confidence: ruler.confidence.max(llm.confidence),
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_test_utils::{fixture_ontology, StubEmbedder};

    fn ruler_match(span: (usize, usize), surface: &str, iri: &str, conf: f64) -> RulerMatch {
        RulerMatch {
            span: Span::new(span.0, span.1),
            surface_text: surface.into(),
            iri: ConceptIri::from(iri),
            label: surface.into(),
            match_type: MatchType::PreferredLabel,
            confidence: conf,
        }
    }

    fn proposal(span: (usize, usize), surface: &str, hint: Option<&str>, conf: f64) -> Proposal {
        Proposal {
            span: Span::new(span.0, span.1),
            surface: surface.into(),
            branch_hint: hint.map(|s| s.to_string()),
            confidence: conf,
            chunk_index: 0,
        }
    }

    fn reconciler(embedder: Option<StubEmbedder>) -> Reconciler {
        Reconciler::new(
            Arc::new(fixture_ontology()),
            embedder.map(|e| Arc::new(e) as Arc<dyn EmbeddingService>),
            0.80,
        )
    }

    #[tokio::test]
    async fn test_agreement_merges_sources_and_takes_max_confidence() {
        let doc = Document::from_text("A breach of contract occurred.", 3000, 200).unwrap();
        let ruler = vec![ruler_match((2, 20), "breach of contract", "folio:breach-of-contract", 0.90)];
        let props = vec![proposal((2, 20), "Breach of Contract", Some("Event"), 0.95)];
        let (discoveries, signals) = reconciler(None).reconcile(&doc, &ruler, &props).await;
        assert!(signals.is_empty());
        assert_eq!(discoveries.len(), 1);
        let d = &discoveries[0];
        assert_eq!(d.sources, vec![MatchSource::Ruler, MatchSource::Llm]);
        assert!((d.confidence - 0.95).abs() < 1e-12);
        assert_eq!(d.candidate_iris.len(), 1);
    }

    #[tokio::test]
    async fn test_single_arm_retained_as_is() {
        let doc = Document::from_text("The tribunal convened. New theory applies.", 3000, 200)
            .unwrap();
        let ruler = vec![ruler_match((4, 12), "tribunal", "folio:court", 0.35)];
        let props = vec![proposal((23, 33), "New theory", Some("Concept"), 0.6)];
        let (discoveries, _) = reconciler(None).reconcile(&doc, &ruler, &props).await;
        assert_eq!(discoveries.len(), 2);
        let by_key: BTreeMap<&str, &Discovery> = discoveries
            .iter()
            .map(|d| (d.normalized_surface.as_str(), d))
            .collect();
        assert_eq!(by_key["tribunal"].sources, vec![MatchSource::Ruler]);
        assert_eq!(by_key["new theory"].sources, vec![MatchSource::Llm]);
    }

    #[tokio::test]
    async fn test_branch_conflict_with_triage_assigns_concept() {
        let doc =
            Document::from_text("The accrued Interest on the loan was paid.", 3000, 200).unwrap();
        let ruler = vec![
            ruler_match((12, 20), "Interest", "folio:interest-financial", 0.72),
            ruler_match((12, 20), "Interest", "folio:interest-curiosity", 0.72),
        ];
        let props = vec![proposal((12, 20), "Interest", Some("Event"), 0.8)];
        let embedder = StubEmbedder::from_ontology(&fixture_ontology())
            .with_override("accrued", "folio:interest-financial", 0.93)
            .with_override("accrued", "folio:interest-curiosity", 0.40);
        let (discoveries, signals) = reconciler(Some(embedder))
            .reconcile(&doc, &ruler, &props)
            .await;
        assert!(signals.is_empty());
        assert_eq!(discoveries.len(), 1);
        let d = &discoveries[0];
        assert_eq!(d.candidate_iris, vec![ConceptIri::from("folio:interest-financial")]);
        assert!(d.sources.contains(&MatchSource::Semantic));
        assert!(d.sources.contains(&MatchSource::Ruler));
        assert!(d.sources.contains(&MatchSource::Llm));
    }

    #[tokio::test]
    async fn test_branch_conflict_without_embedder_keeps_both_arms() {
        let doc = Document::from_text("The Interest accrued.", 3000, 200).unwrap();
        let ruler = vec![ruler_match((4, 12), "Interest", "folio:interest-financial", 0.72)];
        let props = vec![proposal((4, 12), "Interest", Some("Event"), 0.8)];
        let (discoveries, _) = reconciler(None).reconcile(&doc, &ruler, &props).await;
        assert_eq!(discoveries.len(), 2);
        assert!(discoveries.iter().any(|d| d.sources == vec![MatchSource::Ruler]));
        assert!(discoveries.iter().any(|d| d.sources == vec![MatchSource::Llm]));
    }

    #[tokio::test]
    async fn test_triage_below_threshold_keeps_both_arms() {
        let doc = Document::from_text("The Interest accrued.", 3000, 200).unwrap();
        let ruler = vec![
            ruler_match((4, 12), "Interest", "folio:interest-financial", 0.72),
            ruler_match((4, 12), "Interest", "folio:interest-curiosity", 0.72),
        ];
        let props = vec![proposal((4, 12), "Interest", Some("Event"), 0.8)];
        let embedder = StubEmbedder::from_ontology(&fixture_ontology())
            .with_override("accrued", "folio:interest-financial", 0.55)
            .with_override("accrued", "folio:interest-curiosity", 0.52);
        let (discoveries, _) = reconciler(Some(embedder))
            .reconcile(&doc, &ruler, &props)
            .await;
        assert_eq!(discoveries.len(), 2);
    }
}
