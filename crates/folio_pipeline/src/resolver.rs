//! Resolution: map each discovery to a ranked list of concept IRIs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use folio_inference::EmbeddingService;
use folio_ontology::OntologyAccessor;
use folio_protocol::{defaults, ConceptIri, QualitySignal, RankedCandidate, Stage};
use folio_text::fold_key;

use crate::discovery::Discovery;

/// A discovery with its resolved concept and ranked backups.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDiscovery {
    pub discovery: Discovery,
    pub iri: ConceptIri,
    pub preferred_label: String,
    pub branches: BTreeSet<String>,
    pub backups: Vec<RankedCandidate>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LexicalGrade {
    ExactPreferred,
    ExactAlt,
    Fuzzy,
}

impl LexicalGrade {
    fn score(self) -> f64 {
        match self {
            LexicalGrade::ExactPreferred => 1.0,
            LexicalGrade::ExactAlt => 0.8,
            LexicalGrade::Fuzzy => 0.5,
        }
    }
}

struct Candidate {
    lexical: LexicalGrade,
    semantic: Option<f64>,
    label: String,
}

/// Lexical + semantic candidate ranking. Process-wide; the label index is
/// built once from the ontology.
pub struct Resolver {
    ontology: Arc<dyn OntologyAccessor>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    /// folded label -> (iri, is_preferred) pairs.
    label_index: BTreeMap<String, Vec<(ConceptIri, bool)>>,
    invocations: AtomicUsize,
}

impl Resolver {
    pub fn new(
        ontology: Arc<dyn OntologyAccessor>,
        embedder: Option<Arc<dyn EmbeddingService>>,
    ) -> Self {
        let mut label_index: BTreeMap<String, Vec<(ConceptIri, bool)>> = BTreeMap::new();
        for class in ontology.iterate_classes() {
            label_index
                .entry(fold_key(&class.preferred_label))
                .or_default()
                .push((class.iri.clone(), true));
            for alt in &class.alt_labels {
                label_index
                    .entry(fold_key(alt))
                    .or_default()
                    .push((class.iri.clone(), false));
            }
        }
        Self {
            ontology,
            embedder,
            label_index,
            invocations: AtomicUsize::new(0),
        }
    }

    /// How many discoveries have been resolved. Resolution runs at most once
    /// per unique `(normalized_surface, branches)` discovery.
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Rank candidates for one discovery. Composite score is
    /// `0.6 * lexical + 0.4 * semantic`; lexical-only when the embedding
    /// index is down. Ties prefer preferred-label entries, then lower IRI.
    pub async fn resolve(
        &self,
        discovery: &Discovery,
    ) -> (Option<ResolvedDiscovery>, Vec<QualitySignal>) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let mut signals = Vec::new();
        let mut candidates: BTreeMap<ConceptIri, Candidate> = BTreeMap::new();

        // Ruler-proposed candidates and exact label-index hits.
        for iri in &discovery.candidate_iris {
            match self.ontology.get_class(iri) {
                Ok(class) => {
                    let grade = self.exact_grade(&discovery.normalized_surface, iri);
                    candidates.insert(
                        iri.clone(),
                        Candidate {
                            lexical: grade,
                            semantic: None,
                            label: class.preferred_label.clone(),
                        },
                    );
                }
                Err(e) => {
                    signals.push(
                        QualitySignal::new(Stage::Resolver, "unresolved_iri")
                            .with_detail(e.to_string()),
                    );
                }
            }
        }
        if let Some(entries) = self.label_index.get(&discovery.normalized_surface) {
            for (iri, is_preferred) in entries {
                let grade = if *is_preferred {
                    LexicalGrade::ExactPreferred
                } else {
                    LexicalGrade::ExactAlt
                };
                let label = self
                    .ontology
                    .get_class(iri)
                    .map(|c| c.preferred_label.clone())
                    .unwrap_or_default();
                let entry = candidates.entry(iri.clone()).or_insert(Candidate {
                    lexical: grade,
                    semantic: None,
                    label,
                });
                if grade.score() > entry.lexical.score() {
                    entry.lexical = grade;
                }
            }
        }

        // Semantic candidates and scores.
        if let Some(embedder) = &self.embedder {
            let semantic_pool = embedder
                .nearest(&discovery.surface, defaults::RESOLVER_TOP_K * 2)
                .await;
            match semantic_pool {
                Ok(hits) => {
                    for hit in hits {
                        let entry = candidates.entry(hit.iri.clone()).or_insert(Candidate {
                            lexical: LexicalGrade::Fuzzy,
                            semantic: None,
                            label: hit.label.clone(),
                        });
                        entry.semantic = Some(hit.score);
                    }
                }
                Err(e) => {
                    signals.push(
                        QualitySignal::new(Stage::Resolver, "semantic_ranking_unavailable")
                            .with_detail(e.to_string()),
                    );
                }
            }
        }

        if candidates.is_empty() {
            debug!(surface = %discovery.surface, "no resolution candidates");
            signals.push(QualitySignal::new(Stage::Resolver, "unresolved_surface")
                .with_detail(discovery.surface.clone()));
            return (None, signals);
        }

        let mut ranked: Vec<(ConceptIri, String, f64, bool)> = candidates
            .into_iter()
            .map(|(iri, c)| {
                let composite = match c.semantic {
                    Some(semantic) => {
                        defaults::RESOLVER_LEXICAL_WEIGHT * c.lexical.score()
                            + (1.0 - defaults::RESOLVER_LEXICAL_WEIGHT) * semantic
                    }
                    None => c.lexical.score(),
                };
                let preferred = c.lexical == LexicalGrade::ExactPreferred;
                (iri, c.label, composite, preferred)
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.3.cmp(&a.3))
                .then_with(|| a.0.cmp(&b.0))
        });

        let (iri, preferred_label, _, _) = ranked[0].clone();
        let branches = self.ontology.branches_for(&iri);
        let backups: Vec<RankedCandidate> = ranked
            .iter()
            .skip(1)
            .take(defaults::RESOLVER_TOP_K)
            .map(|(iri, label, score, _)| RankedCandidate {
                iri: iri.clone(),
                label: label.clone(),
                score: *score,
            })
            .collect();

        (
            Some(ResolvedDiscovery {
                discovery: discovery.clone(),
                iri,
                preferred_label,
                branches,
                backups,
            }),
            signals,
        )
    }

    fn exact_grade(&self, normalized_surface: &str, iri: &ConceptIri) -> LexicalGrade {
        match self.label_index.get(normalized_surface) {
            Some(entries) => entries
                .iter()
                .filter(|(entry_iri, _)| entry_iri == iri)
                .map(|(_, is_preferred)| {
                    if *is_preferred {
                        LexicalGrade::ExactPreferred
                    } else {
                        LexicalGrade::ExactAlt
                    }
                })
                .max_by_key(|g| (g.score() * 100.0) as u64)
                .unwrap_or(LexicalGrade::Fuzzy),
            None => LexicalGrade::Fuzzy,
        }
    }
}
