//! The three-phase enrichment orchestrator.
//!
//! Phase 1 runs intake and normalization sequentially. Phase 2 fans out the
//! five discovery stages concurrently and awaits all of them. Phase 3 runs
//! the reconciliation/resolution/calibration chain in order, each stage
//! consuming the updated working set. No error escapes `run`: every failure
//! becomes a quality signal or a terminal job state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use folio_inference::{DocTypeResponse, EmbeddingService, LanguageModel};
use folio_match::individuals::{ExtractedIndividual, IndividualExtractor};
use folio_match::properties::PropertyMatch;
use folio_match::ruler::RulerMatch;
use folio_match::{PropertyMatcher, Ruler};
use folio_ontology::OntologyAccessor;
use folio_protocol::{
    AnnotationState, ConceptMatch, DocumentMetadata, EnrichConfig, EnrichResult, Individual,
    JobEventKind, JobId, JobResult, JobState, LineageEvent, MatchSource, PropertyAnnotation,
    QualitySignal, Stage,
};
use folio_text::{Document, FoldedText, NormalizeError};

use crate::branch_judge::judge_branches;
use crate::cancel::CancellationToken;
use crate::dependency::DependencyExtractor;
use crate::discovery::Reconciler;
use crate::doc_type::classify_doc_type;
use crate::events::EventSink;
use crate::expand::expand_annotations;
use crate::linkers::{link_individuals, link_properties};
use crate::metadata::synthesize_metadata;
use crate::proposer::{propose_concepts, Proposal};
use crate::rerank::rerank_annotations;
use crate::resolver::Resolver;
use crate::working::WorkingSet;

/// Process-wide read-only collaborators, constructed once at startup and
/// shared by every job.
pub struct PipelineDeps {
    pub ontology: Arc<dyn OntologyAccessor>,
    pub lm: Option<Arc<dyn LanguageModel>>,
    pub embedder: Option<Arc<dyn EmbeddingService>>,
    ruler: Arc<Ruler>,
    property_matcher: Option<Arc<PropertyMatcher>>,
    individual_extractor: Arc<IndividualExtractor>,
    dependency_extractor: Arc<DependencyExtractor>,
    branch_names: Vec<String>,
}

impl PipelineDeps {
    pub fn new(
        ontology: Arc<dyn OntologyAccessor>,
        lm: Option<Arc<dyn LanguageModel>>,
        embedder: Option<Arc<dyn EmbeddingService>>,
    ) -> Result<Self, folio_match::catalog::CatalogError> {
        let ruler = Arc::new(Ruler::from_ontology(ontology.as_ref())?);
        // A label set without object properties is legal; the property
        // matcher just never runs.
        let property_matcher = match PropertyMatcher::from_ontology(ontology.as_ref()) {
            Ok(matcher) => Some(Arc::new(matcher)),
            Err(folio_match::catalog::CatalogError::Empty) => None,
            Err(e) => return Err(e),
        };
        let individual_extractor = Arc::new(
            IndividualExtractor::new()
                .map_err(|e| folio_match::catalog::CatalogError::Build(e.to_string()))?,
        );
        let dependency_extractor = Arc::new(DependencyExtractor::from_ontology(ontology.as_ref()));
        let mut branch_names: Vec<String> = ontology
            .iterate_classes()
            .flat_map(|c| c.branches.iter().cloned())
            .collect();
        branch_names.sort();
        branch_names.dedup();
        Ok(Self {
            ontology,
            lm,
            embedder,
            ruler,
            property_matcher,
            individual_extractor,
            dependency_extractor,
            branch_names,
        })
    }
}

/// Raw input to a job.
pub enum DocumentSource {
    Bytes(Vec<u8>),
    Text(String),
}

enum Phase2Output {
    Ruler(Vec<RulerMatch>, Vec<QualitySignal>),
    Proposals(Vec<Proposal>, Vec<QualitySignal>),
    Individuals(Vec<ExtractedIndividual>, Vec<QualitySignal>),
    Properties(Vec<PropertyMatch>, Vec<QualitySignal>),
    DocType(Option<DocTypeResponse>, Vec<QualitySignal>),
}

/// A panicking CPU stage degrades to empty output plus a quality signal;
/// the job proceeds.
fn recover<T: Default>(
    stage: Stage,
    joined: Result<T, tokio::task::JoinError>,
) -> (T, Vec<QualitySignal>) {
    match joined {
        Ok(value) => (value, Vec::new()),
        Err(e) => (
            T::default(),
            vec![QualitySignal::new(stage, "stage_panic").with_detail(e.to_string())],
        ),
    }
}

pub struct Orchestrator {
    deps: Arc<PipelineDeps>,
}

impl Orchestrator {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self { deps }
    }

    /// Drive one job to a terminal state. Always returns a `JobResult`;
    /// failures surface as `state = failed` plus quality signals.
    pub async fn run(
        &self,
        job_id: JobId,
        source: DocumentSource,
        config: EnrichConfig,
        cancel: CancellationToken,
        events: EventSink,
    ) -> JobResult {
        // ---- Phase 1: intake + normalize --------------------------------
        events.emit(Stage::Intake, JobEventKind::StageStarted);
        let started = Instant::now();
        let document = match self.normalize(source, &config) {
            Ok(document) => Arc::new(document),
            Err(e) => {
                error!(%job_id, error = %e, "intake rejected document");
                let mut result = JobResult::new(job_id, "", config);
                result.state = JobState::Failed;
                result
                    .quality_signals
                    .push(QualitySignal::new(Stage::Intake, "input_error").with_detail(e.to_string()));
                events.emit(Stage::Intake, JobEventKind::JobFinished { state: result.state });
                return result;
            }
        };
        let mut result = JobResult::new(job_id, document.text_hash(), config.clone());
        let mut ws = WorkingSet::new();
        ws.record_timing(Stage::Intake, started.elapsed().as_millis() as u64, true);

        let normalize_started = Instant::now();
        let folded = Arc::new(FoldedText::new(document.text()));
        ws.record_timing(
            Stage::Normalize,
            normalize_started.elapsed().as_millis() as u64,
            true,
        );
        events.emit(
            Stage::Normalize,
            JobEventKind::StageFinished {
                counts: Default::default(),
            },
        );

        // ---- Phase 2: concurrent discovery ------------------------------
        let phase2 = self
            .run_phase2(&document, &folded, &config, &cancel, &events, &mut ws)
            .await;

        if cancel.is_cancelled() {
            return self.finish_cancelled(result, ws, &events);
        }

        // ---- Phase 3: sequential calibration chain ----------------------
        let metadata = match self
            .run_phase3(&document, &folded, &config, &cancel, &events, &mut ws, phase2)
            .await
        {
            Ok(metadata) => metadata,
            // The only error a stage-boundary checkpoint raises is
            // cooperative cancellation.
            Err(_) => return self.finish_cancelled(result, ws, &events),
        };
        result.metadata = metadata;

        if cancel.is_cancelled() {
            return self.finish_cancelled(result, ws, &events);
        }

        ws.drain_into(&mut result);
        result.finalize_state();
        events.emit(
            Stage::MetadataSynthesizer,
            JobEventKind::JobFinished { state: result.state },
        );
        info!(%job_id, state = ?result.state, annotations = result.annotations.len(), "job complete");
        result
    }

    fn normalize(
        &self,
        source: DocumentSource,
        config: &EnrichConfig,
    ) -> Result<Document, NormalizeError> {
        match source {
            DocumentSource::Bytes(raw) => Document::from_bytes(
                &raw,
                config.max_upload_bytes,
                config.max_chunk_chars,
                config.chunk_overlap_chars,
            ),
            DocumentSource::Text(text) => {
                if text.len() > config.max_upload_bytes {
                    return Err(NormalizeError::Oversize {
                        size: text.len(),
                        limit: config.max_upload_bytes,
                    });
                }
                Document::from_text(&text, config.max_chunk_chars, config.chunk_overlap_chars)
            }
        }
    }

    /// Fan out the five Phase 2 stages, skipping LM-backed ones when the
    /// interface is absent. Panicking stages degrade to empty output.
    async fn run_phase2(
        &self,
        document: &Arc<Document>,
        folded: &Arc<FoldedText>,
        config: &EnrichConfig,
        cancel: &CancellationToken,
        events: &EventSink,
        ws: &mut WorkingSet,
    ) -> Vec<Phase2Output> {
        let mut tasks: JoinSet<(Stage, u64, Phase2Output)> = JoinSet::new();

        {
            let ruler = Arc::clone(&self.deps.ruler);
            let document = Arc::clone(document);
            let folded = Arc::clone(folded);
            let policy = config.boundary_policy;
            events.emit(Stage::Ruler, JobEventKind::StageStarted);
            tasks.spawn(async move {
                let started = Instant::now();
                let (matches, signals) = recover(
                    Stage::Ruler,
                    tokio::task::spawn_blocking(move || ruler.scan(&document, &folded, policy))
                        .await,
                );
                (
                    Stage::Ruler,
                    started.elapsed().as_millis() as u64,
                    Phase2Output::Ruler(matches, signals),
                )
            });
        }

        if let Some(property_matcher) = &self.deps.property_matcher {
            let matcher = Arc::clone(property_matcher);
            let document = Arc::clone(document);
            let folded = Arc::clone(folded);
            let policy = config.boundary_policy;
            events.emit(Stage::PropertyMatcher, JobEventKind::StageStarted);
            tasks.spawn(async move {
                let started = Instant::now();
                let (matches, signals) = recover(
                    Stage::PropertyMatcher,
                    tokio::task::spawn_blocking(move || matcher.scan(&document, &folded, policy))
                        .await,
                );
                (
                    Stage::PropertyMatcher,
                    started.elapsed().as_millis() as u64,
                    Phase2Output::Properties(matches, signals),
                )
            });
        }

        {
            let extractor = Arc::clone(&self.deps.individual_extractor);
            let document = Arc::clone(document);
            events.emit(Stage::IndividualExtractor, JobEventKind::StageStarted);
            tasks.spawn(async move {
                let started = Instant::now();
                let (individuals, signals) = recover(
                    Stage::IndividualExtractor,
                    tokio::task::spawn_blocking(move || extractor.extract(&document)).await,
                );
                (
                    Stage::IndividualExtractor,
                    started.elapsed().as_millis() as u64,
                    Phase2Output::Individuals(individuals, signals),
                )
            });
        }

        match &self.deps.lm {
            Some(lm) => {
                {
                    let lm = Arc::clone(lm);
                    let document = Arc::clone(document);
                    let config = config.clone();
                    let branch_names = self.deps.branch_names.clone();
                    let cancel = cancel.clone();
                    events.emit(Stage::ConceptProposer, JobEventKind::StageStarted);
                    tasks.spawn(async move {
                        let started = Instant::now();
                        let (proposals, signals) =
                            propose_concepts(lm, document, &config, &branch_names, &cancel).await;
                        (
                            Stage::ConceptProposer,
                            started.elapsed().as_millis() as u64,
                            Phase2Output::Proposals(proposals, signals),
                        )
                    });
                }
                {
                    let lm = Arc::clone(lm);
                    let document = Arc::clone(document);
                    let config = config.clone();
                    events.emit(Stage::DocTypeClassifier, JobEventKind::StageStarted);
                    tasks.spawn(async move {
                        let started = Instant::now();
                        let (doc_type, signals) = classify_doc_type(lm, &document, &config).await;
                        (
                            Stage::DocTypeClassifier,
                            started.elapsed().as_millis() as u64,
                            Phase2Output::DocType(doc_type, signals),
                        )
                    });
                }
            }
            None => {
                for stage in [Stage::ConceptProposer, Stage::DocTypeClassifier] {
                    self.skip_stage(stage, events, ws);
                }
            }
        }

        let mut outputs = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((stage, millis, output)) => {
                    ws.record_timing(stage, millis, true);
                    events.emit(
                        stage,
                        JobEventKind::StageFinished {
                            counts: Default::default(),
                        },
                    );
                    outputs.push(output);
                }
                Err(e) => {
                    // Panics inside stage bodies are recovered per stage;
                    // this is the outer task envelope failing.
                    warn!(error = %e, "phase 2 stage task aborted");
                }
            }
        }
        outputs
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_phase3(
        &self,
        document: &Arc<Document>,
        folded: &Arc<FoldedText>,
        config: &EnrichConfig,
        cancel: &CancellationToken,
        events: &EventSink,
        ws: &mut WorkingSet,
        phase2: Vec<Phase2Output>,
    ) -> EnrichResult<DocumentMetadata> {
        let mut ruler_matches = Vec::new();
        let mut proposals = Vec::new();
        let mut individuals = Vec::new();
        let mut property_matches = Vec::new();
        let mut doc_type = None;
        for output in phase2 {
            let signals = match output {
                Phase2Output::Ruler(matches, signals) => {
                    ruler_matches = matches;
                    signals
                }
                Phase2Output::Proposals(p, signals) => {
                    proposals = p;
                    signals
                }
                Phase2Output::Individuals(items, signals) => {
                    individuals = items;
                    signals
                }
                Phase2Output::Properties(matches, signals) => {
                    property_matches = matches;
                    signals
                }
                Phase2Output::DocType(response, signals) => {
                    doc_type = response;
                    signals
                }
            };
            for s in signals {
                ws.signal(s);
            }
        }

        self.materialize_individuals(ws, individuals, events);
        self.materialize_properties(ws, property_matches, events);

        // Reconciler -> Resolver.
        let stage_budget = Duration::from_secs(config.stage_hard_timeout_secs);
        let reconciler = Reconciler::new(
            Arc::clone(&self.deps.ontology),
            self.deps.embedder.clone(),
            config.t_conflict,
        );
        events.emit(Stage::Reconciler, JobEventKind::StageStarted);
        let reconciled = tokio::time::timeout(
            stage_budget,
            reconciler.reconcile(document, &ruler_matches, &proposals),
        )
        .await;
        let discoveries = match reconciled {
            Ok((discoveries, signals)) => {
                for s in signals {
                    ws.signal(s);
                }
                discoveries
            }
            Err(_) => {
                ws.signal(QualitySignal::new(Stage::Reconciler, "stage_timeout"));
                Vec::new()
            }
        };
        cancel.checkpoint()?;

        events.emit(Stage::Resolver, JobEventKind::StageStarted);
        let resolver = Resolver::new(Arc::clone(&self.deps.ontology), self.deps.embedder.clone());
        for discovery in &discoveries {
            cancel.checkpoint()?;
            let (resolved, signals) = resolver.resolve(discovery).await;
            for s in signals {
                ws.signal(s);
            }
            if let Some(resolved) = resolved {
                for span in &resolved.discovery.spans {
                    let id = ws.next_annotation_id();
                    let mut annotation = ConceptMatch {
                        id,
                        span: *span,
                        surface_text: document.slice(span).to_string(),
                        concept_iri: resolved.iri.clone(),
                        preferred_label: resolved.preferred_label.clone(),
                        branches: resolved.branches.clone(),
                        backup_branches: Default::default(),
                        match_type: resolved.discovery.match_type,
                        confidence: resolved.discovery.confidence,
                        backup_candidates: Vec::new(),
                        sources: resolved.discovery.sources.clone(),
                        state: AnnotationState::Preliminary,
                        lineage: vec![LineageEvent::new(Stage::Resolver.as_str(), "resolved")],
                    };
                    for backup in &resolved.backups {
                        annotation.push_backup(backup.clone());
                    }
                    events.emit(
                        Stage::Resolver,
                        JobEventKind::AnnotationAdded {
                            annotation: annotation.clone(),
                        },
                    );
                    ws.annotations.push(annotation);
                }
            }
        }

        // Reranker and branch judge, LM only.
        match &self.deps.lm {
            Some(lm) => {
                events.emit(Stage::Reranker, JobEventKind::StageStarted);
                let started = Instant::now();
                let signals = rerank_annotations(
                    Arc::clone(lm),
                    document,
                    config,
                    &mut ws.annotations,
                    cancel,
                )
                .await;
                for s in signals {
                    ws.signal(s);
                }
                ws.record_timing(Stage::Reranker, started.elapsed().as_millis() as u64, true);

                events.emit(Stage::BranchJudge, JobEventKind::StageStarted);
                let started = Instant::now();
                let signals =
                    judge_branches(Arc::clone(lm), document, config, &mut ws.annotations, cancel)
                        .await;
                for s in signals {
                    ws.signal(s);
                }
                ws.record_timing(Stage::BranchJudge, started.elapsed().as_millis() as u64, true);
            }
            None => {
                self.skip_stage(Stage::Reranker, events, ws);
                self.skip_stage(Stage::BranchJudge, events, ws);
            }
        }
        cancel.checkpoint()?;

        // String-match expansion runs with or without the LM.
        events.emit(Stage::StringMatchExpander, JobEventKind::StageStarted);
        let started = Instant::now();
        let signals = expand_annotations(self.deps.ontology.as_ref(), document, folded, config, ws);
        for s in signals {
            ws.signal(s);
        }
        ws.record_timing(
            Stage::StringMatchExpander,
            started.elapsed().as_millis() as u64,
            true,
        );

        // Linkers, LM only.
        match &self.deps.lm {
            Some(lm) => {
                events.emit(Stage::IndividualLinker, JobEventKind::StageStarted);
                let annotations = ws.annotations.clone();
                let signals = link_individuals(
                    Arc::clone(lm),
                    document,
                    config,
                    &annotations,
                    &mut ws.individuals,
                    cancel,
                )
                .await;
                for s in signals {
                    ws.signal(s);
                }

                events.emit(Stage::PropertyLinker, JobEventKind::StageStarted);
                let signals = link_properties(
                    Arc::clone(lm),
                    self.deps.ontology.as_ref(),
                    document,
                    config,
                    &annotations,
                    &mut ws.properties,
                    cancel,
                )
                .await;
                for s in signals {
                    ws.signal(s);
                }
            }
            None => {
                self.skip_stage(Stage::IndividualLinker, events, ws);
                self.skip_stage(Stage::PropertyLinker, events, ws);
            }
        }
        cancel.checkpoint()?;

        // Dependency extraction, no LM required.
        events.emit(Stage::DependencyExtractor, JobEventKind::StageStarted);
        let started = Instant::now();
        ws.triples = self.deps.dependency_extractor.extract(document, &ws.annotations);
        ws.record_timing(
            Stage::DependencyExtractor,
            started.elapsed().as_millis() as u64,
            true,
        );

        // Metadata synthesis; minimal record when the LM is down.
        events.emit(Stage::MetadataSynthesizer, JobEventKind::StageStarted);
        if self.deps.lm.is_none() {
            ws.signal(QualitySignal::new(Stage::MetadataSynthesizer, "lm_unavailable"));
        }
        let started = Instant::now();
        let (metadata, signals) = synthesize_metadata(
            self.deps.lm.clone(),
            document,
            config,
            ws,
            doc_type.as_ref(),
        )
        .await;
        for s in signals {
            ws.signal(s);
        }
        ws.record_timing(
            Stage::MetadataSynthesizer,
            started.elapsed().as_millis() as u64,
            self.deps.lm.is_some(),
        );
        Ok(metadata)
    }

    fn materialize_individuals(
        &self,
        ws: &mut WorkingSet,
        extracted: Vec<ExtractedIndividual>,
        events: &EventSink,
    ) {
        for item in extracted {
            let id = ws.next_annotation_id();
            let individual = Individual {
                id,
                span: item.span,
                surface_text: item.surface_text,
                individual_type: item.individual_type,
                normalized_form: item.normalized_form,
                resolved_url: item.resolved_url,
                linked_concept_iri: None,
                confidence: item.confidence,
                sources: vec![MatchSource::Ruler],
                lineage: Vec::new(),
            };
            events.emit(
                Stage::IndividualExtractor,
                JobEventKind::IndividualAdded {
                    individual: individual.clone(),
                },
            );
            ws.individuals.push(individual);
        }
    }

    fn materialize_properties(
        &self,
        ws: &mut WorkingSet,
        matches: Vec<PropertyMatch>,
        events: &EventSink,
    ) {
        for m in matches {
            let (domain, range, inverse) = match self.deps.ontology.get_object_property(&m.iri) {
                Ok(p) => (p.domain_iris.clone(), p.range_iris.clone(), p.inverse_iri.clone()),
                Err(_) => (Vec::new(), Vec::new(), None),
            };
            let id = ws.next_annotation_id();
            let property = PropertyAnnotation {
                id,
                span: m.span,
                surface_text: m.surface_text,
                property_iri: m.iri,
                preferred_label: m.label,
                domain_classes: domain,
                range_classes: range,
                inverse_iri: inverse,
                linked_subject_iri: None,
                linked_object_iri: None,
                confidence: m.confidence,
                sources: vec![MatchSource::Ruler],
                lineage: Vec::new(),
            };
            events.emit(
                Stage::PropertyMatcher,
                JobEventKind::PropertyAdded {
                    property: property.clone(),
                },
            );
            ws.properties.push(property);
        }
    }

    fn skip_stage(&self, stage: Stage, events: &EventSink, ws: &mut WorkingSet) {
        events.emit(
            stage,
            JobEventKind::StageSkipped {
                reason: "lm_unavailable".into(),
            },
        );
        ws.signal(QualitySignal::new(stage, "lm_unavailable"));
        ws.record_timing(stage, 0, false);
    }

    fn finish_cancelled(
        &self,
        mut result: JobResult,
        ws: WorkingSet,
        events: &EventSink,
    ) -> JobResult {
        ws.drain_into(&mut result);
        result.state = JobState::Cancelled;
        result.incomplete = true;
        events.emit(
            Stage::MetadataSynthesizer,
            JobEventKind::JobFinished { state: result.state },
        );
        result
    }
}
