//! The per-job mutable working set. Owned by the orchestrator; stages
//! receive it sequentially in Phase 3 and never share it concurrently.

use folio_protocol::{
    sort_matches, AnnotationId, ConceptMatch, Individual, JobResult, LineageEvent,
    PropertyAnnotation, QualitySignal, Stage, StageTiming, Triple,
};

#[derive(Default)]
pub struct WorkingSet {
    next_id: u64,
    pub annotations: Vec<ConceptMatch>,
    pub individuals: Vec<Individual>,
    pub properties: Vec<PropertyAnnotation>,
    pub triples: Vec<Triple>,
    pub quality_signals: Vec<QualitySignal>,
    pub timings: Vec<StageTiming>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable ids, assigned at first persistence into the working set and
    /// monotonically increasing per job.
    pub fn next_annotation_id(&mut self) -> AnnotationId {
        self.next_id += 1;
        AnnotationId::new(self.next_id)
    }

    pub fn signal(&mut self, signal: QualitySignal) {
        self.quality_signals.push(signal);
    }

    pub fn record_timing(&mut self, stage: Stage, millis: u64, ran: bool) {
        self.timings.push(StageTiming { stage, millis, ran });
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&ConceptMatch> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn annotation_mut(&mut self, id: AnnotationId) -> Option<&mut ConceptMatch> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    /// Record a confidence change on an annotation: exactly one lineage
    /// event per mutation.
    pub fn update_confidence(
        annotation: &mut ConceptMatch,
        stage: Stage,
        new_confidence: f64,
        reason: &str,
    ) {
        let before = annotation.confidence;
        annotation.confidence = new_confidence;
        annotation.lineage.push(
            LineageEvent::new(stage.as_str(), reason)
                .with_change(serde_json::json!(before), serde_json::json!(new_confidence)),
        );
    }

    /// Canonical hand-off order before persistence.
    pub fn sort_for_handoff(&mut self) {
        sort_matches(&mut self.annotations);
        self.individuals.sort_by(|a, b| {
            (a.span.start, a.span.end, a.individual_type)
                .cmp(&(b.span.start, b.span.end, b.individual_type))
        });
        self.properties.sort_by(|a, b| {
            (a.span.start, a.span.end, a.property_iri.as_str())
                .cmp(&(b.span.start, b.span.end, b.property_iri.as_str()))
        });
        self.triples.sort_by(|a, b| {
            (a.evidence.start, a.evidence.end, a.subject, a.object)
                .cmp(&(b.evidence.start, b.evidence.end, b.subject, b.object))
        });
    }

    /// Move everything into the result envelope.
    pub fn drain_into(mut self, result: &mut JobResult) {
        self.sort_for_handoff();
        result.annotations = self.annotations;
        result.individuals = self.individuals;
        result.properties = self.properties;
        result.triples = self.triples;
        result.quality_signals.extend(self.quality_signals);
        result.timings.extend(self.timings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_allocation_is_monotonic() {
        let mut ws = WorkingSet::new();
        let a = ws.next_annotation_id();
        let b = ws.next_annotation_id();
        assert!(b > a);
        assert_eq!(a, AnnotationId::new(1));
    }

    #[test]
    fn test_update_confidence_appends_one_lineage_event() {
        use folio_protocol::{AnnotationState, ConceptIri, MatchSource, MatchType, Span};
        let mut annotation = ConceptMatch {
            id: AnnotationId::new(1),
            span: Span::new(0, 5),
            surface_text: "claim".into(),
            concept_iri: ConceptIri::from("folio:claim"),
            preferred_label: "Claim".into(),
            branches: Default::default(),
            backup_branches: Default::default(),
            match_type: MatchType::PreferredLabel,
            confidence: 0.72,
            backup_candidates: vec![],
            sources: vec![MatchSource::Ruler],
            state: AnnotationState::Preliminary,
            lineage: vec![],
        };
        WorkingSet::update_confidence(&mut annotation, Stage::Reranker, 0.81, "rerank_blend");
        assert_eq!(annotation.lineage.len(), 1);
        assert!((annotation.confidence - 0.81).abs() < 1e-12);
        assert_eq!(annotation.lineage[0].actor, "reranker");
        assert_eq!(
            annotation.lineage[0].before,
            Some(serde_json::json!(0.72))
        );
    }
}
