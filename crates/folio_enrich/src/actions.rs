//! User-action API: promote, reject, restore, cascade operations, and
//! lineage retrieval. Every action appends lineage and transitions state
//! deterministically; nothing is ever destroyed.

use folio_ontology::OntologyAccessor;
use folio_protocol::{
    AnnotationId, AnnotationState, ConceptIri, ConceptMatch, JobId, LineageEvent, RankedCandidate,
};

use crate::service::{EnrichService, ServiceError};

impl EnrichService {
    /// Replace the active IRI with the named backup; the previous active
    /// IRI becomes the top backup. Promoting the already-active IRI is a
    /// no-op, which makes the operation idempotent.
    pub async fn promote(
        &self,
        job_id: JobId,
        annotation_id: AnnotationId,
        backup_iri: ConceptIri,
    ) -> Result<(), ServiceError> {
        let mut result = self.load_completed(job_id).await?;
        let ontology = std::sync::Arc::clone(&self.deps().ontology);
        let annotation = find_annotation(&mut result.annotations, annotation_id)?;

        if annotation.concept_iri == backup_iri {
            // Already active: idempotent no-op.
            return Ok(());
        }
        let position = annotation
            .backup_candidates
            .iter()
            .position(|c| c.iri == backup_iri)
            .ok_or_else(|| ServiceError::UnknownBackup(backup_iri.clone()))?;
        let chosen = annotation.backup_candidates.remove(position);

        let previous = RankedCandidate {
            iri: annotation.concept_iri.clone(),
            label: annotation.preferred_label.clone(),
            score: annotation.confidence,
        };
        let event = LineageEvent::new("promote", "user_promote").with_change(
            serde_json::json!(previous.iri.as_str()),
            serde_json::json!(chosen.iri.as_str()),
        );

        annotation.concept_iri = chosen.iri.clone();
        annotation.preferred_label = chosen.label;
        annotation.confidence = chosen.score;
        annotation.branches = ontology.branches_for(&chosen.iri);
        annotation.backup_candidates.insert(0, previous);
        annotation.lineage.push(event);
        match ontology.get_class(&chosen.iri) {
            Ok(_) => annotation.state = AnnotationState::Confirmed,
            Err(_) => {
                // The promoted IRI vanished from the ontology: reject rather
                // than silently drop.
                annotation.state = AnnotationState::Rejected;
                annotation
                    .lineage
                    .push(LineageEvent::new("promote", "unresolved_iri"));
            }
        }
        self.persist(job_id, annotation_id, result).await
    }

    /// Mark rejected. The annotation and its history stay in the result.
    pub async fn reject(
        &self,
        job_id: JobId,
        annotation_id: AnnotationId,
        reason: impl Into<String>,
    ) -> Result<(), ServiceError> {
        let mut result = self.load_completed(job_id).await?;
        let annotation = find_annotation(&mut result.annotations, annotation_id)?;
        transition(annotation, AnnotationState::Rejected, "reject", reason.into());
        self.persist(job_id, annotation_id, result).await
    }

    /// Resurrect a rejected annotation as confirmed; the rejection stays in
    /// lineage.
    pub async fn restore(
        &self,
        job_id: JobId,
        annotation_id: AnnotationId,
    ) -> Result<(), ServiceError> {
        let mut result = self.load_completed(job_id).await?;
        let annotation = find_annotation(&mut result.annotations, annotation_id)?;
        transition(annotation, AnnotationState::Confirmed, "restore", "user_restore".into());
        self.persist(job_id, annotation_id, result).await
    }

    /// Confirm every annotation bound to `iri` and promote it on every
    /// annotation that carries it as a backup.
    pub async fn cascade_promote(
        &self,
        job_id: JobId,
        iri: ConceptIri,
    ) -> Result<usize, ServiceError> {
        let result = self.load_completed(job_id).await?;
        let targets: Vec<AnnotationId> = result
            .annotations
            .iter()
            .filter(|a| {
                a.concept_iri == iri || a.backup_candidates.iter().any(|c| c.iri == iri)
            })
            .map(|a| a.id)
            .collect();
        drop(result);
        for annotation_id in &targets {
            let mut result = self.load_completed(job_id).await?;
            let annotation = find_annotation(&mut result.annotations, *annotation_id)?;
            if annotation.concept_iri == iri {
                transition(
                    annotation,
                    AnnotationState::Confirmed,
                    "cascade_promote",
                    "cascade_confirm".into(),
                );
                self.persist(job_id, *annotation_id, result).await?;
            } else {
                drop(result);
                self.promote(job_id, *annotation_id, iri.clone()).await?;
            }
        }
        Ok(targets.len())
    }

    /// Reject every annotation bound to `iri`.
    pub async fn bulk_reject(&self, job_id: JobId, iri: ConceptIri) -> Result<usize, ServiceError> {
        let mut result = self.load_completed(job_id).await?;
        let mut count = 0usize;
        let mut touched = Vec::new();
        for annotation in result
            .annotations
            .iter_mut()
            .filter(|a| a.concept_iri == iri)
        {
            transition(
                annotation,
                AnnotationState::Rejected,
                "bulk_reject",
                "bulk_reject".into(),
            );
            touched.push((annotation.id, annotation.lineage.last().cloned()));
            count += 1;
        }
        for (annotation_id, event) in &touched {
            if let Some(event) = event {
                self.store()
                    .append_lineage(job_id, *annotation_id, event)
                    .await?;
            }
        }
        self.store().save_result(&result).await?;
        Ok(count)
    }

    /// Full audit trail for one annotation.
    pub async fn lineage(
        &self,
        job_id: JobId,
        annotation_id: AnnotationId,
    ) -> Result<Vec<LineageEvent>, ServiceError> {
        let mut result = self.load_completed(job_id).await?;
        let annotation = find_annotation(&mut result.annotations, annotation_id)?;
        Ok(annotation.lineage.clone())
    }

    async fn persist(
        &self,
        job_id: JobId,
        annotation_id: AnnotationId,
        result: folio_protocol::JobResult,
    ) -> Result<(), ServiceError> {
        if let Some(annotation) = result.annotations.iter().find(|a| a.id == annotation_id) {
            if let Some(event) = annotation.lineage.last() {
                self.store()
                    .append_lineage(job_id, annotation_id, event)
                    .await?;
            }
        }
        self.store().save_result(&result).await?;
        Ok(())
    }
}

fn find_annotation(
    annotations: &mut [ConceptMatch],
    annotation_id: AnnotationId,
) -> Result<&mut ConceptMatch, ServiceError> {
    annotations
        .iter_mut()
        .find(|a| a.id == annotation_id)
        .ok_or(ServiceError::UnknownAnnotation(annotation_id))
}

/// One state transition, one lineage event.
fn transition(
    annotation: &mut ConceptMatch,
    to: AnnotationState,
    actor: &str,
    reason: String,
) {
    let before = annotation.state;
    annotation.state = to;
    annotation.lineage.push(LineageEvent::new(actor, reason).with_change(
        serde_json::json!(before.as_str()),
        serde_json::json!(to.as_str()),
    ));
}
