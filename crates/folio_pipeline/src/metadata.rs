//! Metadata synthesis: one full-context LM call, with an individuals-based
//! fallback when the model is unavailable. Also hosts the post-pipeline
//! area-of-law ranking and the document-type cross-check.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use folio_inference::{
    call_structured, CallBudget, DocTypeResponse, LanguageModel, LmTask, MetadataResponse,
    StructuredRequest,
};
use folio_protocol::{
    AnnotationState, AreaOfLawScore, DocumentMetadata, EnrichConfig, IndividualType, KeyDate,
    PartyRecord, QualitySignal, Stage, TriplePredicate,
};
use folio_text::Document;

use crate::working::WorkingSet;

/// Synthesize the metadata record from the full pipeline context.
pub async fn synthesize_metadata(
    lm: Option<Arc<dyn LanguageModel>>,
    document: &Document,
    config: &EnrichConfig,
    ws: &WorkingSet,
    doc_type: Option<&DocTypeResponse>,
) -> (DocumentMetadata, Vec<QualitySignal>) {
    let mut signals = Vec::new();
    let mut metadata = match lm {
        Some(lm) => match lm_metadata(lm, document, config, ws, doc_type).await {
            Ok(metadata) => metadata,
            Err(signal) => {
                signals.push(signal);
                fallback_metadata(ws, doc_type)
            }
        },
        None => fallback_metadata(ws, doc_type),
    };

    // Post-pipeline: area-of-law ranking from resolved branches, filled when
    // the synthesizer left it empty.
    if metadata.areas_of_law.is_empty() {
        metadata.areas_of_law = area_of_law_ranking(ws);
    }
    if metadata.primary_area_of_law.is_none() {
        metadata.primary_area_of_law = metadata.areas_of_law.first().map(|a| a.area.clone());
    }

    // Document-type quality cross-check.
    if let (Some(hypothesis), Some(synthesized)) =
        (doc_type, metadata.document_type.as_deref())
    {
        if !hypothesis.document_type.eq_ignore_ascii_case(synthesized) {
            signals.push(
                QualitySignal::new(Stage::DocTypeCheck, "doc_type_mismatch").with_detail(format!(
                    "classifier: {}, synthesizer: {}",
                    hypothesis.document_type, synthesized
                )),
            );
        }
    }
    (metadata, signals)
}

async fn lm_metadata(
    lm: Arc<dyn LanguageModel>,
    document: &Document,
    config: &EnrichConfig,
    ws: &WorkingSet,
    doc_type: Option<&DocTypeResponse>,
) -> Result<DocumentMetadata, QualitySignal> {
    let concepts = ws
        .annotations
        .iter()
        .filter(|a| a.state != AnnotationState::Rejected)
        .map(|a| format!("{} ({:.2})", a.preferred_label, a.confidence))
        .collect::<Vec<_>>()
        .join("; ");
    let mut grouped: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    for individual in &ws.individuals {
        grouped
            .entry(individual.individual_type.as_str())
            .or_default()
            .push(individual.surface_text.clone());
    }
    let individuals = grouped
        .iter()
        .map(|(kind, items)| format!("{kind}: {}", items.join(", ")))
        .collect::<Vec<_>>()
        .join("\n");
    let relations = ws
        .triples
        .iter()
        .map(|t| match &t.predicate {
            TriplePredicate::Verb { lemma } => format!("{} {} {}", t.subject, lemma, t.object),
            TriplePredicate::Property { iri } => format!("{} {} {}", t.subject, iri, t.object),
        })
        .collect::<Vec<_>>()
        .join("; ");
    let opening: String = document.text().chars().take(1500).collect();

    let bindings = BTreeMap::from([
        (
            "fields",
            "document_type, title, court, jurisdiction, judge, docket_number, case_number, \
             filing_date, decision_date, key_dates, parties, plaintiffs, defendants, attorneys, \
             claims, causes_of_action, relief_sought, monetary_amounts, cited_authorities, \
             statutes, governing_law, summary, outcome, procedural_posture, signatories"
                .to_string(),
        ),
        (
            "doc_type",
            doc_type
                .map(|d| d.document_type.clone())
                .unwrap_or_else(|| "unknown".to_string()),
        ),
        ("concepts", concepts),
        ("individuals", individuals),
        ("relations", relations),
        ("opening", opening),
    ]);
    let request = StructuredRequest {
        task: LmTask::Metadata,
        routing_key: config.lm_task_routing.get("metadata").cloned(),
        prompt: folio_inference::prompt::METADATA.render(&bindings),
        schema_name: "metadata_response",
        schema_version: folio_inference::prompt::METADATA.version,
        budget: CallBudget {
            max_tokens: 4096,
            timeout: std::time::Duration::from_secs(config.lm_timeout_secs),
        },
    };
    match call_structured::<MetadataResponse>(lm.as_ref(), &request).await {
        Ok(response) => Ok(response.metadata),
        Err(e) => Err(
            QualitySignal::new(Stage::MetadataSynthesizer, "synthesis_failed")
                .with_detail(e.to_string()),
        ),
    }
}

/// Minimal record assembled from individuals and resolved concepts.
pub fn fallback_metadata(ws: &WorkingSet, doc_type: Option<&DocTypeResponse>) -> DocumentMetadata {
    let mut metadata = DocumentMetadata::default();
    metadata.document_type = doc_type.map(|d| d.document_type.clone());
    metadata.document_type_confidence = doc_type.map(|d| d.confidence);

    let mut parties: Vec<PartyRecord> = Vec::new();
    for individual in &ws.individuals {
        let surface = individual.surface_text.clone();
        match individual.individual_type {
            IndividualType::Person | IndividualType::Org => {
                if !parties.iter().any(|p| p.name == surface) {
                    parties.push(PartyRecord {
                        name: surface,
                        role: None,
                    });
                }
            }
            IndividualType::Date => {
                let date = individual
                    .normalized_form
                    .clone()
                    .unwrap_or_else(|| surface.clone());
                if metadata.filing_date.is_none() {
                    metadata.filing_date = Some(date.clone());
                }
                metadata.key_dates.push(KeyDate {
                    date,
                    description: None,
                });
            }
            IndividualType::Court => {
                if metadata.court.is_none() {
                    metadata.court = Some(surface);
                }
            }
            IndividualType::CaseNumber => {
                if metadata.case_number.is_none() {
                    metadata.case_number = Some(surface);
                }
            }
            IndividualType::Money => {
                metadata.monetary_amounts.push(surface);
            }
            IndividualType::Citation => {
                metadata
                    .cited_authorities
                    .push(individual.normalized_form.clone().unwrap_or(surface));
            }
            IndividualType::Statute => {
                metadata.statutes.push(surface);
            }
            IndividualType::Gpe => {
                if metadata.jurisdiction.is_none() {
                    metadata.jurisdiction = Some(surface);
                }
            }
            _ => {}
        }
    }
    metadata.parties = parties;

    // Claims from resolved Event-branch concepts.
    let mut claims: Vec<String> = ws
        .annotations
        .iter()
        .filter(|a| {
            a.state != AnnotationState::Rejected && a.branches.contains("Event")
        })
        .map(|a| a.preferred_label.clone())
        .collect();
    claims.sort();
    claims.dedup();
    metadata.claims = claims;

    debug!(parties = metadata.parties.len(), "fallback metadata assembled");
    metadata
}

/// Branch frequencies over live annotations, normalized to [0, 1].
pub fn area_of_law_ranking(ws: &WorkingSet) -> Vec<AreaOfLawScore> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0usize;
    for annotation in &ws.annotations {
        if annotation.state == AnnotationState::Rejected {
            continue;
        }
        for branch in &annotation.branches {
            *counts.entry(branch.clone()).or_default() += 1;
            total += 1;
        }
    }
    if total == 0 {
        return Vec::new();
    }
    let mut ranking: Vec<AreaOfLawScore> = counts
        .into_iter()
        .map(|(area, count)| AreaOfLawScore {
            area,
            score: count as f64 / total as f64,
        })
        .collect();
    ranking.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.area.cmp(&b.area))
    });
    ranking
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_protocol::{
        AnnotationId, ConceptIri, ConceptMatch, Individual, MatchSource, MatchType, Span,
    };
    use folio_test_utils::ScriptedLm;
    use std::collections::BTreeSet;

    fn ws_with_individuals() -> WorkingSet {
        let mut ws = WorkingSet::new();
        let mut push = |kind: IndividualType, surface: &str, normalized: Option<&str>| {
            let id = ws.next_annotation_id();
            ws.individuals.push(Individual {
                id,
                span: Span::new(0, 1),
                surface_text: surface.into(),
                individual_type: kind,
                normalized_form: normalized.map(|s| s.to_string()),
                resolved_url: None,
                linked_concept_iri: None,
                confidence: 0.9,
                sources: vec![MatchSource::Ruler],
                lineage: vec![],
            });
        };
        push(IndividualType::Person, "John Smith", None);
        push(IndividualType::Org, "Acme Corp.", None);
        push(IndividualType::Date, "January 5, 1999", Some("1999-01-05"));
        push(IndividualType::Court, "Superior Court of California", None);
        push(IndividualType::Money, "$500", None);
        ws
    }

    #[tokio::test]
    async fn test_fallback_fills_from_individuals() {
        let ws = ws_with_individuals();
        let (metadata, signals) = synthesize_metadata(
            None,
            &Document::from_text("x.", 3000, 200).unwrap(),
            &EnrichConfig::default(),
            &ws,
            None,
        )
        .await;
        assert!(signals.is_empty());
        assert_eq!(metadata.parties.len(), 2);
        assert_eq!(metadata.filing_date.as_deref(), Some("1999-01-05"));
        assert_eq!(
            metadata.court.as_deref(),
            Some("Superior Court of California")
        );
        assert_eq!(metadata.monetary_amounts, vec!["$500"]);
    }

    #[tokio::test]
    async fn test_lm_failure_degrades_to_fallback_with_signal() {
        let lm = Arc::new(ScriptedLm::new()); // metadata task unhandled
        let ws = ws_with_individuals();
        let (metadata, signals) = synthesize_metadata(
            Some(lm),
            &Document::from_text("x.", 3000, 200).unwrap(),
            &EnrichConfig::default(),
            &ws,
            None,
        )
        .await;
        assert!(signals
            .iter()
            .any(|s| s.stage == Stage::MetadataSynthesizer));
        assert_eq!(metadata.parties.len(), 2);
    }

    #[tokio::test]
    async fn test_doc_type_cross_check_signals_mismatch() {
        let lm = Arc::new(ScriptedLm::new().with_fixed(
            LmTask::Metadata,
            serde_json::json!({"document_type": "complaint"}),
        ));
        let hypothesis = DocTypeResponse {
            document_type: "lease".into(),
            confidence: 0.8,
        };
        let (metadata, signals) = synthesize_metadata(
            Some(lm),
            &Document::from_text("x.", 3000, 200).unwrap(),
            &EnrichConfig::default(),
            &WorkingSet::new(),
            Some(&hypothesis),
        )
        .await;
        assert_eq!(metadata.document_type.as_deref(), Some("complaint"));
        assert!(signals
            .iter()
            .any(|s| s.stage == Stage::DocTypeCheck && s.reason == "doc_type_mismatch"));
    }

    #[test]
    fn test_area_of_law_ranking_orders_by_frequency() {
        let mut ws = WorkingSet::new();
        for (i, branch) in ["Event", "Event", "Document"].iter().enumerate() {
            ws.annotations.push(ConceptMatch {
                id: AnnotationId::new(i as u64 + 1),
                span: Span::new(i * 10, i * 10 + 5),
                surface_text: "x".into(),
                concept_iri: ConceptIri::from("folio:x"),
                preferred_label: "X".into(),
                branches: BTreeSet::from([branch.to_string()]),
                backup_branches: BTreeSet::new(),
                match_type: MatchType::PreferredLabel,
                confidence: 0.8,
                backup_candidates: vec![],
                sources: vec![MatchSource::Ruler],
                state: AnnotationState::Preliminary,
                lineage: vec![],
            });
        }
        let ranking = area_of_law_ranking(&ws);
        assert_eq!(ranking[0].area, "Event");
        assert!((ranking[0].score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(ranking[1].area, "Document");
    }
}
