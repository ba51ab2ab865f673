//! Annotation payload types (spans, concept matches, individuals, properties,
//! triples).
//!
//! "Properties" throughout this crate are OWL object properties (legal verbs
//! and relations between concepts), never key/value record fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::ids::AnnotationId;

// ============================================================================
// Spans
// ============================================================================

/// Half-open `[start, end)` character offsets into the normalized text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default,
)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True when `self` fully encloses `other` and the two are not identical.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end && *self != *other
    }

    /// True when the two spans share at least one character position.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when the spans overlap but neither encloses the other.
    pub fn partially_overlaps(&self, other: &Span) -> bool {
        self.overlaps(other) && !self.contains(other) && !other.contains(self) && self != other
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ============================================================================
// Concept IRIs
// ============================================================================

/// IRI of a class or object property in the FOLIO ontology.
///
/// Stable id; all cross-stage references to ontology entities go through
/// IRIs, never object identity.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default,
)]
#[serde(transparent)]
pub struct ConceptIri(String);

impl ConceptIri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConceptIri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConceptIri {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConceptIri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl FromStr for ConceptIri {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

// ============================================================================
// Canonical enums
// ============================================================================

/// How a concept match was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    PreferredLabel,
    AltLabel,
    Semantic,
    Llm,
    Expanded,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::PreferredLabel => "preferred_label",
            MatchType::AltLabel => "alt_label",
            MatchType::Semantic => "semantic",
            MatchType::Llm => "llm",
            MatchType::Expanded => "expanded",
        }
    }
}

/// Evidence source for an annotation. `sources` is a multiset: the same
/// source may appear more than once when independent passes agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Ruler,
    Llm,
    Semantic,
    StringMatch,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::Ruler => "ruler",
            MatchSource::Llm => "llm",
            MatchSource::Semantic => "semantic",
            MatchSource::StringMatch => "string_match",
        }
    }
}

/// Lifecycle state of an annotation. Nothing is ever destroyed; rejection
/// only marks state, and user actions can resurrect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationState {
    #[default]
    Preliminary,
    Confirmed,
    Rejected,
}

impl AnnotationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationState::Preliminary => "preliminary",
            AnnotationState::Confirmed => "confirmed",
            AnnotationState::Rejected => "rejected",
        }
    }
}

// ============================================================================
// Lineage
// ============================================================================

/// One entry in an annotation's audit trail. Every score mutation and state
/// transition appends exactly one event; events are never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineageEvent {
    /// RFC3339
    pub timestamp: String,
    /// Stage name or user action that caused the mutation.
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    pub reason: String,
}

impl LineageEvent {
    pub fn new(actor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            actor: actor.into(),
            before: None,
            after: None,
            reason: reason.into(),
        }
    }

    pub fn with_change(
        mut self,
        before: impl Into<serde_json::Value>,
        after: impl Into<serde_json::Value>,
    ) -> Self {
        self.before = Some(before.into());
        self.after = Some(after.into());
        self
    }
}

// ============================================================================
// Concept annotations
// ============================================================================

/// A ranked backup candidate for an annotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedCandidate {
    pub iri: ConceptIri,
    pub label: String,
    pub score: f64,
}

/// A binding from a span to a concept IRI with calibrated confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptMatch {
    pub id: AnnotationId,
    pub span: Span,
    pub surface_text: String,
    pub concept_iri: ConceptIri,
    pub preferred_label: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub branches: BTreeSet<String>,
    /// Branches demoted by the branch judge; kept for resurrection.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub backup_branches: BTreeSet<String>,
    pub match_type: MatchType,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backup_candidates: Vec<RankedCandidate>,
    /// Never empty. Kept sorted so persisted artifacts are byte-stable.
    pub sources: Vec<MatchSource>,
    #[serde(default)]
    pub state: AnnotationState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lineage: Vec<LineageEvent>,
}

impl ConceptMatch {
    /// Append a source occurrence, preserving sorted multiset order.
    /// Sources only ever grow; there is no removal path.
    pub fn add_source(&mut self, source: MatchSource) {
        self.sources.push(source);
        self.sources.sort();
    }

    pub fn has_source(&self, source: MatchSource) -> bool {
        self.sources.contains(&source)
    }

    /// Merge a candidate into the backups, deduplicating by IRI and keeping
    /// descending score order. The active IRI is never its own backup.
    pub fn push_backup(&mut self, candidate: RankedCandidate) {
        if candidate.iri == self.concept_iri {
            return;
        }
        if let Some(existing) = self
            .backup_candidates
            .iter_mut()
            .find(|c| c.iri == candidate.iri)
        {
            if candidate.score > existing.score {
                existing.score = candidate.score;
                existing.label = candidate.label;
            }
        } else {
            self.backup_candidates.push(candidate);
        }
        self.backup_candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.iri.cmp(&b.iri))
        });
    }

    /// Sort key used whenever a stage hands off annotations.
    pub fn sort_key(&self) -> (usize, usize, &str) {
        (self.span.start, self.span.end, self.concept_iri.as_str())
    }
}

/// Sort a slice of concept matches into the canonical `(start, end, iri)`
/// hand-off order.
pub fn sort_matches(matches: &mut [ConceptMatch]) {
    matches.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

// ============================================================================
// Individuals
// ============================================================================

/// Kind of an extracted OWL individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IndividualType {
    Citation,
    Date,
    Money,
    Percent,
    Duration,
    Address,
    Phone,
    Email,
    Url,
    Statute,
    Court,
    CaseNumber,
    Org,
    Person,
    Gpe,
}

impl IndividualType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndividualType::Citation => "citation",
            IndividualType::Date => "date",
            IndividualType::Money => "money",
            IndividualType::Percent => "percent",
            IndividualType::Duration => "duration",
            IndividualType::Address => "address",
            IndividualType::Phone => "phone",
            IndividualType::Email => "email",
            IndividualType::Url => "url",
            IndividualType::Statute => "statute",
            IndividualType::Court => "court",
            IndividualType::CaseNumber => "case_number",
            IndividualType::Org => "org",
            IndividualType::Person => "person",
            IndividualType::Gpe => "gpe",
        }
    }
}

/// An OWL-style named instance (citation, party, date, amount, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Individual {
    pub id: AnnotationId,
    pub span: Span,
    pub surface_text: String,
    #[serde(rename = "type")]
    pub individual_type: IndividualType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_form: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_url: Option<String>,
    /// Set by the individual linker when a nearby concept annotation claims
    /// this individual.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_concept_iri: Option<ConceptIri>,
    pub confidence: f64,
    pub sources: Vec<MatchSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lineage: Vec<LineageEvent>,
}

// ============================================================================
// Object properties
// ============================================================================

/// An occurrence of an OWL object property (legal verb or relation) in text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyAnnotation {
    pub id: AnnotationId,
    pub span: Span,
    pub surface_text: String,
    pub property_iri: ConceptIri,
    pub preferred_label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_classes: Vec<ConceptIri>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub range_classes: Vec<ConceptIri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inverse_iri: Option<ConceptIri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_subject_iri: Option<ConceptIri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_object_iri: Option<ConceptIri>,
    pub confidence: f64,
    pub sources: Vec<MatchSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lineage: Vec<LineageEvent>,
}

// ============================================================================
// Triples
// ============================================================================

/// Predicate of an extracted triple: a known object property when the verb
/// resolves to one, otherwise the bare lemma.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriplePredicate {
    Verb { lemma: String },
    Property { iri: ConceptIri },
}

/// Subject-predicate-object triple derived from syntactic structure.
/// Subject and object reference concept annotations by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Triple {
    pub subject: AnnotationId,
    pub predicate: TriplePredicate,
    pub object: AnnotationId,
    pub evidence: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_containment() {
        let outer = Span::new(10, 28);
        let inner = Span::new(21, 28);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&outer));
    }

    #[test]
    fn test_span_partial_overlap() {
        let a = Span::new(0, 10);
        let b = Span::new(5, 15);
        assert!(a.partially_overlaps(&b));
        let c = Span::new(2, 8);
        assert!(!a.partially_overlaps(&c)); // contained, not partial
        let d = Span::new(10, 20);
        assert!(!a.partially_overlaps(&d)); // adjacent, no shared position
    }

    #[test]
    fn test_match_source_serialization() {
        assert_eq!(
            serde_json::to_string(&MatchSource::StringMatch).unwrap(),
            "\"string_match\""
        );
        let parsed: MatchSource = serde_json::from_str("\"ruler\"").unwrap();
        assert_eq!(parsed, MatchSource::Ruler);
    }

    #[test]
    fn test_backup_dedup_by_iri() {
        let mut m = sample_match();
        m.push_backup(RankedCandidate {
            iri: ConceptIri::from("folio:B"),
            label: "B".into(),
            score: 0.4,
        });
        m.push_backup(RankedCandidate {
            iri: ConceptIri::from("folio:B"),
            label: "B".into(),
            score: 0.6,
        });
        m.push_backup(RankedCandidate {
            iri: ConceptIri::from("folio:C"),
            label: "C".into(),
            score: 0.5,
        });
        assert_eq!(m.backup_candidates.len(), 2);
        assert_eq!(m.backup_candidates[0].iri.as_str(), "folio:B");
        assert!((m.backup_candidates[0].score - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_backup_never_holds_active_iri() {
        let mut m = sample_match();
        m.push_backup(RankedCandidate {
            iri: m.concept_iri.clone(),
            label: "self".into(),
            score: 0.9,
        });
        assert!(m.backup_candidates.is_empty());
    }

    #[test]
    fn test_sources_stay_sorted() {
        let mut m = sample_match();
        m.add_source(MatchSource::StringMatch);
        m.add_source(MatchSource::Llm);
        let mut sorted = m.sources.clone();
        sorted.sort();
        assert_eq!(m.sources, sorted);
        assert_eq!(m.sources.len(), 3);
    }

    #[test]
    fn test_concept_match_json_roundtrip() {
        let m = sample_match();
        let json = serde_json::to_string(&m).unwrap();
        let parsed: ConceptMatch = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn test_triple_predicate_tagging() {
        let p = TriplePredicate::Verb {
            lemma: "deny".into(),
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"kind\":\"verb\""));
        assert!(json.contains("\"lemma\":\"deny\""));
    }

    fn sample_match() -> ConceptMatch {
        ConceptMatch {
            id: AnnotationId::new(1),
            span: Span::new(10, 28),
            surface_text: "breach of contract".into(),
            concept_iri: ConceptIri::from("folio:A"),
            preferred_label: "Breach of Contract".into(),
            branches: BTreeSet::from(["Event".to_string()]),
            backup_branches: BTreeSet::new(),
            match_type: MatchType::PreferredLabel,
            confidence: 0.9,
            backup_candidates: Vec::new(),
            sources: vec![MatchSource::Ruler],
            state: AnnotationState::Preliminary,
            lineage: Vec::new(),
        }
    }
}
