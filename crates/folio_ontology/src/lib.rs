//! Ontology accessor for FOLIO classes and object properties.
//!
//! The ontology is a DAG with multiple-inheritance concepts. Everything is
//! keyed by IRI; object identity is never used across stage boundaries.
//! The accessor is a process-wide read-only singleton constructed at
//! startup; no stage mutates it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use thiserror::Error;

use folio_protocol::ConceptIri;

#[derive(Debug, Error)]
pub enum OntologyError {
    #[error("unknown IRI: {0}")]
    UnknownIri(String),
}

/// One ontology class record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OntologyClass {
    pub iri: ConceptIri,
    pub preferred_label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_labels: Vec<String>,
    /// High-level categories (Actor, Document, Event, ...).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub branches: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_iris: Vec<ConceptIri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// One OWL object property record (legal verbs and relations).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectProperty {
    pub iri: ConceptIri,
    pub preferred_label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_iris: Vec<ConceptIri>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub range_iris: Vec<ConceptIri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inverse_iri: Option<ConceptIri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

/// Narrow contract the core consumes. Implementations must be cheap to call
/// concurrently; lookups are hot inside Phase 2 and Phase 3.
pub trait OntologyAccessor: Send + Sync {
    fn iterate_classes(&self) -> Box<dyn Iterator<Item = &OntologyClass> + '_>;
    fn iterate_object_properties(&self) -> Box<dyn Iterator<Item = &ObjectProperty> + '_>;
    fn get_class(&self, iri: &ConceptIri) -> Result<&OntologyClass, OntologyError>;
    fn get_object_property(&self, iri: &ConceptIri) -> Result<&ObjectProperty, OntologyError>;
    fn branches_for(&self, iri: &ConceptIri) -> BTreeSet<String>;
    fn is_descendant(&self, iri: &ConceptIri, ancestor_iri: &ConceptIri) -> bool;
}

/// HashMap-backed ontology with a memoized descendant check.
pub struct InMemoryOntology {
    classes: HashMap<ConceptIri, OntologyClass>,
    /// Insertion order of class IRIs, for deterministic iteration.
    class_order: Vec<ConceptIri>,
    properties: HashMap<ConceptIri, ObjectProperty>,
    property_order: Vec<ConceptIri>,
    descendant_memo: RwLock<HashMap<(ConceptIri, ConceptIri), bool>>,
}

impl InMemoryOntology {
    pub fn new(
        classes: impl IntoIterator<Item = OntologyClass>,
        properties: impl IntoIterator<Item = ObjectProperty>,
    ) -> Self {
        let mut class_map = HashMap::new();
        let mut class_order = Vec::new();
        for class in classes {
            class_order.push(class.iri.clone());
            class_map.insert(class.iri.clone(), class);
        }
        let mut property_map = HashMap::new();
        let mut property_order = Vec::new();
        for property in properties {
            property_order.push(property.iri.clone());
            property_map.insert(property.iri.clone(), property);
        }
        Self {
            classes: class_map,
            class_order,
            properties: property_map,
            property_order,
            descendant_memo: RwLock::new(HashMap::new()),
        }
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// BFS up the parent links. Cycles in malformed input terminate because
    /// visited IRIs are never re-queued.
    fn search_ancestors(&self, iri: &ConceptIri, ancestor_iri: &ConceptIri) -> bool {
        let mut visited: HashSet<&ConceptIri> = HashSet::new();
        let mut queue: VecDeque<&ConceptIri> = VecDeque::new();
        queue.push_back(iri);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(class) = self.classes.get(current) {
                for parent in &class.parent_iris {
                    if parent == ancestor_iri {
                        return true;
                    }
                    queue.push_back(parent);
                }
            }
        }
        false
    }
}

impl OntologyAccessor for InMemoryOntology {
    fn iterate_classes(&self) -> Box<dyn Iterator<Item = &OntologyClass> + '_> {
        Box::new(
            self.class_order
                .iter()
                .filter_map(move |iri| self.classes.get(iri)),
        )
    }

    fn iterate_object_properties(&self) -> Box<dyn Iterator<Item = &ObjectProperty> + '_> {
        Box::new(
            self.property_order
                .iter()
                .filter_map(move |iri| self.properties.get(iri)),
        )
    }

    fn get_class(&self, iri: &ConceptIri) -> Result<&OntologyClass, OntologyError> {
        self.classes
            .get(iri)
            .ok_or_else(|| OntologyError::UnknownIri(iri.to_string()))
    }

    fn get_object_property(&self, iri: &ConceptIri) -> Result<&ObjectProperty, OntologyError> {
        self.properties
            .get(iri)
            .ok_or_else(|| OntologyError::UnknownIri(iri.to_string()))
    }

    fn branches_for(&self, iri: &ConceptIri) -> BTreeSet<String> {
        self.classes
            .get(iri)
            .map(|c| c.branches.clone())
            .unwrap_or_default()
    }

    fn is_descendant(&self, iri: &ConceptIri, ancestor_iri: &ConceptIri) -> bool {
        if iri == ancestor_iri {
            return true;
        }
        let key = (iri.clone(), ancestor_iri.clone());
        if let Some(&cached) = self
            .descendant_memo
            .read()
            .expect("descendant memo poisoned")
            .get(&key)
        {
            return cached;
        }
        let result = self.search_ancestors(iri, ancestor_iri);
        self.descendant_memo
            .write()
            .expect("descendant memo poisoned")
            .insert(key, result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(iri: &str, label: &str, parents: &[&str], branches: &[&str]) -> OntologyClass {
        OntologyClass {
            iri: ConceptIri::from(iri),
            preferred_label: label.to_string(),
            alt_labels: Vec::new(),
            branches: branches.iter().map(|s| s.to_string()).collect(),
            parent_iris: parents.iter().map(|s| ConceptIri::from(*s)).collect(),
            definition: None,
        }
    }

    fn diamond() -> InMemoryOntology {
        // A diamond: bottom -> {left, right} -> top, exercising multiple
        // inheritance.
        InMemoryOntology::new(
            vec![
                class("folio:top", "Top", &[], &["Event"]),
                class("folio:left", "Left", &["folio:top"], &["Event"]),
                class("folio:right", "Right", &["folio:top"], &["Document"]),
                class("folio:bottom", "Bottom", &["folio:left", "folio:right"], &["Event"]),
            ],
            vec![],
        )
    }

    #[test]
    fn test_descendant_through_diamond() {
        let onto = diamond();
        let bottom = ConceptIri::from("folio:bottom");
        let top = ConceptIri::from("folio:top");
        assert!(onto.is_descendant(&bottom, &top));
        assert!(onto.is_descendant(&bottom, &ConceptIri::from("folio:right")));
        assert!(!onto.is_descendant(&top, &bottom));
        // memoized second call
        assert!(onto.is_descendant(&bottom, &top));
    }

    #[test]
    fn test_self_is_descendant() {
        let onto = diamond();
        let top = ConceptIri::from("folio:top");
        assert!(onto.is_descendant(&top, &top));
    }

    #[test]
    fn test_unknown_iri_errors() {
        let onto = diamond();
        let missing = ConceptIri::from("folio:missing");
        assert!(matches!(
            onto.get_class(&missing),
            Err(OntologyError::UnknownIri(_))
        ));
        assert!(onto.branches_for(&missing).is_empty());
    }

    #[test]
    fn test_iteration_order_is_insertion_order() {
        let onto = diamond();
        let labels: Vec<&str> = onto
            .iterate_classes()
            .map(|c| c.preferred_label.as_str())
            .collect();
        assert_eq!(labels, vec!["Top", "Left", "Right", "Bottom"]);
    }

    #[test]
    fn test_cycle_terminates() {
        let onto = InMemoryOntology::new(
            vec![
                class("folio:a", "A", &["folio:b"], &[]),
                class("folio:b", "B", &["folio:a"], &[]),
            ],
            vec![],
        );
        assert!(!onto.is_descendant(&ConceptIri::from("folio:a"), &ConceptIri::from("folio:x")));
        assert!(onto.is_descendant(&ConceptIri::from("folio:a"), &ConceptIri::from("folio:b")));
    }
}
