//! Prompt assembly.
//!
//! Prompts are data: versioned templates with injected lists (branch names,
//! candidate labels). The JSON schema version for the structured response is
//! carried next to the template version so the two evolve together.

use std::collections::BTreeMap;

/// A versioned prompt template with `{placeholder}` substitution.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub version: u32,
    pub template: &'static str,
}

impl PromptTemplate {
    pub const fn new(name: &'static str, version: u32, template: &'static str) -> Self {
        Self {
            name,
            version,
            template,
        }
    }

    /// Substitute `{key}` occurrences. Unknown placeholders are left intact
    /// so a missing binding is visible in the outgoing prompt rather than
    /// silently blank.
    pub fn render(&self, bindings: &BTreeMap<&str, String>) -> String {
        let mut out = self.template.to_string();
        for (key, value) in bindings {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        out
    }
}

/// Per-chunk concept extraction.
pub const CONCEPT_PROPOSER: PromptTemplate = PromptTemplate::new(
    "concept_proposer",
    2,
    "You are annotating a legal document against the FOLIO ontology.\n\
     Extract every legal concept mentioned in the passage below.\n\
     For each concept return the exact contiguous text as it appears\n\
     (verbatim, no paraphrase), the most likely ontology branch from this\n\
     list: {branches}\n\
     and your confidence between 0 and 1.\n\
     Respond as JSON: {\"concepts\": [{\"concept_text\": str, \"branch_hint\": str, \"confidence\": num}]}\n\
     \n\
     Passage:\n{chunk}",
);

/// Single-shot document-type classification from the document opening.
pub const DOC_TYPE_CLASSIFIER: PromptTemplate = PromptTemplate::new(
    "doc_type_classifier",
    1,
    "Classify the type of this legal document from its opening.\n\
     Choose the most specific type (e.g. complaint, motion to dismiss,\n\
     contract, lease, opinion, brief, statute, regulation).\n\
     Respond as JSON: {\"document_type\": str, \"confidence\": num}\n\
     \n\
     Opening:\n{opening}",
);

/// Contextual rerank of one annotation against a four-anchor rubric.
pub const RERANK: PromptTemplate = PromptTemplate::new(
    "rerank",
    2,
    "Score how well the concept \"{label}\" fits the highlighted mention.\n\
     Rubric: 0.95 unambiguous, 0.70 plausible, 0.40 weak, 0.20 likely false positive.\n\
     Respond as JSON: {\"score\": num}\n\
     \n\
     Mention: \"{surface}\"\n\
     Context:\n{context}",
);

/// Branch disambiguation for multi-branch concepts.
pub const BRANCH_JUDGE: PromptTemplate = PromptTemplate::new(
    "branch_judge",
    1,
    "The mention \"{surface}\" resolved to a concept that belongs to more\n\
     than one ontology branch: {candidates}.\n\
     From the sentence below, pick the branch this mention belongs to and\n\
     give a confidence between 0 and 1.\n\
     Respond as JSON: {\"branch\": str, \"score\": num}\n\
     \n\
     Sentence:\n{sentence}",
);

/// Validate or override the nearest-neighbor link for a property/individual.
pub const LINKER: PromptTemplate = PromptTemplate::new(
    "linker",
    1,
    "In the sentence below, the relation \"{surface}\" should connect a\n\
     subject and object concept. Candidates: {candidates}.\n\
     Respond as JSON: {\"subject_iri\": str|null, \"object_iri\": str|null, \"confidence\": num}\n\
     \n\
     Sentence:\n{sentence}",
);

/// Full-context metadata synthesis.
pub const METADATA: PromptTemplate = PromptTemplate::new(
    "metadata",
    3,
    "Produce the document metadata record for this legal document.\n\
     Use the pipeline context below: resolved concepts, extracted\n\
     individuals grouped by type, relations, and the document-type\n\
     hypothesis. Fill only fields the evidence supports.\n\
     Respond as a JSON object with these fields: {fields}\n\
     \n\
     Document type hypothesis: {doc_type}\n\
     Concepts:\n{concepts}\n\
     Individuals:\n{individuals}\n\
     Relations:\n{relations}\n\
     \n\
     Document opening:\n{opening}",
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all_bindings() {
        let bindings = BTreeMap::from([
            ("surface", "Interest".to_string()),
            ("label", "Financial Interest".to_string()),
            ("context", "the accrued Interest on the loan".to_string()),
        ]);
        let prompt = RERANK.render(&bindings);
        assert!(prompt.contains("\"Interest\""));
        assert!(prompt.contains("Financial Interest"));
        assert!(!prompt.contains("{surface}"));
    }

    #[test]
    fn test_unknown_placeholder_left_visible() {
        let prompt = RERANK.render(&BTreeMap::new());
        assert!(prompt.contains("{label}"));
    }

    #[test]
    fn test_templates_are_versioned() {
        assert_eq!(CONCEPT_PROPOSER.version, 2);
        assert_eq!(RERANK.name, "rerank");
    }
}
