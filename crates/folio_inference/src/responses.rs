//! Typed structured-response shapes, one per prompt template.
//!
//! Deserialization of these types is the schema validation step: a response
//! that fails to parse counts as a schema violation and is retried once.

use serde::{Deserialize, Serialize};

use folio_protocol::DocumentMetadata;

/// One tuple from the concept proposer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedConcept {
    /// Verbatim contiguous text from the chunk; tuples whose text is not a
    /// substring of the chunk are discarded by the stage.
    pub concept_text: String,
    #[serde(default)]
    pub branch_hint: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProposerResponse {
    #[serde(default)]
    pub concepts: Vec<ProposedConcept>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocTypeResponse {
    pub document_type: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankResponse {
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchJudgeResponse {
    pub branch: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LinkerResponse {
    #[serde(default)]
    pub subject_iri: Option<String>,
    #[serde(default)]
    pub object_iri: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// The metadata synthesizer returns the record shape directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetadataResponse {
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposer_response_tolerates_missing_hint() {
        let json = r#"{"concepts": [{"concept_text": "breach of contract", "confidence": 0.8}]}"#;
        let parsed: ProposerResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.concepts.len(), 1);
        assert_eq!(parsed.concepts[0].branch_hint, None);
    }

    #[test]
    fn test_proposer_response_rejects_wrong_shape() {
        let json = r#"{"concepts": [{"confidence": 0.8}]}"#;
        assert!(serde_json::from_str::<ProposerResponse>(json).is_err());
    }

    #[test]
    fn test_metadata_response_flattens() {
        let json = r#"{"document_type": "complaint", "plaintiffs": ["Acme Corp."]}"#;
        let parsed: MetadataResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.metadata.document_type.as_deref(), Some("complaint"));
        assert_eq!(parsed.metadata.plaintiffs, vec!["Acme Corp."]);
    }
}
