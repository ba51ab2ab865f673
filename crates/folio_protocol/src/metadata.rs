//! Document-level metadata record produced by the metadata synthesizer.

use serde::{Deserialize, Serialize};

/// One party to the matter, with the role the pipeline inferred for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartyRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// A dated event pulled from the document (filing, hearing, execution, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyDate {
    /// ISO-8601 where normalization succeeded, else the surface form.
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Area-of-law ranking entry derived from resolved concept branches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AreaOfLawScore {
    pub area: String,
    pub score: f64,
}

/// The 28-field document metadata record.
///
/// Every field is optional or defaultable: the offline fallback fills what it
/// can from individuals and concept branches and leaves the rest empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docket_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filing_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_dates: Vec<KeyDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parties: Vec<PartyRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plaintiffs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defendants: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attorneys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes_of_action: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relief_sought: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub monetary_amounts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cited_authorities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statutes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub governing_law: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub areas_of_law: Vec<AreaOfLawScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_area_of_law: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedural_posture: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_serializes_to_empty_object() {
        let meta = DocumentMetadata::default();
        assert_eq!(serde_json::to_string(&meta).unwrap(), "{}");
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = DocumentMetadata {
            document_type: Some("Motion to Dismiss".into()),
            parties: vec![PartyRecord {
                name: "Acme Corp.".into(),
                role: Some("defendant".into()),
            }],
            areas_of_law: vec![AreaOfLawScore {
                area: "Civil Procedure".into(),
                score: 0.61,
            }],
            ..Default::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        let parsed: DocumentMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, meta);
    }
}
