//! Rule-based individual extraction: citations, dates, amounts, contact
//! details, courts, parties. Runs in Phase 2 without a language model.

use regex::Regex;
use thiserror::Error;

use folio_protocol::{IndividualType, Span};
use folio_text::{fold_key, Document};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid extraction pattern for {kind:?}: {message}")]
    Pattern {
        kind: IndividualType,
        message: String,
    },
}

/// One extracted individual, before id assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedIndividual {
    pub span: Span,
    pub surface_text: String,
    pub individual_type: IndividualType,
    pub normalized_form: Option<String>,
    pub resolved_url: Option<String>,
    pub confidence: f64,
}

struct Rule {
    kind: IndividualType,
    regex: Regex,
    confidence: f64,
    normalizer: Option<fn(&str) -> Option<String>>,
}

/// Compiled extraction rules. Process-wide read-only singleton.
pub struct IndividualExtractor {
    rules: Vec<Rule>,
    versus: Regex,
    org_suffix: Regex,
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

impl IndividualExtractor {
    pub fn new() -> Result<Self, ExtractError> {
        let mut rules = Vec::new();
        let mut add = |kind: IndividualType,
                       pattern: &str,
                       confidence: f64,
                       normalizer: Option<fn(&str) -> Option<String>>|
         -> Result<(), ExtractError> {
            let regex = Regex::new(pattern).map_err(|e| ExtractError::Pattern {
                kind,
                message: e.to_string(),
            })?;
            rules.push(Rule {
                kind,
                regex,
                confidence,
                normalizer,
            });
            Ok(())
        };

        // Reporter citations: "123 F.3d 456 (9th Cir. 1999)".
        add(
            IndividualType::Citation,
            r"\b\d{1,4}\s+(?:U\.S\.|S\.\s?Ct\.|F\.\s?(?:2d|3d|4th)|F\.\s?Supp\.(?:\s?[23]d)?|Cal\.\s?(?:App\.\s?)?(?:[2345]th|[23]d)?|N\.[EYW]\.(?:[23]d)?|S\.[EW]\.(?:[23]d)?|P\.(?:[23]d)?|A\.(?:[23]d)?|So\.\s?(?:[23]d)?)\s*\d{1,5}(?:\s*\([^()]{1,60}?\d{4}\))?",
            0.95,
            Some(normalize_citation),
        )?;
        // Statutes: "28 U.S.C. § 1331", "Cal. Civ. Code § 1942".
        add(
            IndividualType::Statute,
            r"\b\d{1,3}\s+U\.S\.C\.(?:A\.)?\s*§{1,2}\s*\d+[A-Za-z0-9().\-]*|\b[A-Z][a-z]+\.\s+(?:[A-Z][a-z]+\.\s+)?Code\s*(?:Ann\.\s*)?§{1,2}\s*[\d.\-]+",
            0.93,
            None,
        )?;
        // Dates, three shapes; all normalize to ISO-8601 where parseable.
        add(
            IndividualType::Date,
            r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2},\s+\d{4}\b",
            0.90,
            Some(normalize_date),
        )?;
        add(
            IndividualType::Date,
            r"\b\d{1,2}/\d{1,2}/\d{4}\b",
            0.85,
            Some(normalize_date),
        )?;
        add(
            IndividualType::Date,
            r"\b\d{4}-\d{2}-\d{2}\b",
            0.90,
            Some(normalize_date),
        )?;
        // Money: "$1,234.56", "$2 million", "500 dollars".
        add(
            IndividualType::Money,
            r"\$\s?\d[\d,]*(?:\.\d{1,2})?(?:\s?(?i:million|billion|thousand))?|(?i)\b\d[\d,]*(?:\.\d+)?\s+dollars\b",
            0.92,
            Some(normalize_money),
        )?;
        add(
            IndividualType::Percent,
            r"\b\d{1,3}(?:\.\d+)?\s?(?:%|(?i:percent))",
            0.92,
            None,
        )?;
        add(
            IndividualType::Duration,
            r"(?i)\b(?:\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|twenty|thirty|sixty|ninety)[- ](?:day|week|month|year)s?\b",
            0.80,
            None,
        )?;
        add(
            IndividualType::Phone,
            r"\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
            0.95,
            None,
        )?;
        add(
            IndividualType::Email,
            r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b",
            0.98,
            None,
        )?;
        add(
            IndividualType::Url,
            r#"\bhttps?://[^\s<>"')\]]+"#,
            0.98,
            None,
        )?;
        add(
            IndividualType::Address,
            r"\b\d{1,5}\s+[A-Z][A-Za-z]*(?:\s+[A-Z][A-Za-z]*){0,3}\s+(?:Street|St\.|Avenue|Ave\.|Boulevard|Blvd\.|Road|Rd\.|Drive|Dr\.|Lane|Ln\.|Way|Place|Pl\.)(?:,?\s+(?:Suite|Ste\.|Apt\.?|Unit)\s+\w+)?",
            0.75,
            None,
        )?;
        add(
            IndividualType::Court,
            r"\b(?:Supreme Court(?: of (?:the United States|[A-Z][a-z]+(?: [A-Z][a-z]+)?))?|(?:United States )?(?:District|Bankruptcy) Court(?: for the [A-Z][a-z]+(?: [A-Z][a-z]+){0,3})?|(?:United States )?Court of Appeals(?: for the [A-Z][a-z]+ Circuit)?|Superior Court(?: of [A-Z][a-z]+(?: [A-Z][a-z]+)?)?|Circuit Court)\b",
            0.85,
            None,
        )?;
        add(
            IndividualType::CaseNumber,
            r"(?:Case\s+)?No\.\s*\d{1,2}:\d{2}-(?:cv|cr|mc|md|bk)-\d{3,6}(?:-[A-Z]{2,4})?\b|(?:Case\s+)?No\.\s*\d{2,4}-\d{2,6}\b",
            0.92,
            None,
        )?;
        // Organizations by corporate suffix.
        add(
            IndividualType::Org,
            r"\b(?:[A-Z][A-Za-z&'.\-]+\s+){0,4}[A-Z][A-Za-z&'.\-]+,?\s+(?:Inc|Corp|Co|LLC|LLP|Ltd|L\.P|N\.A)\.?(?:\b|$)",
            0.70,
            None,
        )?;
        // Persons gated on an honorific or judicial title.
        add(
            IndividualType::Person,
            r"\b(?:Mr|Mrs|Ms|Dr|Hon|Judge|Justice|Chief Justice)\.?\s+[A-Z][a-z]+(?:\s+[A-Z]\.)?(?:\s+[A-Z][a-z]+)+",
            0.65,
            None,
        )?;
        // Geopolitical entities: explicit government formulas plus US states.
        add(
            IndividualType::Gpe,
            r"\b(?:United States of America|United States|(?:State|County|City|Commonwealth) of [A-Z][a-z]+(?: [A-Z][a-z]+)?|Alabama|Alaska|Arizona|Arkansas|California|Colorado|Connecticut|Delaware|Florida|Georgia|Hawaii|Idaho|Illinois|Indiana|Iowa|Kansas|Kentucky|Louisiana|Maine|Maryland|Massachusetts|Michigan|Minnesota|Mississippi|Missouri|Montana|Nebraska|Nevada|New Hampshire|New Jersey|New Mexico|New York|North Carolina|North Dakota|Ohio|Oklahoma|Oregon|Pennsylvania|Rhode Island|South Carolina|South Dakota|Tennessee|Texas|Utah|Vermont|Virginia|Washington|West Virginia|Wisconsin|Wyoming)\b",
            0.70,
            None,
        )?;

        let versus = Regex::new(
            r"\b([A-Z][A-Za-z'.\-]+(?:\s+[A-Z][A-Za-z'.\-]+){0,3})\s+v\.\s+([A-Z][A-Za-z'.\-]+(?:\s+[A-Z][A-Za-z'.\-]+){0,3})",
        )
        .map_err(|e| ExtractError::Pattern {
            kind: IndividualType::Person,
            message: e.to_string(),
        })?;
        let org_suffix = Regex::new(r"(?:Inc|Corp|Co|LLC|LLP|Ltd|L\.P|N\.A)\.?$").map_err(|e| {
            ExtractError::Pattern {
                kind: IndividualType::Org,
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            rules,
            versus,
            org_suffix,
        })
    }

    /// Run every rule over the document and deduplicate by
    /// `(type, normalized surface, span)`, keeping the highest confidence.
    pub fn extract(&self, document: &Document) -> Vec<ExtractedIndividual> {
        let text = document.text();
        let mut found: Vec<ExtractedIndividual> = Vec::new();

        for rule in &self.rules {
            for m in rule.regex.find_iter(text) {
                let span = document.byte_range_to_span(m.start(), m.end());
                let surface = m.as_str().to_string();
                let normalized_form = rule.normalizer.and_then(|f| f(&surface));
                let resolved_url = (rule.kind == IndividualType::Citation)
                    .then(|| citation_url(normalized_form.as_deref().unwrap_or(&surface)));
                found.push(ExtractedIndividual {
                    span,
                    surface_text: surface,
                    individual_type: rule.kind,
                    normalized_form,
                    resolved_url,
                    confidence: rule.confidence,
                });
            }
        }

        // Caption parties: "Smith v. Jones" yields one individual per side,
        // typed org when a corporate suffix is present.
        for caps in self.versus.captures_iter(text) {
            for idx in [1, 2] {
                if let Some(side) = caps.get(idx) {
                    let surface = side.as_str().trim_end_matches(',').to_string();
                    let kind = if self.org_suffix.is_match(&surface) {
                        IndividualType::Org
                    } else {
                        IndividualType::Person
                    };
                    found.push(ExtractedIndividual {
                        span: document.byte_range_to_span(side.start(), side.end()),
                        surface_text: surface,
                        individual_type: kind,
                        normalized_form: None,
                        resolved_url: None,
                        confidence: 0.75,
                    });
                }
            }
        }

        dedup(found)
    }
}

/// Group by `(type, normalized surface, span)`; highest confidence wins.
fn dedup(mut items: Vec<ExtractedIndividual>) -> Vec<ExtractedIndividual> {
    items.sort_by(|a, b| {
        (
            a.span.start,
            a.span.end,
            a.individual_type,
            std::cmp::Reverse((a.confidence * 1e9) as u64),
        )
            .cmp(&(
                b.span.start,
                b.span.end,
                b.individual_type,
                std::cmp::Reverse((b.confidence * 1e9) as u64),
            ))
    });
    items.dedup_by(|a, b| {
        a.individual_type == b.individual_type
            && a.span == b.span
            && fold_key(&a.surface_text) == fold_key(&b.surface_text)
    });
    items
}

/// Canonical short form: strip the parenthetical, collapse whitespace.
fn normalize_citation(surface: &str) -> Option<String> {
    let head = surface.split('(').next().unwrap_or(surface);
    let collapsed = head.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn citation_url(normalized: &str) -> String {
    let q: String = normalized
        .chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .collect();
    format!("https://www.courtlistener.com/?q={q}")
}

/// ISO-8601 where the shape is unambiguous; `mm/dd/yyyy` is read as US.
fn normalize_date(surface: &str) -> Option<String> {
    let s = surface.trim();
    if let Some((y, rest)) = s.split_once('-') {
        if y.len() == 4 {
            let mut parts = rest.split('-');
            let m: u32 = parts.next()?.parse().ok()?;
            let d: u32 = parts.next()?.parse().ok()?;
            return iso(y.parse().ok()?, m, d);
        }
    }
    if s.contains('/') {
        let mut parts = s.split('/');
        let m: u32 = parts.next()?.parse().ok()?;
        let d: u32 = parts.next()?.parse().ok()?;
        let y: i32 = parts.next()?.parse().ok()?;
        return iso(y, m, d);
    }
    let lowered = s.to_lowercase();
    let mut words = lowered.split_whitespace();
    let month_word = words.next()?;
    let month = MONTHS.iter().position(|m| *m == month_word)? as u32 + 1;
    let day: u32 = words.next()?.trim_end_matches(',').parse().ok()?;
    let year: i32 = words.next()?.parse().ok()?;
    iso(year, month, day)
}

fn iso(year: i32, month: u32, day: u32) -> Option<String> {
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

/// Bare numeric amount: "$1,234.56" -> "1234.56".
fn normalize_money(surface: &str) -> Option<String> {
    let lowered = surface.to_lowercase();
    let digits: String = surface
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() {
        return None;
    }
    let scale = if lowered.contains("billion") {
        1e9
    } else if lowered.contains("million") {
        1e6
    } else if lowered.contains("thousand") {
        1e3
    } else {
        1.0
    };
    let value: f64 = digits.parse().ok()?;
    let scaled = value * scale;
    if scaled.fract() == 0.0 {
        Some(format!("{}", scaled as i64))
    } else {
        Some(format!("{scaled}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<ExtractedIndividual> {
        let extractor = IndividualExtractor::new().unwrap();
        let doc = Document::from_text(text, 3000, 200).unwrap();
        extractor.extract(&doc)
    }

    fn of_type(items: &[ExtractedIndividual], kind: IndividualType) -> Vec<ExtractedIndividual> {
        items
            .iter()
            .filter(|i| i.individual_type == kind)
            .cloned()
            .collect()
    }

    #[test]
    fn test_citation_with_normalized_form_and_url() {
        let items = extract("See 123 F.3d 456 (9th Cir. 1999) for the holding.");
        let citations = of_type(&items, IndividualType::Citation);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].normalized_form.as_deref(), Some("123 F.3d 456"));
        assert_eq!(
            citations[0].resolved_url.as_deref(),
            Some("https://www.courtlistener.com/?q=123+F.3d+456")
        );
    }

    #[test]
    fn test_statute_extraction() {
        let items = extract("Jurisdiction rests on 28 U.S.C. § 1331 and Cal. Civ. Code § 1942.");
        let statutes = of_type(&items, IndividualType::Statute);
        assert_eq!(statutes.len(), 2);
    }

    #[test]
    fn test_date_normalization_variants() {
        let items = extract("Filed January 5, 1999, amended 03/17/2001, effective 2002-12-01.");
        let dates = of_type(&items, IndividualType::Date);
        assert_eq!(dates.len(), 3);
        let norms: Vec<&str> = dates
            .iter()
            .filter_map(|d| d.normalized_form.as_deref())
            .collect();
        assert!(norms.contains(&"1999-01-05"));
        assert!(norms.contains(&"2001-03-17"));
        assert!(norms.contains(&"2002-12-01"));
    }

    #[test]
    fn test_money_normalization() {
        let items = extract("Damages of $1,234.56 plus $2 million in fees.");
        let money = of_type(&items, IndividualType::Money);
        assert_eq!(money.len(), 2);
        let norms: Vec<&str> = money
            .iter()
            .filter_map(|m| m.normalized_form.as_deref())
            .collect();
        assert!(norms.contains(&"1234.56"));
        assert!(norms.contains(&"2000000"));
    }

    #[test]
    fn test_contact_details() {
        let items =
            extract("Reach counsel at (415) 555-0100 or counsel@firm.example.com, see https://firm.example.com/brief.");
        assert_eq!(of_type(&items, IndividualType::Phone).len(), 1);
        assert_eq!(of_type(&items, IndividualType::Email).len(), 1);
        assert_eq!(of_type(&items, IndividualType::Url).len(), 1);
    }

    #[test]
    fn test_court_and_case_number() {
        let items = extract(
            "United States District Court for the Northern District, Case No. 3:21-cv-04567-ABC.",
        );
        assert_eq!(of_type(&items, IndividualType::Court).len(), 1);
        assert_eq!(of_type(&items, IndividualType::CaseNumber).len(), 1);
    }

    #[test]
    fn test_caption_parties_typed() {
        let items = extract("Smith v. Acme Widgets Inc. was decided last term.");
        let persons = of_type(&items, IndividualType::Person);
        let orgs = of_type(&items, IndividualType::Org);
        assert!(persons.iter().any(|p| p.surface_text == "Smith"));
        assert!(orgs.iter().any(|o| o.surface_text.starts_with("Acme Widgets")));
    }

    #[test]
    fn test_gpe_and_duration() {
        let items = extract("Under the laws of the State of Delaware, within thirty days.");
        assert!(of_type(&items, IndividualType::Gpe)
            .iter()
            .any(|g| g.surface_text == "State of Delaware"));
        assert_eq!(of_type(&items, IndividualType::Duration).len(), 1);
    }

    #[test]
    fn test_dedup_same_span_same_type() {
        // "January 5, 1999" matches only the month-name rule, but an
        // identical span from two rules must collapse to one individual.
        let items = extract("Signed January 5, 1999.");
        let dates = of_type(&items, IndividualType::Date);
        assert_eq!(dates.len(), 1);
    }

    #[test]
    fn test_output_sorted_by_span() {
        let items = extract("Pay $500 by January 5, 1999 or 10% accrues.");
        let starts: Vec<usize> = items.iter().map(|i| i.span.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
    }
}
