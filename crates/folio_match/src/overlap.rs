//! Containment-aware overlap resolution.
//!
//! The policy, applied within every run of transitively-overlapping matches:
//! - a match fully contained in another survives (nested concepts are kept);
//! - of two partially-overlapping matches (neither contains the other) only
//!   the longer survives; equal lengths keep the earlier start;
//! - identical spans keep every distinct IRI;
//! - identical `(span, iri)` pairs collapse to one.

use folio_protocol::{ConceptIri, Span};

/// Implemented by anything the overlap policy can arbitrate.
pub trait Spanned {
    fn span(&self) -> Span;
    fn iri(&self) -> &ConceptIri;
}

impl Spanned for crate::catalog::RawHit {
    fn span(&self) -> Span {
        self.span
    }
    fn iri(&self) -> &ConceptIri {
        &self.entry.iri
    }
}

/// Apply the containment-aware policy to a batch of matches. Output order is
/// `(start, end, iri)`.
pub fn resolve_overlaps<T: Spanned>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by(|a, b| {
        (a.span().start, a.span().end, a.iri().as_str())
            .cmp(&(b.span().start, b.span().end, b.iri().as_str()))
    });
    items.dedup_by(|a, b| a.span() == b.span() && a.iri() == b.iri());

    let mut out: Vec<T> = Vec::with_capacity(items.len());
    let mut group: Vec<T> = Vec::new();
    let mut group_end = 0usize;
    for item in items {
        if group.is_empty() || item.span().start < group_end {
            group_end = group_end.max(item.span().end);
            group.push(item);
        } else {
            resolve_group(&mut group, &mut out);
            group_end = item.span().end;
            group.push(item);
        }
    }
    resolve_group(&mut group, &mut out);

    out.sort_by(|a, b| {
        (a.span().start, a.span().end, a.iri().as_str())
            .cmp(&(b.span().start, b.span().end, b.iri().as_str()))
    });
    out
}

/// Resolve one transitive-overlap run: greedily admit candidates longest
/// first (earlier start breaks length ties), dropping any candidate that
/// partially overlaps an already-admitted match. Containment and identical
/// spans never block admission.
fn resolve_group<T: Spanned>(group: &mut Vec<T>, out: &mut Vec<T>) {
    if group.len() <= 1 {
        out.append(group);
        return;
    }
    let mut candidates: Vec<T> = std::mem::take(group);
    candidates.sort_by(|a, b| {
        b.span()
            .len()
            .cmp(&a.span().len())
            .then_with(|| a.span().start.cmp(&b.span().start))
            .then_with(|| a.iri().as_str().cmp(b.iri().as_str()))
    });

    let mut kept: Vec<T> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let blocked = kept
            .iter()
            .any(|k| k.span().partially_overlaps(&candidate.span()));
        if !blocked {
            kept.push(candidate);
        }
    }
    out.append(&mut kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Hit {
        span: Span,
        iri: ConceptIri,
    }

    impl Hit {
        fn new(start: usize, end: usize, iri: &str) -> Self {
            Self {
                span: Span::new(start, end),
                iri: ConceptIri::from(iri),
            }
        }
    }

    impl Spanned for Hit {
        fn span(&self) -> Span {
            self.span
        }
        fn iri(&self) -> &ConceptIri {
            &self.iri
        }
    }

    #[test]
    fn test_contained_match_survives() {
        let out = resolve_overlaps(vec![Hit::new(10, 28, "folio:boc"), Hit::new(20, 28, "folio:c")]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_partial_overlap_keeps_longer() {
        let out = resolve_overlaps(vec![Hit::new(0, 10, "folio:long"), Hit::new(5, 12, "folio:short")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].iri.as_str(), "folio:long");
        assert_eq!(out[0].span, Span::new(0, 10));
    }

    #[test]
    fn test_partial_overlap_equal_length_keeps_earlier() {
        let out = resolve_overlaps(vec![Hit::new(5, 10, "folio:b"), Hit::new(0, 5, "folio:a")]);
        // Adjacent spans do not overlap; both kept.
        assert_eq!(out.len(), 2);

        let out = resolve_overlaps(vec![Hit::new(4, 9, "folio:b"), Hit::new(0, 5, "folio:a")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].span, Span::new(0, 5));
    }

    #[test]
    fn test_identical_span_keeps_all_iris() {
        let out = resolve_overlaps(vec![
            Hit::new(3, 11, "folio:interest_fin"),
            Hit::new(3, 11, "folio:interest_cur"),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_identical_span_and_iri_collapses() {
        let out = resolve_overlaps(vec![Hit::new(3, 11, "folio:x"), Hit::new(3, 11, "folio:x")]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_disjoint_groups_resolve_independently() {
        let out = resolve_overlaps(vec![
            Hit::new(0, 8, "folio:a"),
            Hit::new(4, 12, "folio:b"),
            Hit::new(50, 58, "folio:c"),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].span, Span::new(0, 8));
        assert_eq!(out[1].span, Span::new(50, 58));
    }

    #[test]
    fn test_nested_chain_all_survive() {
        let out = resolve_overlaps(vec![
            Hit::new(0, 30, "folio:outer"),
            Hit::new(5, 20, "folio:mid"),
            Hit::new(10, 15, "folio:inner"),
        ]);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_output_ordered_by_start_end_iri() {
        let out = resolve_overlaps(vec![
            Hit::new(50, 58, "folio:z"),
            Hit::new(0, 30, "folio:outer"),
            Hit::new(10, 15, "folio:inner"),
        ]);
        let spans: Vec<usize> = out.iter().map(|h| h.span.start).collect();
        assert_eq!(spans, vec![0, 10, 50]);
    }
}
