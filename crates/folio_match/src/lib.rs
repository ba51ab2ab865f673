//! Deterministic matching: the ruler, the property matcher, the
//! string-match expander, containment-aware overlap resolution, and the
//! rule-based individual extractors.
//!
//! All scanning is automaton-based (one pass over the folded text, O(n + z)
//! in text length plus match count). The automata are built once per
//! process from the ontology label set and shared read-only.

pub mod boundary;
pub mod catalog;
pub mod expander;
pub mod individuals;
pub mod overlap;
pub mod properties;
pub mod ruler;

pub use catalog::{LabelAutomaton, LabelEntry, LabelStratum, RawHit};
pub use expander::{ExpandedHit, StringMatchExpander};
pub use individuals::IndividualExtractor;
pub use overlap::resolve_overlaps;
pub use properties::PropertyMatcher;
pub use ruler::Ruler;
