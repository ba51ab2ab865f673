//! Word-boundary validation for automaton hits.

use folio_protocol::BoundaryPolicy;

/// Whether `c` counts as a word character under the policy.
pub fn is_word_char(c: char, policy: BoundaryPolicy) -> bool {
    match policy {
        BoundaryPolicy::HyphenIsWord => c.is_alphanumeric() || c == '-',
        BoundaryPolicy::Alphanumeric => c.is_alphanumeric(),
    }
}

/// A hit is boundary-valid when the characters immediately before and after
/// it are not word characters. Hyphens count as word characters under the
/// default policy, so "claim" inside "cross-claim" is not a valid hit.
pub fn is_boundary_valid(
    before: Option<char>,
    after: Option<char>,
    policy: BoundaryPolicy,
) -> bool {
    let left_ok = before.map_or(true, |c| !is_word_char(c, policy));
    let right_ok = after.map_or(true, |c| !is_word_char(c, policy));
    left_ok && right_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyphen_blocks_boundary_by_default() {
        let policy = BoundaryPolicy::HyphenIsWord;
        assert!(!is_boundary_valid(Some('-'), Some(' '), policy));
        assert!(is_boundary_valid(Some(' '), Some('.'), policy));
        assert!(is_boundary_valid(None, None, policy));
    }

    #[test]
    fn test_alphanumeric_policy_allows_hyphen_edge() {
        let policy = BoundaryPolicy::Alphanumeric;
        assert!(is_boundary_valid(Some('-'), Some(' '), policy));
        assert!(!is_boundary_valid(Some('a'), Some(' '), policy));
    }
}
