//! Deck path grammar.
//!
//! A deck path is an ordered list of name segments joined by `::`. Depth is
//! the segment count minus one, so root decks have depth 0. No case or
//! separator normalization happens here; callers pass well-formed paths.

/// Reserved separator between deck path segments.
pub const SEPARATOR: &str = "::";

/// Splits a path into its name segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).collect()
}

/// Joins name segments into a path.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Number of separator-delimited segments minus one.
pub fn depth(path: &str) -> usize {
    path.matches(SEPARATOR).count()
}

/// Keeps the first `levels + 1` segments of `path`.
///
/// Paths already at or above that depth come back unchanged.
pub fn truncate(path: &str, levels: usize) -> String {
    path.split(SEPARATOR)
        .take(levels + 1)
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// True iff `path` is `root` itself or lies strictly below it.
pub fn is_descendant(path: &str, root: &str) -> bool {
    match path.strip_prefix(root) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// Depth of `path` measured from `root`. `None` when `path` is outside `root`.
pub fn relative_depth(path: &str, root: &str) -> Option<usize> {
    if !is_descendant(path, root) {
        return None;
    }
    Some(depth(path) - depth(root))
}

/// Ancestor that `path` collapses into when only `preserve_levels` levels
/// below `root` keep their identity.
pub fn flatten_target(path: &str, root: &str, preserve_levels: usize) -> String {
    truncate(path, depth(root) + preserve_levels)
}

/// Derived tag for a deck: spaces become underscores, `::` is kept.
pub fn to_tag(path: &str) -> String {
    path.replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_is_segment_count_minus_one() {
        assert_eq!(depth("Lang"), 0);
        assert_eq!(depth("Lang::Vocab"), 1);
        assert_eq!(depth("Lang::Vocab::Nouns::Rare"), 3);
        for path in ["A", "A::B", "A::B::C", "A b::C d::E"] {
            assert_eq!(depth(path), segments(path).len() - 1);
        }
    }

    #[test]
    fn truncate_keeps_levels_plus_one_segments() {
        assert_eq!(truncate("A::B::C::D", 0), "A");
        assert_eq!(truncate("A::B::C::D", 1), "A::B");
        assert_eq!(truncate("A::B", 5), "A::B");
    }

    #[test]
    fn truncate_is_idempotent() {
        for path in ["A", "A::B::C", "Lang::Vocab::Nouns::Rare"] {
            for levels in 0..5 {
                let once = truncate(path, levels);
                assert_eq!(truncate(&once, levels), once);
            }
        }
    }

    #[test]
    fn descendant_requires_separator_boundary() {
        assert!(is_descendant("Lang", "Lang"));
        assert!(is_descendant("Lang::Vocab", "Lang"));
        assert!(!is_descendant("Languages", "Lang"));
        assert!(!is_descendant("Lang", "Lang::Vocab"));
    }

    #[test]
    fn relative_depth_and_target_are_measured_from_root() {
        assert_eq!(relative_depth("Lang::Vocab::Nouns", "Lang::Vocab"), Some(1));
        assert_eq!(relative_depth("Other", "Lang::Vocab"), None);
        assert_eq!(
            flatten_target("Lang::Vocab::Nouns::Rare", "Lang::Vocab", 1),
            "Lang::Vocab::Nouns"
        );
        assert_eq!(
            flatten_target("Lang::Vocab::Nouns::Rare", "Lang::Vocab", 0),
            "Lang::Vocab"
        );
    }

    #[test]
    fn to_tag_replaces_spaces_only() {
        assert_eq!(to_tag("My Deck::Sub Deck"), "My_Deck::Sub_Deck");
        assert_eq!(to_tag("X::A"), "X::A");
    }

    #[test]
    fn join_inverts_segments() {
        let path = "A::B c::D";
        assert_eq!(join(&segments(path)), path);
    }
}
