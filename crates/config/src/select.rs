// SPDX-License-Identifier: MIT

//! Header-value predicate matching for `select` rules.
//!
//! A header predicate value is either a literal equality or a regex match.
//! The distiction is made explicit rather than guessed: a value prefixed
//! with `re:` is compiled as a regex and matched unanchored against the
//! header value; anything else is a literal string comparison. This was an
//! open point in the original contract ("each value is either a literal
//! equality or a regex match" without saying how they're told apart) —
//! resolved here and recorded in the project's design notes.

use regex::Regex;

const REGEX_PREFIX: &str = "re:";

/// Evaluate a single header predicate against an observed header value.
pub fn header_value_matches(pattern: &str, observed: &str) -> bool {
    match pattern.strip_prefix(REGEX_PREFIX) {
        Some(re_src) => Regex::new(re_src)
            .map(|re| re.is_match(observed))
            .unwrap_or(false),
        None => pattern == observed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_requires_exact_match() {
        assert!(header_value_matches("alpha", "alpha"));
        assert!(!header_value_matches("alpha", "alphabeta"));
    }

    #[test]
    fn regex_prefixed_pattern_is_compiled_and_matched() {
        assert!(header_value_matches("re:^alpha.*$", "alphabeta"));
        assert!(!header_value_matches("re:^beta.*$", "alphabeta"));
    }

    #[test]
    fn invalid_regex_never_matches() {
        assert!(!header_value_matches("re:(unclosed", "anything"));
    }
}
