//! Property-based tests for engram
//!
//! These tests verify invariants that must hold for all inputs:
//! - Normalization is idempotent and never panics
//! - The query compiler never panics and only emits quoted terms
//! - Fingerprints ignore surrounding whitespace
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// CATEGORY NORMALIZATION
// ============================================================================

mod category_tests {
    use super::*;
    use engram::normalize::normalize_category;

    proptest! {
        /// Invariant: normalization never panics on any string input
        #[test]
        fn never_panics(s in ".*") {
            let _ = normalize_category(Some(&s));
        }

        /// Invariant: normalizing twice yields the same result
        #[test]
        fn idempotent(s in "\\PC{0,100}") {
            let once = normalize_category(Some(&s));
            let twice = normalize_category(Some(&once));
            prop_assert_eq!(once, twice);
        }

        /// Invariant: output is lowercase, trimmed, and never empty
        #[test]
        fn output_shape(s in "\\PC{0,100}") {
            let normalized = normalize_category(Some(&s));
            prop_assert!(!normalized.is_empty());
            prop_assert_eq!(normalized.trim(), normalized.as_str());
            prop_assert!(!normalized.chars().any(|c| c.is_uppercase()));
        }
    }
}

// ============================================================================
// TAG NORMALIZATION
// ============================================================================

mod tag_tests {
    use super::*;
    use engram::normalize::normalize_tags;

    proptest! {
        /// Invariant: no duplicates and no blanks survive
        #[test]
        fn distinct_and_non_blank(tags in proptest::collection::vec("\\PC{0,20}", 0..10)) {
            let normalized = normalize_tags(&tags);

            let mut unique = normalized.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), normalized.len());

            prop_assert!(normalized.iter().all(|t| !t.trim().is_empty()));
        }

        /// Invariant: normalization is idempotent
        #[test]
        fn idempotent(tags in proptest::collection::vec("\\PC{0,20}", 0..10)) {
            let once = normalize_tags(&tags);
            let twice = normalize_tags(&once);
            prop_assert_eq!(once, twice);
        }

        /// Invariant: first occurrence wins and order is preserved
        #[test]
        fn preserves_first_occurrence(tag in "[a-z]{1,10}") {
            let tags = vec![tag.clone(), format!(" {} ", tag), "zzz".to_string()];
            let normalized = normalize_tags(&tags);
            prop_assert_eq!(normalized, vec![tag, "zzz".to_string()]);
        }
    }
}

// ============================================================================
// CONTENT NORMALIZATION & FINGERPRINT
// ============================================================================

mod content_tests {
    use super::*;
    use engram::normalize::{content_fingerprint, normalize_content};

    proptest! {
        /// Invariant: never panics; success implies trimmed non-empty output
        #[test]
        fn trims_or_rejects(s in "\\PC{0,200}") {
            match normalize_content(&s) {
                Ok(content) => {
                    prop_assert!(!content.is_empty());
                    prop_assert_eq!(content.as_str(), s.trim());
                }
                Err(_) => prop_assert!(s.trim().is_empty()),
            }
        }

        /// Invariant: surrounding whitespace never changes the fingerprint
        #[test]
        fn fingerprint_ignores_padding(s in "\\PC{1,50}", pad in "\\s{0,5}") {
            let padded = format!("{}{}{}", pad, s, pad);
            prop_assert_eq!(content_fingerprint(&s), content_fingerprint(&padded));
        }
    }
}

// ============================================================================
// FTS QUERY COMPILER
// ============================================================================

mod query_compiler_tests {
    use super::*;
    use engram::search::compile_fts_query;
    use engram::types::MatchMode;

    proptest! {
        /// Invariant: the compiler never panics on any input
        #[test]
        fn never_panics(s in ".*", distance in 1u32..=100) {
            for mode in [MatchMode::Any, MatchMode::All, MatchMode::Near] {
                let _ = compile_fts_query(&s, mode, distance);
            }
        }

        /// Invariant: whitespace-only input compiles to nothing
        #[test]
        fn blank_input_is_none(s in "\\s{0,20}") {
            prop_assert!(compile_fts_query(&s, MatchMode::Any, 10).is_none());
        }

        /// Invariant: any non-blank input compiles, and every double quote
        /// inside the output is balanced by the doubling escape
        #[test]
        fn tokens_always_quoted(s in "[a-zA-Z0-9\"]{1,30}") {
            if let Some(compiled) = compile_fts_query(&s, MatchMode::Any, 10) {
                let quotes = compiled.chars().filter(|c| *c == '"').count();
                prop_assert_eq!(quotes % 2, 0);
            } else {
                prop_assert!(s.split_whitespace().next().is_none());
            }
        }

        /// Invariant: NEAR mode always carries the requested distance
        #[test]
        fn near_distance_is_embedded(distance in 1u32..=100) {
            let compiled = compile_fts_query("alpha beta", MatchMode::Near, distance).unwrap();
            let suffix = format!(", {})", distance);
            prop_assert!(compiled.ends_with(&suffix), "expected suffix {:?} in {:?}", suffix, compiled);
            prop_assert!(compiled.starts_with("NEAR("));
        }
    }
}
