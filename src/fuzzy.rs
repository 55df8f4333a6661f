//! Surface-level "same answer?" decisions.
//!
//! Edit distance is meaningful for near-identical short answers
//! ("sneaker" vs "sneakers") but misleading for multi-word phrases, where
//! word overlap matters more than character overlap. The decider switches
//! strategy on token count.

use crate::normalize::normalize;
use crate::similarity::{character_similarity, token_jaccard};

/// Default threshold for clustering comparisons.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.7;

/// Word-overlap threshold for phrases longer than two tokens. Fixed,
/// independent of the caller-supplied threshold.
const JACCARD_THRESHOLD: f64 = 0.5;

/// Up to this many tokens a phrase is compared by edit distance.
const SHORT_PHRASE_MAX_TOKENS: usize = 2;

/// Decide whether two raw responses name the same answer.
///
/// Identical normalized forms always match. Short phrases (at most two
/// tokens each) are rejected outright when their lengths differ by more
/// than 2x, otherwise compared by character similarity against
/// `threshold` (inclusive). Longer phrases are compared by token overlap
/// against the fixed [`JACCARD_THRESHOLD`].
pub fn is_fuzzy_match(text1: &str, text2: &str, threshold: f64) -> bool {
    let n1 = normalize(text1);
    let n2 = normalize(text2);

    if n1 == n2 {
        return true;
    }

    let tokens1 = n1.split_whitespace().count();
    let tokens2 = n2.split_whitespace().count();

    if tokens1 <= SHORT_PHRASE_MAX_TOKENS && tokens2 <= SHORT_PHRASE_MAX_TOKENS {
        let len1 = n1.chars().count();
        let len2 = n2.chars().count();
        let (shorter, longer) = if len1 <= len2 { (len1, len2) } else { (len2, len1) };

        // Wildly different lengths cannot be typo variants of each other.
        if longer > shorter * 2 {
            return false;
        }

        return character_similarity(&n1, &n2) >= threshold;
    }

    token_jaccard(&n1, &n2) >= JACCARD_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::{is_fuzzy_match, DEFAULT_FUZZY_THRESHOLD};

    #[test]
    fn identical_after_normalization() {
        assert!(is_fuzzy_match("The Shoes!", "shoes", DEFAULT_FUZZY_THRESHOLD));
        // Threshold is irrelevant for exact normalized matches.
        assert!(is_fuzzy_match("Pizza", "pizza!", 1.0));
    }

    #[test]
    fn reflexive_for_any_nonempty_input() {
        for text in ["x", "sneakers", "red hot chili peppers", "Route 66"] {
            assert!(is_fuzzy_match(text, text, DEFAULT_FUZZY_THRESHOLD));
        }
    }

    #[test]
    fn symmetric() {
        let pairs = [
            ("sneaker", "sneakers"),
            ("a", "pizza"),
            ("tennis shoes", "tennis shoe"),
            ("red hot chili peppers", "hot chili peppers"),
        ];
        for (a, b) in pairs {
            assert_eq!(
                is_fuzzy_match(a, b, DEFAULT_FUZZY_THRESHOLD),
                is_fuzzy_match(b, a, DEFAULT_FUZZY_THRESHOLD),
                "asymmetric for {a:?} / {b:?}"
            );
        }
    }

    #[test]
    fn near_identical_short_phrase() {
        // character similarity = 1 - 1/8 = 0.875
        assert!(is_fuzzy_match("sneaker", "sneakers", 0.7));
    }

    #[test]
    fn length_ratio_rejects_before_scoring() {
        // "a" normalizes to "" (stopword), so 5 chars vs 0 fails the 2x check.
        assert!(!is_fuzzy_match("a", "pizza", 0.7));
        assert!(!is_fuzzy_match("ab", "abcdefgh", 0.7));
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        // distance 1 over max length 4 -> similarity exactly 0.75
        assert!(is_fuzzy_match("abcd", "abce", 0.75));
        assert!(!is_fuzzy_match("abcd", "abce", 0.76));
    }

    #[test]
    fn long_phrases_use_token_overlap() {
        // 3 of 4 tokens shared -> 0.75 >= 0.5, even with a strict threshold.
        assert!(is_fuzzy_match(
            "red hot chili peppers",
            "hot chili peppers",
            0.99
        ));
        assert!(!is_fuzzy_match(
            "one two three words",
            "four five six words",
            DEFAULT_FUZZY_THRESHOLD
        ));
    }

    #[test]
    fn word_order_does_not_matter_for_long_phrases() {
        assert!(is_fuzzy_match(
            "peanut butter and jelly",
            "jelly and peanut butter",
            DEFAULT_FUZZY_THRESHOLD
        ));
    }
}
