use once_cell::sync::Lazy;
use regex::Regex;

/// Articles and filler quantifiers that carry no answer content: "the
/// shoes", "some shoes" and "shoes" all name the same answer.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "some", "bit", "of", "little", "few", "many", "much", "lot", "lots", "my",
    "your", "their", "his", "her", "its", "our",
];

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("valid punctuation pattern"));

/// Canonicalize a raw response into the form used for comparison:
/// lowercased, punctuation stripped, stopwords dropped, whitespace
/// collapsed to single spaces. Idempotent; empty input yields an empty
/// string.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");

    stripped
        .split_whitespace()
        .filter(|word| !STOPWORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}
