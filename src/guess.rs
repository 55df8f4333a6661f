//! Real-time guess checking against a day's ranked canonical answers.

use serde::{Deserialize, Serialize};

use crate::fuzzy::is_fuzzy_match;

/// Tighter than the clustering default: guesses are live user input, so
/// false positives are worse than misses.
pub const GUESS_MATCH_THRESHOLD: f64 = 0.85;

/// A canonical answer as persisted by the caller, with its rank and vote
/// count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedAnswer {
    pub rank: u32,
    pub answer: String,
    pub vote_count: u64,
}

/// A successful guess: which ranked answer it hit and the points awarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessMatch {
    pub rank: u32,
    pub answer: String,
    pub points: u32,
}

/// Check a guess against the top answers in rank order; the first fuzzy
/// match at [`GUESS_MATCH_THRESHOLD`] wins. `top_ten_total` is the vote
/// mass across the top ten answers, which is the denominator of the
/// points model even though only the top five are guessable.
pub fn check_guess(
    guess: &str,
    top_answers: &[RankedAnswer],
    top_ten_total: u64,
) -> Option<GuessMatch> {
    for ranked in top_answers {
        if is_fuzzy_match(guess, &ranked.answer, GUESS_MATCH_THRESHOLD) {
            return Some(GuessMatch {
                rank: ranked.rank,
                answer: ranked.answer.clone(),
                points: score_points(ranked.vote_count, top_ten_total),
            });
        }
    }
    None
}

/// Share of the top-ten vote mass held by the matched answer, as a whole
/// percentage rounded half-up.
pub fn score_points(vote_count: u64, top_ten_total: u64) -> u32 {
    if top_ten_total == 0 {
        return 0;
    }
    let percentage = vote_count as f64 / top_ten_total as f64 * 100.0;
    percentage.round() as u32
}
