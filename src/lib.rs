//! Answer normalization, fuzzy matching and clustering for a daily
//! survey/guessing game.
//!
//! Users vote free-text answers to a prompt; the next day other users
//! guess the most popular responses. This crate decides when two
//! independently typed responses ("sneakers" vs "tennis shoes") count as
//! the same answer, collapses all votes into a ranked canonical list, and
//! checks live guesses against it. HTTP, persistence and scheduling live
//! with the caller.

pub mod cluster;
pub mod embedder;
pub mod fuzzy;
pub mod guess;
pub mod normalize;
pub mod semantic;
pub mod settings;
pub mod similarity;

pub use cluster::{
    cluster_answers, cluster_answers_semantic, group_similar_answers,
    group_similar_answers_semantic, rank_groups, AnswerGroup, SemanticGrouping,
};
pub use embedder::{Embedder, OnnxEmbedder};
pub use fuzzy::{is_fuzzy_match, DEFAULT_FUZZY_THRESHOLD};
pub use guess::{check_guess, score_points, GuessMatch, RankedAnswer, GUESS_MATCH_THRESHOLD};
pub use normalize::normalize;
pub use semantic::{MatchOptions, SemanticMatcher, DEFAULT_SEMANTIC_THRESHOLD};
pub use settings::Settings;
