//! Greedy answer clustering.
//!
//! Tallying collapses every vote for a prompt into a small ranked list of
//! canonical answers. The pass structure is load-bearing: exact buckets
//! first, then a most-frequent-first greedy merge, so popular answers
//! become cluster representatives instead of being absorbed into rarer
//! clusters by accident of processing order.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::fuzzy::{is_fuzzy_match, DEFAULT_FUZZY_THRESHOLD};
use crate::normalize::normalize;
use crate::semantic::{MatchOptions, SemanticMatcher};

/// One cluster of equivalent responses.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerGroup {
    /// Representative original-form spelling, shown to users.
    pub canonical: String,
    /// Total votes absorbed into this cluster.
    pub count: usize,
    /// The raw responses folded in; always `count` entries.
    pub members: Vec<String>,
}

/// Output of [`group_similar_answers_semantic`]: the canonical counts plus
/// a raw-response -> canonical map for traceability.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticGrouping {
    pub grouped_answers: HashMap<String, usize>,
    pub vote_to_answer: HashMap<String, String>,
}

/// A bucket of responses sharing one normalized form.
struct Bucket {
    representative: String,
    count: usize,
    members: Vec<String>,
}

/// Shorter originals make better user-facing spellings. On equal length,
/// a spelling that already reads like the normalized form beats one that
/// only normalizes to it ("shoes" over "Shoes"); otherwise the first one
/// seen stays.
fn is_better_representative(candidate: &str, current: &str, normalized: &str) -> bool {
    if candidate.len() != current.len() {
        return candidate.len() < current.len();
    }
    candidate == normalized && current != normalized
}

/// Exact-bucket pass: group responses by normalized form, remembering the
/// best original spelling per bucket as representative. Buckets come back
/// most-frequent-first; ties break toward the shorter representative,
/// then lexically on the normalized key, so clustering is deterministic
/// run to run.
fn bucket_by_normalized(responses: &[String]) -> Vec<(String, Bucket)> {
    let mut buckets: HashMap<String, Bucket> = HashMap::new();

    for response in responses {
        let key = normalize(response);
        match buckets.get_mut(&key) {
            Some(bucket) => {
                bucket.count += 1;
                bucket.members.push(response.clone());
                if is_better_representative(response, &bucket.representative, &key) {
                    bucket.representative = response.clone();
                }
            }
            None => {
                buckets.insert(
                    key,
                    Bucket {
                        representative: response.clone(),
                        count: 1,
                        members: vec![response.clone()],
                    },
                );
            }
        }
    }

    let mut ordered: Vec<(String, Bucket)> = buckets.into_iter().collect();
    ordered.sort_by(|(key_a, a), (key_b, b)| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.representative.len().cmp(&b.representative.len()))
            .then_with(|| key_a.cmp(key_b))
    });
    ordered
}

/// Collapse raw responses into clusters of equivalent answers using the
/// fuzzy decider at [`DEFAULT_FUZZY_THRESHOLD`].
///
/// Group counts always sum to `responses.len()`. The comparison scan is
/// O(k^2) over distinct normalized forms, which stays small per prompt
/// even when raw vote volume is large.
pub fn cluster_answers(responses: &[String]) -> Vec<AnswerGroup> {
    let ordered = bucket_by_normalized(responses);
    let mut processed = vec![false; ordered.len()];
    let mut groups = Vec::new();

    for i in 0..ordered.len() {
        if processed[i] {
            continue;
        }
        processed[i] = true;
        let (key_i, bucket_i) = &ordered[i];

        let mut canonical = bucket_i.representative.clone();
        let mut canonical_votes = bucket_i.count;
        let mut count = bucket_i.count;
        let mut members = bucket_i.members.clone();

        for j in (i + 1)..ordered.len() {
            if processed[j] {
                continue;
            }
            let (key_j, bucket_j) = &ordered[j];
            if !is_fuzzy_match(key_i, key_j, DEFAULT_FUZZY_THRESHOLD) {
                continue;
            }
            processed[j] = true;
            count += bucket_j.count;
            members.extend(bucket_j.members.iter().cloned());

            // A more popular bucket (or an equally popular, shorter
            // spelling) takes over as the user-visible representative.
            if bucket_j.count > canonical_votes
                || (bucket_j.count == canonical_votes
                    && bucket_j.representative.len() < canonical.len())
            {
                canonical = bucket_j.representative.clone();
                canonical_votes = bucket_j.count;
            }
        }

        groups.push(AnswerGroup {
            canonical,
            count,
            members,
        });
    }

    debug!(
        responses = responses.len(),
        groups = groups.len(),
        "clustered responses"
    );
    groups
}

/// Canonical answer -> vote count over all responses.
pub fn group_similar_answers(responses: &[String]) -> HashMap<String, usize> {
    cluster_answers(responses)
        .into_iter()
        .map(|group| (group.canonical, group.count))
        .collect()
}

/// Sort groups by count descending (ties: shorter canonical, then
/// lexical) and keep the first `n`. The grouping maps carry no order, so
/// ranking is an explicit caller step.
pub fn rank_groups(mut groups: Vec<AnswerGroup>, n: usize) -> Vec<AnswerGroup> {
    groups.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.canonical.len().cmp(&b.canonical.len()))
            .then_with(|| a.canonical.cmp(&b.canonical))
    });
    groups.truncate(n);
    groups
}

/// [`cluster_answers`] with the embedding-based matcher as the pairwise
/// predicate. Embedding failures degrade to fuzzy matching inside the
/// matcher, so clustering itself cannot fail.
pub async fn cluster_answers_semantic(
    matcher: &SemanticMatcher,
    responses: &[String],
    options: &MatchOptions,
) -> Vec<AnswerGroup> {
    let ordered = bucket_by_normalized(responses);
    let mut processed = vec![false; ordered.len()];
    let mut groups = Vec::new();

    for i in 0..ordered.len() {
        if processed[i] {
            continue;
        }
        processed[i] = true;
        let (key_i, bucket_i) = &ordered[i];

        let mut canonical = bucket_i.representative.clone();
        let mut canonical_votes = bucket_i.count;
        let mut count = bucket_i.count;
        let mut members = bucket_i.members.clone();

        for j in (i + 1)..ordered.len() {
            if processed[j] {
                continue;
            }
            let (key_j, bucket_j) = &ordered[j];
            if !matcher.is_semantic_match(key_i, key_j, options).await {
                continue;
            }
            processed[j] = true;
            count += bucket_j.count;
            members.extend(bucket_j.members.iter().cloned());

            if bucket_j.count > canonical_votes
                || (bucket_j.count == canonical_votes
                    && bucket_j.representative.len() < canonical.len())
            {
                canonical = bucket_j.representative.clone();
                canonical_votes = bucket_j.count;
            }
        }

        groups.push(AnswerGroup {
            canonical,
            count,
            members,
        });
    }

    debug!(
        responses = responses.len(),
        groups = groups.len(),
        "clustered responses semantically"
    );
    groups
}

/// Semantic grouping with traceability: canonical counts plus the
/// raw-response -> canonical mapping callers persist alongside ranked
/// rows.
pub async fn group_similar_answers_semantic(
    matcher: &SemanticMatcher,
    responses: &[String],
    options: &MatchOptions,
) -> SemanticGrouping {
    let groups = cluster_answers_semantic(matcher, responses, options).await;

    let mut grouped_answers = HashMap::new();
    let mut vote_to_answer = HashMap::new();
    for group in groups {
        for member in &group.members {
            vote_to_answer.insert(member.clone(), group.canonical.clone());
        }
        grouped_answers.insert(group.canonical, group.count);
    }

    SemanticGrouping {
        grouped_answers,
        vote_to_answer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responses(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| (*t).to_string()).collect()
    }

    #[test]
    fn exact_buckets_prefer_shortest_original() {
        let grouped = group_similar_answers(&responses(&["Shoes", "shoes", "Boots"]));
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["shoes"], 2);
        assert_eq!(grouped["Boots"], 1);
    }

    #[test]
    fn empty_input_empty_output() {
        assert!(group_similar_answers(&[]).is_empty());
        assert!(cluster_answers(&[]).is_empty());
    }

    #[test]
    fn typo_variants_merge() {
        let groups = cluster_answers(&responses(&["sneakers", "sneaker", "Sneakers!"]));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 3);
        assert_eq!(groups[0].members.len(), 3);
    }

    #[test]
    fn popular_answer_stays_representative() {
        let groups = cluster_answers(&responses(&[
            "tennis shoes",
            "tennis shoes",
            "tennis shoes",
            "tennis shoe",
        ]));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].canonical, "tennis shoes");
        assert_eq!(groups[0].count, 4);
    }

    #[test]
    fn conservation_of_votes() {
        let input = responses(&[
            "pizza", "Pizza!", "pizzas", "tacos", "TACOS", "taco", "sushi", "a", "the",
        ]);
        let groups = cluster_answers(&input);
        let total: usize = groups.iter().map(|g| g.count).sum();
        assert_eq!(total, input.len());
        for group in &groups {
            assert_eq!(group.count, group.members.len());
        }
    }

    #[test]
    fn unrelated_answers_stay_apart() {
        let grouped = group_similar_answers(&responses(&["pizza", "tacos", "sushi"]));
        assert_eq!(grouped.len(), 3);
    }

    #[test]
    fn ranking_is_deterministic() {
        let groups = cluster_answers(&responses(&[
            "pizza", "pizza", "pizza", "tacos", "tacos", "sushi", "ramen",
        ]));
        let ranked = rank_groups(groups, 3);
        assert_eq!(ranked[0].canonical, "pizza");
        assert_eq!(ranked[1].canonical, "tacos");
        // sushi/ramen tie on count 1 and length 5 -> lexical order.
        assert_eq!(ranked[2].canonical, "ramen");
    }

    #[test]
    fn rank_truncates() {
        let groups = cluster_answers(&responses(&["a1", "b2", "c3", "d4"]));
        assert_eq!(rank_groups(groups, 2).len(), 2);
    }

    #[tokio::test]
    async fn semantic_grouping_maps_votes_to_canonicals() {
        struct NoEmbedder;

        #[async_trait::async_trait]
        impl crate::embedder::Embedder for NoEmbedder {
            async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
                anyhow::bail!("unavailable")
            }
        }

        // A dead backend degrades to fuzzy matching inside the matcher,
        // so grouping still works end to end.
        let matcher = SemanticMatcher::with_embedder(
            std::sync::Arc::new(NoEmbedder),
            &crate::settings::Settings::default_settings().unwrap(),
        );
        let input = responses(&["Shoes", "shoes", "sneaker", "sneakers"]);
        let grouping =
            group_similar_answers_semantic(&matcher, &input, &MatchOptions::default()).await;

        let total: usize = grouping.grouped_answers.values().sum();
        assert_eq!(total, input.len());
        assert_eq!(grouping.vote_to_answer.len(), 4);
        for canonical in grouping.vote_to_answer.values() {
            assert!(grouping.grouped_answers.contains_key(canonical));
        }
        assert_eq!(grouping.vote_to_answer["Shoes"], "shoes");
        assert_eq!(grouping.vote_to_answer["sneakers"], "sneaker");
    }
}
