//! Embedding-based answer matching, the higher-fidelity alternative to
//! the fuzzy decider.
//!
//! The model is heavy, so it is loaded lazily and exactly once: the first
//! caller triggers the load and every concurrent caller awaits the same
//! in-flight initialization. Embeddings and pairwise similarities are
//! memoized in bounded caches. Any embedding failure degrades to the
//! fuzzy decider instead of surfacing an error to the matching path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use moka::future::Cache;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::embedder::{Embedder, OnnxEmbedder};
use crate::fuzzy::{is_fuzzy_match, DEFAULT_FUZZY_THRESHOLD};
use crate::normalize::normalize;
use crate::settings::Settings;
use crate::similarity::cosine_similarity;

/// Default cosine threshold for semantic equivalence.
pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.75;

/// Blend weights when a question context is supplied: most of the score
/// is text-to-text similarity, the rest rewards the two texts being
/// equally relevant to the question.
const BASE_SIMILARITY_WEIGHT: f64 = 0.7;
const RELEVANCE_WEIGHT: f64 = 0.3;

/// Embeddings of near-empty strings are token-starved and compare
/// unreliably against long texts, so such pairs are rejected without
/// embedding.
const MIN_COMPARABLE_CHARS: usize = 3;
const MAX_SKEWED_CHARS: usize = 10;

/// A matcher's embedding backend, shared across callers.
pub type SharedEmbedder = Arc<dyn Embedder>;
/// Deferred backend construction, run on first use.
pub type EmbedderLoader = Box<dyn Fn() -> Result<SharedEmbedder> + Send + Sync>;

/// Per-call options for [`SemanticMatcher::is_semantic_match`].
#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub threshold: f64,
    /// The day's prompt; when present, equal relevance to it nudges two
    /// answers toward matching.
    pub question_context: Option<String>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SEMANTIC_THRESHOLD,
            question_context: None,
        }
    }
}

pub struct SemanticMatcher {
    loader: EmbedderLoader,
    embedder: OnceCell<SharedEmbedder>,
    /// normalized text -> embedding
    embedding_cache: Cache<String, Arc<Vec<f32>>>,
    /// "n1|n2[|question]" -> final similarity. The key is order-sensitive
    /// on purpose; see DESIGN.md.
    similarity_cache: Cache<String, f64>,
}

impl SemanticMatcher {
    /// Matcher that loads the configured ONNX model on first use.
    pub fn new(settings: &Settings) -> Self {
        let model_dir = settings.model.model_dir.clone();
        Self::with_loader(
            Box::new(move || {
                let model = OnnxEmbedder::load(&model_dir)
                    .with_context(|| format!("loading embedding model from {}", model_dir.display()))?;
                Ok(Arc::new(model) as SharedEmbedder)
            }),
            settings,
        )
    }

    /// Matcher over a pre-built backend; the lazy load never runs. Used
    /// by tests and callers with custom embedding backends.
    pub fn with_embedder(embedder: SharedEmbedder, settings: &Settings) -> Self {
        let matcher = Self::with_loader(Box::new(|| bail!("embedder was injected")), settings);
        let _ = matcher.embedder.set(embedder);
        matcher
    }

    /// Matcher with a custom backend loader. The loader runs at most once
    /// concurrently: the first caller executes it and all concurrent
    /// callers receive the same backend. A failed load is retried on the
    /// next call rather than poisoning the matcher.
    pub fn with_loader(loader: EmbedderLoader, settings: &Settings) -> Self {
        Self {
            loader,
            embedder: OnceCell::new(),
            embedding_cache: Cache::builder()
                .max_capacity(settings.cache.capacity)
                .time_to_live(Duration::from_secs(settings.cache.ttl_secs))
                .build(),
            similarity_cache: Cache::builder()
                .max_capacity(settings.cache.capacity)
                .time_to_live(Duration::from_secs(settings.cache.ttl_secs))
                .build(),
        }
    }

    /// Decide whether two texts name the same answer by embedding
    /// similarity. Falls back to the fuzzy decider at
    /// [`DEFAULT_FUZZY_THRESHOLD`] if the model cannot be loaded or run.
    pub async fn is_semantic_match(&self, text1: &str, text2: &str, options: &MatchOptions) -> bool {
        let n1 = normalize(text1);
        let n2 = normalize(text2);

        if n1 == n2 {
            return true;
        }

        let len1 = n1.chars().count();
        let len2 = n2.chars().count();
        if (len1 < MIN_COMPARABLE_CHARS && len2 > MAX_SKEWED_CHARS)
            || (len2 < MIN_COMPARABLE_CHARS && len1 > MAX_SKEWED_CHARS)
        {
            return false;
        }

        match self
            .pair_similarity(&n1, &n2, options.question_context.as_deref())
            .await
        {
            Ok(similarity) => similarity >= options.threshold,
            Err(error) => {
                warn!(%error, "embedding failed, falling back to fuzzy matching");
                is_fuzzy_match(text1, text2, DEFAULT_FUZZY_THRESHOLD)
            }
        }
    }

    /// Diagnostic entry point: the raw similarity score with no fuzzy
    /// fallback; embedding and model errors surface to the caller.
    pub async fn semantic_similarity(
        &self,
        text1: &str,
        text2: &str,
        question_context: Option<&str>,
    ) -> Result<f64> {
        let n1 = normalize(text1);
        let n2 = normalize(text2);
        if n1 == n2 {
            return Ok(1.0);
        }
        self.pair_similarity(&n1, &n2, question_context).await
    }

    /// Drop all memoized embeddings and similarities.
    pub fn reset_caches(&self) {
        self.embedding_cache.invalidate_all();
        self.similarity_cache.invalidate_all();
    }

    async fn shared_embedder(&self) -> Result<&SharedEmbedder> {
        self.embedder
            .get_or_try_init(|| async {
                info!("loading embedding model");
                (self.loader)()
            })
            .await
    }

    async fn embedding(&self, normalized: &str) -> Result<Arc<Vec<f32>>> {
        if let Some(hit) = self.embedding_cache.get(normalized).await {
            return Ok(hit);
        }
        let embedder = self.shared_embedder().await?;
        let vector = Arc::new(embedder.embed(normalized).await?);
        self.embedding_cache
            .insert(normalized.to_string(), vector.clone())
            .await;
        Ok(vector)
    }

    async fn pair_similarity(
        &self,
        n1: &str,
        n2: &str,
        question_context: Option<&str>,
    ) -> Result<f64> {
        let key = match question_context {
            Some(question) => format!("{n1}|{n2}|{question}"),
            None => format!("{n1}|{n2}"),
        };
        if let Some(hit) = self.similarity_cache.get(&key).await {
            return Ok(hit);
        }

        let e1 = self.embedding(n1).await?;
        let e2 = self.embedding(n2).await?;
        let base = cosine_similarity(&e1, &e2);

        let similarity = match question_context {
            Some(question) => {
                let question_embedding = self.embedding(&normalize(question)).await?;
                let text1_to_question = cosine_similarity(&e1, &question_embedding);
                let text2_to_question = cosine_similarity(&e2, &question_embedding);
                let relevance_boost = 1.0 - (text1_to_question - text2_to_question).abs();
                BASE_SIMILARITY_WEIGHT * base + RELEVANCE_WEIGHT * relevance_boost
            }
            None => base,
        };

        self.similarity_cache.insert(key, similarity).await;
        Ok(similarity)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use super::*;
    use crate::settings::Settings;

    /// Deterministic token-hash embedder: FNV-hash each token into a
    /// fixed-dimension bucket, L2-normalize. No model download needed.
    struct HashEmbedder {
        calls: AtomicUsize,
    }

    impl HashEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let dim = 64;
            let mut v = vec![0_f32; dim];
            for token in text.split_whitespace() {
                let mut x: u64 = 1_469_598_103_934_665_603;
                for b in token.as_bytes() {
                    x ^= u64::from(*b);
                    x = x.wrapping_mul(1_099_511_628_211);
                }
                v[(x % dim as u64) as usize] += 1.0;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
            for x in &mut v {
                *x /= norm;
            }
            Ok(v)
        }
    }

    /// Always errors; proves which paths avoid or survive embedding.
    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            bail!("inference backend unavailable")
        }
    }

    /// Fixed vectors per normalized text.
    struct MapEmbedder(HashMap<String, Vec<f32>>);

    #[async_trait]
    impl Embedder for MapEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.0
                .get(text)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no vector for {text:?}"))
        }
    }

    fn settings() -> Settings {
        Settings::default_settings().unwrap()
    }

    fn matcher_with(embedder: Arc<dyn Embedder>) -> SemanticMatcher {
        SemanticMatcher::with_embedder(embedder, &settings())
    }

    #[tokio::test]
    async fn exact_normalized_match_never_embeds() {
        let matcher = matcher_with(Arc::new(FailingEmbedder));
        assert!(
            matcher
                .is_semantic_match("The Shoes!", "shoes", &MatchOptions::default())
                .await
        );
    }

    #[tokio::test]
    async fn skewed_lengths_rejected_without_embedding() {
        let embedder = Arc::new(HashEmbedder::new());
        let matcher = matcher_with(embedder.clone());
        assert!(
            !matcher
                .is_semantic_match("ab", "a very long answer here", &MatchOptions::default())
                .await
        );
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn identical_token_sets_match() {
        let matcher = matcher_with(Arc::new(HashEmbedder::new()));
        assert!(
            matcher
                .is_semantic_match("peanut butter jelly", "jelly peanut butter", &MatchOptions::default())
                .await
        );
    }

    #[tokio::test]
    async fn symmetric_despite_order_sensitive_cache_key() {
        let matcher = matcher_with(Arc::new(HashEmbedder::new()));
        let options = MatchOptions::default();
        for (a, b) in [("running shoes", "running sneakers"), ("pizza", "sushi")] {
            assert_eq!(
                matcher.is_semantic_match(a, b, &options).await,
                matcher.is_semantic_match(b, a, &options).await,
                "asymmetric for {a:?} / {b:?}"
            );
        }
    }

    #[tokio::test]
    async fn embedding_failure_falls_back_to_fuzzy() {
        let matcher = matcher_with(Arc::new(FailingEmbedder));
        // Fuzzy match at the default threshold says yes.
        assert!(
            matcher
                .is_semantic_match("sneaker", "sneakers", &MatchOptions::default())
                .await
        );
        // And no.
        assert!(
            !matcher
                .is_semantic_match("pizza", "sushi", &MatchOptions::default())
                .await
        );
    }

    #[tokio::test]
    async fn diagnostic_surfaces_errors() {
        let matcher = matcher_with(Arc::new(FailingEmbedder));
        assert!(matcher
            .semantic_similarity("sneaker", "sneakers", None)
            .await
            .is_err());
        // But the exact-match short-circuit still applies.
        let sim = matcher
            .semantic_similarity("shoes", "The Shoes!", None)
            .await
            .unwrap();
        assert!((sim - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn embeddings_are_cached_per_text() {
        let embedder = Arc::new(HashEmbedder::new());
        let matcher = matcher_with(embedder.clone());
        let options = MatchOptions::default();
        matcher.is_semantic_match("alpha", "beta", &options).await;
        matcher.is_semantic_match("alpha", "gamma", &options).await;
        // alpha embedded once, beta and gamma once each.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

        matcher.reset_caches();
        matcher.is_semantic_match("alpha", "beta", &options).await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn question_context_blends_relevance() {
        let mut vectors = HashMap::new();
        // Orthogonal answers, equally relevant to the question.
        vectors.insert("cats".to_string(), vec![1.0, 0.0, 0.0]);
        vectors.insert("dogs".to_string(), vec![0.0, 1.0, 0.0]);
        vectors.insert("favorite pet".to_string(), vec![0.5_f32.sqrt(), 0.5_f32.sqrt(), 0.0]);
        let matcher = matcher_with(Arc::new(MapEmbedder(vectors)));

        let base = matcher
            .semantic_similarity("cats", "dogs", None)
            .await
            .unwrap();
        assert!(base.abs() < 1e-6);

        // 0.7 * 0 + 0.3 * (1 - |cos(c,q) - cos(d,q)|) = 0.3
        let blended = matcher
            .semantic_similarity("cats", "dogs", Some("favorite pet"))
            .await
            .unwrap();
        assert!((blended - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn single_flight_model_load() {
        let load_count = Arc::new(AtomicUsize::new(0));
        let counter = load_count.clone();
        let matcher = Arc::new(SemanticMatcher::with_loader(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(HashEmbedder::new()) as Arc<dyn Embedder>)
            }),
            &settings(),
        ));

        let mut handles = Vec::new();
        for i in 0..8 {
            let matcher = matcher.clone();
            handles.push(tokio::spawn(async move {
                let text = format!("answer number {i}");
                matcher
                    .is_semantic_match(&text, "some other answer", &MatchOptions::default())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(load_count.load(Ordering::SeqCst), 1);
    }
}
