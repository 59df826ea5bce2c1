//! Embedding-based retrieval with aggressive near-duplicate filtering.
//!
//! The retriever embeds a query, asks the [`ChunkIndex`] for the top-K
//! most similar chunks, then filters the candidates greedily in
//! descending-similarity order: a candidate is dropped when it is a
//! substring of an already-accepted context (or vice versa), or when its
//! token-Jaccard similarity to an accepted context exceeds a threshold.
//! Survivors are joined into one context string handed to the prompt
//! builder.
//!
//! # Guarantees
//!
//! - Output ordering matches the similarity-descending input ordering
//!   after filtering.
//! - No two accepted contexts are near-duplicates under the rule above.
//! - At most `top_n` contexts are accepted.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ProviderError;
use crate::providers::{ChunkIndex, EmbeddingProvider};

/// Separator line placed between accepted contexts in the joined string.
pub const CONTEXT_SEPARATOR: &str = "\n----------\n";

/// Default token-Jaccard similarity above which two chunks are considered
/// duplicates.
pub const DEFAULT_JACCARD_THRESHOLD: f32 = 0.5;

/// `"1.2 "`-style numbering prefix stripped before tokenizing.
static NUMBERING_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*\.?\s+").expect("numbering regex"));

/// Runs of non-word characters, the token boundary.
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("non-word regex"));

/// One retrieved chunk surfaced to the caller for citation display.
/// Ephemeral and query-scoped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub filename: String,
    pub text: String,
}

/// Result of one retrieval: the joined context string plus the individual
/// contexts in acceptance order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Retrieval {
    pub joined_context: String,
    pub contexts: Vec<RetrievedContext>,
}

/// Normalized token set used by the Jaccard near-duplicate heuristic:
/// lowercased, numbering prefix stripped, split on non-word runs, tokens
/// of length > 3 only.
fn token_set(text: &str) -> FxHashSet<String> {
    let lowered = text.to_lowercase();
    let stripped = NUMBERING_PREFIX.replace(&lowered, "");
    NON_WORD
        .split(&stripped)
        .filter(|token| token.len() > 3)
        .map(str::to_string)
        .collect()
}

/// Token-Jaccard similarity between two texts, in `0.0..=1.0`.
///
/// Returns `0.0` when both normalized token sets are empty.
///
/// # Examples
///
/// ```
/// use docent::retrieval::token_jaccard;
///
/// assert_eq!(token_jaccard("alpha beta gamma", "alpha beta gamma"), 1.0);
/// assert_eq!(token_jaccard("alpha beta", "gamma delta"), 0.0);
/// ```
#[must_use]
pub fn token_jaccard(a: &str, b: &str) -> f32 {
    let set_a = token_set(a);
    let set_b = token_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Whether `candidate` duplicates any already-accepted text: literal
/// substring containment in either direction, or token-Jaccard similarity
/// above `threshold`.
fn is_duplicate(candidate: &str, accepted: &[String], threshold: f32) -> bool {
    accepted.iter().any(|seen| {
        seen.contains(candidate) || candidate.contains(seen.as_str()) || {
            let similarity = token_jaccard(candidate, seen);
            similarity > threshold
        }
    })
}

/// Queries the index and assembles a deduplicated, joined context.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn ChunkIndex>,
    jaccard_threshold: f32,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn ChunkIndex>) -> Self {
        Self {
            embedder,
            index,
            jaccard_threshold: DEFAULT_JACCARD_THRESHOLD,
        }
    }

    /// Overrides the near-duplicate threshold.
    #[must_use]
    pub fn with_jaccard_threshold(mut self, threshold: f32) -> Self {
        self.jaccard_threshold = threshold;
        self
    }

    /// Retrieves up to `top_n` deduplicated contexts for `query`.
    ///
    /// An empty index is not an error: the result carries an empty joined
    /// context and the caller still builds a prompt from it.
    pub async fn retrieve(&self, query: &str, top_n: usize) -> Result<Retrieval, ProviderError> {
        let embedding = self.embedder.encode(query).await?;
        let hits = self.index.query(&embedding, top_n).await?;

        let mut accepted_texts: Vec<String> = Vec::new();
        let mut contexts: Vec<RetrievedContext> = Vec::new();

        for hit in hits {
            if contexts.len() >= top_n {
                break;
            }
            let text = hit.chunk.text.trim();
            if text.is_empty() {
                continue;
            }
            if is_duplicate(text, &accepted_texts, self.jaccard_threshold) {
                debug!(
                    score = hit.score,
                    filename = %hit.chunk.filename,
                    "dropping near-duplicate retrieval candidate"
                );
                continue;
            }
            accepted_texts.push(text.to_string());
            contexts.push(RetrievedContext {
                filename: hit.chunk.filename,
                text: text.to_string(),
            });
        }

        Ok(Retrieval {
            joined_context: accepted_texts.join(CONTEXT_SEPARATOR),
            contexts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{HashEmbedding, MemoryChunkIndex};
    use crate::providers::{Chunk, EmbeddingProvider};
    use uuid::Uuid;

    #[test]
    fn jaccard_ignores_numbering_and_case() {
        let a = "3.1 Feeding Schedule Details Overview";
        let b = "feeding schedule details overview";
        assert_eq!(token_jaccard(a, b), 1.0);
    }

    #[test]
    fn jaccard_drops_short_tokens() {
        // "a", "of", "the" all fall under the length-3 cutoff.
        assert_eq!(token_jaccard("a of the", "is to it"), 0.0);
    }

    #[test]
    fn jaccard_partial_overlap() {
        let similarity = token_jaccard("alpha beta gamma delta", "alpha beta epsilon zeta");
        // 2 shared / 6 total
        assert!((similarity - 2.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn substring_counts_as_duplicate() {
        let accepted = vec!["the full feeding schedule text".to_string()];
        assert!(is_duplicate("feeding schedule", &accepted, 0.5));
        assert!(is_duplicate(
            "prefix the full feeding schedule text suffix",
            &accepted,
            0.5
        ));
        assert!(!is_duplicate("entirely unrelated content", &accepted, 0.5));
    }

    async fn populated_index(
        embedder: &HashEmbedding,
        texts: &[&str],
    ) -> std::sync::Arc<MemoryChunkIndex> {
        let index = std::sync::Arc::new(MemoryChunkIndex::new());
        let doc_id = Uuid::new_v4();
        for text in texts {
            let embedding = embedder.encode(text).await.unwrap();
            index
                .insert(Chunk::new(doc_id, "kb.txt", *text, embedding))
                .await
                .unwrap();
        }
        index
    }

    #[tokio::test]
    async fn near_duplicates_are_filtered() {
        let embedder = HashEmbedding::default();
        let index = populated_index(
            &embedder,
            &[
                "cats need fresh water available at all times daily",
                "1.2 cats need fresh water available at all times daily",
                "dogs enjoy long walks in the park every morning",
            ],
        )
        .await;

        let retriever = Retriever::new(Arc::new(embedder), index);
        let result = retriever.retrieve("fresh water for cats", 3).await.unwrap();

        // The numbered duplicate must be dropped; the dog chunk survives.
        assert_eq!(result.contexts.len(), 2);
        assert!(result.joined_context.contains(CONTEXT_SEPARATOR));
    }

    #[tokio::test]
    async fn accepted_count_is_capped_at_top_n() {
        let embedder = HashEmbedding::default();
        let index = populated_index(
            &embedder,
            &[
                "first entirely distinct subject matter about astronomy",
                "second entirely distinct subject matter about geology",
                "third entirely distinct subject matter about botany",
                "fourth entirely distinct subject matter about chemistry",
            ],
        )
        .await;

        let retriever = Retriever::new(Arc::new(embedder), index);
        let result = retriever
            .retrieve("entirely distinct subject matter", 2)
            .await
            .unwrap();
        assert!(result.contexts.len() <= 2);
    }

    #[tokio::test]
    async fn empty_index_yields_empty_context() {
        let embedder = HashEmbedding::default();
        let index = std::sync::Arc::new(MemoryChunkIndex::new());
        let retriever = Retriever::new(Arc::new(embedder), index);

        let result = retriever.retrieve("anything", 3).await.unwrap();
        assert!(result.contexts.is_empty());
        assert_eq!(result.joined_context, "");
    }

    #[tokio::test]
    async fn ordering_follows_similarity() {
        let embedder = HashEmbedding::default();
        let index = populated_index(
            &embedder,
            &[
                "gardening tips for growing tomatoes in summer",
                "completely different topic regarding maritime navigation",
            ],
        )
        .await;

        let retriever = Retriever::new(Arc::new(embedder), index);
        let result = retriever
            .retrieve("growing tomatoes gardening", 2)
            .await
            .unwrap();
        assert_eq!(
            result.contexts[0].text,
            "gardening tips for growing tomatoes in summer"
        );
    }
}
