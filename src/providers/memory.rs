//! In-memory reference implementations of the collaborator traits.
//!
//! These back the test suite and double as a usable configuration for
//! small, fully on-device deployments: a brute-force cosine index, plain
//! vector/map stores, and a deterministic hash-bucket embedder whose
//! vectors actually reflect token overlap, so similarity assertions in
//! tests behave like a real embedding model would.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::errors::ProviderError;
use crate::message::{ConversationMessage, Language};
use crate::providers::{
    Chunk, ChunkHit, ChunkIndex, Document, DocumentStore, EmbeddingProvider, HistoryStore,
};

/// Deterministic embedding provider hashing tokens into buckets.
///
/// Each lowercased alphanumeric token increments one bucket of the output
/// vector (chosen by hashing the token), and the result is L2-normalized.
/// Texts sharing many tokens therefore land close together under cosine
/// similarity, which is all retrieval tests need.
#[derive(Clone, Debug)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hash = 0xcbf2_9ce4_8422_2325u64;
            for byte in token.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
            let bucket = (hash % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(128)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine similarity with a zero-norm guard.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Brute-force in-memory chunk index ranked by cosine similarity.
#[derive(Debug, Default)]
pub struct MemoryChunkIndex {
    chunks: RwLock<Vec<Chunk>>,
}

impl MemoryChunkIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkIndex for MemoryChunkIndex {
    async fn insert(&self, chunk: Chunk) -> Result<(), ProviderError> {
        self.chunks.write().push(chunk);
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_n: usize) -> Result<Vec<ChunkHit>, ProviderError> {
        let chunks = self.chunks.read();
        let mut hits: Vec<ChunkHit> = chunks
            .iter()
            .map(|chunk| ChunkHit {
                score: cosine_similarity(embedding, &chunk.embedding),
                chunk: chunk.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_n);
        Ok(hits)
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<usize, ProviderError> {
        let mut chunks = self.chunks.write();
        let before = chunks.len();
        chunks.retain(|chunk| chunk.document_id != document_id);
        Ok(before - chunks.len())
    }

    async fn count(&self) -> Result<usize, ProviderError> {
        Ok(self.chunks.read().len())
    }
}

/// Plain in-memory document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<Vec<Document>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn add(&self, document: Document) -> Result<Uuid, ProviderError> {
        let id = document.id;
        self.documents.write().push(document);
        Ok(id)
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<Uuid>, ProviderError> {
        Ok(self
            .documents
            .read()
            .iter()
            .find(|doc| doc.filename == filename)
            .map(|doc| doc.id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), ProviderError> {
        self.documents.write().retain(|doc| doc.id != id);
        Ok(())
    }
}

/// In-memory per-language history store.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    histories: RwLock<FxHashMap<Language, Vec<ConversationMessage>>>,
}

impl MemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save(
        &self,
        language: Language,
        messages: &[ConversationMessage],
    ) -> Result<(), ProviderError> {
        self.histories.write().insert(language, messages.to_vec());
        Ok(())
    }

    async fn load(&self, language: Language) -> Result<Vec<ConversationMessage>, ProviderError> {
        Ok(self
            .histories
            .read()
            .get(&language)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear(&self) -> Result<(), ProviderError> {
        self.histories.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedding_is_deterministic_and_normalized() {
        let embedder = HashEmbedding::new(64);
        let a = embedder.encode("the quick brown fox").await.unwrap();
        let b = embedder.encode("the quick brown fox").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn similar_texts_score_higher_than_dissimilar() {
        let embedder = HashEmbedding::default();
        let query = embedder.encode("feline behavior and cats").await.unwrap();
        let near = embedder
            .encode("cats exhibit curious feline behavior")
            .await
            .unwrap();
        let far = embedder
            .encode("quarterly financial projections")
            .await
            .unwrap();
        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn index_ranks_and_truncates() {
        let embedder = HashEmbedding::default();
        let index = MemoryChunkIndex::new();
        let doc_id = Uuid::new_v4();
        for text in ["cats and felines", "dogs and canines", "stock market news"] {
            let embedding = embedder.encode(text).await.unwrap();
            index
                .insert(Chunk::new(doc_id, "pets.txt", text, embedding))
                .await
                .unwrap();
        }

        let query = embedder.encode("cats felines").await.unwrap();
        let hits = index.query(&query, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].chunk.text, "cats and felines");
    }

    #[tokio::test]
    async fn delete_by_document_removes_only_that_document() {
        let index = MemoryChunkIndex::new();
        let keep = Uuid::new_v4();
        let removed = Uuid::new_v4();
        index
            .insert(Chunk::new(keep, "a.txt", "kept", vec![1.0]))
            .await
            .unwrap();
        index
            .insert(Chunk::new(removed, "b.txt", "gone", vec![1.0]))
            .await
            .unwrap();
        index
            .insert(Chunk::new(removed, "b.txt", "also gone", vec![1.0]))
            .await
            .unwrap();

        assert_eq!(index.delete_by_document(removed).await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn document_store_supersede_cycle() {
        let store = MemoryDocumentStore::new();
        let doc = Document::new("kb.txt", "v1");
        let id = store.add(doc).await.unwrap();
        assert_eq!(store.find_by_filename("kb.txt").await.unwrap(), Some(id));

        store.delete(id).await.unwrap();
        assert_eq!(store.find_by_filename("kb.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn history_store_keeps_languages_separate() {
        let store = MemoryHistoryStore::new();
        let english = vec![ConversationMessage::user("hello")];
        let russian = vec![
            ConversationMessage::user("привет"),
            ConversationMessage::assistant("здравствуйте"),
        ];
        store.save(Language::English, &english).await.unwrap();
        store.save(Language::Russian, &russian).await.unwrap();

        assert_eq!(store.load(Language::English).await.unwrap().len(), 1);
        assert_eq!(store.load(Language::Russian).await.unwrap().len(), 2);

        store.clear().await.unwrap();
        assert!(store.load(Language::English).await.unwrap().is_empty());
        assert!(store.load(Language::Russian).await.unwrap().is_empty());
    }

    #[test]
    fn cosine_zero_norm_guard() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
