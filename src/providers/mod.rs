//! External collaborator interfaces consumed by the engine.
//!
//! The engine treats the embedding model, the vector index, document and
//! history persistence, the generative model, and the translator as
//! black boxes behind object-safe async traits. Surrounding app code
//! supplies real implementations; [`memory`] ships in-memory reference
//! implementations used by the test suite and suitable for small
//! deployments.
//!
//! ```text
//!                 ┌────────────────────┐
//!                 │   Engine / actor   │
//!                 └─────────┬──────────┘
//!                           │ async traits
//!     ┌──────────┬──────────┼───────────┬─────────────┐
//!     ▼          ▼          ▼           ▼             ▼
//! Embedding  ChunkIndex  Document   Generator    Translator
//! Provider               Store      (streaming)  (best-effort)
//! ```

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{GenerateError, ModelFailure, ProviderError, TranslateError};
use crate::events::StreamItem;
use crate::message::{ConversationMessage, Language};

/// A knowledge-base document: immutable after creation, superseded (with
/// its chunks) when the same filename is re-ingested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    #[must_use]
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            text: text.into(),
            ingested_at: Utc::now(),
        }
    }
}

/// A stored chunk: one chunking output with its embedding, owned by its
/// document and deleted with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl Chunk {
    #[must_use]
    pub fn new(
        document_id: Uuid,
        filename: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            filename: filename.into(),
            text: text.into(),
            embedding,
        }
    }
}

/// A chunk returned from a similarity search, with its query-time score.
/// The score is ephemeral and never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkHit {
    pub score: f32,
    pub chunk: Chunk,
}

/// Maps text to a fixed-dimension embedding vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encodes text into a vector of [`Self::dimension`] floats.
    async fn encode(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// The fixed length of vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Stores chunks with their embeddings and answers top-K similarity
/// queries. Written only during initialization; read-only at query time.
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    async fn insert(&self, chunk: Chunk) -> Result<(), ProviderError>;

    /// The `top_n` most similar chunks, most similar first.
    async fn query(&self, embedding: &[f32], top_n: usize) -> Result<Vec<ChunkHit>, ProviderError>;

    /// Removes every chunk owned by the given document. Returns the number
    /// of chunks removed.
    async fn delete_by_document(&self, document_id: Uuid) -> Result<usize, ProviderError>;

    async fn count(&self) -> Result<usize, ProviderError>;
}

/// Document bookkeeping used to make re-ingestion idempotent.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn add(&self, document: Document) -> Result<Uuid, ProviderError>;

    async fn find_by_filename(&self, filename: &str) -> Result<Option<Uuid>, ProviderError>;

    async fn delete(&self, id: Uuid) -> Result<(), ProviderError>;
}

/// The compute path a generator ended up on after initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorBackend {
    /// Hardware-accelerated primary backend.
    Accelerated,
    /// General-purpose fallback backend.
    GeneralPurpose,
}

impl fmt::Display for GeneratorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorBackend::Accelerated => f.write_str("accelerated"),
            GeneratorBackend::GeneralPurpose => f.write_str("general-purpose"),
        }
    }
}

/// Initialization progress callback, fed fractions in `0.0..=1.0`.
pub type InitProgress = Box<dyn Fn(f32) + Send + Sync>;

/// The black-box streaming text generator.
///
/// `initialize` is expected to try a primary backend and fall back to a
/// general-purpose one internally, reporting a classified [`ModelFailure`]
/// when both are unusable. `stream_generate` yields a channel of
/// [`StreamItem`]s; exactly one item per stream is terminal (a chunk with
/// `is_final` set, or an error).
#[async_trait]
pub trait Generator: Send + Sync {
    async fn initialize(&self, progress: InitProgress) -> Result<GeneratorBackend, ModelFailure>;

    async fn stream_generate(&self, prompt: &str)
    -> Result<flume::Receiver<StreamItem>, GenerateError>;
}

/// Best-effort text translator. Initialization failure is never fatal to
/// the system; translation failure falls back to the untranslated text.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Returns whether the translator is usable.
    async fn initialize(&self) -> Result<bool, TranslateError>;

    async fn translate(&self, text: &str, target: Language) -> Result<String, TranslateError>;
}

/// Per-language conversation history persistence.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save(
        &self,
        language: Language,
        messages: &[ConversationMessage],
    ) -> Result<(), ProviderError>;

    async fn load(&self, language: Language) -> Result<Vec<ConversationMessage>, ProviderError>;

    /// Wipes every language's stored history.
    async fn clear(&self) -> Result<(), ProviderError>;
}
