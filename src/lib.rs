//! # Docent: on-device retrieval-augmented generation engine
//!
//! Docent ingests a text knowledge base, splits it into structure-aware
//! chunks, embeds and indexes them, and answers queries by retrieving and
//! deduplicating relevant chunks, building a grounded prompt, and
//! streaming the generated answer back — optionally translating the
//! finished answer into a second language.
//!
//! ## Core pieces
//!
//! - **Chunker** ([`chunker`]): separator- and paragraph-aware splitting.
//! - **Retriever** ([`retrieval`]): top-K similarity search with
//!   substring and token-Jaccard near-duplicate filtering.
//! - **PromptBuilder** ([`prompt`]): grounded prompt with a verbatim
//!   "don't know" fallback instruction.
//! - **GenerationOrchestrator** ([`generation`]): streaming state machine
//!   with exactly-one-terminal semantics and post-stream translation.
//! - **SystemInitializer** ([`init`]): fail-fast-on-critical,
//!   continue-on-optional startup sequencing.
//! - **Engine** ([`engine`]): the single-owner actor serializing all
//!   state transitions and publishing immutable snapshots.
//!
//! External collaborators (embedding model, vector index, generator,
//! translator, persistence) are async traits in [`providers`], with
//! in-memory reference implementations in [`providers::memory`].
//!
//! ## Quick start
//!
//! ```
//! use docent::chunker::structured_chunks;
//!
//! let chunks = structured_chunks("INTRO\n-----\nDETAILS", 500);
//! assert_eq!(chunks, vec!["INTRO".to_string(), "DETAILS".to_string()]);
//! ```
//!
//! Driving the full engine requires collaborator implementations; see
//! `tests/engine_integration.rs` for an end-to-end example built on the
//! in-memory providers.

pub mod chunker;
pub mod engine;
pub mod errors;
pub mod events;
pub mod generation;
pub mod init;
pub mod message;
pub mod prompt;
pub mod providers;
pub mod retrieval;
pub mod state;

pub use engine::{Engine, EngineConfig, EngineDeps, EngineHandle};
pub use errors::{BlockingError, EngineError, InitError, ModelFailure};
pub use events::{EngineCommand, GenerationUpdate, RequestToken, StreamChunk};
pub use init::{InitPhase, IngestionReport, KnowledgeSource};
pub use message::{ConversationMessage, Language};
pub use retrieval::{Retrieval, RetrievedContext, Retriever};
pub use state::EngineSnapshot;
