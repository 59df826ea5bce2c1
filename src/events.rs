//! Event and command unions exchanged with the engine actor.
//!
//! All caller interaction goes through [`EngineCommand`] values submitted to
//! the engine's inbox; all generation progress flows back as
//! [`GenerationUpdate`] values tagged with the [`RequestToken`] of the
//! request they belong to. Both are plain tagged unions dispatched through
//! single exhaustive `match` handlers, so adding a variant is a compile
//! error everywhere it matters.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::GenerateError;
use crate::message::Language;
use crate::retrieval::RetrievedContext;

/// A caller-submitted command for the engine actor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Submit a user query. Rejected with a notice when the system is not
    /// ready, the text is blank, or a generation is already in flight.
    StartQuery(String),
    /// Swap the active language, persisting the outgoing history first.
    ChangeLanguage(Language),
    /// Clear the active language's history, in memory and persisted.
    ClearHistory,
    /// Reset initialization to its starting state and rerun the sequence.
    RetryInit,
    /// Stop the engine actor.
    Shutdown,
}

/// Identifies one retrieval+generation request.
///
/// Every update emitted for a request carries its token; the engine drops
/// updates whose token no longer matches the active request, so a stale
/// stream (e.g. after a language switch) can never touch the wrong history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken(Uuid);

impl RequestToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One chunk of a generator's output stream: a text delta plus the
/// terminal flag. Exactly one chunk per stream has `is_final` set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamChunk {
    pub text: String,
    pub is_final: bool,
}

impl StreamChunk {
    #[must_use]
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    #[must_use]
    pub fn final_chunk(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Item type of a generator stream channel.
pub type StreamItem = Result<StreamChunk, GenerateError>;

/// Progress of one in-flight request, as observed by the engine.
///
/// `Partial` always carries the full accumulated buffer so far, never a raw
/// delta, so observers render the complete answer-in-progress at any point.
/// Exactly one terminal variant (`Completed` or `Failed`) is delivered per
/// request and nothing follows it.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationUpdate {
    /// Retrieval finished; contexts surfaced for citation display.
    Retrieved { contexts: Vec<RetrievedContext> },
    /// The answer so far, monotonically growing.
    Partial { buffer: String },
    /// Terminal success with the final (possibly translated) answer.
    Completed { text: String },
    /// Terminal failure carrying the underlying message.
    Failed { message: String },
}

impl GenerationUpdate {
    /// Whether this update ends its request.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationUpdate::Completed { .. } | GenerationUpdate::Failed { .. }
        )
    }
}
