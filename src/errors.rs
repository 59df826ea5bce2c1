//! Classified error taxonomy for the engine.
//!
//! Errors are split by blast radius:
//!
//! - [`InitError`] — fatal during initialization; the system never becomes
//!   ready and the caller gets a [`BlockingError`] with retry semantics.
//! - [`ModelFailure`] — sub-classified model initialization failure carried
//!   inside [`InitError::Model`]; each sub-class maps to a distinct
//!   user-facing message that is surfaced verbatim.
//! - [`ProviderError`] — collaborator call failures (embedding, index,
//!   stores); fatal during ingestion, recoverable at query time.
//! - [`GenerateError`] / [`TranslateError`] — per-query failures; the first
//!   terminates only the affected request, the second falls back silently
//!   to the untranslated answer.

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Sub-classified generative model initialization failure.
///
/// All variants are fatal to chat capability. The classification exists so
/// each failure mode reaches the user with a distinct message rather than a
/// generic "model failed to load".
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ModelFailure {
    /// Fetching the model artifact failed.
    #[error("model download failed: {0}")]
    #[diagnostic(
        code(docent::init::model_download),
        help("Check connectivity and free disk space, then retry initialization.")
    )]
    DownloadFailed(String),

    /// The primary backend failed and the fallback backend also failed.
    #[error("both model backends failed (primary: {primary}; fallback: {fallback})")]
    #[diagnostic(
        code(docent::init::model_backends),
        help("The device supports neither the accelerated nor the general-purpose backend.")
    )]
    BothBackendsFailed { primary: String, fallback: String },

    /// The model loaded but its warmup pass failed.
    #[error("model warmup failed: {0}")]
    #[diagnostic(code(docent::init::model_warmup))]
    WarmupFailed(String),

    /// Anything the generator could not classify further.
    #[error("model initialization failed: {0}")]
    #[diagnostic(code(docent::init::model_unknown))]
    Unknown(String),
}

impl ModelFailure {
    /// The message shown to the user for this failure class, verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ModelFailure::DownloadFailed(detail) => {
                format!("The language model could not be downloaded. {detail}")
            }
            ModelFailure::BothBackendsFailed { primary, fallback } => format!(
                "The language model failed to start on this device. \
                 Accelerated backend: {primary}. General-purpose backend: {fallback}."
            ),
            ModelFailure::WarmupFailed(detail) => {
                format!("The language model loaded but failed its first run. {detail}")
            }
            ModelFailure::Unknown(detail) => {
                format!("The language model could not be initialized. {detail}")
            }
        }
    }
}

/// Fatal initialization error. The system cannot proceed to chat.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum InitError {
    /// Knowledge-base ingestion failed: asset read, chunking, or index write.
    #[error("knowledge base ingestion failed: {0}")]
    #[diagnostic(
        code(docent::init::knowledge_base),
        help("The knowledge base could not be loaded. Retry initialization or reinstall the assets.")
    )]
    KnowledgeBase(String),

    /// Model initialization failed, with a classified reason.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelFailure),
}

/// Failure from one of the external collaborators consumed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ProviderError {
    #[error("embedding provider error: {0}")]
    #[diagnostic(code(docent::provider::embedding))]
    Embedding(String),

    #[error("chunk index error: {0}")]
    #[diagnostic(code(docent::provider::index))]
    Index(String),

    #[error("document store error: {0}")]
    #[diagnostic(code(docent::provider::document_store))]
    DocumentStore(String),

    #[error("history store error: {0}")]
    #[diagnostic(code(docent::provider::history_store))]
    HistoryStore(String),
}

/// Per-query generation failure. Terminates only the affected request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum GenerateError {
    /// The generator reported an error mid-stream.
    #[error("generation failed: {0}")]
    #[diagnostic(code(docent::generate::stream))]
    Stream(String),

    /// The stream channel closed before a terminal chunk arrived.
    #[error("generation stream ended without a terminal chunk")]
    #[diagnostic(code(docent::generate::truncated))]
    TruncatedStream,
}

/// Translation failure. Never surfaced as a hard error; the orchestrator
/// falls back to the untranslated answer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum TranslateError {
    #[error("translation failed: {0}")]
    #[diagnostic(code(docent::translate::failed))]
    Failed(String),
}

/// Errors from the engine handle itself.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum EngineError {
    /// The engine actor has shut down and can no longer accept commands.
    #[error("engine is no longer running")]
    #[diagnostic(code(docent::engine::disconnected))]
    Disconnected,
}

/// Category tag for a [`BlockingError`], naming which init stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    KnowledgeBase,
    Model,
}

/// A fatal, user-blocking error surfaced by the snapshot.
///
/// Carries everything a UI needs to render a blocking dialog: a short
/// title, the classified user-facing message, and the failed category.
/// The caller's actions are dismiss, retry (restarts the full init
/// sequence via [`crate::events::EngineCommand::RetryInit`]), or exit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockingError {
    pub title: String,
    pub message: String,
    pub category: ErrorCategory,
}

impl BlockingError {
    /// Classifies a fatal [`InitError`] into its user-facing form.
    #[must_use]
    pub fn from_init(error: &InitError) -> Self {
        match error {
            InitError::KnowledgeBase(detail) => Self {
                title: "Knowledge base unavailable".to_string(),
                message: format!("The knowledge base could not be loaded: {detail}"),
                category: ErrorCategory::KnowledgeBase,
            },
            InitError::Model(failure) => Self {
                title: "Model unavailable".to_string(),
                message: failure.user_message(),
                category: ErrorCategory::Model,
            },
        }
    }
}
