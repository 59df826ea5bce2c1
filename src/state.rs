//! Engine state and its immutable snapshots.
//!
//! [`EngineState`] is owned by exactly one writer, the engine actor; every
//! mutation goes through that actor's message handler. Observers never see
//! the live state. Instead the actor publishes cloned, immutable
//! [`EngineSnapshot`]s after each mutation, so readers always observe a
//! consistent point-in-time view, tagged with a monotonically increasing
//! version.
//!
//! Message histories are kept as a map from [`Language`] to an ordered
//! message list. The two per-language histories are independently
//! addressable at all times; a language switch swaps which one is active
//! and never interleaves or merges them.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::errors::BlockingError;
use crate::init::{IngestionReport, InitPhase};
use crate::message::{ConversationMessage, Language};
use crate::providers::GeneratorBackend;
use crate::retrieval::RetrievedContext;

/// Live engine state. Single writer; see the module docs.
#[derive(Clone, Debug, Default)]
pub struct EngineState {
    pub init_phase: InitPhase,
    pub knowledge_base_ready: bool,
    pub model_ready: bool,
    pub translator_ready: bool,
    pub backend: Option<GeneratorBackend>,
    pub ingestion: Option<IngestionReport>,
    pub active_language: Language,
    histories: FxHashMap<Language, Vec<ConversationMessage>>,
    /// The answer-so-far for the in-flight request, full buffer not delta.
    pub streaming_buffer: Option<String>,
    /// Contexts retrieved for the in-flight request, for citation display.
    pub retrieved_contexts: Vec<RetrievedContext>,
    pub generating: bool,
    /// Transient per-query notice; cleared by the next accepted query.
    pub notice: Option<String>,
    /// Fatal init error awaiting dismiss/retry/exit.
    pub blocking_error: Option<BlockingError>,
    version: u64,
}

impl EngineState {
    /// Fresh state with the given language active.
    #[must_use]
    pub fn with_language(language: Language) -> Self {
        Self {
            active_language: language,
            ..Self::default()
        }
    }

    /// Overall readiness: knowledge base AND model. Translator readiness
    /// is informational only and never gates this.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.knowledge_base_ready && self.model_ready
    }

    /// Read access to a language's history.
    #[must_use]
    pub fn history(&self, language: Language) -> &[ConversationMessage] {
        self.histories
            .get(&language)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Read access to the active language's history.
    #[must_use]
    pub fn active_history(&self) -> &[ConversationMessage] {
        self.history(self.active_language)
    }

    /// Appends a message to the active language's history.
    pub fn push_message(&mut self, message: ConversationMessage) {
        self.histories
            .entry(self.active_language)
            .or_default()
            .push(message);
    }

    /// Replaces a language's history wholesale (used when loading a
    /// persisted history on language switch).
    pub fn set_history(&mut self, language: Language, messages: Vec<ConversationMessage>) {
        self.histories.insert(language, messages);
    }

    /// Clears the active language's history.
    pub fn clear_active_history(&mut self) {
        self.histories.insert(self.active_language, Vec::new());
    }

    /// Resets every initialization-derived field for a retry. Histories
    /// and the active language survive.
    pub fn reset_for_retry(&mut self) {
        self.init_phase = InitPhase::NotStarted;
        self.knowledge_base_ready = false;
        self.model_ready = false;
        self.translator_ready = false;
        self.backend = None;
        self.ingestion = None;
        self.blocking_error = None;
        self.streaming_buffer = None;
        self.generating = false;
    }

    /// Clones the current state into an immutable snapshot and bumps the
    /// version.
    pub fn snapshot(&mut self) -> EngineSnapshot {
        self.version += 1;
        EngineSnapshot {
            version: self.version,
            ready: self.ready(),
            init_phase: self.init_phase,
            knowledge_base_ready: self.knowledge_base_ready,
            model_ready: self.model_ready,
            translator_ready: self.translator_ready,
            backend: self.backend,
            ingestion: self.ingestion,
            active_language: self.active_language,
            messages: self.active_history().to_vec(),
            streaming_buffer: self.streaming_buffer.clone(),
            retrieved_contexts: self.retrieved_contexts.clone(),
            generating: self.generating,
            notice: self.notice.clone(),
            blocking_error: self.blocking_error.clone(),
        }
    }
}

/// Immutable point-in-time view of the engine, published to observers
/// after every state transition.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EngineSnapshot {
    /// Monotonically increasing; two snapshots with the same version are
    /// identical.
    pub version: u64,
    /// Knowledge base AND model ready; translation availability is
    /// reported separately via `translator_ready`.
    pub ready: bool,
    pub init_phase: InitPhase,
    pub knowledge_base_ready: bool,
    pub model_ready: bool,
    pub translator_ready: bool,
    pub backend: Option<GeneratorBackend>,
    pub ingestion: Option<IngestionReport>,
    pub active_language: Language,
    /// The active language's history.
    pub messages: Vec<ConversationMessage>,
    pub streaming_buffer: Option<String>,
    pub retrieved_contexts: Vec<RetrievedContext>,
    pub generating: bool,
    pub notice: Option<String>,
    pub blocking_error: Option<BlockingError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_language_starts_empty_in_that_language() {
        let state = EngineState::with_language(Language::Russian);
        assert_eq!(state.active_language, Language::Russian);
        assert!(state.active_history().is_empty());
        assert!(!state.ready());
    }

    #[test]
    fn ready_requires_kb_and_model_only() {
        let mut state = EngineState::default();
        assert!(!state.ready());
        state.knowledge_base_ready = true;
        assert!(!state.ready());
        state.model_ready = true;
        assert!(state.ready());
        // Translator is informational.
        state.translator_ready = false;
        assert!(state.ready());
    }

    #[test]
    fn histories_are_independent() {
        let mut state = EngineState::default();
        state.push_message(ConversationMessage::user("english one"));
        state.active_language = Language::Russian;
        state.push_message(ConversationMessage::user("русский один"));

        assert_eq!(state.history(Language::English).len(), 1);
        assert_eq!(state.history(Language::Russian).len(), 1);
        assert_eq!(state.history(Language::English)[0].content, "english one");
    }

    #[test]
    fn snapshot_is_independent_of_later_mutation() {
        let mut state = EngineState::default();
        state.push_message(ConversationMessage::user("before"));
        let snapshot = state.snapshot();

        state.push_message(ConversationMessage::user("after"));
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(state.active_history().len(), 2);
    }

    #[test]
    fn snapshot_versions_increase() {
        let mut state = EngineState::default();
        let first = state.snapshot();
        let second = state.snapshot();
        assert!(second.version > first.version);
    }

    #[test]
    fn retry_reset_preserves_histories() {
        let mut state = EngineState::default();
        state.push_message(ConversationMessage::user("kept"));
        state.knowledge_base_ready = true;
        state.model_ready = true;
        state.blocking_error = Some(crate::errors::BlockingError {
            title: "t".into(),
            message: "m".into(),
            category: crate::errors::ErrorCategory::Model,
        });

        state.reset_for_retry();
        assert!(!state.ready());
        assert!(state.blocking_error.is_none());
        assert_eq!(state.active_history().len(), 1);
    }
}
