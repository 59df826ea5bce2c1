//! The engine actor: a single-owner task serializing all state
//! transitions.
//!
//! Every mutation of [`EngineState`] flows through one inbound message
//! queue processed by one task, so concurrent initialization, streaming
//! generation, and caller commands never race on shared mutable memory.
//! After each transition the actor publishes an immutable
//! [`EngineSnapshot`] on a watch channel.
//!
//! ```text
//!  callers ──EngineCommand──┐
//!  init task ──InitUpdate───┼──► inbox ──► actor ──► watch<EngineSnapshot>
//!  generation ─GenerationUpdate(token)─┘
//! ```
//!
//! Query dispatch per conversation: at most one generation is in flight;
//! new queries are rejected with a notice while one is `Generating`.
//! Every generation carries a [`RequestToken`], and updates whose token no
//! longer matches the active request are dropped, so a stale stream (for
//! example after a language switch) can never touch the wrong history.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::errors::{BlockingError, EngineError};
use crate::events::{EngineCommand, GenerationUpdate, RequestToken};
use crate::generation::GenerationOrchestrator;
use crate::init::{InitUpdate, KnowledgeSource, SystemInitializer};
use crate::message::{ConversationMessage, Language};
use crate::prompt::PromptBuilder;
use crate::providers::{
    ChunkIndex, DocumentStore, EmbeddingProvider, Generator, HistoryStore, Translator,
};
use crate::retrieval::Retriever;
use crate::state::{EngineSnapshot, EngineState};

/// Tunable engine parameters.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Maximum chunk size handed to the chunker during ingestion.
    pub max_chunk_size: usize,
    /// How many contexts retrieval may accept per query.
    pub retrieval_top_n: usize,
    /// Token-Jaccard near-duplicate threshold.
    pub jaccard_threshold: f32,
    /// Trailing conversation turns rendered into the prompt.
    pub history_turns: usize,
    /// Language active at startup.
    pub initial_language: Language,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            retrieval_top_n: 3,
            jaccard_threshold: crate::retrieval::DEFAULT_JACCARD_THRESHOLD,
            history_turns: crate::prompt::DEFAULT_HISTORY_TURNS,
            initial_language: Language::English,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    #[must_use]
    pub fn with_retrieval_top_n(mut self, top_n: usize) -> Self {
        self.retrieval_top_n = top_n;
        self
    }

    #[must_use]
    pub fn with_jaccard_threshold(mut self, threshold: f32) -> Self {
        self.jaccard_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    #[must_use]
    pub fn with_initial_language(mut self, language: Language) -> Self {
        self.initial_language = language;
        self
    }
}

/// The external collaborators and knowledge base the engine runs on.
pub struct EngineDeps {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn ChunkIndex>,
    pub documents: Arc<dyn DocumentStore>,
    pub generator: Arc<dyn Generator>,
    pub translator: Arc<dyn Translator>,
    pub history: Arc<dyn HistoryStore>,
    pub knowledge_base: Vec<KnowledgeSource>,
}

/// Everything the actor can receive on its inbox.
enum EngineMsg {
    Command(EngineCommand),
    Init(InitUpdate),
    Generation {
        token: RequestToken,
        update: GenerationUpdate,
    },
}

/// Cloneable handle to a running engine.
///
/// Commands are fire-and-forget into the actor's inbox; results surface
/// through the snapshot stream.
#[derive(Clone)]
pub struct EngineHandle {
    tx: flume::Sender<EngineMsg>,
    snapshots: watch::Receiver<EngineSnapshot>,
}

impl EngineHandle {
    /// Submits a command to the engine.
    pub fn submit(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.tx
            .send(EngineMsg::Command(command))
            .map_err(|_| EngineError::Disconnected)
    }

    pub fn start_query(&self, text: impl Into<String>) -> Result<(), EngineError> {
        self.submit(EngineCommand::StartQuery(text.into()))
    }

    pub fn change_language(&self, language: Language) -> Result<(), EngineError> {
        self.submit(EngineCommand::ChangeLanguage(language))
    }

    pub fn clear_history(&self) -> Result<(), EngineError> {
        self.submit(EngineCommand::ClearHistory)
    }

    pub fn retry_init(&self) -> Result<(), EngineError> {
        self.submit(EngineCommand::RetryInit)
    }

    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.submit(EngineCommand::Shutdown)
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A fresh subscription to the snapshot stream.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a published snapshot satisfies `predicate` and returns
    /// it. Checks the current snapshot first.
    pub async fn wait_for(
        &self,
        predicate: impl Fn(&EngineSnapshot) -> bool,
    ) -> Result<EngineSnapshot, EngineError> {
        let mut rx = self.snapshots.clone();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&snapshot) {
                    return Ok(snapshot.clone());
                }
            }
            rx.changed().await.map_err(|_| EngineError::Disconnected)?;
        }
    }
}

/// Spawns the engine actor and kicks off initialization.
pub struct Engine;

impl Engine {
    /// Starts the actor and returns a handle. Initialization begins
    /// immediately; observe progress via the snapshot stream.
    pub fn spawn(config: EngineConfig, deps: EngineDeps) -> EngineHandle {
        let (tx, rx) = flume::unbounded();

        let retriever = Retriever::new(Arc::clone(&deps.embedder), Arc::clone(&deps.index))
            .with_jaccard_threshold(config.jaccard_threshold);
        let prompt_builder = PromptBuilder::new().with_history_turns(config.history_turns);
        let orchestrator =
            GenerationOrchestrator::new(Arc::clone(&deps.generator), Arc::clone(&deps.translator));
        let initializer = Arc::new(SystemInitializer::new(
            deps.knowledge_base,
            config.max_chunk_size,
            deps.embedder,
            deps.index,
            deps.documents,
            deps.generator,
            deps.translator,
        ));

        let mut state = EngineState::with_language(config.initial_language);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());

        let mut actor = EngineActor {
            config,
            state,
            self_tx: tx.clone(),
            snapshots: snapshot_tx,
            retriever,
            prompt_builder,
            orchestrator,
            initializer,
            history: deps.history,
            active_request: None,
            init_running: false,
        };
        actor.spawn_init();

        tokio::spawn(async move {
            loop {
                let Ok(msg) = rx.recv_async().await else { break };
                if actor.handle(msg).await.is_break() {
                    break;
                }
            }
            debug!("engine actor stopped");
        });

        EngineHandle {
            tx,
            snapshots: snapshot_rx,
        }
    }
}

struct EngineActor {
    config: EngineConfig,
    state: EngineState,
    self_tx: flume::Sender<EngineMsg>,
    snapshots: watch::Sender<EngineSnapshot>,
    retriever: Retriever,
    prompt_builder: PromptBuilder,
    orchestrator: GenerationOrchestrator,
    initializer: Arc<SystemInitializer>,
    history: Arc<dyn HistoryStore>,
    /// Token of the in-flight generation, if any. Updates with any other
    /// token are dropped.
    active_request: Option<RequestToken>,
    init_running: bool,
}

impl EngineActor {
    fn publish(&mut self) {
        let _ = self.snapshots.send(self.state.snapshot());
    }

    /// Forwards the initializer's updates into the inbox from a spawned
    /// task.
    fn spawn_init(&mut self) {
        self.init_running = true;
        let initializer = Arc::clone(&self.initializer);
        let inbox = self.self_tx.clone();
        tokio::spawn(async move {
            let (tx, rx) = flume::unbounded();
            let forward = tokio::spawn(async move {
                while let Ok(update) = rx.recv_async().await {
                    if inbox.send(EngineMsg::Init(update)).is_err() {
                        break;
                    }
                }
            });
            initializer.run(tx).await;
            let _ = forward.await;
        });
    }

    async fn handle(&mut self, msg: EngineMsg) -> std::ops::ControlFlow<()> {
        match msg {
            EngineMsg::Command(EngineCommand::Shutdown) => return std::ops::ControlFlow::Break(()),
            EngineMsg::Command(EngineCommand::StartQuery(text)) => self.start_query(text),
            EngineMsg::Command(EngineCommand::ChangeLanguage(language)) => {
                self.change_language(language).await;
            }
            EngineMsg::Command(EngineCommand::ClearHistory) => self.clear_history().await,
            EngineMsg::Command(EngineCommand::RetryInit) => self.retry_init(),
            EngineMsg::Init(update) => self.apply_init(update),
            EngineMsg::Generation { token, update } => self.apply_generation(token, update).await,
        }
        std::ops::ControlFlow::Continue(())
    }

    /// Query dispatch guard and kickoff: `Idle -> Generating` or a
    /// rejection notice with no state change beyond the notice itself.
    fn start_query(&mut self, text: String) {
        let text = text.trim().to_string();
        if !self.state.ready() {
            self.state.notice = Some("The system is still starting up. Please wait.".to_string());
            self.publish();
            return;
        }
        if text.is_empty() {
            self.state.notice = Some("Please enter a question.".to_string());
            self.publish();
            return;
        }
        if self.state.generating {
            self.state.notice =
                Some("An answer is already being generated. Please wait for it.".to_string());
            self.publish();
            return;
        }

        // History for the prompt is the conversation before this query.
        let prior_history = self.state.active_history().to_vec();

        self.state.notice = None;
        self.state.retrieved_contexts = Vec::new();
        self.state.streaming_buffer = Some(String::new());
        self.state.push_message(ConversationMessage::user(&text));
        self.state.generating = true;

        let token = RequestToken::new();
        self.active_request = Some(token);
        self.publish();

        let translate_to = self
            .state
            .active_language
            .needs_translation()
            .then_some(self.state.active_language);
        let retriever = self.retriever.clone();
        let prompt_builder = self.prompt_builder.clone();
        let orchestrator = self.orchestrator.clone();
        let top_n = self.config.retrieval_top_n;
        let inbox = self.self_tx.clone();

        tokio::spawn(async move {
            let send = |update: GenerationUpdate| {
                inbox.send(EngineMsg::Generation { token, update }).is_ok()
            };

            let retrieval = match retriever.retrieve(&text, top_n).await {
                Ok(retrieval) => retrieval,
                Err(err) => {
                    send(GenerationUpdate::Failed {
                        message: err.to_string(),
                    });
                    return;
                }
            };
            if !send(GenerationUpdate::Retrieved {
                contexts: retrieval.contexts.clone(),
            }) {
                return;
            }

            let prompt = prompt_builder.build(&text, &retrieval.joined_context, &prior_history);
            let updates = orchestrator.stream_answer(prompt, translate_to);
            while let Ok(update) = updates.recv_async().await {
                if !send(update) {
                    break;
                }
            }
        });
    }

    /// Applies a generation update, dropping it when its token is stale.
    async fn apply_generation(&mut self, token: RequestToken, update: GenerationUpdate) {
        if self.active_request != Some(token) {
            debug!("dropping generation update from a stale request");
            return;
        }

        match update {
            GenerationUpdate::Retrieved { contexts } => {
                self.state.retrieved_contexts = contexts;
            }
            GenerationUpdate::Partial { buffer } => {
                self.state.streaming_buffer = Some(buffer);
            }
            GenerationUpdate::Completed { text } => {
                self.state.push_message(ConversationMessage::assistant(text));
                self.state.streaming_buffer = None;
                self.state.generating = false;
                self.active_request = None;
                self.persist_active_history().await;
            }
            GenerationUpdate::Failed { message } => {
                // No partial assistant message is ever committed.
                self.state.notice = Some(message);
                self.state.streaming_buffer = None;
                self.state.generating = false;
                self.active_request = None;
            }
        }
        self.publish();
    }

    /// Persists the outgoing language's history, loads the target's, and
    /// resets the in-flight display without touching stored histories.
    async fn change_language(&mut self, language: Language) {
        if language == self.state.active_language {
            return;
        }

        self.persist_active_history().await;

        let loaded = match self.history.load(language).await {
            Ok(messages) => messages,
            Err(err) => {
                debug!(error = %err, "history load failed, starting empty");
                Vec::new()
            }
        };
        self.state.set_history(language, loaded);
        self.state.active_language = language;

        // The display resets; any in-flight generation keeps running but
        // its token no longer matches, so its updates are dropped.
        self.state.streaming_buffer = None;
        self.state.retrieved_contexts = Vec::new();
        self.state.generating = false;
        self.state.notice = None;
        self.active_request = None;

        info!(language = %language, "switched active language");
        self.publish();
    }

    async fn clear_history(&mut self) {
        self.state.clear_active_history();
        self.persist_active_history().await;
        self.publish();
    }

    fn retry_init(&mut self) {
        if self.init_running {
            debug!("ignoring retry while initialization is already running");
            return;
        }
        self.state.reset_for_retry();
        self.publish();
        self.spawn_init();
    }

    fn apply_init(&mut self, update: InitUpdate) {
        match update {
            InitUpdate::Phase(phase) => {
                self.state.init_phase = phase;
            }
            InitUpdate::KnowledgeBaseLoaded(report) => {
                self.state.knowledge_base_ready = true;
                self.state.ingestion = Some(report);
            }
            InitUpdate::Completed {
                backend,
                translator_ready,
            } => {
                self.state.model_ready = true;
                self.state.translator_ready = translator_ready;
                self.state.backend = Some(backend);
                self.init_running = false;
                info!(%backend, translator_ready, "initialization complete");
            }
            InitUpdate::Failed(error) => {
                self.state.blocking_error = Some(BlockingError::from_init(&error));
                self.init_running = false;
            }
        }
        self.publish();
    }

    async fn persist_active_history(&mut self) {
        let language = self.state.active_language;
        if let Err(err) = self
            .history
            .save(language, self.state.active_history())
            .await
        {
            debug!(error = %err, "history persistence failed");
        }
    }
}
