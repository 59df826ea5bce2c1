//! Multi-stage system initialization.
//!
//! Sequences knowledge-base ingestion, model initialization, and
//! translator initialization with a fail-fast-on-critical /
//! continue-on-optional policy:
//!
//! ```text
//! NotStarted -> LoadingKnowledgeBase -> LoadingModel -> LoadingTranslator -> Ready
//!                      │                     │
//!                      ▼                     ▼
//!              KnowledgeBaseFailed      ModelFailed        (both terminal)
//! ```
//!
//! Knowledge-base and model failures are fatal: the system never becomes
//! ready and the caller receives a classified [`InitError`]. Translator
//! failure is informational only; the system reaches `Ready` in
//! English-only mode. Initialization runs once per session; a retry
//! resets to `NotStarted` and reruns the whole sequence with no partial
//! resume.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::chunker::structured_chunks;
use crate::errors::{InitError, ProviderError};
use crate::providers::{
    Chunk, ChunkIndex, Document, DocumentStore, EmbeddingProvider, Generator, GeneratorBackend,
    Translator,
};

/// Phase of the initialization state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum InitPhase {
    #[default]
    NotStarted,
    LoadingKnowledgeBase,
    LoadingModel,
    LoadingTranslator,
    Ready,
    /// Terminal: knowledge-base ingestion failed.
    KnowledgeBaseFailed,
    /// Terminal: model initialization failed.
    ModelFailed,
}

impl InitPhase {
    /// Whether this phase is a terminal failure the system cannot leave
    /// without an explicit retry.
    #[must_use]
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, InitPhase::KnowledgeBaseFailed | InitPhase::ModelFailed)
    }
}

/// One raw knowledge-base source handed to ingestion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnowledgeSource {
    pub filename: String,
    pub text: String,
}

impl KnowledgeSource {
    #[must_use]
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
        }
    }
}

/// Counters describing one completed ingestion pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    /// Documents ingested.
    pub documents: usize,
    /// Chunks embedded and inserted into the index.
    pub chunks: usize,
    /// Pre-existing documents superseded by a same-filename re-ingest.
    pub superseded: usize,
}

/// Progress updates emitted while the initialization sequence runs.
#[derive(Clone, Debug)]
pub enum InitUpdate {
    Phase(InitPhase),
    KnowledgeBaseLoaded(IngestionReport),
    /// The sequence finished; the system is ready.
    Completed {
        backend: GeneratorBackend,
        translator_ready: bool,
    },
    /// The sequence halted on a fatal error.
    Failed(InitError),
}

/// Runs the initialization sequence and reports progress on a channel.
pub struct SystemInitializer {
    sources: Vec<KnowledgeSource>,
    max_chunk_size: usize,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn ChunkIndex>,
    documents: Arc<dyn DocumentStore>,
    generator: Arc<dyn Generator>,
    translator: Arc<dyn Translator>,
}

impl SystemInitializer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sources: Vec<KnowledgeSource>,
        max_chunk_size: usize,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn ChunkIndex>,
        documents: Arc<dyn DocumentStore>,
        generator: Arc<dyn Generator>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            sources,
            max_chunk_size,
            embedder,
            index,
            documents,
            generator,
            translator,
        }
    }

    /// Runs the full sequence, sending [`InitUpdate`]s as phases change.
    ///
    /// Send failures are ignored: a dropped receiver means nobody is
    /// observing initialization anymore.
    pub async fn run(&self, updates: flume::Sender<InitUpdate>) {
        let _ = updates.send(InitUpdate::Phase(InitPhase::LoadingKnowledgeBase));
        let report = match self.ingest_knowledge_base().await {
            Ok(report) => report,
            Err(err) => {
                let _ = updates.send(InitUpdate::Phase(InitPhase::KnowledgeBaseFailed));
                let _ = updates.send(InitUpdate::Failed(err));
                return;
            }
        };
        let _ = updates.send(InitUpdate::KnowledgeBaseLoaded(report));

        let _ = updates.send(InitUpdate::Phase(InitPhase::LoadingModel));
        let backend = match self
            .generator
            .initialize(Box::new(|fraction| {
                tracing::debug!(fraction, "model initialization progress");
            }))
            .await
        {
            Ok(backend) => {
                info!(%backend, "generator initialized");
                backend
            }
            Err(failure) => {
                let _ = updates.send(InitUpdate::Phase(InitPhase::ModelFailed));
                let _ = updates.send(InitUpdate::Failed(InitError::Model(failure)));
                return;
            }
        };

        let _ = updates.send(InitUpdate::Phase(InitPhase::LoadingTranslator));
        let translator_ready = match self.translator.initialize().await {
            Ok(ready) => ready,
            Err(err) => {
                // Best-effort: translation failure never blocks readiness.
                warn!(error = %err, "translator unavailable, continuing in English-only mode");
                false
            }
        };

        let _ = updates.send(InitUpdate::Phase(InitPhase::Ready));
        let _ = updates.send(InitUpdate::Completed {
            backend,
            translator_ready,
        });
    }

    /// Ingests every source: chunk, embed, index.
    ///
    /// Re-ingestion is idempotent. A source whose filename already exists
    /// in the document store first deletes the old document and its
    /// chunks, so a knowledge-base update never leaves stale or duplicate
    /// chunks behind.
    async fn ingest_knowledge_base(&self) -> Result<IngestionReport, InitError> {
        let mut report = IngestionReport::default();

        for source in &self.sources {
            if let Some(stale_id) = self
                .documents
                .find_by_filename(&source.filename)
                .await
                .map_err(fatal)?
            {
                let removed = self.index.delete_by_document(stale_id).await.map_err(fatal)?;
                self.documents.delete(stale_id).await.map_err(fatal)?;
                report.superseded += 1;
                info!(
                    filename = %source.filename,
                    removed_chunks = removed,
                    "superseded stale document before re-ingest"
                );
            }

            let document = Document::new(&source.filename, &source.text);
            let document_id = self.documents.add(document).await.map_err(fatal)?;

            let chunks = structured_chunks(&source.text, self.max_chunk_size);
            for text in &chunks {
                let embedding = self.embedder.encode(text).await.map_err(fatal)?;
                self.index
                    .insert(Chunk::new(document_id, &source.filename, text, embedding))
                    .await
                    .map_err(fatal)?;
            }

            info!(
                filename = %source.filename,
                chunks = chunks.len(),
                "ingested knowledge-base document"
            );
            report.documents += 1;
            report.chunks += chunks.len();
        }

        Ok(report)
    }
}

/// Any provider failure during ingestion is fatal to initialization.
fn fatal(err: ProviderError) -> InitError {
    InitError::KnowledgeBase(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{GenerateError, ModelFailure, TranslateError};
    use crate::events::StreamItem;
    use crate::message::Language;
    use crate::providers::memory::{HashEmbedding, MemoryChunkIndex, MemoryDocumentStore};
    use crate::providers::InitProgress;
    use async_trait::async_trait;

    struct StubGenerator {
        failure: Option<ModelFailure>,
    }

    #[async_trait]
    impl Generator for StubGenerator {
        async fn initialize(
            &self,
            progress: InitProgress,
        ) -> Result<GeneratorBackend, ModelFailure> {
            progress(1.0);
            match &self.failure {
                Some(failure) => Err(failure.clone()),
                None => Ok(GeneratorBackend::GeneralPurpose),
            }
        }

        async fn stream_generate(
            &self,
            _prompt: &str,
        ) -> Result<flume::Receiver<StreamItem>, GenerateError> {
            let (_tx, rx) = flume::unbounded();
            Ok(rx)
        }
    }

    struct StubTranslator {
        ready: Result<bool, TranslateError>,
    }

    #[async_trait]
    impl Translator for StubTranslator {
        async fn initialize(&self) -> Result<bool, TranslateError> {
            self.ready.clone()
        }

        async fn translate(&self, text: &str, _target: Language) -> Result<String, TranslateError> {
            Ok(text.to_string())
        }
    }

    fn initializer(
        sources: Vec<KnowledgeSource>,
        model_failure: Option<ModelFailure>,
        translator_ready: Result<bool, TranslateError>,
    ) -> (SystemInitializer, Arc<MemoryChunkIndex>) {
        let index = Arc::new(MemoryChunkIndex::new());
        let init = SystemInitializer::new(
            sources,
            200,
            Arc::new(HashEmbedding::default()),
            Arc::clone(&index) as Arc<dyn ChunkIndex>,
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(StubGenerator {
                failure: model_failure,
            }),
            Arc::new(StubTranslator {
                ready: translator_ready,
            }),
        );
        (init, index)
    }

    async fn run_collecting(init: &SystemInitializer) -> Vec<InitUpdate> {
        let (tx, rx) = flume::unbounded();
        init.run(tx).await;
        rx.drain().collect()
    }

    #[tokio::test]
    async fn happy_path_reaches_ready() {
        let sources = vec![KnowledgeSource::new("kb.txt", "SECTION A\n-----\nSECTION B")];
        let (init, index) = initializer(sources, None, Ok(true));
        let updates = run_collecting(&init).await;

        assert!(matches!(
            updates.last(),
            Some(InitUpdate::Completed {
                translator_ready: true,
                ..
            })
        ));
        assert_eq!(index.count().await.unwrap(), 2);

        let phases: Vec<InitPhase> = updates
            .iter()
            .filter_map(|u| match u {
                InitUpdate::Phase(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                InitPhase::LoadingKnowledgeBase,
                InitPhase::LoadingModel,
                InitPhase::LoadingTranslator,
                InitPhase::Ready,
            ]
        );
    }

    #[tokio::test]
    async fn model_failure_is_terminal() {
        let sources = vec![KnowledgeSource::new("kb.txt", "content")];
        let (init, _) = initializer(
            sources,
            Some(ModelFailure::DownloadFailed("offline".into())),
            Ok(true),
        );
        let updates = run_collecting(&init).await;

        assert!(matches!(
            updates.last(),
            Some(InitUpdate::Failed(InitError::Model(
                ModelFailure::DownloadFailed(_)
            )))
        ));
        // The translator phase is never attempted.
        assert!(!updates.iter().any(|u| matches!(
            u,
            InitUpdate::Phase(InitPhase::LoadingTranslator)
        )));
    }

    #[tokio::test]
    async fn translator_failure_still_reaches_ready() {
        let sources = vec![KnowledgeSource::new("kb.txt", "content")];
        let (init, _) = initializer(
            sources,
            None,
            Err(TranslateError::Failed("no model".into())),
        );
        let updates = run_collecting(&init).await;

        assert!(matches!(
            updates.last(),
            Some(InitUpdate::Completed {
                translator_ready: false,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn reingest_supersedes_same_filename() {
        let sources = vec![
            KnowledgeSource::new("kb.txt", "old content\n-----\nmore old content"),
            KnowledgeSource::new("kb.txt", "new content"),
        ];
        let (init, index) = initializer(sources, None, Ok(true));
        let updates = run_collecting(&init).await;

        // The second ingest of kb.txt replaces the first outright.
        assert_eq!(index.count().await.unwrap(), 1);
        let report = updates
            .iter()
            .find_map(|u| match u {
                InitUpdate::KnowledgeBaseLoaded(report) => Some(*report),
                _ => None,
            })
            .expect("ingestion report");
        assert_eq!(report.superseded, 1);
        assert_eq!(report.documents, 2);
    }

    #[test]
    fn terminal_failure_phases() {
        assert!(InitPhase::KnowledgeBaseFailed.is_terminal_failure());
        assert!(InitPhase::ModelFailed.is_terminal_failure());
        assert!(!InitPhase::Ready.is_terminal_failure());
        assert!(!InitPhase::NotStarted.is_terminal_failure());
    }
}
