//! Full pipeline on the in-memory providers: ingest a small knowledge
//! base, ask one question, and watch the answer stream through the
//! snapshot channel.
//!
//! Run with:
//!
//! ```bash
//! RUST_LOG=info cargo run --example memory_pipeline
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use docent::engine::{Engine, EngineConfig, EngineDeps};
use docent::errors::{GenerateError, ModelFailure, TranslateError};
use docent::events::{StreamChunk, StreamItem};
use docent::init::KnowledgeSource;
use docent::message::Language;
use docent::providers::memory::{
    HashEmbedding, MemoryChunkIndex, MemoryDocumentStore, MemoryHistoryStore,
};
use docent::providers::{Generator, GeneratorBackend, InitProgress, Translator};

const KB: &str = "Basil needs watering twice a week and at least six hours of \
                  direct sun per day.\n\
                  -----\n\
                  Rosemary prefers dry soil; water it only when the top layer \
                  is fully dry.\n\
                  -----\n\
                  Mint spreads aggressively and is best kept in its own pot.";

/// Stand-in for a real on-device model: streams a canned answer word by
/// word with a small delay so the streaming path is visible.
struct CannedGenerator;

#[async_trait]
impl Generator for CannedGenerator {
    async fn initialize(&self, progress: InitProgress) -> Result<GeneratorBackend, ModelFailure> {
        for step in 0..=4 {
            progress(step as f32 / 4.0);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(GeneratorBackend::GeneralPurpose)
    }

    async fn stream_generate(
        &self,
        _prompt: &str,
    ) -> Result<flume::Receiver<StreamItem>, GenerateError> {
        let words: Vec<&str> = "Water basil twice a week and give it at least six hours of sun."
            .split(' ')
            .collect();
        let (tx, rx) = flume::unbounded();
        tokio::spawn(async move {
            let last = words.len() - 1;
            for (i, word) in words.into_iter().enumerate() {
                tokio::time::sleep(Duration::from_millis(80)).await;
                let text = if i == last {
                    word.to_string()
                } else {
                    format!("{word} ")
                };
                let chunk = if i == last {
                    StreamChunk::final_chunk(text)
                } else {
                    StreamChunk::partial(text)
                };
                if tx.send_async(Ok(chunk)).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Translator that never comes up; the demo runs in English-only mode.
struct OfflineTranslator;

#[async_trait]
impl Translator for OfflineTranslator {
    async fn initialize(&self) -> Result<bool, TranslateError> {
        Ok(false)
    }

    async fn translate(&self, _text: &str, _target: Language) -> Result<String, TranslateError> {
        Err(TranslateError::Failed("translator offline".into()))
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let engine = Engine::spawn(
        EngineConfig::default(),
        EngineDeps {
            embedder: Arc::new(HashEmbedding::default()),
            index: Arc::new(MemoryChunkIndex::new()),
            documents: Arc::new(MemoryDocumentStore::new()),
            generator: Arc::new(CannedGenerator),
            translator: Arc::new(OfflineTranslator),
            history: Arc::new(MemoryHistoryStore::new()),
            knowledge_base: vec![KnowledgeSource::new("herbs.txt", KB)],
        },
    );

    let ready = engine.wait_for(|s| s.ready).await?;
    let report = ready.ingestion.expect("ingestion report");
    println!(
        "ready on {} backend, {} chunks from {} document(s)\n",
        ready.backend.expect("backend"),
        report.chunks,
        report.documents
    );

    let question = "How often should I water basil?";
    println!("Q: {question}");
    engine.start_query(question)?;

    let mut snapshots = engine.subscribe();
    loop {
        if snapshots.changed().await.is_err() {
            break;
        }
        let snapshot = snapshots.borrow_and_update().clone();
        if let Some(buffer) = &snapshot.streaming_buffer {
            println!("  … {buffer}");
        }
        if !snapshot.generating
            && snapshot.messages.last().is_some_and(|m| !m.from_user)
        {
            println!("\nA: {}", snapshot.messages.last().expect("answer").content);
            println!(
                "\ngrounded on:\n{}",
                serde_json::to_string_pretty(&snapshot.retrieved_contexts).expect("json")
            );
            break;
        }
    }

    engine.shutdown()?;
    Ok(())
}
