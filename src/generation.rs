//! Streaming generation orchestration.
//!
//! Drives one generator stream per request through the state machine
//! `Idle -> Streaming -> {Completed | Failed}`. Partial chunks are
//! accumulated into a buffer and the full buffer-so-far is published on
//! every partial, so observers always render the complete answer in
//! progress. On the terminal chunk the orchestrator optionally translates
//! the finished answer, showing a `(translating...)` interim display while
//! the translation is in flight and falling back to the untranslated
//! buffer when translation fails.
//!
//! Exactly one terminal update (success or failure) is emitted per
//! request, and no partial follows it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::events::GenerationUpdate;
use crate::message::Language;
use crate::providers::{Generator, Translator};

/// Interim suffix shown while a completed answer is being translated.
const TRANSLATING_SUFFIX: &str = "\n\n(translating...)";

/// Orchestrates one streaming generation request at a time.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    generator: Arc<dyn Generator>,
    translator: Arc<dyn Translator>,
}

impl GenerationOrchestrator {
    pub fn new(generator: Arc<dyn Generator>, translator: Arc<dyn Translator>) -> Self {
        Self {
            generator,
            translator,
        }
    }

    /// Streams an answer for `prompt`, delivering [`GenerationUpdate`]s on
    /// the returned channel.
    ///
    /// When `translate_to` names a language, the completed English buffer
    /// is translated before the terminal update; translation failure
    /// degrades to the untranslated buffer rather than failing the
    /// request. The channel ends after its single terminal update.
    pub fn stream_answer(
        &self,
        prompt: String,
        translate_to: Option<Language>,
    ) -> flume::Receiver<GenerationUpdate> {
        let (tx, rx) = flume::unbounded();
        let generator = Arc::clone(&self.generator);
        let translator = Arc::clone(&self.translator);

        tokio::spawn(async move {
            let stream = match generator.stream_generate(&prompt).await {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = tx.send(GenerationUpdate::Failed {
                        message: err.to_string(),
                    });
                    return;
                }
            };

            let mut buffer = String::new();
            let terminal = loop {
                match stream.recv_async().await {
                    Ok(Ok(chunk)) => {
                        buffer.push_str(&chunk.text);
                        if chunk.is_final {
                            break finalize(&tx, buffer, translate_to, translator.as_ref()).await;
                        }
                        let _ = tx.send(GenerationUpdate::Partial {
                            buffer: buffer.clone(),
                        });
                    }
                    Ok(Err(err)) => {
                        break GenerationUpdate::Failed {
                            message: err.to_string(),
                        };
                    }
                    Err(_) => {
                        // Channel closed without a terminal chunk.
                        break GenerationUpdate::Failed {
                            message: crate::errors::GenerateError::TruncatedStream.to_string(),
                        };
                    }
                }
            };

            debug!(
                failed = matches!(terminal, GenerationUpdate::Failed { .. }),
                "generation stream finished"
            );
            let _ = tx.send(terminal);
        });

        rx
    }
}

/// Produces the terminal update for a successfully completed buffer,
/// running the optional translation pass.
async fn finalize(
    tx: &flume::Sender<GenerationUpdate>,
    buffer: String,
    translate_to: Option<Language>,
    translator: &dyn Translator,
) -> GenerationUpdate {
    let Some(target) = translate_to else {
        return GenerationUpdate::Completed { text: buffer };
    };

    let _ = tx.send(GenerationUpdate::Partial {
        buffer: format!("{buffer}{TRANSLATING_SUFFIX}"),
    });

    match translator.translate(&buffer, target).await {
        Ok(translated) => GenerationUpdate::Completed { text: translated },
        Err(err) => {
            warn!(target_language = %target, error = %err, "translation failed, falling back to untranslated answer");
            GenerationUpdate::Completed { text: buffer }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{GenerateError, ModelFailure, TranslateError};
    use crate::events::{StreamChunk, StreamItem};
    use crate::providers::{GeneratorBackend, InitProgress};
    use async_trait::async_trait;

    /// Generator that replays a scripted list of stream items.
    struct ScriptedGenerator {
        script: Vec<StreamItem>,
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn initialize(
            &self,
            _progress: InitProgress,
        ) -> Result<GeneratorBackend, ModelFailure> {
            Ok(GeneratorBackend::Accelerated)
        }

        async fn stream_generate(
            &self,
            _prompt: &str,
        ) -> Result<flume::Receiver<StreamItem>, GenerateError> {
            let (tx, rx) = flume::unbounded();
            for item in self.script.clone() {
                let _ = tx.send(item);
            }
            Ok(rx)
        }
    }

    impl Clone for ScriptedGenerator {
        fn clone(&self) -> Self {
            Self {
                script: self.script.clone(),
            }
        }
    }

    struct UppercaseTranslator {
        fail: bool,
    }

    #[async_trait]
    impl Translator for UppercaseTranslator {
        async fn initialize(&self) -> Result<bool, TranslateError> {
            Ok(!self.fail)
        }

        async fn translate(&self, text: &str, _target: Language) -> Result<String, TranslateError> {
            if self.fail {
                Err(TranslateError::Failed("offline".into()))
            } else {
                Ok(text.to_uppercase())
            }
        }
    }

    fn orchestrator(script: Vec<StreamItem>, fail_translation: bool) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            Arc::new(ScriptedGenerator { script }),
            Arc::new(UppercaseTranslator {
                fail: fail_translation,
            }),
        )
    }

    async fn collect(rx: flume::Receiver<GenerationUpdate>) -> Vec<GenerationUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.recv_async().await {
            updates.push(update);
        }
        updates
    }

    #[tokio::test]
    async fn partials_carry_the_growing_buffer() {
        let orchestrator = orchestrator(
            vec![
                Ok(StreamChunk::partial("Cats ")),
                Ok(StreamChunk::partial("drink ")),
                Ok(StreamChunk::final_chunk("water.")),
            ],
            false,
        );
        let updates = collect(orchestrator.stream_answer("p".into(), None)).await;

        assert_eq!(
            updates,
            vec![
                GenerationUpdate::Partial {
                    buffer: "Cats ".into()
                },
                GenerationUpdate::Partial {
                    buffer: "Cats drink ".into()
                },
                GenerationUpdate::Completed {
                    text: "Cats drink water.".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn exactly_one_terminal_event() {
        let orchestrator = orchestrator(
            vec![
                Ok(StreamChunk::partial("a")),
                Ok(StreamChunk::final_chunk("b")),
            ],
            false,
        );
        let updates = collect(orchestrator.stream_answer("p".into(), None)).await;
        let terminals = updates.iter().filter(|u| u.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(updates.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn translation_publishes_interim_then_translated() {
        let orchestrator = orchestrator(vec![Ok(StreamChunk::final_chunk("hello"))], false);
        let updates = collect(
            orchestrator.stream_answer("p".into(), Some(Language::Russian)),
        )
        .await;

        assert_eq!(
            updates,
            vec![
                GenerationUpdate::Partial {
                    buffer: "hello\n\n(translating...)".into()
                },
                GenerationUpdate::Completed {
                    text: "HELLO".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn translation_failure_falls_back_to_untranslated() {
        let orchestrator = orchestrator(vec![Ok(StreamChunk::final_chunk("hello"))], true);
        let updates = collect(
            orchestrator.stream_answer("p".into(), Some(Language::Russian)),
        )
        .await;

        assert_eq!(
            updates.last().unwrap(),
            &GenerationUpdate::Completed {
                text: "hello".into()
            }
        );
    }

    #[tokio::test]
    async fn mid_stream_error_is_single_failure() {
        let orchestrator = orchestrator(
            vec![
                Ok(StreamChunk::partial("par")),
                Err(GenerateError::Stream("backend crashed".into())),
            ],
            false,
        );
        let updates = collect(orchestrator.stream_answer("p".into(), None)).await;

        let terminals: Vec<_> = updates.iter().filter(|u| u.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        match terminals[0] {
            GenerationUpdate::Failed { message } => assert!(message.contains("backend crashed")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_stream_is_a_failure() {
        let orchestrator = orchestrator(vec![Ok(StreamChunk::partial("never ends"))], false);
        let updates = collect(orchestrator.stream_answer("p".into(), None)).await;
        assert!(matches!(
            updates.last().unwrap(),
            GenerationUpdate::Failed { .. }
        ));
    }
}
