//! Grounded prompt assembly.
//!
//! Pure formatting: a fixed persona instruction (with a mandatory verbatim
//! fallback sentence for unanswerable queries), the tail of the
//! conversation history as `Human:` / `Assistant:` lines, the joined
//! context block, and the query. Whitespace is normalized before the
//! prompt leaves this module because generators are sensitive to malformed
//! whitespace.

use std::sync::LazyLock;

use regex::Regex;

use crate::message::ConversationMessage;

/// The exact sentence the generator must emit when the context does not
/// contain the answer.
pub const FALLBACK_SENTENCE: &str =
    "I don't have enough information in my knowledge base to answer that.";

/// Number of trailing conversation turns included by default.
pub const DEFAULT_HISTORY_TURNS: usize = 2;

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("space regex"));
static BLANK_LINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line regex"));

/// Collapses runs of spaces/tabs to one space and caps consecutive blank
/// lines at one.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    let collapsed = SPACE_RUNS.replace_all(text, " ");
    let trimmed_lines: Vec<&str> = collapsed.lines().map(str::trim_end).collect();
    let rejoined = trimmed_lines.join("\n");
    BLANK_LINE_RUNS.replace_all(&rejoined, "\n\n").into_owned()
}

/// Renders retrieved context, history, and a query into one model-ready
/// prompt string. No network or index access.
#[derive(Clone, Debug)]
pub struct PromptBuilder {
    history_turns: usize,
    fallback_sentence: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            history_turns: DEFAULT_HISTORY_TURNS,
            fallback_sentence: FALLBACK_SENTENCE.to_string(),
        }
    }
}

impl PromptBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides how many trailing turns of history are rendered.
    #[must_use]
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Overrides the verbatim fallback sentence, for deployments with a
    /// different persona.
    #[must_use]
    pub fn with_fallback_sentence(mut self, sentence: impl Into<String>) -> Self {
        self.fallback_sentence = sentence.into();
        self
    }

    /// The fallback sentence this builder instructs the generator to use.
    #[must_use]
    pub fn fallback_sentence(&self) -> &str {
        &self.fallback_sentence
    }

    /// Builds the prompt for one query.
    ///
    /// `history` is the committed conversation so far, excluding the query
    /// being asked; only the trailing `history_turns` turns (one user plus
    /// one assistant message each) are rendered.
    #[must_use]
    pub fn build(
        &self,
        query: &str,
        joined_context: &str,
        history: &[ConversationMessage],
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are a careful assistant that answers questions using only the \
             provided context.\n\
             Be concise, factual, and neutral in tone. Never invent details that \
             are not in the context.\n",
        );
        prompt.push_str(&format!(
            "If the context does not contain the answer, reply with exactly this \
             sentence and nothing else: \"{}\"\n\n",
            self.fallback_sentence
        ));

        let tail_len = self.history_turns * 2;
        let tail_start = history.len().saturating_sub(tail_len);
        for message in &history[tail_start..] {
            let speaker = if message.from_user { "Human" } else { "Assistant" };
            prompt.push_str(&format!("{speaker}: {}\n", message.content));
        }
        if tail_start < history.len() {
            prompt.push('\n');
        }

        prompt.push_str("Context:\n");
        prompt.push_str(joined_context);
        prompt.push_str("\n\n");

        prompt.push_str(&format!("Human: {query}\nAssistant:"));

        normalize_whitespace(&prompt)
    }
}
