use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human language the engine can hold a conversation in.
///
/// The engine keeps one message history per language and treats exactly one
/// language as active at a time. Languages other than English are answered
/// by generating in English first and translating the completed answer.
///
/// # Examples
///
/// ```
/// use docent::message::Language;
///
/// assert!(!Language::English.needs_translation());
/// assert!(Language::Russian.needs_translation());
/// assert_eq!(Language::Russian.code(), "ru");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    /// English, the generator's native language.
    #[default]
    English,
    /// Russian, answered via post-generation translation.
    Russian,
}

impl Language {
    /// ISO 639-1 code for this language.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Russian => "ru",
        }
    }

    /// Whether answers in this language require a translation pass after
    /// generation completes.
    #[must_use]
    pub fn needs_translation(&self) -> bool {
        !matches!(self, Language::English)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single message in a conversation history.
///
/// Messages are appended to a per-language ordered history and never mutated
/// after append. In-flight answer text lives in the engine's streaming
/// buffer rather than in history, so committed messages always carry
/// `streaming = false`.
///
/// # Examples
///
/// ```
/// use docent::message::ConversationMessage;
///
/// let question = ConversationMessage::user("What is a chunk?");
/// assert!(question.from_user);
/// assert!(!question.streaming);
///
/// let answer = ConversationMessage::assistant("A bounded span of source text.");
/// assert!(!answer.from_user);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// The message text.
    pub content: String,
    /// `true` for user-submitted queries, `false` for assistant answers.
    pub from_user: bool,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
    /// `true` only when a consumer serializes an in-flight display as a
    /// message; committed history entries are always complete.
    pub streaming: bool,
}

impl ConversationMessage {
    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            from_user: true,
            timestamp: Utc::now(),
            streaming: false,
        }
    }

    /// Creates a completed assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            from_user: false,
            timestamp: Utc::now(),
            streaming: false,
        }
    }
}
