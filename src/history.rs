//! Conversation state and word-budget trimming.

use crate::types::message::{Message, MessageRole};
use serde::{Deserialize, Serialize};

/// System message used when none is configured.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// Ordered conversation history.
///
/// The first entry is always the system message; every other entry is a
/// user or assistant turn in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    entries: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_MESSAGE)
    }
}

impl Conversation {
    pub fn new(system_message: impl Into<String>) -> Self {
        Self {
            entries: vec![Message::system(system_message)],
        }
    }

    /// Build a conversation from existing entries.
    ///
    /// The first system entry found becomes the system message; later system
    /// entries are dropped. Without one, [`DEFAULT_SYSTEM_MESSAGE`] is used.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut system: Option<Message> = None;
        let mut turns = Vec::new();
        for m in messages {
            if m.is_system() {
                if system.is_none() {
                    system = Some(m);
                }
            } else {
                turns.push(m);
            }
        }

        let mut entries = Vec::with_capacity(turns.len() + 1);
        entries.push(system.unwrap_or_else(|| Message::system(DEFAULT_SYSTEM_MESSAGE)));
        entries.extend(turns);
        Self { entries }
    }

    pub fn system_message(&self) -> &str {
        &self.entries[0].content
    }

    pub fn set_system_message(&mut self, text: impl Into<String>) {
        self.entries[0] = Message::system(text);
    }

    /// Append a turn. A system-role message replaces the system message.
    pub fn push(&mut self, message: Message) {
        match message.role {
            MessageRole::System => self.entries[0] = message,
            _ => self.entries.push(message),
        }
    }

    /// All entries, system message first.
    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    /// User and assistant turns only.
    pub fn turns(&self) -> &[Message] {
        &self.entries[1..]
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns().last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no user or assistant turns.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Word count of all non-system entries.
    pub fn word_count(&self) -> usize {
        self.turns().iter().map(Message::word_count).sum()
    }

    /// Evict the oldest turns until the conversation fits `max_words`.
    ///
    /// The most recent turn is never evicted. Returns how many turns were
    /// removed.
    pub fn trim(&mut self, max_words: usize) -> usize {
        let mut total = self.word_count();
        let mut evict = 0;
        let turns = self.turns();
        while total > max_words && turns.len() - evict > 1 {
            total -= turns[evict].word_count();
            evict += 1;
        }
        if evict > 0 {
            self.entries.drain(1..1 + evict);
        }
        evict
    }

    /// Drop all turns, keeping the system message.
    pub fn clear(&mut self) {
        self.entries.truncate(1);
    }
}

/// Trim a plain message list to `max_words`, counting only non-system entries
/// and never evicting the last remaining non-system entry. System entries
/// keep their positions.
pub fn trim(history: &[Message], max_words: usize) -> Vec<Message> {
    let mut total: usize = history
        .iter()
        .filter(|m| !m.is_system())
        .map(Message::word_count)
        .sum();
    let mut remaining = history.iter().filter(|m| !m.is_system()).count();
    let mut out = Vec::with_capacity(history.len());

    for m in history {
        if !m.is_system() && total > max_words && remaining > 1 {
            total -= m.word_count();
            remaining -= 1;
            continue;
        }
        out.push(m.clone());
    }
    out
}
