//! Conversation Log
//!
//! An append-only record of the messages exchanged during a session, kept for
//! display. Entries are never edited or removed individually; the whole log is
//! cleared when a new connection attempt begins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Agent => write!(f, "agent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct ConversationLog {
    messages: Vec<Message>,
    next_id: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns it. Ids keep increasing across `clear()`.
    pub fn append(&mut self, sender: Sender, text: impl Into<String>) -> &Message {
        self.next_id += 1;
        self.messages.push(Message {
            id: self.next_id,
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order_and_sender() {
        let mut log = ConversationLog::new();
        log.append(Sender::Agent, "hello");
        log.append(Sender::User, "hi");

        let texts: Vec<_> = log
            .messages()
            .iter()
            .map(|m| (m.sender, m.text.as_str()))
            .collect();
        assert_eq!(texts, vec![(Sender::Agent, "hello"), (Sender::User, "hi")]);
    }

    #[test]
    fn test_ids_increase_and_survive_clear() {
        let mut log = ConversationLog::new();
        let first = log.append(Sender::User, "a").id;
        let second = log.append(Sender::User, "b").id;
        assert!(second > first);

        log.clear();
        assert!(log.is_empty());

        let third = log.append(Sender::Agent, "c").id;
        assert!(third > second);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_sender_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Sender::Agent).unwrap(), "\"agent\"");
        assert_eq!(Sender::User.to_string(), "user");
    }
}
