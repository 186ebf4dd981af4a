use chronicle_core::{Message, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A titled, timestamped, append-only sequence of captured messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Globally unique, immutable identifier.
    pub id: Uuid,
    /// Human-readable label set at creation.
    pub title: String,
    /// Captured messages in append order.
    pub messages: Vec<Message>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent append (equals `created_at` until then).
    pub updated_at: DateTime<Utc>,
    /// Free-form labels; set semantics.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Originating project, capture source, ...
    #[serde(default)]
    pub metadata: Metadata,
}

impl Session {
    /// Creates an empty session stamped with the current time.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            tags: BTreeSet::new(),
            metadata: Metadata::new(),
        }
    }

    /// Number of messages captured so far.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the session carries at least one of `tags`.
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }

    /// Case-insensitive substring match against the title or any message body.
    ///
    /// `needle` must already be lowercased.
    pub(crate) fn matches_keyword(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(needle))
    }

    /// Appends a message, keeping timestamps non-decreasing.
    ///
    /// If the wall clock stepped backwards since the last append, the message
    /// is stamped with the previous `updated_at` instead.
    pub(crate) fn push_message(&mut self, mut message: Message) -> &Message {
        if message.timestamp < self.updated_at {
            message.timestamp = self.updated_at;
        }
        self.updated_at = message.timestamp;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }
}
