use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Opaque key/value bag attached to sessions and messages.
///
/// The core never inspects its contents; it is carried through unmodified.
pub type Metadata = HashMap<String, serde_json::Value>;

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user. Autosave always writes this role.
    User,
    /// The AI assistant.
    Assistant,
    /// A system-level note, recognised when loading data written elsewhere.
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

/// A single captured unit of content within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier, unique within the owning session.
    pub id: Uuid,
    /// The role of the message author.
    pub role: Role,
    /// Raw captured text.
    pub content: String,
    /// UTC timestamp of when the message was appended.
    pub timestamp: DateTime<Utc>,
    /// Capture source, originating file path, capture instant, ...
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    /// Creates a new message stamped with the given instant.
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp,
            metadata: Metadata::new(),
        }
    }

    /// Attaches metadata, replacing any existing bag.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}
