//! Conversation transcript
//!
//! Bounded record of user and advisor messages, used to give the
//! language-model responder recent context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::Intent;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Advisor,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    /// Intent the classifier assigned, for user messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
}

impl TranscriptMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
            intent: None,
        }
    }

    pub fn user(content: impl Into<String>, intent: Option<Intent>) -> Self {
        Self {
            intent,
            ..Self::new(MessageRole::User, content)
        }
    }

    pub fn advisor(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Advisor, content)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    capacity: usize,
    messages: VecDeque<TranscriptMessage>,
}

impl Transcript {
    pub fn new(capacity: usize) -> Self {
        Self {
            created_at: Utc::now(),
            updated_at: Utc::now(),
            capacity: capacity.max(1),
            messages: VecDeque::new(),
        }
    }

    /// Append a message, dropping the oldest once full
    pub fn push(&mut self, message: TranscriptMessage) {
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
        self.updated_at = Utc::now();
    }

    pub fn messages(&self) -> impl Iterator<Item = &TranscriptMessage> {
        self.messages.iter()
    }

    /// The `count` most recent messages, oldest first
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &TranscriptMessage> {
        let skip = self.messages.len().saturating_sub(count);
        self.messages.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Recent conversation formatted for a language-model prompt
    pub fn formatted_context(&self, count: usize) -> String {
        let mut context = String::from("## Recent conversation\n\n");

        for msg in self.recent(count) {
            let role = match msg.role {
                MessageRole::User => "User",
                MessageRole::Advisor => "Advisor",
                MessageRole::System => "System",
            };
            context.push_str(&format!("{}: {}\n", role, msg.content));
        }

        context
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }
}
