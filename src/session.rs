// src/session.rs
// Per-conversation state passed explicitly into interpretation and orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied context about the user, used for "near me" resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// Current location as "City, ST".
    pub location: Option<String>,
    pub previous_searches: Vec<String>,
}

/// Conversation history plus the most recent processed result.
///
/// One `Session` per caller conversation; nothing here is shared across
/// sessions. The orchestrator appends turns and refreshes `last_result`
/// after each processed query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub conversation: Vec<ConversationTurn>,
    pub user_context: UserContext,
    pub last_result: Option<Value>,
}

impl Session {
    pub fn new(user_context: UserContext) -> Self {
        Self {
            conversation: Vec::new(),
            user_context,
            last_result: None,
        }
    }

    pub fn push_user_turn(&mut self, content: impl Into<String>) {
        self.conversation.push(ConversationTurn {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn push_assistant_turn(&mut self, content: impl Into<String>) {
        self.conversation.push(ConversationTurn {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Most recent turns, oldest first, capped at `n`.
    pub fn recent_turns(&self, n: usize) -> &[ConversationTurn] {
        let start = self.conversation.len().saturating_sub(n);
        &self.conversation[start..]
    }

    pub fn set_last_result(&mut self, result: Value) {
        self.last_result = Some(result);
    }

    pub fn reset(&mut self) {
        self.conversation.clear();
        self.last_result = None;
    }
}
