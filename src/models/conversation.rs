use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::{ConversationId, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub name: Option<String>,
    /// Membership only; the ordering carries no meaning
    pub participants: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}
