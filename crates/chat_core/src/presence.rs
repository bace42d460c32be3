use std::collections::BTreeSet;

use shared::{
    domain::{ConversationId, UserId},
    protocol::ClientEvent,
};

/// Keeps server-side room membership and read state aligned with the open thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadTracker {
    joined: BTreeSet<ConversationId>,
}

impl ReadTracker {
    /// `join_conversation` then `mark_read` for a thread being opened.
    pub fn open_events(
        &mut self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Vec<ClientEvent> {
        self.joined.insert(conversation_id.clone());
        vec![
            ClientEvent::JoinConversation {
                conversation_id: conversation_id.clone(),
            },
            ClientEvent::MarkRead {
                conversation_id: conversation_id.clone(),
                user_id: user_id.clone(),
            },
        ]
    }

    /// Joins to re-issue after the server forgot them on reconnect.
    pub fn rejoin_events(&self) -> Vec<ClientEvent> {
        self.joined
            .iter()
            .map(|conversation_id| ClientEvent::JoinConversation {
                conversation_id: conversation_id.clone(),
            })
            .collect()
    }

    pub fn leave(&mut self, conversation_id: &ConversationId) {
        self.joined.remove(conversation_id);
    }

    pub fn is_joined(&self, conversation_id: &ConversationId) -> bool {
        self.joined.contains(conversation_id)
    }

    pub fn joined_count(&self) -> usize {
        self.joined.len()
    }
}
