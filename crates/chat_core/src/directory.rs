use std::cmp::Reverse;

use shared::{
    domain::{ConversationId, ConversationStatus, UserId},
    protocol::{Conversation, Message},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryUiState {
    Loading,
    Ready,
    Empty,
    Error,
}

/// Conversations visible to the current user, most recent activity first.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationDirectory {
    ui_state: DirectoryUiState,
    conversations: Vec<Conversation>,
    refresh_deferred: bool,
}

impl Default for ConversationDirectory {
    fn default() -> Self {
        Self {
            ui_state: DirectoryUiState::Loading,
            conversations: Vec::new(),
            refresh_deferred: false,
        }
    }
}

impl ConversationDirectory {
    pub fn ui_state(&self) -> DirectoryUiState {
        self.ui_state
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| &conversation.id == conversation_id)
    }

    /// Replaces the whole set with a freshly fetched list.
    pub fn replace(&mut self, mut conversations: Vec<Conversation>) {
        sort_by_recency(&mut conversations);
        self.ui_state = if conversations.is_empty() {
            DirectoryUiState::Empty
        } else {
            DirectoryUiState::Ready
        };
        self.conversations = conversations;
        self.refresh_deferred = false;
    }

    /// A failed fetch keeps the last known list.
    pub fn set_error(&mut self) {
        if self.conversations.is_empty() {
            self.ui_state = DirectoryUiState::Error;
        }
    }

    /// Records a new message against its conversation. `lastMessageAt` never moves backwards.
    /// Returns false when the conversation is not listed.
    pub fn note_message(&mut self, message: &Message) -> bool {
        let Some(conversation_id) = message.conversation_id.as_ref() else {
            return false;
        };
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|conversation| &conversation.id == conversation_id)
        else {
            return false;
        };

        if conversation
            .last_message_at
            .map_or(true, |current| message.created_at > current)
        {
            conversation.last_message_at = Some(message.created_at);
        }
        if !conversation
            .messages
            .iter()
            .any(|existing| existing.id == message.id)
        {
            conversation.messages.insert(0, message.clone());
        }
        sort_by_recency(&mut self.conversations);
        true
    }

    pub fn mark_closed(&mut self, conversation_id: &ConversationId) -> bool {
        match self
            .conversations
            .iter_mut()
            .find(|conversation| &conversation.id == conversation_id)
        {
            Some(conversation) => {
                conversation.status = ConversationStatus::Closed;
                true
            }
            None => false,
        }
    }

    /// Marks that a refresh was skipped because the composer held focus.
    pub fn defer_refresh(&mut self) {
        self.refresh_deferred = true;
    }

    pub fn take_deferred_refresh(&mut self) -> bool {
        std::mem::replace(&mut self.refresh_deferred, false)
    }

    pub fn total_unread(&self, current_user: &UserId) -> usize {
        self.conversations
            .iter()
            .map(|conversation| unread_count_of(conversation, current_user))
            .sum()
    }
}

/// Unread messages in the preview list that were not sent by `current_user`.
pub fn unread_count_of(conversation: &Conversation, current_user: &UserId) -> usize {
    conversation
        .messages
        .iter()
        .filter(|message| !message.is_read && &message.sender_id != current_user)
        .count()
}

fn sort_by_recency(conversations: &mut [Conversation]) {
    conversations.sort_by_key(|conversation| Reverse(conversation.last_message_at));
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
