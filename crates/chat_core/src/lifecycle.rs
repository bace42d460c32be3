use std::collections::HashMap;

use shared::{
    domain::{ConversationId, ConversationStatus, UserId},
    protocol::ClientEvent,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("conversation {0} is already closed")]
    AlreadyClosed(ConversationId),
}

/// `OPEN -> CLOSED`, one way. A closed conversation is never reopened locally;
/// the backend creates a new one instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleController {
    statuses: HashMap<ConversationId, ConversationStatus>,
}

impl LifecycleController {
    pub fn status(&self, conversation_id: &ConversationId) -> ConversationStatus {
        self.statuses
            .get(conversation_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_closed(&self, conversation_id: &ConversationId) -> bool {
        self.status(conversation_id) == ConversationStatus::Closed
    }

    /// Adopts the status reported by the backend. A locally known closure sticks.
    pub fn observe(&mut self, conversation_id: &ConversationId, status: ConversationStatus) {
        let entry = self
            .statuses
            .entry(conversation_id.clone())
            .or_insert(status);
        if status == ConversationStatus::Closed {
            *entry = ConversationStatus::Closed;
        }
    }

    /// Staff-initiated closure: the event to emit. The status only changes
    /// through [`Self::mark_closed`] once the event went out.
    pub fn close(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<ClientEvent, LifecycleError> {
        if self.is_closed(conversation_id) {
            return Err(LifecycleError::AlreadyClosed(conversation_id.clone()));
        }
        Ok(ClientEvent::CloseConversation {
            conversation_id: conversation_id.clone(),
            user_id: user_id.clone(),
        })
    }

    /// Records a closure, sent or received. Returns false when it was already closed.
    pub fn mark_closed(&mut self, conversation_id: &ConversationId) -> bool {
        self.statuses
            .insert(conversation_id.clone(), ConversationStatus::Closed)
            != Some(ConversationStatus::Closed)
    }
}
