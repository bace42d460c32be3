use shared::{
    domain::{ClientToken, ConversationId, UserId},
    protocol::Message,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadUiState {
    Empty,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Failed { reason: String },
    Confirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEntry {
    pub message: Message,
    pub delivery: DeliveryState,
}

impl ThreadEntry {
    pub fn confirmed(message: Message) -> Self {
        Self {
            message,
            delivery: DeliveryState::Confirmed,
        }
    }

    pub fn pending(message: Message) -> Self {
        Self {
            message,
            delivery: DeliveryState::Pending,
        }
    }

    fn has_token(&self, token: &ClientToken) -> bool {
        self.message.client_token.as_ref() == Some(token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// A provisional or duplicate entry at this index was replaced.
    Replaced(usize),
    Appended,
}

/// Message timeline of the one conversation currently open. Order is insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveThread {
    conversation_id: Option<ConversationId>,
    entries: Vec<ThreadEntry>,
    ui_state: ThreadUiState,
}

impl Default for ActiveThread {
    fn default() -> Self {
        Self {
            conversation_id: None,
            entries: Vec::new(),
            ui_state: ThreadUiState::Empty,
        }
    }
}

impl ActiveThread {
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    pub fn entries(&self) -> &[ThreadEntry] {
        &self.entries
    }

    pub fn ui_state(&self) -> ThreadUiState {
        self.ui_state
    }

    pub fn is_open(&self) -> bool {
        self.conversation_id.is_some()
    }

    pub fn is_showing(&self, conversation_id: &ConversationId) -> bool {
        self.conversation_id.as_ref() == Some(conversation_id)
    }

    pub fn open(&mut self, conversation_id: ConversationId) {
        self.conversation_id = Some(conversation_id);
        self.entries.clear();
        self.ui_state = ThreadUiState::Loading;
    }

    /// Installs fetched history if `conversation_id` is still the open one.
    /// Entries added while loading stay after the history unless it already
    /// contains them, by server id or client token.
    pub fn set_history(&mut self, conversation_id: &ConversationId, history: Vec<Message>) -> bool {
        if !self.is_showing(conversation_id) {
            return false;
        }
        let local = std::mem::take(&mut self.entries);
        self.entries = history.into_iter().map(ThreadEntry::confirmed).collect();
        for entry in local {
            let known = self.entries.iter().any(|existing| {
                existing.message.id == entry.message.id
                    || entry
                        .message
                        .client_token
                        .as_ref()
                        .is_some_and(|token| existing.has_token(token))
            });
            if !known {
                self.entries.push(entry);
            }
        }
        self.ui_state = ThreadUiState::Ready;
        true
    }

    pub fn set_error(&mut self, conversation_id: &ConversationId) {
        if self.is_showing(conversation_id) {
            self.ui_state = ThreadUiState::Error;
        }
    }

    pub fn append(&mut self, entry: ThreadEntry) {
        self.entries.push(entry);
    }

    /// Folds a server-confirmed message into the timeline.
    ///
    /// An entry with the same server id is replaced. For the current user's own
    /// messages the provisional entry carrying the echoed client token is replaced;
    /// echoes without a token replace the first provisional entry from that sender.
    /// Anything else is appended.
    pub fn reconcile(&mut self, message: Message, current_user: &UserId) -> Reconciliation {
        if let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.message.id == message.id)
        {
            self.entries[index] = ThreadEntry::confirmed(message);
            return Reconciliation::Replaced(index);
        }

        if &message.sender_id == current_user {
            let index = match message.client_token.as_ref() {
                Some(token) => self
                    .entries
                    .iter()
                    .position(|entry| entry.message.is_provisional() && entry.has_token(token)),
                None => self.entries.iter().position(|entry| {
                    entry.message.is_provisional() && &entry.message.sender_id == current_user
                }),
            };
            if let Some(index) = index {
                self.entries[index] = ThreadEntry::confirmed(message);
                return Reconciliation::Replaced(index);
            }
        }

        self.entries.push(ThreadEntry::confirmed(message));
        Reconciliation::Appended
    }

    /// Moves a pending provisional entry to `Failed`: the one carrying `token`,
    /// or the oldest pending one when the error names no token. A token that
    /// matches nothing here fails nothing.
    pub fn mark_failed(
        &mut self,
        token: Option<&ClientToken>,
        reason: &str,
    ) -> Option<&ThreadEntry> {
        let is_pending = |entry: &ThreadEntry| {
            entry.message.is_provisional() && entry.delivery == DeliveryState::Pending
        };
        let index = match token {
            Some(token) => self
                .entries
                .iter()
                .position(|entry| is_pending(entry) && entry.has_token(token)),
            None => self.entries.iter().position(is_pending),
        }?;
        let entry = &mut self.entries[index];
        entry.delivery = DeliveryState::Failed {
            reason: reason.to_owned(),
        };
        Some(&*entry)
    }

    /// Puts a failed entry back to pending and returns its message for re-sending.
    pub fn retry(&mut self, token: &ClientToken) -> Option<Message> {
        let entry = self.entries.iter_mut().find(|entry| {
            entry.has_token(token) && matches!(entry.delivery, DeliveryState::Failed { .. })
        })?;
        entry.delivery = DeliveryState::Pending;
        Some(entry.message.clone())
    }

    /// Drops a failed entry. Pending and confirmed entries are never removed.
    pub fn discard(&mut self, token: &ClientToken) -> bool {
        let Some(index) = self.entries.iter().position(|entry| {
            entry.has_token(token) && matches!(entry.delivery, DeliveryState::Failed { .. })
        }) else {
            return false;
        };
        self.entries.remove(index);
        true
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.delivery == DeliveryState::Pending)
            .count()
    }

    pub fn clear(&mut self) {
        self.conversation_id = None;
        self.entries.clear();
        self.ui_state = ThreadUiState::Empty;
    }
}

#[cfg(test)]
#[path = "tests/thread_tests.rs"]
mod tests;
