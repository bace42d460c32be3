//! Optimistic send: a provisional message is built locally and shown before the
//! `send_message` event is emitted.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use shared::{
    domain::{ClientToken, ConversationId, ConversationStatus, MessageId, ParticipantProfile, UserId},
    protocol::{ClientEvent, Message},
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("message text is empty")]
    EmptyMessage,
    #[error("no conversation is open")]
    NoActiveConversation,
    #[error("conversation {0} is closed")]
    ConversationClosed(ConversationId),
}

/// Strictly increasing millisecond clock for provisional ids.
#[derive(Debug, Default)]
pub struct ProvisionalClock {
    last: AtomicU64,
}

impl ProvisionalClock {
    pub fn tick(&self, now: DateTime<Utc>) -> u64 {
        let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or_default();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now_ms.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendCommand {
    pub conversation_id: Option<ConversationId>,
    pub conversation_status: ConversationStatus,
    pub sender_id: UserId,
    pub sender: Option<ParticipantProfile>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub provisional: Message,
    pub event: ClientEvent,
}

pub fn prepare_send(
    clock: &ProvisionalClock,
    command: SendCommand,
    now: DateTime<Utc>,
) -> Result<OutgoingMessage, SendError> {
    let content = command.text.trim();
    if content.is_empty() {
        return Err(SendError::EmptyMessage);
    }
    let conversation_id = command
        .conversation_id
        .ok_or(SendError::NoActiveConversation)?;
    if command.conversation_status == ConversationStatus::Closed {
        return Err(SendError::ConversationClosed(conversation_id));
    }

    let provisional = Message {
        id: MessageId::provisional(clock.tick(now)),
        conversation_id: Some(conversation_id),
        content: content.to_owned(),
        sender_id: command.sender_id,
        created_at: now,
        is_read: false,
        sender: command.sender,
        client_token: Some(ClientToken::generate()),
    };
    Ok(OutgoingMessage {
        event: send_event(&provisional)?,
        provisional,
    })
}

/// The `send_message` event for a provisional message, reusing its client token.
pub fn send_event(message: &Message) -> Result<ClientEvent, SendError> {
    let conversation_id = message
        .conversation_id
        .clone()
        .ok_or(SendError::NoActiveConversation)?;
    Ok(ClientEvent::SendMessage {
        conversation_id,
        sender_id: message.sender_id.clone(),
        content: message.content.clone(),
        client_token: message.client_token.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_support::at;

    fn command(text: &str) -> SendCommand {
        SendCommand {
            conversation_id: Some(ConversationId::from("c1")),
            conversation_status: ConversationStatus::Open,
            sender_id: UserId::from("client-1"),
            sender: None,
            text: text.to_owned(),
        }
    }

    #[test]
    fn builds_provisional_message_and_matching_event() {
        let clock = ProvisionalClock::default();

        let outgoing = prepare_send(&clock, command("  Bonjour  "), at(0)).expect("valid");

        let message = &outgoing.provisional;
        assert!(message.is_provisional());
        assert_eq!(
            message.id,
            MessageId::provisional(at(0).timestamp_millis() as u64)
        );
        assert_eq!(message.content, "Bonjour");
        assert!(!message.is_read);
        assert_eq!(message.created_at, at(0));
        assert!(message.client_token.is_some());
        assert_eq!(
            outgoing.event,
            ClientEvent::SendMessage {
                conversation_id: ConversationId::from("c1"),
                sender_id: UserId::from("client-1"),
                content: "Bonjour".into(),
                client_token: message.client_token.clone(),
            }
        );
    }

    #[test]
    fn rejects_whitespace_only_text() {
        let clock = ProvisionalClock::default();

        assert_eq!(
            prepare_send(&clock, command(" \n\t "), at(0)),
            Err(SendError::EmptyMessage)
        );
    }

    #[test]
    fn requires_an_open_conversation() {
        let clock = ProvisionalClock::default();
        let mut no_target = command("hi");
        no_target.conversation_id = None;
        let mut closed = command("hi");
        closed.conversation_status = ConversationStatus::Closed;

        assert_eq!(
            prepare_send(&clock, no_target, at(0)),
            Err(SendError::NoActiveConversation)
        );
        assert_eq!(
            prepare_send(&clock, closed, at(0)),
            Err(SendError::ConversationClosed(ConversationId::from("c1")))
        );
    }

    #[test]
    fn provisional_ids_stay_unique_within_one_millisecond() {
        let clock = ProvisionalClock::default();

        let first = prepare_send(&clock, command("a"), at(0)).expect("valid");
        let second = prepare_send(&clock, command("b"), at(0)).expect("valid");

        assert_ne!(first.provisional.id, second.provisional.id);
        assert_ne!(
            first.provisional.client_token,
            second.provisional.client_token
        );
    }
}
