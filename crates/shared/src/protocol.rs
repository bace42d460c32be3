use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ClientToken, ConversationId, ConversationStatus, MessageId, ParticipantProfile, UserId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub content: String,
    pub sender_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<ParticipantProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<ClientToken>,
}

impl Message {
    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub client_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ParticipantProfile>,
    /// Preview of the most recent messages, newest first.
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub status: ConversationStatus,
}

impl Conversation {
    pub fn is_closed(&self) -> bool {
        self.status == ConversationStatus::Closed
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.first()
    }
}

/// Events emitted by this client over the transport channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinConversation {
        conversation_id: ConversationId,
    },
    MarkRead {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    SendMessage {
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_token: Option<ClientToken>,
    },
    CloseConversation {
        conversation_id: ConversationId,
        user_id: UserId,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinConversation { .. } => "join_conversation",
            ClientEvent::MarkRead { .. } => "mark_read",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::CloseConversation { .. } => "close_conversation",
        }
    }

    pub fn client_token(&self) -> Option<&ClientToken> {
        match self {
            ClientEvent::SendMessage { client_token, .. } => client_token.as_ref(),
            _ => None,
        }
    }
}

/// Events pushed by the server to the members of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    NewMessage(Message),
    NewClientMessage {
        sender: ParticipantProfile,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
    },
    ConversationClosed {
        conversation_id: ConversationId,
    },
    MessageError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_token: Option<ClientToken>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_message_uses_event_envelope_with_camel_case_payload() {
        let event = ClientEvent::SendMessage {
            conversation_id: ConversationId::from("c1"),
            sender_id: UserId::from("u1"),
            content: "Bonjour".into(),
            client_token: None,
        };

        let value = serde_json::to_value(&event).expect("serialize");

        assert_eq!(
            value,
            json!({
                "event": "send_message",
                "data": { "conversationId": "c1", "senderId": "u1", "content": "Bonjour" }
            })
        );
        assert_eq!(event.name(), "send_message");
    }

    #[test]
    fn parses_new_message_from_server() {
        let raw = json!({
            "event": "new_message",
            "data": {
                "id": "msg_123",
                "content": "Bonjour",
                "senderId": "u1",
                "createdAt": "2024-05-01T10:00:00Z",
                "isRead": false,
                "sender": { "firstName": "Awa", "lastName": "Diop" }
            }
        });

        let event: ServerEvent = serde_json::from_value(raw).expect("parse");

        let ServerEvent::NewMessage(message) = event else {
            panic!("expected new_message");
        };
        assert_eq!(message.id.as_str(), "msg_123");
        assert!(!message.is_provisional());
        assert_eq!(message.conversation_id, None);
        assert_eq!(
            message.sender.map(|sender| sender.display_name()),
            Some("Awa Diop".to_owned())
        );
    }

    #[test]
    fn parses_notification_only_client_message() {
        let raw = json!({
            "event": "new_client_message",
            "data": { "sender": { "firstName": "Kofi", "lastName": "Mensah", "phone": "+228" } }
        });

        let event: ServerEvent = serde_json::from_value(raw).expect("parse");

        assert!(matches!(
            event,
            ServerEvent::NewClientMessage { ref sender, conversation_id: None }
                if sender.first_name == "Kofi"
        ));
    }

    #[test]
    fn conversation_defaults_to_open_with_empty_preview() {
        let raw = json!({ "id": "c1", "clientId": "u1" });

        let conversation: Conversation = serde_json::from_value(raw).expect("parse");

        assert!(!conversation.is_closed());
        assert!(conversation.messages.is_empty());
        assert!(conversation.last_message().is_none());
    }
}
