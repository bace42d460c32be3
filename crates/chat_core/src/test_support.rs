use chrono::{DateTime, TimeZone, Utc};
use shared::{
    domain::{ConversationId, ConversationStatus, MessageId, UserId},
    protocol::{Conversation, Message},
};

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub fn message(id: &str, conversation: &str, sender: &str, content: &str) -> Message {
    Message {
        id: MessageId::from(id),
        conversation_id: Some(ConversationId::from(conversation)),
        content: content.to_owned(),
        sender_id: UserId::from(sender),
        created_at: at(0),
        is_read: false,
        sender: None,
        client_token: None,
    }
}

pub fn conversation(id: &str, client: &str, minute: Option<u32>) -> Conversation {
    Conversation {
        id: ConversationId::from(id),
        client_id: UserId::from(client),
        agent_id: None,
        last_message_at: minute.map(at),
        client: None,
        messages: Vec::new(),
        status: ConversationStatus::Open,
    }
}
