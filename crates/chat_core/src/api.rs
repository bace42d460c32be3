use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ConversationId, UserId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{Conversation, Message},
};
use tracing::debug;

use crate::{
    error::{ChatError, Result},
    settings::ChatSettings,
};

/// REST collaborators owned by the chat backend.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;
    async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;
}

pub struct HttpConversationApi {
    http: Client,
    base_url: String,
    user_id: UserId,
}

impl HttpConversationApi {
    pub fn new(settings: &ChatSettings, user_id: UserId) -> Result<Self> {
        let base_url = settings.http_base()?;
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|source| ChatError::Http {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base_url,
            user_id,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        debug!(%url, "api: GET");
        let response = self
            .http
            .get(&url)
            .query(&[("user_id", self.user_id.as_str())])
            .send()
            .await
            .map_err(|source| ChatError::Http {
                url: url.clone(),
                source,
            })?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|source| ChatError::Http { url, source })
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        let code = match status.as_u16() {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            400 | 422 => ErrorCode::Validation,
            500..=599 => ErrorCode::Internal,
            _ => ErrorCode::Unknown,
        };
        ApiError::new(code, format!("http status {status}"))
    });
    Err(ApiException::from(error).into())
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.get_json(format!("{}/chat/conversations", self.base_url))
            .await
    }

    async fn list_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        self.get_json(format!(
            "{}/chat/conversations/{}/messages",
            self.base_url, conversation_id
        ))
        .await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
