use shared::{domain::ClientToken, error::ApiException};
use thiserror::Error;

use crate::{lifecycle::LifecycleError, send::SendError};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("server_url must start with http:// or https://, got {0}")]
    InvalidServerUrl(String),
    #[error("failed to connect websocket {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("transport channel is closed")]
    ChannelClosed,
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("chat api rejected request: {0}")]
    Api(#[from] ApiException),
    #[error("no conversation is open")]
    NoActiveConversation,
    #[error("no failed message with client token {0}")]
    UnknownMessage(ClientToken),
    #[error("only staff members may close conversations")]
    Forbidden,
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("invalid settings: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("failed to initialize logging: {0}")]
    LoggingInit(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
