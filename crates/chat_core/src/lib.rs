pub mod api;
pub mod composer;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod presence;
pub mod send;
pub mod session;
pub mod settings;
pub mod thread;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use api::{ConversationApi, HttpConversationApi};
pub use error::{ChatError, Result};
pub use session::{ChatSession, Notice, NoticeKind, SessionEvent, SessionIdentity};
pub use settings::{load_settings, ChatSettings};
pub use thread::{DeliveryState, ThreadEntry};
pub use transport::{ChannelEvent, TransportChannel, WsTransport};
