//! Chat session: wires the transport channel, REST collaborators and local
//! state together and publishes [`SessionEvent`]s for the UI.
//!
//! The transport is subscribed once per connection. Handlers read the current
//! selection from shared state when an event arrives, so switching threads
//! never re-creates the subscription. REST reloads triggered by inbound events
//! run on a separate worker so the listener never waits on HTTP.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

use chrono::Utc;
use shared::{
    domain::{ClientToken, ConversationId, MessageId, ParticipantProfile, Role, UserId},
    protocol::{ClientEvent, Message, ServerEvent},
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::{ConversationApi, HttpConversationApi},
    composer::Composer,
    directory::{unread_count_of, ConversationDirectory},
    error::{ChatError, Result},
    lifecycle::LifecycleController,
    presence::ReadTracker,
    send::{prepare_send, send_event, ProvisionalClock, SendCommand},
    settings::ChatSettings,
    thread::{ActiveThread, ThreadEntry},
    transport::{ChannelEvent, TransportChannel, WsTransport},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub role: Role,
    pub profile: Option<ParticipantProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    SendFailed,
    FetchFailed,
    Transport,
}

/// Transient, user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DirectoryUpdated,
    /// `autoscroll` is false while the composer holds focus.
    ThreadUpdated { autoscroll: bool },
    Notice(Notice),
    ClientMessageReceived {
        sender: ParticipantProfile,
        conversation_id: Option<ConversationId>,
    },
    ConversationClosed { conversation_id: ConversationId },
    ConnectionChanged { connected: bool },
}

#[derive(Default)]
struct SessionState {
    directory: ConversationDirectory,
    thread: ActiveThread,
    composer: Composer,
    presence: ReadTracker,
    lifecycle: LifecycleController,
}

impl SessionState {
    fn autoscroll(&self) -> bool {
        !self.composer.is_focused()
    }

    /// Whether a `new_message` belongs to the open thread. Messages without a
    /// conversation id rely on the server scoping them to the joined room, so
    /// they are only accepted while exactly that one room is joined.
    fn is_for_open_thread(&self, message: &Message) -> bool {
        match message.conversation_id.as_ref() {
            Some(conversation_id) => self.thread.is_showing(conversation_id),
            None => self.thread.conversation_id().is_some_and(|open| {
                self.presence.is_joined(open) && self.presence.joined_count() == 1
            }),
        }
    }
}

/// Work the listener hands off instead of awaiting it.
#[derive(Debug)]
enum Background {
    RefreshDirectory,
    ReloadHistory(ConversationId),
}

pub struct ChatSession {
    identity: SessionIdentity,
    transport: Arc<dyn TransportChannel>,
    api: Arc<dyn ConversationApi>,
    clock: ProvisionalClock,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    background: mpsc::UnboundedSender<Background>,
    refresh_queued: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl ChatSession {
    /// Opens the WebSocket and REST clients for `identity` and starts listening.
    pub async fn connect(settings: &ChatSettings, identity: SessionIdentity) -> Result<Arc<Self>> {
        let transport = WsTransport::connect(settings, &identity.user_id).await?;
        let api = HttpConversationApi::new(settings, identity.user_id.clone())?;
        Ok(Self::start(identity, transport, Arc::new(api), settings.event_buffer).await)
    }

    pub async fn start(
        identity: SessionIdentity,
        transport: Arc<dyn TransportChannel>,
        api: Arc<dyn ConversationApi>,
        event_buffer: usize,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        let (background, background_rx) = mpsc::unbounded_channel();
        let inbound = transport.subscribe();
        let session = Arc::new(Self {
            identity,
            transport,
            api,
            clock: ProvisionalClock::default(),
            state: Mutex::new(SessionState::default()),
            events,
            background,
            refresh_queued: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        });

        let listener = tokio::spawn(listen(Arc::downgrade(&session), inbound));
        let worker = tokio::spawn(run_background(Arc::downgrade(&session), background_rx));
        *session.tasks.lock().await = vec![listener, worker];
        info!(user_id = %session.identity.user_id, role = ?session.identity.role, "session: started");
        session
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn directory(&self) -> ConversationDirectory {
        self.state.lock().await.directory.clone()
    }

    pub async fn thread(&self) -> ActiveThread {
        self.state.lock().await.thread.clone()
    }

    pub async fn composer(&self) -> Composer {
        self.state.lock().await.composer.clone()
    }

    pub async fn unread_count(&self, conversation_id: &ConversationId) -> Option<usize> {
        let guard = self.state.lock().await;
        guard
            .directory
            .get(conversation_id)
            .map(|conversation| unread_count_of(conversation, &self.identity.user_id))
    }

    /// Fetches the conversation list and replaces the directory. On failure the
    /// last known list stays and a notice is published.
    pub async fn load_directory(&self) -> Result<()> {
        match self.api.list_conversations().await {
            Ok(conversations) => {
                {
                    let mut guard = self.state.lock().await;
                    for conversation in &conversations {
                        guard
                            .lifecycle
                            .observe(&conversation.id, conversation.status);
                    }
                    debug!(count = conversations.len(), "session: directory loaded");
                    guard.directory.replace(conversations);
                }
                self.publish(SessionEvent::DirectoryUpdated);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "session: failed to load conversations");
                self.state.lock().await.directory.set_error();
                self.notify(NoticeKind::FetchFailed, format!("could not load conversations: {err}"));
                Err(err)
            }
        }
    }

    pub async fn refresh_directory(&self) -> Result<()> {
        self.load_directory().await
    }

    /// Selects a conversation: joins its room, marks it read and loads its history.
    pub async fn open_conversation(&self, conversation_id: ConversationId) -> Result<()> {
        let (presence_events, autoscroll) = {
            let mut guard = self.state.lock().await;
            guard.thread.open(conversation_id.clone());
            let events = guard
                .presence
                .open_events(&conversation_id, &self.identity.user_id);
            (events, guard.autoscroll())
        };
        self.publish(SessionEvent::ThreadUpdated { autoscroll });
        info!(conversation_id = %conversation_id, "session: conversation opened");

        for event in presence_events {
            self.emit(event).await?;
        }
        self.load_history(&conversation_id).await
    }

    async fn load_history(&self, conversation_id: &ConversationId) -> Result<()> {
        match self.api.list_messages(conversation_id).await {
            Ok(history) => {
                let (applied, autoscroll) = {
                    let mut guard = self.state.lock().await;
                    let applied = guard.thread.set_history(conversation_id, history);
                    (applied, guard.autoscroll())
                };
                if applied {
                    self.publish(SessionEvent::ThreadUpdated { autoscroll });
                } else {
                    debug!(%conversation_id, "session: dropping history for a conversation no longer open");
                }
                Ok(())
            }
            Err(err) => {
                warn!(%conversation_id, %err, "session: failed to load messages");
                self.state.lock().await.thread.set_error(conversation_id);
                self.notify(NoticeKind::FetchFailed, format!("could not load messages: {err}"));
                Err(err)
            }
        }
    }

    pub async fn set_composer_text(&self, text: impl Into<String>) {
        self.state.lock().await.composer.set_text(text);
    }

    pub async fn focus_input(&self) {
        self.state.lock().await.composer.focus();
    }

    /// Releases input focus and runs any directory refresh held back meanwhile.
    pub async fn blur_input(&self) -> Result<()> {
        let refresh = {
            let mut guard = self.state.lock().await;
            guard.composer.blur() && guard.directory.take_deferred_refresh()
        };
        if refresh {
            debug!("session: running refresh deferred by input focus");
            self.refresh_directory().await?;
        }
        Ok(())
    }

    /// Sends the composer buffer. The buffer is kept when the send is rejected.
    pub async fn submit(&self) -> Result<MessageId> {
        let text = self.state.lock().await.composer.text().to_owned();
        self.send_message(&text).await
    }

    /// Appends a provisional message, clears the composer, then emits `send_message`.
    pub async fn send_message(&self, text: &str) -> Result<MessageId> {
        let (outgoing, autoscroll) = {
            let mut guard = self.state.lock().await;
            let conversation_id = guard.thread.conversation_id().cloned();
            let conversation_status = conversation_id
                .as_ref()
                .map(|id| guard.lifecycle.status(id))
                .unwrap_or_default();
            let outgoing = prepare_send(
                &self.clock,
                SendCommand {
                    conversation_id,
                    conversation_status,
                    sender_id: self.identity.user_id.clone(),
                    sender: self.identity.profile.clone(),
                    text: text.to_owned(),
                },
                Utc::now(),
            )?;
            guard
                .thread
                .append(ThreadEntry::pending(outgoing.provisional.clone()));
            guard.composer.clear();
            (outgoing, guard.autoscroll())
        };
        self.publish(SessionEvent::ThreadUpdated { autoscroll });

        let provisional_id = outgoing.provisional.id.clone();
        debug!(message_id = %provisional_id, "session: sending message");
        if let Err(err) = self.emit(outgoing.event).await {
            self.fail_pending(outgoing.provisional.client_token.as_ref(), &err.to_string())
                .await;
            return Err(err);
        }
        Ok(provisional_id)
    }

    /// Re-emits a failed message with its original client token.
    pub async fn retry_message(&self, token: &ClientToken) -> Result<()> {
        let (message, autoscroll) = {
            let mut guard = self.state.lock().await;
            let Some(message) = guard.thread.retry(token) else {
                return Err(ChatError::UnknownMessage(token.clone()));
            };
            (message, guard.autoscroll())
        };
        self.publish(SessionEvent::ThreadUpdated { autoscroll });
        let event = send_event(&message)?;
        if let Err(err) = self.emit(event).await {
            self.fail_pending(Some(token), &err.to_string()).await;
            return Err(err);
        }
        Ok(())
    }

    pub async fn discard_message(&self, token: &ClientToken) -> bool {
        let (removed, autoscroll) = {
            let mut guard = self.state.lock().await;
            (guard.thread.discard(token), guard.autoscroll())
        };
        if removed {
            self.publish(SessionEvent::ThreadUpdated { autoscroll });
        }
        removed
    }

    /// Staff-only: closes the open conversation. Local state only moves to
    /// closed once `close_conversation` was handed to the transport.
    pub async fn close_conversation(&self) -> Result<()> {
        if !self.identity.role.is_staff() {
            return Err(ChatError::Forbidden);
        }
        let (conversation_id, event) = {
            let guard = self.state.lock().await;
            let conversation_id = guard
                .thread
                .conversation_id()
                .cloned()
                .ok_or(ChatError::NoActiveConversation)?;
            let event = guard
                .lifecycle
                .close(&conversation_id, &self.identity.user_id)?;
            (conversation_id, event)
        };
        info!(%conversation_id, "session: closing conversation");
        self.emit(event).await?;
        self.apply_closure(&conversation_id).await;
        self.publish(SessionEvent::DirectoryUpdated);
        Ok(())
    }

    /// Stops the background tasks and closes the transport. Only the first call
    /// has an effect.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.transport.disconnect().await;
        info!(user_id = %self.identity.user_id, "session: shut down");
    }

    pub(crate) async fn handle_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Inbound(ServerEvent::NewMessage(message)) => {
                self.on_new_message(message).await
            }
            ChannelEvent::Inbound(ServerEvent::NewClientMessage {
                sender,
                conversation_id,
            }) => {
                info!(sender = %sender.display_name(), "session: new client message");
                self.publish(SessionEvent::ClientMessageReceived {
                    sender,
                    conversation_id,
                });
                self.refresh_unless_focused().await;
            }
            ChannelEvent::Inbound(ServerEvent::ConversationClosed { conversation_id }) => {
                self.on_conversation_closed(conversation_id).await
            }
            ChannelEvent::Inbound(ServerEvent::MessageError {
                error,
                client_token,
            }) => {
                warn!(%error, ?client_token, "session: server rejected message");
                self.fail_pending(client_token.as_ref(), &error).await;
            }
            ChannelEvent::Disconnected { reason } => {
                self.publish(SessionEvent::ConnectionChanged { connected: false });
                self.notify(NoticeKind::Transport, format!("connection lost: {reason}"));
            }
            ChannelEvent::Reconnected => self.on_reconnected().await,
        }
    }

    async fn on_new_message(&self, message: Message) {
        let (thread_changed, focused) = {
            let mut guard = self.state.lock().await;
            let for_open_thread = guard.is_for_open_thread(&message);
            if !for_open_thread && message.conversation_id.is_none() && guard.thread.is_open() {
                debug!(message_id = %message.id, "session: ignoring message without conversation id");
            }
            let focused = guard.composer.is_focused();
            if !focused {
                guard.directory.note_message(&message);
            }
            if for_open_thread {
                let outcome = guard.thread.reconcile(message, &self.identity.user_id);
                debug!(?outcome, "session: message reconciled");
            }
            (for_open_thread, focused)
        };
        if thread_changed {
            self.publish(SessionEvent::ThreadUpdated {
                autoscroll: !focused,
            });
        }
        self.refresh_unless_focused().await;
    }

    async fn on_conversation_closed(&self, conversation_id: ConversationId) {
        let was_showing = self.apply_closure(&conversation_id).await;
        info!(%conversation_id, was_showing, "session: conversation closed");
        self.publish(SessionEvent::ConversationClosed { conversation_id });
        self.request_refresh();
    }

    /// Marks `conversation_id` closed everywhere and clears it if it is showing.
    async fn apply_closure(&self, conversation_id: &ConversationId) -> bool {
        let was_showing = {
            let mut guard = self.state.lock().await;
            guard.lifecycle.mark_closed(conversation_id);
            guard.directory.mark_closed(conversation_id);
            guard.presence.leave(conversation_id);
            let showing = guard.thread.is_showing(conversation_id);
            if showing {
                guard.thread.clear();
            }
            showing
        };
        if was_showing {
            self.publish(SessionEvent::ThreadUpdated { autoscroll: false });
        }
        was_showing
    }

    async fn on_reconnected(&self) {
        self.publish(SessionEvent::ConnectionChanged { connected: true });
        let rejoin = self.state.lock().await.presence.rejoin_events();
        for event in rejoin {
            if let Err(err) = self.emit(event).await {
                warn!(%err, "session: failed to rejoin room");
            }
        }
        self.resync().await;
    }

    /// Reloads what inbound events may have changed while they were not seen.
    async fn resync(&self) {
        let open = self.state.lock().await.thread.conversation_id().cloned();
        if let Some(conversation_id) = open {
            let _ = self
                .background
                .send(Background::ReloadHistory(conversation_id));
        }
        self.refresh_unless_focused().await;
    }

    /// Queues a directory refresh, or remembers to run one once the composer
    /// loses focus.
    async fn refresh_unless_focused(&self) {
        {
            let mut guard = self.state.lock().await;
            if guard.composer.is_focused() {
                guard.directory.defer_refresh();
                debug!("session: directory refresh deferred while input is focused");
                return;
            }
        }
        self.request_refresh();
    }

    /// At most one refresh waits behind the one in flight.
    fn request_refresh(&self) {
        if self.refresh_queued.swap(true, Ordering::SeqCst) {
            debug!("session: directory refresh already queued");
            return;
        }
        if self.background.send(Background::RefreshDirectory).is_err() {
            self.refresh_queued.store(false, Ordering::SeqCst);
        }
    }

    async fn fail_pending(&self, token: Option<&ClientToken>, reason: &str) {
        let (failed, autoscroll) = {
            let mut guard = self.state.lock().await;
            let failed = guard.thread.mark_failed(token, reason).is_some();
            (failed, guard.autoscroll())
        };
        if failed {
            self.publish(SessionEvent::ThreadUpdated { autoscroll });
        }
        self.notify(NoticeKind::SendFailed, format!("message not sent: {reason}"));
    }

    async fn emit(&self, event: ClientEvent) -> Result<()> {
        let name = event.name();
        self.transport.emit(event).await.map_err(|err| {
            warn!(event = name, %err, "session: emit failed");
            self.notify(NoticeKind::Transport, format!("could not reach chat server: {err}"));
            err
        })
    }

    fn notify(&self, kind: NoticeKind, message: String) {
        self.publish(SessionEvent::Notice(Notice { kind, message }));
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

async fn listen(session: Weak<ChatSession>, mut inbound: broadcast::Receiver<ChannelEvent>) {
    loop {
        let received = inbound.recv().await;
        let Some(session) = session.upgrade() else {
            break;
        };
        match received {
            Ok(event) => session.handle_channel_event(event).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "session: listener lagged behind transport events, resyncing");
                session.resync().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("session: listener stopped");
}

async fn run_background(session: Weak<ChatSession>, mut jobs: mpsc::UnboundedReceiver<Background>) {
    while let Some(job) = jobs.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        match job {
            Background::RefreshDirectory => {
                session.refresh_queued.store(false, Ordering::SeqCst);
                if let Err(err) = session.refresh_directory().await {
                    debug!(%err, "session: directory refresh failed");
                }
            }
            Background::ReloadHistory(conversation_id) => {
                if let Err(err) = session.load_history(&conversation_id).await {
                    debug!(%conversation_id, %err, "session: history reload failed");
                }
            }
        }
    }
    debug!("session: background worker stopped");
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
