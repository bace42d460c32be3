//! Persistent WebSocket channel carrying named chat events.
//!
//! One [`WsTransport`] is opened per signed-in user. After the initial handshake a
//! supervisor task owns the socket: it forwards inbound frames to subscribers,
//! writes outbound events, and reconnects with exponential backoff when the
//! connection drops. `send_message` events that could not be written are kept in
//! a bounded outbox and replayed once the socket is back.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::{
    domain::UserId,
    protocol::{ClientEvent, ServerEvent},
};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{ChatError, Result},
    settings::ChatSettings,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Inbound(ServerEvent),
    Disconnected { reason: String },
    Reconnected,
}

#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Queues an outbound event. Delivery is fire-and-forget.
    async fn emit(&self, event: ClientEvent) -> Result<()>;
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
    /// Closes the connection. Calling it again is a no-op.
    async fn disconnect(&self);
}

pub struct WsTransport {
    url: Url,
    outbound: mpsc::Sender<ClientEvent>,
    events: broadcast::Sender<ChannelEvent>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WsTransport {
    pub async fn connect(settings: &ChatSettings, user_id: &UserId) -> Result<Arc<Self>> {
        let url = settings.ws_url(user_id)?;
        let stream = open_socket(&url).await?;
        info!(%user_id, url = %url, "transport: connected");

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(settings.event_buffer.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor {
            url: url.clone(),
            backoff: Backoff::new(
                settings.reconnect_initial_delay(),
                settings.reconnect_max_delay(),
            ),
            outbox: Outbox::new(settings.outbox_capacity),
            outbound_rx,
            events: events.clone(),
            shutdown_rx,
        };
        let task = tokio::spawn(supervisor.run(stream));

        Ok(Arc::new(Self {
            url,
            outbound,
            events,
            shutdown,
            supervisor: Mutex::new(Some(task)),
        }))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TransportChannel for WsTransport {
    async fn emit(&self, event: ClientEvent) -> Result<()> {
        debug!(event = event.name(), "transport: emit");
        self.outbound
            .send(event)
            .await
            .map_err(|_| ChatError::ChannelClosed)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn disconnect(&self) {
        let Some(task) = self.supervisor.lock().await.take() else {
            return;
        };
        let _ = self.shutdown.send(true);
        if let Err(err) = task.await {
            warn!(%err, "transport: supervisor task ended abnormally");
        }
        info!(url = %self.url, "transport: disconnected");
    }
}

async fn open_socket(url: &Url) -> Result<WsStream> {
    let (stream, _) = connect_async(url.as_str())
        .await
        .map_err(|source| ChatError::Connect {
            url: url.to_string(),
            source: Box::new(source),
        })?;
    Ok(stream)
}

enum ConnectionEnd {
    Shutdown,
    Lost(String),
}

struct Supervisor {
    url: Url,
    backoff: Backoff,
    outbox: Outbox,
    outbound_rx: mpsc::Receiver<ClientEvent>,
    events: broadcast::Sender<ChannelEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self, mut stream: WsStream) {
        loop {
            let reason = match self.drive(stream).await {
                ConnectionEnd::Shutdown => return,
                ConnectionEnd::Lost(reason) => reason,
            };
            warn!(url = %self.url, %reason, "transport: connection lost");
            let _ = self.events.send(ChannelEvent::Disconnected { reason });

            stream = match self.reconnect().await {
                Some(stream) => stream,
                None => return,
            };
            info!(url = %self.url, pending = self.outbox.len(), "transport: reconnected");
            let _ = self.events.send(ChannelEvent::Reconnected);
        }
    }

    async fn drive(&mut self, stream: WsStream) -> ConnectionEnd {
        let (mut writer, mut reader) = stream.split();

        while let Some(event) = self.outbox.pop() {
            if let Err(err) = write_event(&mut writer, &event).await {
                self.outbox.requeue_front(event);
                return ConnectionEnd::Lost(err);
            }
        }

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    let _ = writer.send(WsMessage::Close(None)).await;
                    return ConnectionEnd::Shutdown;
                }
                frame = reader.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.dispatch(&text),
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return ConnectionEnd::Lost("server closed the connection".into());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return ConnectionEnd::Lost(err.to_string()),
                },
                outbound = self.outbound_rx.recv() => {
                    let Some(event) = outbound else {
                        let _ = writer.send(WsMessage::Close(None)).await;
                        return ConnectionEnd::Shutdown;
                    };
                    if let Err(err) = write_event(&mut writer, &event).await {
                        self.outbox.push(event);
                        return ConnectionEnd::Lost(err);
                    }
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => {
                let _ = self.events.send(ChannelEvent::Inbound(event));
            }
            Err(err) => warn!(%err, frame = text, "transport: ignoring unrecognized frame"),
        }
    }

    /// Retries until a socket opens or shutdown is requested. Events emitted in the
    /// meantime go to the outbox.
    async fn reconnect(&mut self) -> Option<WsStream> {
        loop {
            let delay = self.backoff.next_delay();
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = self.shutdown_rx.changed() => return None,
                    _ = &mut sleep => break,
                    outbound = self.outbound_rx.recv() => match outbound {
                        Some(event) => {
                            self.outbox.push(event);
                        }
                        None => return None,
                    },
                }
            }

            match open_socket(&self.url).await {
                Ok(stream) => {
                    self.backoff.reset();
                    return Some(stream);
                }
                Err(err) => {
                    debug!(
                        %err,
                        retry_in = ?self.backoff.peek(),
                        "transport: reconnect attempt failed"
                    );
                }
            }
        }
    }
}

async fn write_event<S>(writer: &mut S, event: &ClientEvent) -> std::result::Result<(), String>
where
    S: futures::Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(event).map_err(|err| err.to_string())?;
    writer
        .send(WsMessage::Text(text))
        .await
        .map_err(|err| err.to_string())
}

#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub(crate) fn peek(&self) -> Duration {
        self.current
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Unsent `send_message` events, oldest first, unique per client token.
#[derive(Debug)]
pub(crate) struct Outbox {
    capacity: usize,
    queue: VecDeque<ClientEvent>,
}

impl Outbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: VecDeque::new(),
        }
    }

    /// Returns false when the event is not replayable and was dropped.
    pub(crate) fn push(&mut self, event: ClientEvent) -> bool {
        if !matches!(event, ClientEvent::SendMessage { .. }) {
            debug!(event = event.name(), "transport: dropping event while offline");
            return false;
        }
        if let Some(token) = event.client_token() {
            if let Some(existing) = self
                .queue
                .iter_mut()
                .find(|queued| queued.client_token() == Some(token))
            {
                *existing = event;
                return true;
            }
        }
        if self.queue.len() == self.capacity {
            if let Some(dropped) = self.queue.pop_front() {
                warn!(
                    client_token = ?dropped.client_token(),
                    "transport: outbox full, dropping oldest unsent message"
                );
            }
        }
        self.queue.push_back(event);
        true
    }

    pub(crate) fn pop(&mut self) -> Option<ClientEvent> {
        self.queue.pop_front()
    }

    pub(crate) fn requeue_front(&mut self, event: ClientEvent) {
        self.queue.push_front(event);
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
