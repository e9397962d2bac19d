use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared::{
    channel::{other_participant, ChannelAddress},
    domain::{Attachment, ChannelId, ConnectionState, Message, MessageId, UserId},
    error::ChatError,
    protocol::{ClientFrame, RelayEvent},
};
use storage::MessageStore;

pub mod attachment;
pub mod session;

pub use attachment::PendingUpload;
pub use session::{SessionBinder, SessionEvent, SessionProvider};

/// Pause between reconnect attempts. Fixed pacing, no backoff: the
/// delay only keeps the loop from spinning against a dead relay.
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Events published to UI subscribers. Store mutations have their own
/// feed (`MessageStore::subscribe`); this channel carries connection
/// transitions, observed display-name updates, and transient notices.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connection(ConnectionState),
    DirectoryUpdated { identity: UserId, name: String },
    Notice { level: NoticeLevel, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

/// Read-only id -> display-name lookup, injected rather than queried
/// globally so the messaging core stays testable in isolation. Used
/// only for rendering; stored `sender_name` snapshots are never
/// rewritten from it.
pub trait UserDirectory: Send + Sync {
    fn lookup_display_name(&self, identity: &UserId) -> Option<String>;

    fn contains(&self, identity: &UserId) -> bool {
        self.lookup_display_name(identity).is_some()
    }
}

pub struct MissingUserDirectory;

impl UserDirectory for MissingUserDirectory {
    fn lookup_display_name(&self, _identity: &UserId) -> Option<String> {
        None
    }
}

/// Fixed roster directory for the CLI and tests.
pub struct StaticUserDirectory {
    users: HashMap<UserId, String>,
}

impl StaticUserDirectory {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            users: pairs
                .into_iter()
                .map(|(id, name)| (UserId::new(id), name))
                .collect(),
        }
    }
}

impl UserDirectory for StaticUserDirectory {
    fn lookup_display_name(&self, identity: &UserId) -> Option<String> {
        self.users.get(identity).cloned()
    }
}

/// A direct-message interlocutor derived from stored history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub identity: UserId,
    pub display_name: String,
}

/// Owns the single relay connection and its state machine:
/// `Disconnected -> Connecting -> Connected`, back to `Disconnected`
/// on any socket error or close, then an unconditional retry.
///
/// Inbound `receive_message` frames flow into the message store;
/// its idempotent append absorbs duplicate delivery, including the
/// sender's own echo. Outbound publishes are fire-and-forget and are
/// silently dropped while disconnected; the message stays visible
/// locally regardless.
pub struct RelayClient {
    relay_url: String,
    store: Arc<MessageStore>,
    events: broadcast::Sender<ClientEvent>,
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<RelayInner>,
    connect_task: Mutex<Option<JoinHandle<()>>>,
}

struct RelayInner {
    identity: Option<UserId>,
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    observed_names: HashMap<UserId, String>,
}

impl RelayClient {
    pub fn new(
        relay_url: impl Into<String>,
        store: Arc<MessageStore>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            relay_url: relay_url.into(),
            store,
            events,
            state_tx,
            inner: Mutex::new(RelayInner {
                identity: None,
                outbound: None,
                observed_names: HashMap::new(),
            }),
            connect_task: Mutex::new(None),
        })
    }

    /// Enters the connect/reconnect loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.connect_task.lock().expect("relay task lock poisoned");
        if task.is_some() {
            return;
        }
        let client = Arc::clone(self);
        *task = Some(tokio::spawn(client.run()));
    }

    /// Tears down the connection and stops reconnecting.
    pub fn shutdown(&self) {
        if let Some(task) = self
            .connect_task
            .lock()
            .expect("relay task lock poisoned")
            .take()
        {
            task.abort();
        }
        self.inner.lock().expect("relay state lock poisoned").outbound = None;
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Binds the active identity for room addressing. Joins the room
    /// immediately when connected; the connect loop re-joins on every
    /// future `Connected` transition.
    pub fn bind_identity(&self, identity: UserId) {
        let mut inner = self.inner.lock().expect("relay state lock poisoned");
        if let Some(tx) = &inner.outbound {
            let _ = tx.send(ClientFrame::JoinRoom {
                identity: identity.clone(),
            });
        }
        inner.identity = Some(identity);
    }

    /// Leaves the active room (if connected) and clears the binding.
    pub fn release_identity(&self) {
        let mut inner = self.inner.lock().expect("relay state lock poisoned");
        if let (Some(identity), Some(tx)) = (inner.identity.clone(), &inner.outbound) {
            let _ = tx.send(ClientFrame::LeaveRoom { identity });
        }
        inner.identity = None;
    }

    /// Best-effort transmission. No error reaches the caller when the
    /// relay is unreachable; local-first visibility already happened.
    pub fn publish(&self, message: Message) {
        let inner = self.inner.lock().expect("relay state lock poisoned");
        match &inner.outbound {
            Some(tx) => {
                let _ = tx.send(ClientFrame::SendMessage { message });
            }
            None => {
                debug!(message_id = %message.id, "relay unavailable, dropping publish");
            }
        }
    }

    /// Display name observed from inbound message snapshots.
    pub fn observed_name(&self, identity: &UserId) -> Option<String> {
        let inner = self.inner.lock().expect("relay state lock poisoned");
        inner.observed_names.get(identity).cloned()
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.set_state(ConnectionState::Connecting);
            match connect_async(&self.relay_url).await {
                Ok((socket, _)) => {
                    info!(url = %self.relay_url, "relay connected");
                    self.set_state(ConnectionState::Connected);

                    let (mut sink, mut stream) = socket.split();
                    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientFrame>();
                    {
                        let mut inner = self.inner.lock().expect("relay state lock poisoned");
                        if let Some(identity) = inner.identity.clone() {
                            let _ = outbound_tx.send(ClientFrame::JoinRoom { identity });
                        }
                        inner.outbound = Some(outbound_tx);
                    }

                    let writer = tokio::spawn(async move {
                        while let Some(frame) = outbound_rx.recv().await {
                            let text = match serde_json::to_string(&frame) {
                                Ok(text) => text,
                                Err(err) => {
                                    warn!("failed to serialize outbound frame: {err}");
                                    continue;
                                }
                            };
                            if sink.send(WsMessage::Text(text)).await.is_err() {
                                break;
                            }
                        }
                    });

                    while let Some(message) = stream.next().await {
                        match message {
                            Ok(WsMessage::Text(text)) => self.handle_frame(&text),
                            Ok(WsMessage::Close(_)) => break,
                            Ok(_) => {}
                            Err(err) => {
                                warn!("relay receive failed: {err}");
                                break;
                            }
                        }
                    }

                    writer.abort();
                    self.inner.lock().expect("relay state lock poisoned").outbound = None;
                }
                Err(err) => {
                    warn!(url = %self.relay_url, "relay connect failed: {err}");
                }
            }

            self.set_state(ConnectionState::Disconnected);
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<RelayEvent>(text) {
            Ok(RelayEvent::ReceiveMessage { message }) => {
                self.record_sender_name(&message);
                self.store.append(message);
            }
            Err(err) => {
                warn!("invalid relay event: {err}");
            }
        }
    }

    fn record_sender_name(&self, message: &Message) {
        let changed = {
            let mut inner = self.inner.lock().expect("relay state lock poisoned");
            if inner.observed_names.get(&message.sender_id) != Some(&message.sender_name) {
                inner
                    .observed_names
                    .insert(message.sender_id.clone(), message.sender_name.clone());
                true
            } else {
                false
            }
        };

        if changed {
            let _ = self.events.send(ClientEvent::DirectoryUpdated {
                identity: message.sender_id.clone(),
                name: message.sender_name.clone(),
            });
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            let _ = self.events.send(ClientEvent::Connection(state));
        }
    }
}

struct ActiveSession {
    identity: UserId,
    display_name: String,
}

struct ChatInner {
    session: Option<ActiveSession>,
    active_conversation: Option<UserId>,
}

/// Facade over store + relay + directory: the subscription surface for
/// the UI and the entry point for every user-initiated messaging
/// action.
pub struct ChatClient {
    store: Arc<MessageStore>,
    relay: Arc<RelayClient>,
    directory: Arc<dyn UserDirectory>,
    events: broadcast::Sender<ClientEvent>,
    inner: Mutex<ChatInner>,
}

impl ChatClient {
    pub fn new(
        store: Arc<MessageStore>,
        relay_url: impl Into<String>,
        directory: Arc<dyn UserDirectory>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let relay = RelayClient::new(relay_url, Arc::clone(&store), events.clone());
        Arc::new(Self {
            store,
            relay,
            directory,
            events,
            inner: Mutex::new(ChatInner {
                session: None,
                active_conversation: None,
            }),
        })
    }

    pub fn start(self: &Arc<Self>) {
        self.relay.start();
    }

    pub fn shutdown(&self) {
        self.relay.shutdown();
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.relay.connection_state()
    }

    /// Binds a fresh session and joins its relay room. Message history
    /// is not session-scoped; whatever the store already holds stays.
    pub fn login(&self, identity: UserId, display_name: impl Into<String>) {
        let display_name = display_name.into();
        {
            let mut inner = self.inner.lock().expect("chat state lock poisoned");
            inner.session = Some(ActiveSession {
                identity: identity.clone(),
                display_name: display_name.clone(),
            });
        }
        self.relay.bind_identity(identity);
        self.notice(NoticeLevel::Success, format!("Welcome back, {display_name}"));
    }

    /// Leaves the relay room for the outgoing identity, then clears
    /// session-scoped state (active conversation). No-op when logged
    /// out.
    pub fn logout(&self) {
        let had_session = {
            let mut inner = self.inner.lock().expect("chat state lock poisoned");
            let had_session = inner.session.take().is_some();
            inner.active_conversation = None;
            had_session
        };
        if had_session {
            self.relay.release_identity();
            self.notice(NoticeLevel::Success, "Logged out successfully");
        }
    }

    pub fn current_identity(&self) -> Option<UserId> {
        let inner = self.inner.lock().expect("chat state lock poisoned");
        inner.session.as_ref().map(|s| s.identity.clone())
    }

    /// Sends `content` (and an optional attachment) into a channel.
    ///
    /// Empty/whitespace content with no attachment is silently
    /// discarded. The message is appended locally first and is visible
    /// via `query` regardless of relay transmission outcome.
    pub fn send(
        &self,
        content: impl Into<String>,
        channel_id: ChannelId,
        attachment: Option<Attachment>,
    ) -> Result<(), ChatError> {
        let content = content.into();
        if content.trim().is_empty() && attachment.is_none() {
            return Ok(());
        }

        let (sender_id, sender_name) = {
            let inner = self.inner.lock().expect("chat state lock poisoned");
            let session = inner.session.as_ref().ok_or(ChatError::NotLoggedIn)?;
            (session.identity.clone(), session.display_name.clone())
        };

        let message = Message {
            id: MessageId::new(Uuid::new_v4().to_string()),
            sender_id,
            sender_name,
            content,
            attachment,
            channel_id,
            timestamp: Utc::now().timestamp_millis(),
        };

        self.store.append(message.clone());
        self.relay.publish(message);
        Ok(())
    }

    /// Encodes an upload and sends it with kind-appropriate
    /// placeholder text. An oversized resource is rejected before any
    /// store mutation and surfaced as a transient notice.
    pub async fn send_upload(
        &self,
        channel_id: ChannelId,
        upload: &PendingUpload,
    ) -> Result<(), ChatError> {
        let attachment = match attachment::encode(upload).await {
            Ok(attachment) => attachment,
            Err(err) => {
                self.notice(NoticeLevel::Error, err.to_string());
                return Err(err);
            }
        };
        let placeholder = attachment::placeholder_text(&attachment);
        self.send(placeholder, channel_id, Some(attachment))
    }

    /// Opens (or resumes) a direct conversation with `raw_target`.
    ///
    /// The raw id is normalized (trimmed, uppercased) before lookup.
    /// Self-chat and unknown recipients are rejected here, before the
    /// channel resolver ever runs, and surfaced as notices.
    pub fn join_conversation(&self, raw_target: &str) -> Result<ChannelId, ChatError> {
        let own = self.current_identity().ok_or(ChatError::NotLoggedIn)?;
        let target = UserId::new(raw_target.trim().to_ascii_uppercase());

        if target == own {
            let err = ChatError::SelfConversation;
            self.notice(NoticeLevel::Error, err.to_string());
            return Err(err);
        }
        if !self.directory.contains(&target) {
            let err = ChatError::RecipientNotFound { identity: target };
            self.notice(NoticeLevel::Error, err.to_string());
            return Err(err);
        }

        {
            let mut inner = self.inner.lock().expect("chat state lock poisoned");
            inner.active_conversation = Some(target.clone());
        }
        Ok(ChannelAddress::Direct(own, target).channel_id())
    }

    pub fn leave_conversation(&self) {
        let mut inner = self.inner.lock().expect("chat state lock poisoned");
        inner.active_conversation = None;
    }

    pub fn active_conversation(&self) -> Option<UserId> {
        let inner = self.inner.lock().expect("chat state lock poisoned");
        inner.active_conversation.clone()
    }

    pub fn messages(&self, channel_id: &ChannelId) -> Vec<Message> {
        self.store.query(channel_id)
    }

    /// Direct-message interlocutors derived from stored history, with
    /// display names resolved from the directory, falling back to
    /// names observed on the wire, then to a placeholder.
    pub fn list_recent_conversations(&self) -> Vec<Conversation> {
        let Some(own) = self.current_identity() else {
            return Vec::new();
        };

        self.store
            .channels_touching(&own)
            .iter()
            .filter_map(|channel| other_participant(channel, &own))
            .map(|identity| {
                let display_name = self
                    .directory
                    .lookup_display_name(&identity)
                    .or_else(|| self.relay.observed_name(&identity))
                    .unwrap_or_else(|| "Unknown User".to_string());
                Conversation {
                    identity,
                    display_name,
                }
            })
            .collect()
    }

    fn notice(&self, level: NoticeLevel, text: impl Into<String>) {
        let _ = self.events.send(ClientEvent::Notice {
            level,
            text: text.into(),
        });
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
