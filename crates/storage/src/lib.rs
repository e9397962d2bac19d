use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::warn;

use shared::{
    channel::{is_broadcast, DIRECT_SEPARATOR},
    domain::{ChannelId, Message, MessageId, UserId},
};

/// Emitted after every successful insertion. Receivers are UI-facing;
/// lagging subscribers miss events, never messages.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Appended { channel_id: ChannelId },
}

/// Ordered, id-deduplicated, durable message collection.
///
/// Mutation is a synchronous snapshot replace under one lock, so
/// reads observe either the state before an append or after it, never
/// a partial write. The idempotent `append` is the sole deduplication
/// mechanism for the relay's at-least-once delivery.
pub struct MessageStore {
    inner: Mutex<StoreInner>,
    snapshot_path: Option<PathBuf>,
    events: broadcast::Sender<StoreEvent>,
}

struct StoreInner {
    messages: Vec<Message>,
    seen_ids: HashSet<MessageId>,
}

impl MessageStore {
    /// Opens a store backed by a JSON snapshot file, rehydrating any
    /// previously persisted history.
    ///
    /// A snapshot that cannot be read or parsed is discarded and the
    /// store starts empty: persisted-state corruption must never take
    /// the messaging subsystem down with it.
    pub fn open(snapshot_path: impl Into<PathBuf>) -> Result<Self> {
        let snapshot_path = snapshot_path.into();
        ensure_parent_dir_exists(&snapshot_path)?;
        let messages = load_snapshot(&snapshot_path);
        Ok(Self::from_parts(messages, Some(snapshot_path)))
    }

    /// In-memory store with no durability. Used by tests and callers
    /// that manage persistence elsewhere.
    pub fn ephemeral() -> Self {
        Self::from_parts(Vec::new(), None)
    }

    fn from_parts(messages: Vec<Message>, snapshot_path: Option<PathBuf>) -> Self {
        let seen_ids = messages.iter().map(|m| m.id.clone()).collect();
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(StoreInner { messages, seen_ids }),
            snapshot_path,
            events,
        }
    }

    /// Inserts `message` unless one with the same id is already
    /// present. Returns whether an insertion occurred.
    ///
    /// On insertion the full ordered collection is rewritten to the
    /// snapshot path. A failed write is logged and does not undo the
    /// local insertion: local visibility wins over durability.
    pub fn append(&self, message: Message) -> bool {
        let channel_id = {
            let mut inner = self.inner.lock().expect("message store lock poisoned");
            if inner.seen_ids.contains(&message.id) {
                return false;
            }
            inner.seen_ids.insert(message.id.clone());
            let channel_id = message.channel_id.clone();
            inner.messages.push(message);

            if let Some(path) = &self.snapshot_path {
                match serde_json::to_vec(&inner.messages) {
                    Ok(bytes) => {
                        if let Err(err) = fs::write(path, bytes) {
                            warn!(path = %path.display(), "failed to persist message snapshot: {err}");
                        }
                    }
                    Err(err) => {
                        warn!(path = %path.display(), "failed to serialize message snapshot: {err}");
                    }
                }
            }
            channel_id
        };

        let _ = self.events.send(StoreEvent::Appended { channel_id });
        true
    }

    /// All messages in `channel_id`, in append order. A fresh copy on
    /// every call; never re-sorted by timestamp.
    pub fn query(&self, channel_id: &ChannelId) -> Vec<Message> {
        let inner = self.inner.lock().expect("message store lock poisoned");
        inner
            .messages
            .iter()
            .filter(|m| &m.channel_id == channel_id)
            .cloned()
            .collect()
    }

    /// Distinct non-broadcast channel ids with `identity` as a
    /// participant.
    pub fn channels_touching(&self, identity: &UserId) -> BTreeSet<ChannelId> {
        let inner = self.inner.lock().expect("message store lock poisoned");
        inner
            .messages
            .iter()
            .filter(|m| channel_touches(&m.channel_id, identity))
            .map(|m| m.channel_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("message store lock poisoned");
        inner.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

fn channel_touches(channel_id: &ChannelId, identity: &UserId) -> bool {
    if is_broadcast(channel_id) {
        return false;
    }
    match channel_id.as_str().split_once(DIRECT_SEPARATOR) {
        Some((left, right)) => left == identity.as_str() || right == identity.as_str(),
        None => false,
    }
}

fn load_snapshot(path: &Path) -> Vec<Message> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(path = %path.display(), "failed to read message snapshot, starting empty: {err}");
            return Vec::new();
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(messages) => messages,
        Err(err) => {
            warn!(path = %path.display(), "malformed message snapshot, starting empty: {err}");
            Vec::new()
        }
    }
}

fn ensure_parent_dir_exists(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for message snapshot",
            parent.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
