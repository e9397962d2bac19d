use std::sync::Arc;

use tokio::{sync::broadcast, task::JoinHandle};
use tracing::info;

use shared::domain::UserId;

use crate::ChatClient;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    LoggedIn {
        identity: UserId,
        display_name: String,
    },
    LoggedOut,
}

/// Boundary to the auth/session collaborator: the current identity
/// plus a login/logout event feed.
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<(UserId, String)>;
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Ties relay room membership to the session lifecycle.
///
/// On login the new identity is bound (room joined immediately if
/// connected, otherwise on the next `Connected` transition); on logout
/// the room is left before the session clears. Message history is not
/// session-scoped and survives the cycle.
pub struct SessionBinder {
    task: JoinHandle<()>,
}

impl SessionBinder {
    pub fn bind(provider: Arc<dyn SessionProvider>, chat: Arc<ChatClient>) -> Self {
        if let Some((identity, display_name)) = provider.current_user() {
            chat.login(identity, display_name);
        }

        let mut events = provider.subscribe();
        let task = tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    SessionEvent::LoggedIn {
                        identity,
                        display_name,
                    } => {
                        info!(identity = %identity, "session: login, binding relay room");
                        chat.login(identity, display_name);
                    }
                    SessionEvent::LoggedOut => {
                        info!("session: logout, releasing relay room");
                        chat.logout();
                    }
                }
            }
        });

        Self { task }
    }

    pub fn unbind(self) {
        self.task.abort();
    }
}

impl Drop for SessionBinder {
    fn drop(&mut self) {
        self.task.abort();
    }
}
