use serde::{Deserialize, Serialize};

use crate::domain::{Message, UserId};

/// Frames sent from the client to the relay.
///
/// Room membership is the addressing mechanism for direct delivery;
/// broadcast delivery needs no explicit room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinRoom { identity: UserId },
    LeaveRoom { identity: UserId },
    SendMessage { message: Message },
}

/// Frames delivered by the relay. The relay is a dumb fan-out: frames
/// may arrive duplicated (including the sender's own echo) and in
/// arrival order only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RelayEvent {
    ReceiveMessage { message: Message },
}
