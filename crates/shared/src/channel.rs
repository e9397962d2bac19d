use crate::domain::{ChannelId, UserId};

/// Fixed id of the public broadcast channel.
pub const BROADCAST_CHANNEL: &str = "global";

/// Separator used when deriving a direct-channel id from two
/// identities. Identities themselves never contain this character.
pub const DIRECT_SEPARATOR: char = '-';

/// Logical conversation scope before resolution to a channel id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAddress {
    Broadcast,
    Direct(UserId, UserId),
}

impl ChannelAddress {
    /// Resolves the address to its stable channel id.
    ///
    /// Direct channels sort the two participant identities
    /// lexicographically before joining, so the derived id is
    /// symmetric: `Direct(a, b)` and `Direct(b, a)` resolve
    /// identically. Pure and total; a degenerate `Direct(a, a)` is
    /// resolvable but rejected upstream at the UI-action boundary.
    pub fn channel_id(&self) -> ChannelId {
        match self {
            ChannelAddress::Broadcast => ChannelId::new(BROADCAST_CHANNEL),
            ChannelAddress::Direct(a, b) => {
                let (low, high) = if a.as_str() <= b.as_str() {
                    (a, b)
                } else {
                    (b, a)
                };
                ChannelId::new(format!("{low}{DIRECT_SEPARATOR}{high}"))
            }
        }
    }
}

pub fn is_broadcast(channel_id: &ChannelId) -> bool {
    channel_id.as_str() == BROADCAST_CHANNEL
}

/// Derives the interlocutor of a direct channel, given one known
/// participant.
///
/// Returns `None` for the broadcast id, for channel ids that do not
/// contain `known_self`, and for the degenerate self-channel (where
/// there is no "other" side).
pub fn other_participant(channel_id: &ChannelId, known_self: &UserId) -> Option<UserId> {
    if is_broadcast(channel_id) {
        return None;
    }
    let (left, right) = channel_id.as_str().split_once(DIRECT_SEPARATOR)?;
    if left == known_self.as_str() && right == known_self.as_str() {
        None
    } else if left == known_self.as_str() {
        Some(UserId::new(right))
    } else if right == known_self.as_str() {
        Some(UserId::new(left))
    } else {
        None
    }
}
