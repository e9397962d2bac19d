use thiserror::Error;

use crate::domain::UserId;

/// Bytes of original resource content an inline attachment may carry.
pub const MAX_ATTACHMENT_BYTES: u64 = 1024 * 1024;

/// Errors surfaced to the user as transient notices.
///
/// Deliberately narrow: empty sends are silently ignored, publishing
/// while disconnected is a silent wire-level drop, and a malformed
/// persisted snapshot resets the store. None of those appear here
/// because none of them have a direct user action attached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("File too large (limit 1MB)")]
    AttachmentTooLarge { size_bytes: u64 },
    #[error("failed to read attachment: {reason}")]
    AttachmentUnreadable { reason: String },
    #[error("User not found. Try a valid ID.")]
    RecipientNotFound { identity: UserId },
    #[error("You can't DM yourself")]
    SelfConversation,
    #[error("not logged in")]
    NotLoggedIn,
}
