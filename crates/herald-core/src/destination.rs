//! The [`Destination`] trait and the snapshot types it reports.
//!
//! A destination is the external channel-like target the core delivers to:
//! it can report its most recent messages, receive a built
//! [`Message`](crate::Message), and pin a message it previously accepted.
//! Platform bindings implement this trait; the core never talks to a wire
//! protocol itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::TransportError;
use crate::message::Message;

/// An opaque participant (author) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque identifier for a message accepted by a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for a message a destination has accepted, usable to pin it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessageHandle {
    /// Identifier assigned by the destination.
    pub message_id: MessageId,
}

/// A lightweight view of one message in a destination's recent history.
///
/// This is everything predicate evaluation needs; bindings discard the rest
/// of the platform message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    /// Who sent the message.
    pub author_id: ParticipantId,
    /// When the message was originally sent. Edits do not move this.
    pub sent_at: DateTime<Utc>,
    /// Whether the message carries at least one image attachment.
    pub has_image_attachment: bool,
}

impl MessageSnapshot {
    /// Age of this message relative to `now`, saturating to zero for
    /// messages timestamped in the future.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.sent_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Age of this message relative to the current wall clock.
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }
}

/// Something the core can deliver announcements to.
///
/// Implementations must be safe for concurrent use: many scheduled sends may
/// query and deliver to the same destination at once, and the core does not
/// serialize access. If strict per-channel delivery ordering matters, the
/// implementation owns that (e.g. a single-writer queue inside the
/// transport), not the scheduler.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Fetch up to `count` of the most recent messages, newest first.
    ///
    /// Returning fewer than `count` snapshots means the destination holds
    /// fewer messages; an empty vector means it is empty. Implementations
    /// must never truncate silently: a `count` beyond what the transport can
    /// fetch in full is an error, not a shorter result.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if history cannot be fetched, or if
    /// `count` exceeds the transport's fetch limit.
    async fn recent_messages(&self, count: usize) -> Result<Vec<MessageSnapshot>, TransportError>;

    /// Deliver a built message.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if delivery fails. The core never
    /// retries; whatever retrying the transport itself does is invisible
    /// here.
    async fn send(&self, message: &Message) -> Result<SentMessageHandle, TransportError>;

    /// Pin a previously sent message.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if pinning fails. Callers treat this as
    /// non-fatal.
    async fn pin(&self, handle: &SentMessageHandle) -> Result<(), TransportError>;
}
