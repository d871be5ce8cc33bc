//! Error types for the herald core, using thiserror.

use thiserror::Error;

use crate::message::{MAX_ACTION_ROWS, MAX_EMBEDS};

/// Errors raised when building a [`Message`](crate::Message) from an
/// [`Announcement`](crate::Announcement).
///
/// These are caller bugs and are surfaced synchronously from `build()` (and
/// from the send operations, which render before doing anything else).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The message has neither text content nor embeds.
    #[error("message has no content and no embeds")]
    EmptyMessage,

    /// The message carries more embeds than the platform allows.
    #[error("message has {0} embeds, the maximum is {MAX_EMBEDS}")]
    TooManyEmbeds(usize),

    /// The message carries more action rows than the platform allows.
    #[error("message has {0} action rows, the maximum is {MAX_ACTION_ROWS}")]
    TooManyActionRows(usize),
}

/// Errors raised by a [`Destination`](crate::Destination) implementation.
///
/// Delivery transport errors are reported once through the delivery handle
/// and are never retried by the core. Transport errors raised during
/// predicate evaluation never escape the scheduler; they downgrade to a
/// failed check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The platform API rejected or failed the request.
    #[error("destination API error: {0}")]
    Api(String),

    /// The request did not complete in time.
    #[error("destination request timed out")]
    Timeout,

    /// The delivery task was interrupted before producing a result.
    #[error("delivery interrupted: {0}")]
    Interrupted(String),
}

/// Internal error produced while evaluating a predicate.
///
/// Always downgraded to a failed check by the scheduler loop; logged, never
/// propagated.
#[derive(Debug, Error)]
pub(crate) enum PredicateError {
    /// Fetching destination history failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
