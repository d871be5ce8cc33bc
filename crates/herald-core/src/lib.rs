//! # Herald Core
//!
//! Message building, gating predicates, and the deferred-delivery scheduler
//! for herald.
//!
//! The crate is organized around five pieces:
//!
//! - [`Message`]: an immutable-once-built payload of text content, embeds,
//!   and link-button rows.
//! - [`Announcement`]: a fluent builder for a [`Message`] paired with send
//!   operations (immediate, send-and-pin, delayed, conditionally gated).
//! - [`Destination`]: the trait the core consumes: somewhere that can report
//!   recent history, receive a message, and pin a sent message. Platform
//!   bindings (e.g. `herald-discord`) implement it.
//! - [`Predicate`]: a boolean gating check evaluated against a destination
//!   at fire-time, just before a delayed delivery goes out.
//! - [`Scheduler`]: a shared timer service multiplexing many independent
//!   delayed sends, each with its own cancellation handle.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod announcement;
pub mod destination;
pub mod error;
pub mod message;
pub mod predicate;
pub mod scheduler;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use announcement::{Announcement, DeliveryHandle};
pub use destination::{
    Destination, MessageId, MessageSnapshot, ParticipantId, SentMessageHandle,
};
pub use error::{TransportError, ValidationError};
pub use message::{ActionRow, Embed, EmbedField, LinkButton, Message};
pub use predicate::Predicate;
pub use scheduler::{CancelHandle, FireOutcome, ScheduleId, ScheduledSend, Scheduler};
