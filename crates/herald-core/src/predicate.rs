//! Gating predicates evaluated against a destination at fire-time.
//!
//! A [`Predicate`] is a boolean check over the live state of the destination
//! a scheduled announcement is bound to. Evaluation happens when the timer
//! fires, never at schedule time: the point is to look at the channel right
//! before delivery, so nothing is memoized and staleness is by design.
//!
//! Every variant fails closed. A transport error while fetching history is
//! reported to the caller of [`Predicate::check`] as an error; the scheduler
//! downgrades it to a failed check, logs it, and skips the announcement.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::destination::{Destination, ParticipantId};
use crate::error::PredicateError;
use crate::scheduler::ScheduledSend;

/// A caller-supplied check over the scheduled send about to fire.
pub type CustomCheck = Arc<dyn Fn(&ScheduledSend) -> bool + Send + Sync>;

/// A condition a destination must meet for a scheduled announcement to be
/// delivered.
///
/// Immutable once constructed, owned by the [`ScheduledSend`] that references
/// it, and evaluated exactly once per fire (never on cancel).
#[derive(Clone)]
pub enum Predicate {
    /// Passes when the most recent message is younger than the window.
    ///
    /// Fails on an empty destination: with no messages there is no age to
    /// compare, so there is no verdict and the check fails closed.
    Active(Duration),

    /// Passes when the most recent message is older than the window.
    ///
    /// Like [`Predicate::Active`], fails on an empty destination. An empty
    /// channel is not considered inactive.
    Inactive(Duration),

    /// Passes when at least one of the last `n` messages carries an image
    /// attachment.
    HasImageInLast(usize),

    /// Passes when none of the last `n` messages carry an image attachment.
    NoImageInLast(usize),

    /// Passes when at least one of the last `n` messages was authored by the
    /// given participant.
    HasMessageFromInLast(usize, ParticipantId),

    /// Passes when none of the last `n` messages were authored by the given
    /// participant.
    NoMessageFromInLast(usize, ParticipantId),

    /// Passes when the destination has no retrievable messages.
    Empty,

    /// Passes when the destination has at least one retrievable message.
    NotEmpty,

    /// Passes when the supplied function returns `true` for the scheduled
    /// send about to fire.
    Custom(CustomCheck),
}

impl Predicate {
    /// Wrap a closure as a [`Predicate::Custom`].
    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&ScheduledSend) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(check))
    }

    /// Short name of the variant, used for log context.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Active(_) => "active",
            Self::Inactive(_) => "inactive",
            Self::HasImageInLast(_) => "has_image_in_last",
            Self::NoImageInLast(_) => "no_image_in_last",
            Self::HasMessageFromInLast(_, _) => "has_message_from_in_last",
            Self::NoMessageFromInLast(_, _) => "no_message_from_in_last",
            Self::Empty => "empty",
            Self::NotEmpty => "not_empty",
            Self::Custom(_) => "custom",
        }
    }

    /// Evaluate this predicate against the send's destination.
    ///
    /// Returns `Ok(true)` when the condition holds. Transport failures while
    /// fetching history surface as `Err`; the scheduler treats them as a
    /// failed check.
    pub(crate) async fn check(&self, send: &ScheduledSend) -> Result<bool, PredicateError> {
        let destination = send.destination();
        match self {
            Self::Active(window) => {
                Ok(matches!(latest_age(destination).await?, Some(age) if age < *window))
            }
            Self::Inactive(window) => {
                Ok(matches!(latest_age(destination).await?, Some(age) if age > *window))
            }
            Self::HasImageInLast(count) => has_image(destination, *count).await,
            Self::NoImageInLast(count) => Ok(!has_image(destination, *count).await?),
            Self::HasMessageFromInLast(count, participant) => {
                has_message_from(destination, *count, *participant).await
            }
            Self::NoMessageFromInLast(count, participant) => {
                Ok(!has_message_from(destination, *count, *participant).await?)
            }
            Self::Empty => Ok(destination.recent_messages(1).await?.is_empty()),
            Self::NotEmpty => Ok(!destination.recent_messages(1).await?.is_empty()),
            Self::Custom(check) => Ok(check(send)),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active(window) => f.debug_tuple("Active").field(window).finish(),
            Self::Inactive(window) => f.debug_tuple("Inactive").field(window).finish(),
            Self::HasImageInLast(count) => f.debug_tuple("HasImageInLast").field(count).finish(),
            Self::NoImageInLast(count) => f.debug_tuple("NoImageInLast").field(count).finish(),
            Self::HasMessageFromInLast(count, participant) => f
                .debug_tuple("HasMessageFromInLast")
                .field(count)
                .field(participant)
                .finish(),
            Self::NoMessageFromInLast(count, participant) => f
                .debug_tuple("NoMessageFromInLast")
                .field(count)
                .field(participant)
                .finish(),
            Self::Empty => f.write_str("Empty"),
            Self::NotEmpty => f.write_str("NotEmpty"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Age of the most recent message, or `None` for an empty destination.
async fn latest_age(destination: &dyn Destination) -> Result<Option<Duration>, PredicateError> {
    let history = destination.recent_messages(1).await?;
    Ok(history.first().map(|snapshot| snapshot.age()))
}

async fn has_image(destination: &dyn Destination, count: usize) -> Result<bool, PredicateError> {
    let history = destination.recent_messages(count).await?;
    Ok(history.iter().any(|snapshot| snapshot.has_image_attachment))
}

async fn has_message_from(
    destination: &dyn Destination,
    count: usize,
    participant: ParticipantId,
) -> Result<bool, PredicateError> {
    let history = destination.recent_messages(count).await?;
    Ok(history
        .iter()
        .any(|snapshot| snapshot.author_id == participant))
}
