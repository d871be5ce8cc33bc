//! Announcement building and delivery operations.
//!
//! An [`Announcement`] is a fluent builder for a [`Message`] paired with the
//! operations that send it: immediately, immediately-then-pin, after a
//! delay, or after a delay gated on [`Predicate`]s. Building is synchronous
//! and validation errors are raised before anything is sent; delivery always
//! runs on its own tokio task and reports its result through a handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::destination::{Destination, SentMessageHandle};
use crate::error::{TransportError, ValidationError};
use crate::message::{ActionRow, Embed, Message, MAX_ACTION_ROWS, MAX_EMBEDS};
use crate::predicate::Predicate;
use crate::scheduler::{CancelHandle, Scheduler};

/// A message payload under construction, plus the operations to deliver it.
///
/// The fluent setters mutate and return `self` by value; an announcement is
/// cheap to clone and is not shared across concurrent schedules; each
/// scheduled send owns its own copy.
#[derive(Debug, Clone, Default)]
pub struct Announcement {
    content: Option<String>,
    embeds: Vec<Embed>,
    action_rows: Vec<ActionRow>,
}

impl Announcement {
    /// Create an empty announcement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an announcement with text content.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self::new().content(content)
    }

    /// Set the text content.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Append an embed.
    #[must_use]
    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    /// Replace all embeds.
    #[must_use]
    pub fn embeds(mut self, embeds: Vec<Embed>) -> Self {
        self.embeds = embeds;
        self
    }

    /// Append an action row.
    #[must_use]
    pub fn action_row(mut self, row: ActionRow) -> Self {
        self.action_rows.push(row);
        self
    }

    /// Replace all action rows with a single row holding one link button.
    #[must_use]
    pub fn add_link(mut self, url: impl Into<String>, label: impl Into<String>) -> Self {
        self.action_rows = vec![ActionRow::link(url, label)];
        self
    }

    /// Render the announcement into an immutable [`Message`].
    ///
    /// Rendering is idempotent and side-effect-free; the same announcement
    /// builds the same message every time.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the message is empty, has more than
    /// [`MAX_EMBEDS`] embeds, or more than [`MAX_ACTION_ROWS`] action rows.
    pub fn build(&self) -> Result<Message, ValidationError> {
        if self.embeds.len() > MAX_EMBEDS {
            return Err(ValidationError::TooManyEmbeds(self.embeds.len()));
        }
        if self.action_rows.len() > MAX_ACTION_ROWS {
            return Err(ValidationError::TooManyActionRows(self.action_rows.len()));
        }

        let message = Message {
            content: self.content.clone(),
            embeds: self.embeds.clone(),
            action_rows: self.action_rows.clone(),
        };
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(message)
    }

    /// Deliver immediately on a background task.
    ///
    /// Returns as soon as the delivery task is spawned; the caller observes
    /// the result (or ignores it) through the returned [`DeliveryHandle`].
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the announcement does not build; in
    /// that case nothing is sent.
    pub fn send_now(
        &self,
        destination: Arc<dyn Destination>,
    ) -> Result<DeliveryHandle, ValidationError> {
        let message = self.build()?;
        let handle = tokio::spawn(async move {
            let sent = destination.send(&message).await?;
            debug!(message_id = %sent.message_id, "announcement delivered");
            Ok(sent)
        });
        Ok(DeliveryHandle { inner: handle })
    }

    /// Deliver immediately, then pin the sent message.
    ///
    /// A pin failure is logged and does not affect the delivery result: the
    /// message stays sent.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the announcement does not build.
    pub fn send_and_pin(
        &self,
        destination: Arc<dyn Destination>,
    ) -> Result<DeliveryHandle, ValidationError> {
        let message = self.build()?;
        let handle = tokio::spawn(async move {
            let sent = destination.send(&message).await?;
            debug!(message_id = %sent.message_id, "announcement delivered, pinning");
            if let Err(error) = destination.pin(&sent).await {
                warn!(message_id = %sent.message_id, %error, "failed to pin delivered announcement");
            }
            Ok(sent)
        });
        Ok(DeliveryHandle { inner: handle })
    }

    /// Deliver after a delay, with no gating predicates.
    ///
    /// Sugar for [`Announcement::schedule`] with an empty predicate list.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the announcement does not build.
    pub async fn send_after(
        &self,
        scheduler: &Scheduler,
        destination: Arc<dyn Destination>,
        delay: Duration,
    ) -> Result<CancelHandle, ValidationError> {
        self.schedule(scheduler, destination, delay, Vec::new()).await
    }

    /// Register a delayed, predicate-gated delivery with the scheduler.
    ///
    /// The announcement is validated here, before the timer is registered:
    /// a malformed announcement never reaches the scheduler. At fire-time
    /// every predicate is evaluated against the destination's state at that
    /// moment; if all pass (vacuously true with none), the message is
    /// delivered, otherwise the send is skipped with only a log line.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the announcement does not build.
    pub async fn schedule(
        &self,
        scheduler: &Scheduler,
        destination: Arc<dyn Destination>,
        delay: Duration,
        predicates: Vec<Predicate>,
    ) -> Result<CancelHandle, ValidationError> {
        let message = self.build()?;
        Ok(scheduler
            .register(self.clone(), message, destination, delay, predicates)
            .await)
    }
}

/// Handle to an in-flight immediate delivery.
///
/// Dropping the handle detaches the delivery (fire-and-forget); awaiting
/// [`DeliveryHandle::wait`] reports the result once.
#[derive(Debug)]
pub struct DeliveryHandle {
    inner: JoinHandle<Result<SentMessageHandle, TransportError>>,
}

impl DeliveryHandle {
    /// Wait for the delivery to finish and return its result.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] the destination reported, or
    /// [`TransportError::Interrupted`] if the delivery task itself died.
    pub async fn wait(self) -> Result<SentMessageHandle, TransportError> {
        match self.inner.await {
            Ok(result) => result,
            Err(join_error) => Err(TransportError::Interrupted(join_error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestDestination;

    #[test]
    fn build_produces_immutable_message() {
        let announcement = Announcement::with_content("welcome")
            .embed(Embed::new().title("Rules"))
            .add_link("https://example.com/rules", "Read the rules");

        let first = announcement.build().unwrap();
        let second = announcement.build().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.content.as_deref(), Some("welcome"));
        assert_eq!(first.action_rows.len(), 1);
    }

    #[test]
    fn build_rejects_too_many_embeds() {
        let mut announcement = Announcement::with_content("x");
        for _ in 0..11 {
            announcement = announcement.embed(Embed::new().title("e"));
        }

        assert_eq!(
            announcement.build().unwrap_err(),
            ValidationError::TooManyEmbeds(11)
        );
    }

    #[test]
    fn build_rejects_too_many_action_rows() {
        let mut announcement = Announcement::with_content("x");
        for _ in 0..6 {
            announcement = announcement.action_row(ActionRow::link("https://e.com", "e"));
        }

        assert_eq!(
            announcement.build().unwrap_err(),
            ValidationError::TooManyActionRows(6)
        );
    }

    #[test]
    fn build_rejects_empty_message() {
        assert_eq!(
            Announcement::new().build().unwrap_err(),
            ValidationError::EmptyMessage
        );
    }

    #[test]
    fn add_link_replaces_existing_rows() {
        let announcement = Announcement::with_content("x")
            .action_row(ActionRow::link("https://old.example.com", "Old"))
            .action_row(ActionRow::link("https://older.example.com", "Older"))
            .add_link("https://new.example.com", "New");

        let message = announcement.build().unwrap();
        assert_eq!(message.action_rows.len(), 1);
        assert_eq!(message.action_rows[0].buttons[0].label, "New");
    }

    #[tokio::test]
    async fn send_now_delivers_once() {
        let destination = Arc::new(TestDestination::new());
        let handle = Announcement::with_content("hello")
            .send_now(Arc::clone(&destination) as Arc<dyn Destination>)
            .unwrap();

        handle.wait().await.unwrap();
        assert_eq!(destination.sent().len(), 1);
        assert_eq!(destination.sent()[0].content.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn send_now_surfaces_transport_errors() {
        let destination = Arc::new(TestDestination::new());
        destination.fail_send(true);

        let handle = Announcement::with_content("hello")
            .send_now(Arc::clone(&destination) as Arc<dyn Destination>)
            .unwrap();

        assert!(handle.wait().await.is_err());
        assert!(destination.sent().is_empty());
    }

    #[tokio::test]
    async fn send_and_pin_pins_after_delivery() {
        let destination = Arc::new(TestDestination::new());
        let handle = Announcement::with_content("pin me")
            .send_and_pin(Arc::clone(&destination) as Arc<dyn Destination>)
            .unwrap();

        let sent = handle.wait().await.unwrap();
        assert_eq!(destination.pinned(), vec![sent.message_id]);
    }

    #[tokio::test]
    async fn pin_failure_does_not_fail_the_delivery() {
        let destination = Arc::new(TestDestination::new());
        destination.fail_pin(true);

        let handle = Announcement::with_content("pin me")
            .send_and_pin(Arc::clone(&destination) as Arc<dyn Destination>)
            .unwrap();

        assert!(handle.wait().await.is_ok());
        assert_eq!(destination.sent().len(), 1);
        assert!(destination.pinned().is_empty());
    }

    #[tokio::test]
    async fn invalid_announcement_never_sends() {
        let destination = Arc::new(TestDestination::new());
        let result = Announcement::new().send_now(Arc::clone(&destination) as Arc<dyn Destination>);

        assert!(result.is_err());
        assert!(destination.sent().is_empty());
    }
}
