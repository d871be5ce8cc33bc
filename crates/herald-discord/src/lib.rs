//! # Herald Discord
//!
//! Discord channel binding for the herald announcement scheduler.
//!
//! [`ChannelDestination`] implements
//! [`herald_core::Destination`] over a serenity HTTP client and a channel
//! id, so announcements built with `herald-core` can be scheduled against
//! real Discord channels. This crate owns all wire mapping; the core never
//! sees a serenity type.
//!
//! Concurrency note: serenity's `Http` is internally synchronized and safe
//! to share, so many scheduled sends may fire against the same channel at
//! once. Discord itself does not guarantee cross-request ordering and
//! neither does this binding.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{
    CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter, CreateMessage, GetMessages,
};
use serenity::http::Http;
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::id::ChannelId;
use tracing::debug;

use herald_core::{
    ActionRow, Destination, Embed, Message, MessageId, MessageSnapshot, ParticipantId,
    SentMessageHandle, TransportError,
};

/// Discord caps a single history fetch at 100 messages.
const MAX_HISTORY_FETCH: usize = 100;

/// A Discord channel as a herald [`Destination`].
///
/// Cheap to clone; clones share the underlying HTTP client.
#[derive(Clone)]
pub struct ChannelDestination {
    http: Arc<Http>,
    channel: ChannelId,
}

impl ChannelDestination {
    /// Bind a channel through the given HTTP client.
    pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
        Self { http, channel }
    }

    /// The bound channel id.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

impl std::fmt::Debug for ChannelDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelDestination")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Destination for ChannelDestination {
    async fn recent_messages(&self, count: usize) -> Result<Vec<MessageSnapshot>, TransportError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        // Discord serves at most 100 messages per history request. A larger
        // ask is refused, never silently truncated: a gating check over more
        // history than one page must fail closed, not pass on a partial scan.
        if count > MAX_HISTORY_FETCH {
            return Err(TransportError::Api(format!(
                "history fetch of {count} exceeds the {MAX_HISTORY_FETCH}-message limit"
            )));
        }

        let messages = self
            .channel
            .messages(&self.http, GetMessages::new().limit(count as u8))
            .await
            .map_err(to_transport_error)?;

        debug!(channel = %self.channel, fetched = messages.len(), "fetched recent messages");
        Ok(messages.iter().map(snapshot_of).collect())
    }

    async fn send(&self, message: &Message) -> Result<SentMessageHandle, TransportError> {
        let sent = self
            .channel
            .send_message(&self.http, to_create_message(message))
            .await
            .map_err(to_transport_error)?;

        debug!(channel = %self.channel, message_id = %sent.id, "message sent");
        Ok(SentMessageHandle {
            message_id: MessageId(sent.id.get()),
        })
    }

    async fn pin(&self, handle: &SentMessageHandle) -> Result<(), TransportError> {
        self.http
            .pin_message(
                self.channel,
                serenity::model::id::MessageId::new(handle.message_id.0),
                None,
            )
            .await
            .map_err(to_transport_error)
    }
}

fn to_transport_error(error: serenity::Error) -> TransportError {
    TransportError::Api(error.to_string())
}

/// Reduce a Discord message to the snapshot the core's predicates consume.
fn snapshot_of(message: &DiscordMessage) -> MessageSnapshot {
    let has_image_attachment = message.attachments.iter().any(|attachment| {
        looks_like_image(attachment.content_type.as_deref(), attachment.width)
    });
    MessageSnapshot {
        author_id: ParticipantId(message.author.id.get()),
        sent_at: datetime_from_unix(message.timestamp.unix_timestamp()),
        has_image_attachment,
    }
}

/// Whether an attachment is an image, judged like the platform does: either
/// an `image/*` content type or reported pixel dimensions.
fn looks_like_image(content_type: Option<&str>, width: Option<u32>) -> bool {
    content_type.is_some_and(|kind| kind.starts_with("image/")) || width.is_some()
}

fn datetime_from_unix(seconds: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(seconds, 0).unwrap_or(chrono::DateTime::UNIX_EPOCH)
}

/// Map a rendered herald [`Message`] onto a serenity message builder.
fn to_create_message(message: &Message) -> CreateMessage {
    let mut builder = CreateMessage::new();
    if let Some(content) = &message.content {
        builder = builder.content(content.clone());
    }
    if !message.embeds.is_empty() {
        builder = builder.embeds(message.embeds.iter().map(to_create_embed).collect());
    }
    if !message.action_rows.is_empty() {
        builder = builder.components(message.action_rows.iter().map(to_action_row).collect());
    }
    builder
}

fn to_create_embed(embed: &Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new();
    if let Some(title) = &embed.title {
        builder = builder.title(title.clone());
    }
    if let Some(description) = &embed.description {
        builder = builder.description(description.clone());
    }
    if let Some(url) = &embed.url {
        builder = builder.url(url.clone());
    }
    if let Some(color) = embed.color {
        builder = builder.colour(color);
    }
    if let Some(image_url) = &embed.image_url {
        builder = builder.image(image_url.clone());
    }
    if let Some(footer) = &embed.footer {
        builder = builder.footer(CreateEmbedFooter::new(footer.clone()));
    }
    for field in &embed.fields {
        builder = builder.field(field.name.clone(), field.value.clone(), field.inline);
    }
    builder
}

fn to_action_row(row: &ActionRow) -> CreateActionRow {
    CreateActionRow::Buttons(
        row.buttons
            .iter()
            .map(|button| CreateButton::new_link(button.url.clone()).label(button.label.clone()))
            .collect(),
    )
}
