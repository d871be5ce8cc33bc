//! Immutable message payloads: content, embeds, and link-button rows.
//!
//! A [`Message`] is the rendered form of an
//! [`Announcement`](crate::Announcement): once built it is treated as
//! immutable and rendering is idempotent and side-effect-free. The value
//! types here are plain data with fluent constructors; they carry no
//! platform SDK types, so bindings map them to their own wire builders.

use serde::{Deserialize, Serialize};

/// Maximum number of embeds a single message may carry (platform convention).
pub const MAX_EMBEDS: usize = 10;

/// Maximum number of action rows a single message may carry (platform
/// convention).
pub const MAX_ACTION_ROWS: usize = 5;

/// An immutable, ready-for-delivery message payload.
///
/// Built by [`Announcement::build`](crate::Announcement::build), which
/// enforces the embed and action-row limits. Delivered by a
/// [`Destination`](crate::Destination).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Plain text content, if any.
    pub content: Option<String>,
    /// Ordered embeds, at most [`MAX_EMBEDS`].
    pub embeds: Vec<Embed>,
    /// Ordered action rows, at most [`MAX_ACTION_ROWS`].
    pub action_rows: Vec<ActionRow>,
}

impl Message {
    /// Whether the message has neither content nor embeds.
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty) && self.embeds.is_empty()
    }
}

/// A rich embed attached to a message.
///
/// Plain value with a fluent builder; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    /// Embed title line.
    pub title: Option<String>,
    /// Body text of the embed.
    pub description: Option<String>,
    /// URL the title links to.
    pub url: Option<String>,
    /// Accent color as a 24-bit RGB value.
    pub color: Option<u32>,
    /// URL of a large image shown in the embed body.
    pub image_url: Option<String>,
    /// Footer text.
    pub footer: Option<String>,
    /// Named fields rendered below the description.
    pub fields: Vec<EmbedField>,
}

impl Embed {
    /// Create an empty embed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the title line.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the body text.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the URL the title links to.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the accent color (24-bit RGB).
    #[must_use]
    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    /// Set the body image URL.
    #[must_use]
    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Set the footer text.
    #[must_use]
    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Append a named field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

/// A single named field inside an [`Embed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    /// Field name shown in bold.
    pub name: String,
    /// Field value text.
    pub value: String,
    /// Whether the field renders inline with its neighbors.
    pub inline: bool,
}

/// One row of interactive elements below a message.
///
/// Each builder owns its rows exclusively; rows are never shared across
/// announcements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRow {
    /// Link buttons in this row, left to right.
    pub buttons: Vec<LinkButton>,
}

impl ActionRow {
    /// Create a row from the given buttons.
    pub fn new(buttons: Vec<LinkButton>) -> Self {
        Self { buttons }
    }

    /// Create a row holding a single link button.
    pub fn link(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            buttons: vec![LinkButton {
                url: url.into(),
                label: label.into(),
            }],
        }
    }
}

/// A button that opens a URL when clicked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkButton {
    /// Destination URL.
    pub url: String,
    /// Button label text.
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_builder_accumulates_fields() {
        let embed = Embed::new()
            .title("Release notes")
            .description("What changed this week")
            .color(0x00_AA_FF)
            .field("Version", "1.4.2", true)
            .field("Channel", "stable", true);

        assert_eq!(embed.title.as_deref(), Some("Release notes"));
        assert_eq!(embed.color, Some(0x00_AA_FF));
        assert_eq!(embed.fields.len(), 2);
        assert!(embed.fields[0].inline);
    }

    #[test]
    fn message_emptiness() {
        let empty = Message {
            content: None,
            embeds: vec![],
            action_rows: vec![],
        };
        assert!(empty.is_empty());

        let blank_content = Message {
            content: Some(String::new()),
            embeds: vec![],
            action_rows: vec![],
        };
        assert!(blank_content.is_empty());

        let with_embed = Message {
            content: None,
            embeds: vec![Embed::new().title("hi")],
            action_rows: vec![],
        };
        assert!(!with_embed.is_empty());
    }

    #[test]
    fn link_row_holds_single_button() {
        let row = ActionRow::link("https://example.com", "Open");
        assert_eq!(row.buttons.len(), 1);
        assert_eq!(row.buttons[0].label, "Open");
    }

    #[test]
    fn message_roundtrips_through_serde() {
        let message = Message {
            content: Some("hello".into()),
            embeds: vec![Embed::new().title("t").field("a", "b", false)],
            action_rows: vec![ActionRow::link("https://example.com", "Open")],
        };

        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
