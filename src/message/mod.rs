//! Platform-neutral message model.
//!
//! Inbound QQ and Telegram messages are normalized into [`UnifiedMessage`],
//! an ordered list of [`MessageContent`] segments plus sender, channel and
//! reply metadata. Outbound adapters render the same model back into each
//! platform's native shape.

pub mod converter;
pub mod lookup;
pub mod qq;
pub mod segment;
pub mod telegram;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::MediaRef;

pub use converter::MessageConverter;
pub use lookup::{LookupService, MemoryLookup, NoLookup};

/// Chat platforms the bridge speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Qq,
    Telegram,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qq => write!(f, "qq"),
            Self::Telegram => write!(f, "telegram"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qq" => Ok(Self::Qq),
            "telegram" | "tg" => Ok(Self::Telegram),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Platform-qualified user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UserId {
    pub platform: Platform,
    pub id: String,
}

/// QQ id used for "mention everyone". Telegram has no equivalent.
const EVERYONE: &str = "all";

impl UserId {
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
        }
    }

    pub fn everyone() -> Self {
        Self::new(Platform::Qq, EVERYONE)
    }

    pub fn is_everyone(&self) -> bool {
        self.platform == Platform::Qq && self.id == EVERYONE
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.id)
    }
}

/// Platform-qualified message id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MessageRef {
    pub platform: Platform,
    pub id: String,
}

impl MessageRef {
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.id)
    }
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sender {
    pub id: UserId,
    pub display_name: Option<String>,
    pub avatar: Option<MediaRef>,
}

impl Sender {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            display_name: None,
            avatar: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name to show for this sender, falling back to the raw id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id.id)
    }
}

/// Conversation a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelId {
    pub platform: Platform,
    pub id: String,
    /// One-to-one chat rather than a group.
    pub private: bool,
}

impl ChannelId {
    pub fn group(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
            private: false,
        }
    }

    pub fn private(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
            private: true,
        }
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        media: MediaRef,
        mime: Option<String>,
    },
    Video {
        media: MediaRef,
        mime: Option<String>,
        caption: Option<String>,
    },
    Audio {
        media: MediaRef,
        duration_ms: Option<u64>,
    },
    File {
        media: MediaRef,
        name: String,
        mime: Option<String>,
    },
    Sticker {
        media: MediaRef,
        animated: bool,
    },
    /// Self-destructing media.
    Flash {
        media: MediaRef,
    },
    At {
        target: UserId,
        display_name: Option<String>,
    },
    /// Built-in QQ emoticon.
    Face {
        id: u32,
    },
    Dice {
        value: u8,
    },
    /// Rock-paper-scissors: 1 rock, 2 scissors, 3 paper.
    Rps {
        value: u8,
    },
    Location {
        lat: f64,
        lon: f64,
        name: Option<String>,
    },
    Reply {
        target: MessageRef,
    },
    Card {
        title: String,
        url: Option<String>,
        fields: Vec<(String, String)>,
    },
    Markdown {
        content: String,
    },
    /// Explicit marker for a message with no content.
    Empty,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Short name of the content kind, as used in placeholders and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Audio { .. } => "audio",
            Self::File { .. } => "file",
            Self::Sticker { .. } => "sticker",
            Self::Flash { .. } => "flash",
            Self::At { .. } => "at",
            Self::Face { .. } => "face",
            Self::Dice { .. } => "dice",
            Self::Rps { .. } => "rps",
            Self::Location { .. } => "location",
            Self::Reply { .. } => "reply",
            Self::Card { .. } => "card",
            Self::Markdown { .. } => "markdown",
            Self::Empty => "empty",
        }
    }

    pub fn media(&self) -> Option<&MediaRef> {
        match self {
            Self::Image { media, .. }
            | Self::Video { media, .. }
            | Self::Audio { media, .. }
            | Self::File { media, .. }
            | Self::Sticker { media, .. }
            | Self::Flash { media } => Some(media),
            _ => None,
        }
    }

    pub fn media_mut(&mut self) -> Option<&mut MediaRef> {
        match self {
            Self::Image { media, .. }
            | Self::Video { media, .. }
            | Self::Audio { media, .. }
            | Self::File { media, .. }
            | Self::Sticker { media, .. }
            | Self::Flash { media } => Some(media),
            _ => None,
        }
    }

    /// Text placeholder standing in for content the target cannot show.
    pub fn unsupported(kind: &str) -> Self {
        Self::text(segment::placeholder_text(kind))
    }
}

/// Platform-neutral message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedMessage {
    pub id: MessageRef,
    content: Vec<MessageContent>,
    pub sender: Sender,
    pub channel: ChannelId,
    pub reply_to: Option<MessageRef>,
    pub timestamp: DateTime<Utc>,
    pub origin: Option<Platform>,
}

impl UnifiedMessage {
    /// Build a message. An empty segment list is replaced by a single
    /// [`MessageContent::Empty`] marker.
    pub fn new(id: MessageRef, sender: Sender, channel: ChannelId, content: Vec<MessageContent>) -> Self {
        let origin = Some(id.platform);
        let mut message = Self {
            id,
            content: Vec::new(),
            sender,
            channel,
            reply_to: None,
            timestamp: Utc::now(),
            origin,
        };
        message.set_content(content);
        message
    }

    pub fn with_reply_to(mut self, reply_to: MessageRef) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn content(&self) -> &[MessageContent] {
        &self.content
    }

    pub fn set_content(&mut self, content: Vec<MessageContent>) {
        self.content = if content.is_empty() {
            vec![MessageContent::Empty]
        } else {
            content
        };
    }

    pub fn is_empty(&self) -> bool {
        self.content.iter().all(|c| matches!(c, MessageContent::Empty))
    }

    /// Concatenated text and mentions, for logging and command matching.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for item in &self.content {
            match item {
                MessageContent::Text { text } => out.push_str(text),
                MessageContent::At {
                    target,
                    display_name,
                } => out.push_str(&segment::mention_text(target, display_name.as_deref())),
                _ => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: Vec<MessageContent>) -> UnifiedMessage {
        UnifiedMessage::new(
            MessageRef::new(Platform::Qq, "1"),
            Sender::new(UserId::new(Platform::Qq, "10001")),
            ChannelId::group(Platform::Qq, "20002"),
            content,
        )
    }

    #[test]
    fn test_empty_content_gets_marker() {
        let msg = message(Vec::new());
        assert_eq!(msg.content(), &[MessageContent::Empty]);
        assert!(msg.is_empty());
        assert_eq!(msg.origin, Some(Platform::Qq));
    }

    #[test]
    fn test_plain_text_joins_in_order() {
        let msg = message(vec![
            MessageContent::text("hello "),
            MessageContent::Face { id: 14 },
            MessageContent::text("world"),
        ]);
        assert_eq!(msg.plain_text(), "hello world");
        assert!(!msg.is_empty());
    }

    #[test]
    fn test_platform_parse_and_display() {
        assert_eq!("QQ".parse::<Platform>().unwrap(), Platform::Qq);
        assert_eq!("tg".parse::<Platform>().unwrap(), Platform::Telegram);
        assert!("irc".parse::<Platform>().is_err());
        assert_eq!(UserId::everyone().to_string(), "qq:all");
    }

    #[test]
    fn test_everyone_is_qq_only() {
        assert!(UserId::everyone().is_everyone());
        assert!(UserId::new(Platform::Qq, "all").is_everyone());
        assert!(!UserId::new(Platform::Telegram, "all").is_everyone());
    }

    #[test]
    fn test_sender_label_falls_back_to_id() {
        let sender = Sender::new(UserId::new(Platform::Telegram, "42"));
        assert_eq!(sender.label(), "42");
        assert_eq!(sender.with_display_name("Alice").label(), "Alice");
    }

    #[test]
    fn test_content_serializes_tagged() {
        let json = serde_json::to_value(MessageContent::Dice { value: 4 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "dice", "value": 4}));
        assert_eq!(MessageContent::unsupported("sticker").kind(), "text");
    }
}
