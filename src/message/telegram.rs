//! Telegram Bot API message model and segment conversion.
//!
//! A Telegram message is not segmented natively: it carries one text (with
//! entities) or one media item with an optional caption. Inbound messages are
//! decomposed into [`TgPart`]s, which play the role of segments; outbound
//! parts are assembled back into a sequence of Bot API send calls.

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConvertError;
use crate::media::{MediaRef, RemoteMedia};
use crate::message::segment::{
    DICE_EMOJI, card_text, face_text, mention_text, rps_emoji,
};
use crate::message::{MessageContent, Platform, UserId};

/// Longest caption Telegram accepts, in UTF-16 code units.
const MAX_CAPTION_UTF16: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl TgUser {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ if !self.first_name.is_empty() => self.first_name.clone(),
            _ => self
                .username
                .clone()
                .unwrap_or_else(|| self.id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TgChat {
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Text entity. Offsets and lengths count UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TgEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<TgUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Any downloadable file: photo size, voice, audio, video, animation or
/// document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TgFile {
    pub file_id: String,
    #[serde(default)]
    pub file_unique_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl TgFile {
    fn input(&self) -> TgInputFile {
        TgInputFile::Remote(remote(&self.file_id, &self.file_unique_id))
    }

    fn area(&self) -> u64 {
        u64::from(self.width.unwrap_or(0)) * u64::from(self.height.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TgSticker {
    pub file_id: String,
    #[serde(default)]
    pub file_unique_id: String,
    /// TGS (Lottie).
    #[serde(default)]
    pub is_animated: bool,
    /// WebM.
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TgDice {
    pub emoji: String,
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TgLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TgVenue {
    pub location: TgLocation,
    pub title: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TgReplyRef {
    pub message_id: i64,
}

/// Bot API `Message`, restricted to the fields the bridge reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: TgChat,
    /// Unix seconds.
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<TgEntity>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub caption_entities: Vec<TgEntity>,
    #[serde(default)]
    pub photo: Vec<TgFile>,
    #[serde(default)]
    pub sticker: Option<TgSticker>,
    #[serde(default)]
    pub voice: Option<TgFile>,
    #[serde(default)]
    pub audio: Option<TgFile>,
    #[serde(default)]
    pub video: Option<TgFile>,
    #[serde(default)]
    pub animation: Option<TgFile>,
    #[serde(default)]
    pub document: Option<TgFile>,
    #[serde(default)]
    pub dice: Option<TgDice>,
    #[serde(default)]
    pub location: Option<TgLocation>,
    #[serde(default)]
    pub venue: Option<TgVenue>,
    #[serde(default)]
    pub reply_to_message: Option<TgReplyRef>,
    #[serde(default)]
    pub has_media_spoiler: bool,
}

/// File argument of a send call.
#[derive(Debug, Clone, PartialEq)]
pub enum TgInputFile {
    /// A file already on Telegram, re-sent by id.
    Remote(RemoteMedia),
    /// A URL Telegram downloads itself.
    Url(String),
    /// A local file to upload.
    Path(PathBuf),
    /// In-memory bytes to upload.
    Memory(Bytes),
}

impl Serialize for TgInputFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Remote(remote) => serializer.serialize_str(&remote.file_id),
            Self::Url(url) => serializer.serialize_str(url),
            Self::Path(path) => serializer.serialize_str(&format!("attach://{}", path.display())),
            Self::Memory(data) => serializer.serialize_str(&format!("attach://<{} bytes>", data.len())),
        }
    }
}

fn remote(file_id: &str, unique_id: &str) -> RemoteMedia {
    let media = RemoteMedia::new(Platform::Telegram, file_id);
    if unique_id.is_empty() {
        media
    } else {
        media.with_unique_id(unique_id)
    }
}

/// One piece of a Telegram message.
#[derive(Debug, Clone, PartialEq)]
pub enum TgPart {
    Text(String),
    Mention {
        text: String,
        /// Set for `text_mention` entities (users without a username).
        user: Option<TgUser>,
    },
    Photo {
        file: TgInputFile,
        spoiler: bool,
    },
    Sticker {
        file: TgInputFile,
        animated: bool,
    },
    Voice {
        file: TgInputFile,
        duration: Option<u32>,
    },
    Audio {
        file: TgInputFile,
        name: Option<String>,
        mime: Option<String>,
    },
    Video {
        file: TgInputFile,
        mime: Option<String>,
        caption: Option<String>,
    },
    Animation {
        file: TgInputFile,
    },
    Document {
        file: TgInputFile,
        name: Option<String>,
        mime: Option<String>,
    },
    Dice {
        emoji: String,
        value: Option<u8>,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Venue {
        latitude: f64,
        longitude: f64,
        title: String,
        address: String,
    },
}

/// Split a message into parts. Media comes first, then its caption.
pub fn decompose(message: &TgMessage) -> Vec<TgPart> {
    let mut parts = Vec::new();
    let mut caption_used = false;

    if let Some(text) = &message.text {
        parts.extend(split_entities(text, &message.entities));
    }

    if let Some(photo) = message.photo.iter().max_by_key(|p| (p.area(), p.file_size.unwrap_or(0))) {
        parts.push(TgPart::Photo {
            file: photo.input(),
            spoiler: message.has_media_spoiler,
        });
    }
    if let Some(sticker) = &message.sticker {
        parts.push(TgPart::Sticker {
            file: TgInputFile::Remote(remote(&sticker.file_id, &sticker.file_unique_id)),
            animated: sticker.is_animated || sticker.is_video,
        });
    }
    if let Some(voice) = &message.voice {
        parts.push(TgPart::Voice {
            file: voice.input(),
            duration: voice.duration,
        });
    }
    if let Some(audio) = &message.audio {
        parts.push(TgPart::Audio {
            file: audio.input(),
            name: audio.file_name.clone(),
            mime: audio.mime_type.clone(),
        });
    }
    if let Some(video) = &message.video {
        caption_used = true;
        parts.push(TgPart::Video {
            file: video.input(),
            mime: video.mime_type.clone(),
            caption: message.caption.clone(),
        });
    }
    // animations also carry a `document` copy
    if let Some(animation) = &message.animation {
        parts.push(TgPart::Animation {
            file: animation.input(),
        });
    } else if let Some(document) = &message.document {
        parts.push(TgPart::Document {
            file: document.input(),
            name: document.file_name.clone(),
            mime: document.mime_type.clone(),
        });
    }
    if let Some(dice) = &message.dice {
        parts.push(TgPart::Dice {
            emoji: dice.emoji.clone(),
            value: Some(dice.value),
        });
    }
    // venues also carry a `location` copy
    if let Some(venue) = &message.venue {
        parts.push(TgPart::Venue {
            latitude: venue.location.latitude,
            longitude: venue.location.longitude,
            title: venue.title.clone(),
            address: venue.address.clone(),
        });
    } else if let Some(location) = &message.location {
        parts.push(TgPart::Location {
            latitude: location.latitude,
            longitude: location.longitude,
        });
    }

    if !caption_used {
        if let Some(caption) = &message.caption {
            parts.extend(split_entities(caption, &message.caption_entities));
        }
    }

    parts
}

/// Split text into plain runs and mentions.
///
/// Entities out of range or overlapping an earlier mention are ignored.
pub fn split_entities(text: &str, entities: &[TgEntity]) -> Vec<TgPart> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut mentions: Vec<&TgEntity> = entities
        .iter()
        .filter(|e| e.kind == "mention" || e.kind == "text_mention")
        .collect();
    mentions.sort_by_key(|e| e.offset);

    let mut parts = Vec::new();
    let mut cursor = 0;
    for entity in mentions {
        let Some(end) = entity.offset.checked_add(entity.length) else {
            continue;
        };
        if entity.offset < cursor || end > units.len() || entity.length == 0 {
            continue;
        }
        if entity.offset > cursor {
            parts.push(TgPart::Text(String::from_utf16_lossy(&units[cursor..entity.offset])));
        }
        parts.push(TgPart::Mention {
            text: String::from_utf16_lossy(&units[entity.offset..end]),
            user: entity.user.clone(),
        });
        cursor = end;
    }
    if cursor < units.len() {
        parts.push(TgPart::Text(String::from_utf16_lossy(&units[cursor..])));
    }

    parts
}

fn media(file: TgInputFile) -> MediaRef {
    match file {
        TgInputFile::Remote(remote) => MediaRef::Remote(remote),
        TgInputFile::Url(url) => MediaRef::Remote(RemoteMedia::new(Platform::Telegram, url.as_str()).with_url(url)),
        TgInputFile::Path(path) => MediaRef::Path(path),
        TgInputFile::Memory(data) => MediaRef::Bytes(data),
    }
}

/// Convert one part into unified content.
pub fn to_unified(part: TgPart) -> MessageContent {
    match part {
        TgPart::Text(text) => MessageContent::Text { text },
        TgPart::Mention { text, user } => match user {
            Some(user) => MessageContent::At {
                target: UserId::new(Platform::Telegram, user.id.to_string()),
                display_name: Some(user.display_name()),
            },
            None => {
                let username = text.trim_start_matches('@').to_string();
                MessageContent::At {
                    target: UserId::new(Platform::Telegram, username.as_str()),
                    display_name: Some(username),
                }
            }
        },
        TgPart::Photo { file, spoiler: true } => MessageContent::Flash { media: media(file) },
        TgPart::Photo { file, .. } => MessageContent::Image {
            media: media(file),
            mime: Some("image/jpeg".to_string()),
        },
        TgPart::Sticker { file, animated } => MessageContent::Sticker {
            media: media(file),
            animated,
        },
        TgPart::Voice { file, duration } => MessageContent::Audio {
            media: media(file),
            duration_ms: duration.map(|d| u64::from(d) * 1000),
        },
        TgPart::Audio { file, name, mime } => MessageContent::File {
            media: media(file),
            name: name.unwrap_or_else(|| "audio".to_string()),
            mime,
        },
        TgPart::Video {
            file,
            mime,
            caption,
        } => MessageContent::Video {
            media: media(file),
            mime,
            caption,
        },
        TgPart::Animation { file } => MessageContent::Image {
            media: media(file),
            mime: Some("image/gif".to_string()),
        },
        TgPart::Document { file, name, mime } => MessageContent::File {
            media: media(file),
            name: name.unwrap_or_else(|| "file".to_string()),
            mime,
        },
        TgPart::Dice { emoji, value } if emoji == DICE_EMOJI => MessageContent::Dice {
            value: value.unwrap_or_default(),
        },
        TgPart::Dice { emoji, value } => match value {
            Some(value) => MessageContent::text(format!("{} {}", emoji, value)),
            None => MessageContent::Text { text: emoji },
        },
        TgPart::Location {
            latitude,
            longitude,
        } => MessageContent::Location {
            lat: latitude,
            lon: longitude,
            name: None,
        },
        TgPart::Venue {
            latitude,
            longitude,
            title,
            ..
        } => MessageContent::Location {
            lat: latitude,
            lon: longitude,
            name: Some(title),
        },
    }
}

/// Send argument for a media reference.
pub fn input_file(media: &MediaRef) -> Result<TgInputFile, ConvertError> {
    match media {
        MediaRef::Remote(remote) if remote.platform == Platform::Telegram => Ok(TgInputFile::Remote(remote.clone())),
        MediaRef::Remote(remote) => remote
            .url
            .clone()
            .map(TgInputFile::Url)
            .ok_or_else(|| ConvertError::SegmentUnsupported {
                kind: format!("{} media without url", remote.platform),
                platform: Platform::Telegram.to_string(),
            }),
        MediaRef::Path(path) => Ok(TgInputFile::Path(path.clone())),
        MediaRef::Bytes(data) => Ok(TgInputFile::Memory(data.clone())),
        MediaRef::Pending(_) => Err(ConvertError::SegmentUnsupported {
            kind: "unresolved media".to_string(),
            platform: Platform::Telegram.to_string(),
        }),
    }
}

/// Convert unified content into parts.
///
/// Replies produce no part: they travel as the message's reply target.
pub fn from_unified(content: &MessageContent) -> Result<Vec<TgPart>, ConvertError> {
    let part = match content {
        MessageContent::Text { text } => TgPart::Text(text.clone()),
        MessageContent::Image { media, mime } => {
            let file = input_file(media)?;
            if mime.as_deref() == Some("image/gif") {
                TgPart::Animation { file }
            } else {
                TgPart::Photo { file, spoiler: false }
            }
        }
        MessageContent::Video {
            media,
            mime,
            caption,
        } => TgPart::Video {
            file: input_file(media)?,
            mime: mime.clone(),
            caption: caption.clone(),
        },
        MessageContent::Audio { media, duration_ms } => TgPart::Voice {
            file: input_file(media)?,
            duration: duration_ms.and_then(|ms| u32::try_from(ms / 1000).ok()),
        },
        MessageContent::File { media, name, mime } => TgPart::Document {
            file: input_file(media)?,
            name: Some(name.clone()),
            mime: mime.clone(),
        },
        // only Telegram's own stickers can be re-sent as stickers
        MessageContent::Sticker { media, animated } => {
            let file = input_file(media)?;
            match (&file, animated) {
                (TgInputFile::Remote(_), _) => TgPart::Sticker {
                    file,
                    animated: *animated,
                },
                (_, true) => TgPart::Animation { file },
                (_, false) => TgPart::Photo { file, spoiler: false },
            }
        }
        MessageContent::Flash { media } => TgPart::Photo {
            file: input_file(media)?,
            spoiler: true,
        },
        MessageContent::At {
            target,
            display_name,
        } => {
            let text = mention_text(target, display_name.as_deref());
            match (target.platform, target.id.parse::<i64>()) {
                (Platform::Telegram, Ok(id)) => TgPart::Mention {
                    user: Some(TgUser {
                        id,
                        first_name: text.trim_start_matches('@').to_string(),
                        ..TgUser::default()
                    }),
                    text,
                },
                _ => TgPart::Text(text),
            }
        }
        MessageContent::Face { id } => TgPart::Text(face_text(*id)),
        MessageContent::Dice { .. } => TgPart::Dice {
            emoji: DICE_EMOJI.to_string(),
            value: None,
        },
        MessageContent::Rps { value } => TgPart::Text(rps_emoji(*value).to_string()),
        MessageContent::Location { lat, lon, name } => match name {
            Some(title) => TgPart::Venue {
                latitude: *lat,
                longitude: *lon,
                title: title.clone(),
                address: String::new(),
            },
            None => TgPart::Location {
                latitude: *lat,
                longitude: *lon,
            },
        },
        MessageContent::Card { title, url, fields } => TgPart::Text(card_text(title, url.as_deref(), fields)),
        MessageContent::Markdown { content } => TgPart::Text(content.clone()),
        MessageContent::Reply { .. } | MessageContent::Empty => return Ok(Vec::new()),
    };
    Ok(vec![part])
}

/// Caption of a media send.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TgCaption {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub caption_entities: Vec<TgEntity>,
}

impl TgCaption {
    fn raw(caption: Option<String>) -> Self {
        Self {
            caption,
            caption_entities: Vec::new(),
        }
    }
}

/// One Bot API send call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method")]
pub enum TgSend {
    #[serde(rename = "sendMessage")]
    Text {
        text: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        entities: Vec<TgEntity>,
    },
    #[serde(rename = "sendPhoto")]
    Photo {
        photo: TgInputFile,
        #[serde(flatten)]
        caption: TgCaption,
        has_spoiler: bool,
    },
    #[serde(rename = "sendSticker")]
    Sticker { sticker: TgInputFile },
    #[serde(rename = "sendVoice")]
    Voice {
        voice: TgInputFile,
        #[serde(flatten)]
        caption: TgCaption,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<u32>,
    },
    #[serde(rename = "sendAudio")]
    Audio {
        audio: TgInputFile,
        #[serde(flatten)]
        caption: TgCaption,
    },
    #[serde(rename = "sendVideo")]
    Video {
        video: TgInputFile,
        #[serde(flatten)]
        caption: TgCaption,
    },
    #[serde(rename = "sendAnimation")]
    Animation {
        animation: TgInputFile,
        #[serde(flatten)]
        caption: TgCaption,
    },
    #[serde(rename = "sendDocument")]
    Document {
        document: TgInputFile,
        #[serde(flatten)]
        caption: TgCaption,
    },
    #[serde(rename = "sendDice")]
    Dice { emoji: String },
    #[serde(rename = "sendLocation")]
    Location { latitude: f64, longitude: f64 },
    #[serde(rename = "sendVenue")]
    Venue {
        latitude: f64,
        longitude: f64,
        title: String,
        address: String,
    },
}

impl TgSend {
    /// Caption slot that is still free, if this send takes captions.
    fn open_caption(&mut self) -> Option<&mut TgCaption> {
        let caption = match self {
            Self::Photo { caption, .. }
            | Self::Voice { caption, .. }
            | Self::Audio { caption, .. }
            | Self::Video { caption, .. }
            | Self::Animation { caption, .. }
            | Self::Document { caption, .. } => caption,
            _ => return None,
        };
        caption.caption.is_none().then_some(caption)
    }
}

/// A full outgoing Telegram message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TgOutgoing {
    pub chat_id: String,
    /// Applied to the first send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
    pub sends: Vec<TgSend>,
}

#[derive(Default)]
struct TextRun {
    text: String,
    entities: Vec<TgEntity>,
}

impl TextRun {
    fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn push_mention(&mut self, text: &str, user: Option<TgUser>) {
        let offset = utf16_len(&self.text);
        self.text.push_str(text);
        if let Some(user) = user {
            self.entities.push(TgEntity {
                kind: "text_mention".to_string(),
                offset,
                length: utf16_len(text),
                user: Some(user),
                url: None,
            });
        }
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Assemble parts into send calls.
///
/// Consecutive text and mentions merge into one text message. A text run
/// directly after a media item that takes captions becomes its caption when
/// it fits.
pub fn assemble(parts: Vec<TgPart>) -> Vec<TgSend> {
    let mut sends: Vec<TgSend> = Vec::new();
    let mut run = TextRun::default();

    // runs are only flushed right before a media send or at the end, so the
    // last send, if any, is the media item the run directly follows
    fn flush(sends: &mut Vec<TgSend>, run: &mut TextRun) {
        let run = std::mem::take(run);
        if run.is_empty() {
            return;
        }
        if utf16_len(&run.text) <= MAX_CAPTION_UTF16 {
            if let Some(caption) = sends.last_mut().and_then(TgSend::open_caption) {
                caption.caption = Some(run.text);
                caption.caption_entities = run.entities;
                return;
            }
        }
        sends.push(TgSend::Text {
            text: run.text,
            entities: run.entities,
        });
    }

    for part in parts {
        let send = match part {
            TgPart::Text(text) => {
                run.push_text(&text);
                continue;
            }
            TgPart::Mention { text, user } => {
                run.push_mention(&text, user);
                continue;
            }
            TgPart::Photo { file, spoiler } => TgSend::Photo {
                photo: file,
                caption: TgCaption::default(),
                has_spoiler: spoiler,
            },
            TgPart::Sticker { file, .. } => TgSend::Sticker { sticker: file },
            TgPart::Voice { file, duration } => TgSend::Voice {
                voice: file,
                caption: TgCaption::default(),
                duration,
            },
            TgPart::Audio { file, .. } => TgSend::Audio {
                audio: file,
                caption: TgCaption::default(),
            },
            TgPart::Video { file, caption, .. } => TgSend::Video {
                video: file,
                caption: TgCaption::raw(caption),
            },
            TgPart::Animation { file } => TgSend::Animation {
                animation: file,
                caption: TgCaption::default(),
            },
            TgPart::Document { file, .. } => TgSend::Document {
                document: file,
                caption: TgCaption::default(),
            },
            TgPart::Dice { emoji, .. } => TgSend::Dice { emoji },
            TgPart::Location {
                latitude,
                longitude,
            } => TgSend::Location {
                latitude,
                longitude,
            },
            TgPart::Venue {
                latitude,
                longitude,
                title,
                address,
            } => TgSend::Venue {
                latitude,
                longitude,
                title,
                address,
            },
        };

        flush(&mut sends, &mut run);
        sends.push(send);
    }
    flush(&mut sends, &mut run);

    sends
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn message(value: serde_json::Value) -> TgMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_split_entities_utf16() {
        // "😀 " is three UTF-16 units
        let text = "😀 hi @alice and Bob!";
        let entities = vec![
            TgEntity {
                kind: "mention".to_string(),
                offset: 6,
                length: 6,
                user: None,
                url: None,
            },
            TgEntity {
                kind: "text_mention".to_string(),
                offset: 17,
                length: 3,
                user: Some(TgUser {
                    id: 42,
                    first_name: "Bob".to_string(),
                    ..TgUser::default()
                }),
                url: None,
            },
            TgEntity {
                kind: "bold".to_string(),
                offset: 0,
                length: 2,
                user: None,
                url: None,
            },
        ];

        let parts = split_entities(text, &entities);
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], TgPart::Text("😀 hi ".to_string()));
        assert!(matches!(&parts[1], TgPart::Mention { text, user: None } if text == "@alice"));
        assert_eq!(parts[2], TgPart::Text(" and ".to_string()));
        assert!(matches!(&parts[3], TgPart::Mention { text, user: Some(u) } if text == "Bob" && u.id == 42));
        assert_eq!(parts[4], TgPart::Text("!".to_string()));
    }

    #[test]
    fn test_out_of_range_entity_ignored() {
        let entities = vec![TgEntity {
            kind: "mention".to_string(),
            offset: 3,
            length: 40,
            user: None,
            url: None,
        }];
        assert_eq!(split_entities("hi @x", &entities), vec![TgPart::Text("hi @x".to_string())]);
    }

    #[test]
    fn test_overflowing_entity_ignored() {
        let msg = message(json!({
            "message_id": 6,
            "chat": {"id": 1, "type": "private"},
            "date": 1700000000,
            "text": "hello",
            "entities": [{"type": "mention", "offset": u64::MAX, "length": 2}]
        }));
        assert_eq!(decompose(&msg), vec![TgPart::Text("hello".to_string())]);
    }

    #[test]
    fn test_photo_with_caption() {
        let msg = message(json!({
            "message_id": 5,
            "chat": {"id": -100, "type": "supergroup"},
            "date": 1700000000,
            "photo": [
                {"file_id": "small", "file_unique_id": "s", "width": 90, "height": 90},
                {"file_id": "large", "file_unique_id": "l", "width": 1280, "height": 1280}
            ],
            "caption": "look"
        }));
        let content: Vec<MessageContent> = decompose(&msg).into_iter().map(to_unified).collect();
        assert_eq!(content.len(), 2);
        match &content[0] {
            MessageContent::Image { media, .. } => {
                assert_eq!(media.as_remote().unwrap().file_id, "large");
                assert_eq!(media.as_remote().unwrap().stable_id(), "telegram:l");
            }
            other => panic!("unexpected content: {other:?}"),
        }
        assert_eq!(content[1], MessageContent::text("look"));
    }

    #[test]
    fn test_video_keeps_raw_caption() {
        let msg = message(json!({
            "message_id": 6,
            "chat": {"id": 1, "type": "private"},
            "video": {"file_id": "v", "file_unique_id": "vu", "mime_type": "video/mp4"},
            "caption": "clip"
        }));
        let parts = decompose(&msg);
        assert_eq!(parts.len(), 1);
        assert!(matches!(
            to_unified(parts[0].clone()),
            MessageContent::Video { caption: Some(c), .. } if c == "clip"
        ));
    }

    #[test]
    fn test_animation_wins_over_document() {
        let msg = message(json!({
            "message_id": 7,
            "chat": {"id": 1, "type": "private"},
            "animation": {"file_id": "a", "file_unique_id": "au"},
            "document": {"file_id": "a", "file_unique_id": "au"}
        }));
        let parts = decompose(&msg);
        assert_eq!(parts.len(), 1);
        assert!(matches!(
            to_unified(parts[0].clone()),
            MessageContent::Image { mime: Some(m), .. } if m == "image/gif"
        ));
    }

    #[test]
    fn test_dice_emoji() {
        let dice = TgPart::Dice {
            emoji: "🎲".to_string(),
            value: Some(5),
        };
        assert_eq!(to_unified(dice), MessageContent::Dice { value: 5 });

        let dart = TgPart::Dice {
            emoji: "🎯".to_string(),
            value: Some(6),
        };
        assert_eq!(to_unified(dart), MessageContent::text("🎯 6"));
    }

    #[test]
    fn test_venue_wins_over_location() {
        let msg = message(json!({
            "message_id": 8,
            "chat": {"id": 1, "type": "private"},
            "location": {"latitude": 1.5, "longitude": 2.5},
            "venue": {"location": {"latitude": 1.5, "longitude": 2.5}, "title": "Cafe"}
        }));
        let parts = decompose(&msg);
        assert_eq!(parts.len(), 1);
        assert_eq!(
            to_unified(parts[0].clone()),
            MessageContent::Location {
                lat: 1.5,
                lon: 2.5,
                name: Some("Cafe".to_string())
            }
        );
    }

    #[test]
    fn test_assemble_merges_text_and_captions() {
        let photo = TgInputFile::Url("https://example.com/a.jpg".to_string());
        let sends = assemble(vec![
            TgPart::Text("hello ".to_string()),
            TgPart::Mention {
                text: "@Bob".to_string(),
                user: Some(TgUser {
                    id: 42,
                    ..TgUser::default()
                }),
            },
            TgPart::Photo {
                file: photo.clone(),
                spoiler: false,
            },
            TgPart::Text("nice".to_string()),
            TgPart::Dice {
                emoji: "🎲".to_string(),
                value: None,
            },
            TgPart::Text("bye".to_string()),
        ]);

        assert_eq!(sends.len(), 4);
        match &sends[0] {
            TgSend::Text { text, entities } => {
                assert_eq!(text, "hello @Bob");
                assert_eq!(entities[0].offset, 6);
                assert_eq!(entities[0].length, 4);
            }
            other => panic!("unexpected send: {other:?}"),
        }
        assert_eq!(
            sends[1],
            TgSend::Photo {
                photo,
                caption: TgCaption::raw(Some("nice".to_string())),
                has_spoiler: false,
            }
        );
        assert_eq!(sends[2], TgSend::Dice { emoji: "🎲".to_string() });
        // dice takes no caption
        assert_eq!(
            sends[3],
            TgSend::Text {
                text: "bye".to_string(),
                entities: Vec::new()
            }
        );
    }

    #[test]
    fn test_long_text_after_media_stays_separate() {
        let long = "x".repeat(MAX_CAPTION_UTF16 + 1);
        let sends = assemble(vec![
            TgPart::Animation {
                file: TgInputFile::Memory(Bytes::from_static(b"GIF89a")),
            },
            TgPart::Text(long.clone()),
        ]);
        assert_eq!(sends.len(), 2);
        assert!(matches!(&sends[1], TgSend::Text { text, .. } if *text == long));
    }

    #[test]
    fn test_foreign_sticker_sent_as_animation() {
        let sticker = MessageContent::Sticker {
            media: MediaRef::Path(PathBuf::from("/cache/x.gif")),
            animated: true,
        };
        assert!(matches!(
            from_unified(&sticker).unwrap().as_slice(),
            [TgPart::Animation { .. }]
        ));

        let native = MessageContent::Sticker {
            media: MediaRef::Remote(RemoteMedia::new(Platform::Telegram, "CAAC")),
            animated: true,
        };
        assert!(matches!(
            from_unified(&native).unwrap().as_slice(),
            [TgPart::Sticker { .. }]
        ));
    }

    #[test]
    fn test_voice_duration_in_seconds() {
        let voice = |duration_ms| MessageContent::Audio {
            media: MediaRef::Path(PathBuf::from("/cache/v.ogg")),
            duration_ms,
        };
        assert!(matches!(
            from_unified(&voice(Some(3_500))).unwrap().as_slice(),
            [TgPart::Voice { duration: Some(3), .. }]
        ));
        assert!(matches!(
            from_unified(&voice(Some(u64::MAX))).unwrap().as_slice(),
            [TgPart::Voice { duration: None, .. }]
        ));
    }

    #[test]
    fn test_send_serialization() {
        let send = TgSend::Photo {
            photo: TgInputFile::Remote(RemoteMedia::new(Platform::Telegram, "AgAD")),
            caption: TgCaption::raw(Some("hi".to_string())),
            has_spoiler: true,
        };
        assert_eq!(
            serde_json::to_value(&send).unwrap(),
            json!({"method": "sendPhoto", "photo": "AgAD", "caption": "hi", "has_spoiler": true})
        );
    }
}
