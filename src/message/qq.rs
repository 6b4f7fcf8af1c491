//! QQ (OneBot v11) segment model and segment conversion.
//!
//! OneBot implementations disagree on field types: ids arrive as strings or
//! numbers, optional fields are missing, empty or `null`. Segments are
//! therefore parsed through a loose `{type, data}` shape and then mapped onto
//! the closed [`QqSegment`] enum, defaulting anything malformed.

use std::path::PathBuf;
use std::sync::LazyLock;

use base64::Engine;
use bytes::Bytes;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ConvertError;
use crate::media::{MediaRef, RemoteMedia};
use crate::message::segment::{CARD_PLACEHOLDER, card_text, mention_text};
use crate::message::{MessageContent, MessageRef, Platform, UserId};

/// Marker QQ puts in the summary of animated stickers.
const ANIMATED_SUMMARY: &str = "动画表情";

static XML_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("valid xml title regex"));
static XML_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<summary[^>]*>(.*?)</summary>").expect("valid xml summary regex")
});
static XML_BRIEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"brief="([^"]*)""#).expect("valid xml brief regex"));
static XML_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\burl="([^"]*)""#).expect("valid xml url regex"));

/// One OneBot message segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSegment", into = "RawSegment")]
pub enum QqSegment {
    Text {
        text: String,
    },
    Face {
        id: u32,
    },
    Image {
        file: String,
        url: Option<String>,
        /// 1 marks a sticker sent from the emoticon panel.
        sub_type: u8,
        flash: bool,
        summary: Option<String>,
    },
    Record {
        file: String,
        url: Option<String>,
    },
    Video {
        file: String,
        url: Option<String>,
    },
    File {
        file: String,
        name: String,
        url: Option<String>,
    },
    At {
        qq: String,
        name: Option<String>,
    },
    Dice {
        result: Option<u8>,
    },
    Rps {
        result: Option<u8>,
    },
    Location {
        lat: f64,
        lon: f64,
        title: Option<String>,
        content: Option<String>,
    },
    Reply {
        id: String,
    },
    Share {
        url: String,
        title: String,
        content: Option<String>,
        image: Option<String>,
    },
    Json {
        data: String,
    },
    Xml {
        data: String,
    },
    /// Sticker from the QQ sticker store.
    MarketFace {
        emoji_id: String,
        package_id: Option<String>,
        key: Option<String>,
        summary: Option<String>,
    },
    Markdown {
        content: String,
    },
    Forward {
        id: String,
    },
    Unknown {
        kind: String,
        data: Value,
    },
}

impl QqSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn image(file: String) -> Self {
        Self::Image {
            file,
            url: None,
            sub_type: 0,
            flash: false,
            summary: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawSegment {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// String view of a field, accepting numbers and booleans. Empty strings
/// count as missing.
fn field(data: &Value, name: &str) -> Option<String> {
    match data.get(name)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number<T: std::str::FromStr>(data: &Value, name: &str) -> Option<T> {
    field(data, name)?.trim().parse().ok()
}

impl From<RawSegment> for QqSegment {
    fn from(raw: RawSegment) -> Self {
        let data = &raw.data;
        let text = |name: &str| field(data, name).unwrap_or_default();

        match raw.kind.as_str() {
            "text" => Self::Text { text: text("text") },
            "face" => Self::Face {
                id: number(data, "id").unwrap_or_default(),
            },
            "image" | "flash" => Self::Image {
                file: text("file"),
                url: field(data, "url"),
                sub_type: number(data, "subType")
                    .or_else(|| number(data, "sub_type"))
                    .unwrap_or_default(),
                flash: raw.kind == "flash" || field(data, "type").as_deref() == Some("flash"),
                summary: field(data, "summary"),
            },
            "record" => Self::Record {
                file: text("file"),
                url: field(data, "url"),
            },
            "video" => Self::Video {
                file: text("file"),
                url: field(data, "url"),
            },
            "file" => Self::File {
                file: text("file"),
                name: field(data, "name")
                    .or_else(|| field(data, "file_name"))
                    .unwrap_or_else(|| text("file")),
                url: field(data, "url"),
            },
            "at" => Self::At {
                qq: text("qq"),
                name: field(data, "name"),
            },
            "dice" => Self::Dice {
                result: number(data, "result"),
            },
            "rps" => Self::Rps {
                result: number(data, "result"),
            },
            "location" => Self::Location {
                lat: number(data, "lat").unwrap_or_default(),
                lon: number(data, "lon").unwrap_or_default(),
                title: field(data, "title"),
                content: field(data, "content"),
            },
            "reply" => Self::Reply { id: text("id") },
            "share" => Self::Share {
                url: text("url"),
                title: text("title"),
                content: field(data, "content"),
                image: field(data, "image"),
            },
            // some implementations hand json cards over already parsed
            "json" => Self::Json {
                data: match data.get("data") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other @ Value::Object(_)) => other.to_string(),
                    _ => String::new(),
                },
            },
            "xml" => Self::Xml { data: text("data") },
            "mface" => Self::MarketFace {
                emoji_id: text("emoji_id"),
                package_id: field(data, "emoji_package_id"),
                key: field(data, "key"),
                summary: field(data, "summary"),
            },
            "markdown" => Self::Markdown {
                content: text("content"),
            },
            "forward" => Self::Forward { id: text("id") },
            _ => Self::Unknown {
                kind: raw.kind.clone(),
                data: raw.data.clone(),
            },
        }
    }
}

impl From<QqSegment> for RawSegment {
    fn from(segment: QqSegment) -> Self {
        let mut data = Map::new();
        let mut put = |name: &str, value: String| {
            data.insert(name.to_string(), Value::String(value));
        };

        let kind = match segment {
            QqSegment::Text { text } => {
                put("text", text);
                "text"
            }
            QqSegment::Face { id } => {
                put("id", id.to_string());
                "face"
            }
            QqSegment::Image {
                file,
                url,
                sub_type,
                flash,
                summary,
            } => {
                put("file", file);
                if let Some(url) = url {
                    put("url", url);
                }
                if sub_type != 0 {
                    put("subType", sub_type.to_string());
                }
                if flash {
                    put("type", "flash".to_string());
                }
                if let Some(summary) = summary {
                    put("summary", summary);
                }
                "image"
            }
            QqSegment::Record { file, url } => {
                put("file", file);
                if let Some(url) = url {
                    put("url", url);
                }
                "record"
            }
            QqSegment::Video { file, url } => {
                put("file", file);
                if let Some(url) = url {
                    put("url", url);
                }
                "video"
            }
            QqSegment::File { file, name, url } => {
                put("file", file);
                put("name", name);
                if let Some(url) = url {
                    put("url", url);
                }
                "file"
            }
            QqSegment::At { qq, name } => {
                put("qq", qq);
                if let Some(name) = name {
                    put("name", name);
                }
                "at"
            }
            QqSegment::Dice { result } => {
                if let Some(result) = result {
                    put("result", result.to_string());
                }
                "dice"
            }
            QqSegment::Rps { result } => {
                if let Some(result) = result {
                    put("result", result.to_string());
                }
                "rps"
            }
            QqSegment::Location {
                lat,
                lon,
                title,
                content,
            } => {
                put("lat", lat.to_string());
                put("lon", lon.to_string());
                if let Some(title) = title {
                    put("title", title);
                }
                if let Some(content) = content {
                    put("content", content);
                }
                "location"
            }
            QqSegment::Reply { id } => {
                put("id", id);
                "reply"
            }
            QqSegment::Share {
                url,
                title,
                content,
                image,
            } => {
                put("url", url);
                put("title", title);
                if let Some(content) = content {
                    put("content", content);
                }
                if let Some(image) = image {
                    put("image", image);
                }
                "share"
            }
            QqSegment::Json { data } => {
                put("data", data);
                "json"
            }
            QqSegment::Xml { data } => {
                put("data", data);
                "xml"
            }
            QqSegment::MarketFace {
                emoji_id,
                package_id,
                key,
                summary,
            } => {
                put("emoji_id", emoji_id);
                if let Some(package_id) = package_id {
                    put("emoji_package_id", package_id);
                }
                if let Some(key) = key {
                    put("key", key);
                }
                if let Some(summary) = summary {
                    put("summary", summary);
                }
                "mface"
            }
            QqSegment::Markdown { content } => {
                put("content", content);
                "markdown"
            }
            QqSegment::Forward { id } => {
                put("id", id);
                "forward"
            }
            QqSegment::Unknown { kind, data } => return RawSegment { kind, data },
        };

        RawSegment {
            kind: kind.to_string(),
            data: Value::Object(data),
        }
    }
}

/// Sender block of a OneBot message event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QqSender {
    #[serde(default)]
    pub nickname: String,
    /// Group card (per-group nickname), empty when unset.
    #[serde(default)]
    pub card: String,
}

/// OneBot v11 message event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QqMessage {
    #[serde(deserialize_with = "lenient_id")]
    pub message_id: String,
    /// `group` or `private`.
    #[serde(default)]
    pub message_type: String,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub group_id: Option<String>,
    #[serde(deserialize_with = "lenient_id")]
    pub user_id: String,
    #[serde(default)]
    pub sender: QqSender,
    /// Unix seconds.
    #[serde(default)]
    pub time: i64,
    #[serde(deserialize_with = "segments_or_text")]
    pub message: Vec<QqSegment>,
}

impl QqMessage {
    pub fn is_group(&self) -> bool {
        self.message_type == "group" || (self.message_type.is_empty() && self.group_id.is_some())
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected an id, got {}", other))),
    }
}

fn lenient_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(D::Error::custom(format!("expected an id, got {}", other))),
    }
}

/// Segment array, or a bare string taken as one text segment.
fn segments_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<QqSegment>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(vec![QqSegment::Text { text }]),
        Value::Null => Ok(Vec::new()),
        other => serde_json::from_value(other).map_err(D::Error::custom),
    }
}

/// Destination of an outgoing OneBot message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "message_type", rename_all = "lowercase")]
pub enum QqTarget {
    Group { group_id: String },
    Private { user_id: String },
}

/// Parameters of a OneBot `send_msg` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QqOutgoing {
    #[serde(flatten)]
    pub target: QqTarget,
    pub message: Vec<QqSegment>,
}

/// Map a OneBot file reference onto a media handle.
///
/// `base64://` payloads become inline bytes and `file://` URIs local paths;
/// anything else is a platform file id (with its download URL when known).
pub fn media_ref(file: &str, url: Option<&str>) -> MediaRef {
    if let Some(encoded) = file.strip_prefix("base64://") {
        match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
            Ok(data) => return MediaRef::Bytes(Bytes::from(data)),
            Err(e) => tracing::warn!(error = %e, "Undecodable base64 media, keeping as reference"),
        }
    }
    if let Some(path) = file.strip_prefix("file://") {
        return MediaRef::Path(PathBuf::from(path));
    }

    let mut remote = RemoteMedia::new(Platform::Qq, file);
    if file.starts_with("http://") || file.starts_with("https://") {
        remote = remote.with_url(file);
    } else if let Some(url) = url {
        remote = remote.with_url(url);
    }
    MediaRef::Remote(remote)
}

/// OneBot `file` value for an outgoing media segment.
pub fn file_value(media: &MediaRef) -> Result<String, ConvertError> {
    match media {
        MediaRef::Bytes(data) => Ok(format!(
            "base64://{}",
            base64::engine::general_purpose::STANDARD.encode(data)
        )),
        MediaRef::Path(path) => Ok(format!("file://{}", path.display())),
        MediaRef::Remote(remote) if remote.platform == Platform::Qq => Ok(remote.file_id.clone()),
        MediaRef::Remote(remote) => remote.url.clone().ok_or_else(|| ConvertError::SegmentUnsupported {
            kind: format!("{} media without url", remote.platform),
            platform: Platform::Qq.to_string(),
        }),
        MediaRef::Pending(_) => Err(ConvertError::SegmentUnsupported {
            kind: "unresolved media".to_string(),
            platform: Platform::Qq.to_string(),
        }),
    }
}

/// Public GIF of a sticker-store face.
pub fn market_face_url(emoji_id: &str) -> String {
    let prefix: String = emoji_id.chars().take(2).collect();
    format!(
        "https://gxh.vip.qq.com/club/item/parcel/item/{}/{}/raw300.gif",
        prefix, emoji_id
    )
}

/// Convert one OneBot segment into unified content.
pub fn to_unified(segment: &QqSegment) -> MessageContent {
    match segment {
        QqSegment::Text { text } => MessageContent::text(text.as_str()),
        QqSegment::Face { id } => MessageContent::Face { id: *id },
        QqSegment::Image {
            file,
            url,
            sub_type,
            flash,
            summary,
        } => {
            let media = media_ref(file, url.as_deref());
            if *flash {
                MessageContent::Flash { media }
            } else if *sub_type == 1 {
                let animated = summary.as_deref().is_some_and(|s| s.contains(ANIMATED_SUMMARY))
                    || file.to_ascii_lowercase().ends_with(".gif");
                MessageContent::Sticker { media, animated }
            } else {
                MessageContent::Image { media, mime: None }
            }
        }
        QqSegment::Record { file, url } => MessageContent::Audio {
            media: media_ref(file, url.as_deref()),
            duration_ms: None,
        },
        QqSegment::Video { file, url } => MessageContent::Video {
            media: media_ref(file, url.as_deref()),
            mime: None,
            caption: None,
        },
        QqSegment::File { file, name, url } => MessageContent::File {
            media: media_ref(file, url.as_deref()),
            name: name.clone(),
            mime: None,
        },
        QqSegment::At { qq, name } => {
            let target = if qq == "all" {
                UserId::everyone()
            } else {
                UserId::new(Platform::Qq, qq.as_str())
            };
            MessageContent::At {
                target,
                display_name: name.as_deref().map(|n| n.trim_start_matches('@').to_string()),
            }
        }
        QqSegment::Dice { result } => MessageContent::Dice {
            value: result.unwrap_or_default(),
        },
        QqSegment::Rps { result } => MessageContent::Rps {
            value: result.unwrap_or_default(),
        },
        QqSegment::Location {
            lat, lon, title, ..
        } => MessageContent::Location {
            lat: *lat,
            lon: *lon,
            name: title.clone(),
        },
        QqSegment::Reply { id } => MessageContent::Reply {
            target: MessageRef::new(Platform::Qq, id.as_str()),
        },
        QqSegment::Share {
            url,
            title,
            content,
            ..
        } => MessageContent::Card {
            title: if title.is_empty() {
                CARD_PLACEHOLDER.to_string()
            } else {
                title.clone()
            },
            url: (!url.is_empty()).then(|| url.clone()),
            fields: content
                .iter()
                .map(|c| ("desc".to_string(), c.clone()))
                .collect(),
        },
        QqSegment::Json { data } => parse_json_card(data),
        QqSegment::Xml { data } => parse_xml_card(data),
        QqSegment::MarketFace {
            emoji_id, summary, ..
        } => {
            if emoji_id.is_empty() {
                return MessageContent::text(summary.clone().unwrap_or_else(|| "[sticker]".to_string()));
            }
            let url = market_face_url(emoji_id);
            MessageContent::Sticker {
                media: MediaRef::Remote(RemoteMedia::new(Platform::Qq, url.as_str()).with_url(url)),
                animated: true,
            }
        }
        QqSegment::Markdown { content } => MessageContent::Markdown {
            content: content.clone(),
        },
        QqSegment::Forward { .. } => MessageContent::unsupported("forward"),
        QqSegment::Unknown { kind, .. } => {
            MessageContent::unsupported(if kind.is_empty() { "unknown" } else { kind.as_str() })
        }
    }
}

/// Convert unified content into OneBot segments.
///
/// Content QQ cannot carry yields [`ConvertError::SegmentUnsupported`]; the
/// caller substitutes a placeholder.
pub fn from_unified(content: &MessageContent) -> Result<Vec<QqSegment>, ConvertError> {
    let segments = match content {
        MessageContent::Text { text } => vec![QqSegment::text(text.as_str())],
        MessageContent::Image { media, .. } => vec![QqSegment::image(file_value(media)?)],
        MessageContent::Video { media, caption, .. } => {
            let mut segments = vec![QqSegment::Video {
                file: file_value(media)?,
                url: None,
            }];
            if let Some(caption) = caption.as_deref().filter(|c| !c.is_empty()) {
                segments.push(QqSegment::text(caption));
            }
            segments
        }
        MessageContent::Audio { media, .. } => vec![QqSegment::Record {
            file: file_value(media)?,
            url: None,
        }],
        MessageContent::File { media, name, .. } => vec![QqSegment::File {
            file: file_value(media)?,
            name: name.clone(),
            url: None,
        }],
        MessageContent::Sticker { media, .. } => vec![QqSegment::Image {
            file: file_value(media)?,
            url: None,
            sub_type: 1,
            flash: false,
            summary: None,
        }],
        MessageContent::Flash { media } => vec![QqSegment::Image {
            file: file_value(media)?,
            url: None,
            sub_type: 0,
            flash: true,
            summary: None,
        }],
        MessageContent::At {
            target,
            display_name,
        } => match target.platform {
            Platform::Qq => vec![QqSegment::At {
                qq: target.id.clone(),
                name: display_name.clone(),
            }],
            _ => vec![QqSegment::text(mention_text(target, display_name.as_deref()))],
        },
        MessageContent::Face { id } => vec![QqSegment::Face { id: *id }],
        MessageContent::Dice { value } => vec![QqSegment::Dice {
            result: (*value > 0).then_some(*value),
        }],
        MessageContent::Rps { value } => vec![QqSegment::Rps {
            result: (*value > 0).then_some(*value),
        }],
        MessageContent::Location { lat, lon, name } => vec![QqSegment::Location {
            lat: *lat,
            lon: *lon,
            title: name.clone(),
            content: None,
        }],
        MessageContent::Reply { target } if target.platform == Platform::Qq => {
            vec![QqSegment::Reply {
                id: target.id.clone(),
            }]
        }
        MessageContent::Reply { .. } => {
            return Err(ConvertError::SegmentUnsupported {
                kind: "foreign reply".to_string(),
                platform: Platform::Qq.to_string(),
            });
        }
        MessageContent::Card { title, url, fields } => {
            let text = card_text(title, url.as_deref(), fields);
            match url {
                Some(url) => vec![
                    QqSegment::Share {
                        url: url.clone(),
                        title: title.clone(),
                        content: fields.first().map(|(_, value)| value.clone()),
                        image: None,
                    },
                    QqSegment::text(text),
                ],
                None => vec![QqSegment::text(text)],
            }
        }
        MessageContent::Markdown { content } => vec![QqSegment::Markdown {
            content: content.clone(),
        }],
        MessageContent::Empty => Vec::new(),
    };
    Ok(segments)
}

/// Parse a QQ "ark" JSON card.
pub fn parse_json_card(data: &str) -> MessageContent {
    let value: Value = serde_json::from_str(data).unwrap_or(Value::Null);
    let detail = value
        .get("meta")
        .and_then(Value::as_object)
        .and_then(|meta| meta.values().next());
    let detail_str = |name: &str| {
        detail
            .and_then(|d| d.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let title = detail_str("title")
        .or_else(|| {
            value
                .get("prompt")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| CARD_PLACEHOLDER.to_string());
    let url = detail_str("jumpUrl")
        .or_else(|| detail_str("qqdocurl"))
        .or_else(|| detail_str("url"));

    let mut fields = Vec::new();
    if let Some(desc) = detail_str("desc") {
        fields.push(("desc".to_string(), desc));
    }
    if let Some(tag) = detail_str("tag") {
        fields.push(("source".to_string(), tag));
    }

    MessageContent::Card { title, url, fields }
}

/// Parse a QQ XML rich message.
pub fn parse_xml_card(data: &str) -> MessageContent {
    let capture = |re: &Regex| {
        re.captures(data)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let title = capture(&XML_TITLE)
        .or_else(|| capture(&XML_BRIEF))
        .unwrap_or_else(|| CARD_PLACEHOLDER.to_string());
    let url = capture(&XML_URL).map(|u| u.replace("&amp;", "&"));
    let fields = capture(&XML_SUMMARY)
        .map(|summary| vec![("desc".to_string(), summary)])
        .unwrap_or_default();

    MessageContent::Card { title, url, fields }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn segment(value: Value) -> QqSegment {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_lenient_segment_fields() {
        assert_eq!(
            segment(json!({"type": "face", "data": {"id": 14}})),
            QqSegment::Face { id: 14 }
        );
        assert_eq!(
            segment(json!({"type": "face", "data": {"id": "14"}})),
            QqSegment::Face { id: 14 }
        );
        assert_eq!(
            segment(json!({"type": "at", "data": {"qq": 10001}})),
            QqSegment::At {
                qq: "10001".to_string(),
                name: None
            }
        );
        // missing data degrades to defaults
        assert_eq!(segment(json!({"type": "text"})), QqSegment::text(""));
        assert_eq!(
            segment(json!({"type": "face", "data": null})),
            QqSegment::Face { id: 0 }
        );
    }

    #[test]
    fn test_unknown_segment_kept() {
        let seg = segment(json!({"type": "poke", "data": {"id": "1"}}));
        assert!(matches!(&seg, QqSegment::Unknown { kind, .. } if kind == "poke"));
        assert_eq!(to_unified(&seg), MessageContent::unsupported("poke"));

        // and serialized back unchanged
        let value = serde_json::to_value(&seg).unwrap();
        assert_eq!(value, json!({"type": "poke", "data": {"id": "1"}}));
    }

    #[test]
    fn test_flash_image_variants() {
        let a = segment(json!({"type": "image", "data": {"file": "x.image", "type": "flash"}}));
        let b = segment(json!({"type": "flash", "data": {"file": "x.image"}}));
        assert!(matches!(to_unified(&a), MessageContent::Flash { .. }));
        assert!(matches!(to_unified(&b), MessageContent::Flash { .. }));
    }

    #[test]
    fn test_sticker_image() {
        let seg = segment(json!({
            "type": "image",
            "data": {"file": "abc.image", "subType": 1, "summary": "[动画表情]"}
        }));
        match to_unified(&seg) {
            MessageContent::Sticker { media, animated } => {
                assert!(animated);
                assert_eq!(media.as_remote().unwrap().file_id, "abc.image");
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn test_media_ref_schemes() {
        assert_eq!(
            media_ref("base64://aGVsbG8=", None),
            MediaRef::Bytes(Bytes::from_static(b"hello"))
        );
        assert_eq!(
            media_ref("file:///tmp/voice.silk", None),
            MediaRef::Path(PathBuf::from("/tmp/voice.silk"))
        );
        let remote = media_ref("https://example.com/a.jpg", None);
        assert_eq!(
            remote.as_remote().unwrap().url.as_deref(),
            Some("https://example.com/a.jpg")
        );
        let remote = media_ref("abc.image", Some("https://multimedia.nt.qq.com.cn/x"));
        assert_eq!(remote.as_remote().unwrap().file_id, "abc.image");
    }

    #[test]
    fn test_at_all() {
        let seg = segment(json!({"type": "at", "data": {"qq": "all"}}));
        let content = to_unified(&seg);
        assert!(matches!(&content, MessageContent::At { target, .. } if target.is_everyone()));
        assert_eq!(
            from_unified(&content).unwrap(),
            vec![QqSegment::At {
                qq: "all".to_string(),
                name: None
            }]
        );
    }

    #[test]
    fn test_market_face_url() {
        let seg = segment(json!({
            "type": "mface",
            "data": {"emoji_id": "ab34cdef", "emoji_package_id": 235125, "summary": "[hi]"}
        }));
        match to_unified(&seg) {
            MessageContent::Sticker { media, animated: true } => assert_eq!(
                media.as_remote().unwrap().url.as_deref(),
                Some("https://gxh.vip.qq.com/club/item/parcel/item/ab/ab34cdef/raw300.gif")
            ),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn test_json_card() {
        let data = json!({
            "app": "com.tencent.structmsg",
            "prompt": "[分享]Rust 2024",
            "meta": {"news": {
                "title": "Rust 2024",
                "desc": "Edition guide",
                "jumpUrl": "https://doc.rust-lang.org/edition-guide/",
                "tag": "Rust"
            }}
        })
        .to_string();
        assert_eq!(
            parse_json_card(&data),
            MessageContent::Card {
                title: "Rust 2024".to_string(),
                url: Some("https://doc.rust-lang.org/edition-guide/".to_string()),
                fields: vec![
                    ("desc".to_string(), "Edition guide".to_string()),
                    ("source".to_string(), "Rust".to_string()),
                ],
            }
        );
        assert!(matches!(
            parse_json_card("not json"),
            MessageContent::Card { title, url: None, .. } if title == CARD_PLACEHOLDER
        ));
    }

    #[test]
    fn test_xml_card() {
        let data = r#"<?xml version='1.0'?><msg brief="[link]" url="https://a.example/?x=1&amp;y=2"><item><title>Hello</title><summary>World</summary></item></msg>"#;
        assert_eq!(
            parse_xml_card(data),
            MessageContent::Card {
                title: "Hello".to_string(),
                url: Some("https://a.example/?x=1&y=2".to_string()),
                fields: vec![("desc".to_string(), "World".to_string())],
            }
        );
    }

    #[test]
    fn test_message_event_lenient_ids() {
        let msg: QqMessage = serde_json::from_value(json!({
            "message_id": -2147483000,
            "message_type": "group",
            "group_id": 20002,
            "user_id": "10001",
            "sender": {"nickname": "alice", "card": ""},
            "time": 1700000000,
            "message": [{"type": "text", "data": {"text": "hi"}}]
        }))
        .unwrap();
        assert_eq!(msg.message_id, "-2147483000");
        assert_eq!(msg.group_id.as_deref(), Some("20002"));
        assert!(msg.is_group());

        let msg: QqMessage = serde_json::from_value(json!({
            "message_id": "7", "user_id": 1, "message": "plain text"
        }))
        .unwrap();
        assert_eq!(msg.message, vec![QqSegment::text("plain text")]);
        assert!(!msg.is_group());
    }

    #[test]
    fn test_outgoing_shape() {
        let out = QqOutgoing {
            target: QqTarget::Group {
                group_id: "20002".to_string(),
            },
            message: vec![QqSegment::text("hi"), QqSegment::Face { id: 14 }],
        };
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({
                "message_type": "group",
                "group_id": "20002",
                "message": [
                    {"type": "text", "data": {"text": "hi"}},
                    {"type": "face", "data": {"id": "14"}}
                ]
            })
        );
    }

    #[test]
    fn test_foreign_reply_unsupported() {
        let reply = MessageContent::Reply {
            target: MessageRef::new(Platform::Telegram, "5"),
        };
        assert!(from_unified(&reply).is_err());
    }

    #[test]
    fn test_pending_media_unsupported() {
        let image = MessageContent::Image {
            media: MediaRef::pending(
                MediaRef::Bytes(Bytes::from_static(b"x")),
                crate::media::TargetCodec::Png,
            ),
            mime: None,
        };
        assert!(matches!(
            from_unified(&image),
            Err(ConvertError::SegmentUnsupported { .. })
        ));
    }
}
