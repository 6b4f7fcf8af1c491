//! Rendering helpers shared by the QQ and Telegram segment converters.

use crate::media::detection::SourceFormat;
use crate::message::{MessageContent, UserId};

/// The only dice emoji QQ has an equivalent for.
pub const DICE_EMOJI: &str = "🎲";

/// Placeholder used when a reply target cannot be mapped.
pub const REPLY_PLACEHOLDER: &str = "[reply]";

/// Fallback title for rich cards without one.
pub const CARD_PLACEHOLDER: &str = "[card]";

/// `[unsupported: <kind>]`, shown in place of content that cannot be carried.
pub fn placeholder_text(kind: &str) -> String {
    format!("[unsupported: {}]", kind)
}

/// Common QQ face ids and their names.
const FACES: &[(u32, &str)] = &[
    (0, "惊讶"),
    (1, "撇嘴"),
    (2, "色"),
    (4, "得意"),
    (5, "流泪"),
    (6, "害羞"),
    (9, "大哭"),
    (10, "尴尬"),
    (11, "发怒"),
    (12, "调皮"),
    (13, "呲牙"),
    (14, "微笑"),
    (21, "可爱"),
    (23, "傲慢"),
    (26, "惊恐"),
    (27, "流汗"),
    (28, "憨笑"),
    (32, "疑问"),
    (33, "嘘"),
    (34, "晕"),
    (38, "敲打"),
    (39, "再见"),
    (49, "拥抱"),
    (53, "蛋糕"),
    (63, "玫瑰"),
    (66, "爱心"),
    (74, "太阳"),
    (76, "赞"),
    (78, "握手"),
    (79, "胜利"),
    (96, "冷汗"),
    (97, "擦汗"),
    (98, "抠鼻"),
    (99, "鼓掌"),
    (106, "委屈"),
    (107, "快哭了"),
    (109, "左亲亲"),
    (111, "可怜"),
    (112, "菜刀"),
    (124, "OK"),
    (144, "喝彩"),
    (147, "棒棒糖"),
    (171, "茶"),
    (172, "眨眼睛"),
    (175, "卖萌"),
    (178, "斜眼笑"),
    (179, "doge"),
    (182, "笑哭"),
    (187, "幽灵"),
    (201, "点赞"),
    (212, "托腮"),
    (264, "捂脸"),
    (277, "汪汪"),
    (307, "喵喵"),
];

pub fn face_name(id: u32) -> Option<&'static str> {
    FACES.iter().find(|(face, _)| *face == id).map(|(_, name)| *name)
}

/// `/name` for known faces, `[face:<id>]` otherwise.
pub fn face_text(id: u32) -> String {
    match face_name(id) {
        Some(name) => format!("/{}", name),
        None => format!("[face:{}]", id),
    }
}

pub fn rps_emoji(value: u8) -> &'static str {
    match value {
        1 => "✊",
        2 => "✌️",
        3 => "✋",
        _ => "✊✌️✋",
    }
}

/// `@name`, falling back to the raw id.
pub fn mention_text(target: &UserId, display_name: Option<&str>) -> String {
    if target.is_everyone() {
        return "@all".to_string();
    }
    format!("@{}", display_name.unwrap_or(&target.id))
}

/// Plain-text rendering of a rich card.
pub fn card_text(title: &str, url: Option<&str>, fields: &[(String, String)]) -> String {
    let mut lines = vec![title.to_string()];
    lines.extend(
        fields
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| format!("{}: {}", name, value)),
    );
    if let Some(url) = url {
        lines.push(url.to_string());
    }
    lines.join("\n")
}

/// File extension to store pass-through media under.
pub fn media_extension(content: &MessageContent) -> String {
    let from_mime = |mime: &Option<String>| {
        mime.as_deref()
            .and_then(SourceFormat::from_mime)
            .map(|f| f.extension().to_string())
    };

    match content {
        MessageContent::Image { mime, .. } => from_mime(mime).unwrap_or_else(|| "jpg".to_string()),
        MessageContent::Video { mime, .. } => from_mime(mime).unwrap_or_else(|| "mp4".to_string()),
        MessageContent::File { name, mime, .. } => std::path::Path::new(name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .or_else(|| from_mime(mime))
            .unwrap_or_else(|| "bin".to_string()),
        MessageContent::Flash { .. } => "jpg".to_string(),
        MessageContent::Sticker { animated: true, .. } => "gif".to_string(),
        MessageContent::Sticker { .. } => "png".to_string(),
        _ => "bin".to_string(),
    }
}
