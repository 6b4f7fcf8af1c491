//! Magic-byte format detection for media crossing the bridge.
//!
//! Backends use this to pick a strategy and to skip transcodes whose source
//! is already in the target codec.

use std::path::Path;

use serde::Serialize;

/// Broad category of a detected format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Sticker,
    Unknown,
}

/// Source formats the codec backends know how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
    AnimatedWebP,
    /// Telegram animated sticker (gzip-compressed Lottie JSON).
    Tgs,
    /// Tencent SILK v3 speech.
    Silk,
    Amr,
    Ogg,
    Mp3,
    Wav,
    Mp4,
    Mov,
    WebM,
    Mkv,
    Unknown,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnimatedWebP => write!(f, "animated_webp"),
            other => write!(f, "{}", other.extension()),
        }
    }
}

impl SourceFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::WebP | Self::AnimatedWebP => "image/webp",
            Self::Tgs => "application/x-tgsticker",
            Self::Silk => "audio/silk",
            Self::Amr => "audio/amr",
            Self::Ogg => "audio/ogg",
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Mp4 => "video/mp4",
            Self::Mov => "video/quicktime",
            Self::WebM => "video/webm",
            Self::Mkv => "video/x-matroska",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Get the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::WebP | Self::AnimatedWebP => "webp",
            Self::Tgs => "tgs",
            Self::Silk => "silk",
            Self::Amr => "amr",
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::WebM => "webm",
            Self::Mkv => "mkv",
            Self::Unknown => "bin",
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Png | Self::Jpeg | Self::Gif | Self::WebP | Self::AnimatedWebP => {
                MediaKind::Image
            }
            Self::Tgs => MediaKind::Sticker,
            Self::Silk | Self::Amr | Self::Ogg | Self::Mp3 | Self::Wav => MediaKind::Audio,
            Self::Mp4 | Self::Mov | Self::WebM | Self::Mkv => MediaKind::Video,
            Self::Unknown => MediaKind::Unknown,
        }
    }

    /// Whether the format carries more than one frame.
    pub fn is_animated(&self) -> bool {
        matches!(
            self,
            Self::Gif | Self::AnimatedWebP | Self::Tgs | Self::Mp4 | Self::Mov | Self::WebM | Self::Mkv
        )
    }

    /// Parse from a MIME type string.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.split(';').next().unwrap_or(mime).trim();
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            "application/x-tgsticker" => Some(Self::Tgs),
            "audio/silk" => Some(Self::Silk),
            "audio/amr" => Some(Self::Amr),
            "audio/ogg" | "audio/opus" => Some(Self::Ogg),
            "audio/mpeg" | "audio/mp3" => Some(Self::Mp3),
            "audio/wav" | "audio/x-wav" => Some(Self::Wav),
            "video/mp4" => Some(Self::Mp4),
            "video/quicktime" => Some(Self::Mov),
            "video/webm" => Some(Self::WebM),
            "video/x-matroska" => Some(Self::Mkv),
            _ => None,
        }
    }

    /// Parse from a file extension string (without dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            "tgs" => Some(Self::Tgs),
            "silk" | "slk" => Some(Self::Silk),
            "amr" => Some(Self::Amr),
            "ogg" | "oga" | "opus" => Some(Self::Ogg),
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "mp4" | "m4v" => Some(Self::Mp4),
            "mov" => Some(Self::Mov),
            "webm" => Some(Self::WebM),
            "mkv" => Some(Self::Mkv),
            _ => None,
        }
    }
}

/// Detect the format from magic bytes, falling back to the file name.
pub fn detect_format(data: &[u8], filename: Option<&str>) -> SourceFormat {
    detect_from_magic(data)
        .or_else(|| {
            filename.and_then(|f| {
                let ext = Path::new(f).extension()?.to_string_lossy().to_string();
                SourceFormat::from_extension(&ext)
            })
        })
        .unwrap_or(SourceFormat::Unknown)
}

/// Detect the format from magic bytes alone.
pub fn detect_from_magic(data: &[u8]) -> Option<SourceFormat> {
    if data.len() < 4 {
        return None;
    }

    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some(SourceFormat::Png);
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(SourceFormat::Jpeg);
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(SourceFormat::Gif);
    }

    // RIFF....WEBP, animated when the VP8X flags carry the animation bit
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        if has_anim_flag(data) {
            return Some(SourceFormat::AnimatedWebP);
        }
        return Some(SourceFormat::WebP);
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
        return Some(SourceFormat::Wav);
    }

    // TGS: gzip-compressed Lottie (magic bytes 0x1F 0x8B)
    if data.starts_with(&[0x1F, 0x8B]) {
        return Some(SourceFormat::Tgs);
    }

    // SILK v3, with or without Tencent's leading 0x02
    if data.starts_with(b"#!SILK_V3") || (data.len() > 10 && data[0] == 0x02 && &data[1..10] == b"#!SILK_V3")
    {
        return Some(SourceFormat::Silk);
    }
    if data.starts_with(b"#!AMR") {
        return Some(SourceFormat::Amr);
    }
    if data.starts_with(b"OggS") {
        return Some(SourceFormat::Ogg);
    }
    if data.starts_with(b"ID3")
        || data.starts_with(&[0xFF, 0xFB])
        || data.starts_with(&[0xFF, 0xF3])
        || data.starts_with(&[0xFF, 0xF2])
    {
        return Some(SourceFormat::Mp3);
    }

    // ISO BMFF: ftyp box at offset 4, brand distinguishes QuickTime
    if data.len() >= 12 && (&data[4..8] == b"ftyp" || &data[4..8] == b"moov") {
        if &data[8..12] == b"qt  " {
            return Some(SourceFormat::Mov);
        }
        return Some(SourceFormat::Mp4);
    }

    // EBML header shared by WebM and Matroska; DocType tells them apart
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        if has_doctype(data, b"matroska") {
            return Some(SourceFormat::Mkv);
        }
        return Some(SourceFormat::WebM);
    }

    None
}

/// VP8X extended header: animation flag is bit 1 of the byte at offset 20.
fn has_anim_flag(data: &[u8]) -> bool {
    data.len() >= 21 && &data[12..16] == b"VP8X" && data[20] & 0x02 != 0
}

fn has_doctype(data: &[u8], doctype: &[u8]) -> bool {
    let search_len = data.len().min(64);
    data[..search_len]
        .windows(doctype.len())
        .any(|w| w == doctype)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webp(vp8x_flags: Option<u8>) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"RIFF");
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        data.extend_from_slice(b"WEBP");
        match vp8x_flags {
            Some(flags) => {
                data.extend_from_slice(b"VP8X");
                data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
                data.push(flags);
            }
            None => data.extend_from_slice(b"VP8 "),
        }
        data.extend_from_slice(&[0x00; 16]);
        data
    }

    #[test]
    fn test_detect_images() {
        assert_eq!(detect_from_magic(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), Some(SourceFormat::Png));
        assert_eq!(detect_from_magic(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(SourceFormat::Jpeg));
        assert_eq!(detect_from_magic(b"GIF89a...."), Some(SourceFormat::Gif));
        assert_eq!(detect_from_magic(&webp(None)), Some(SourceFormat::WebP));
        assert_eq!(detect_from_magic(&webp(Some(0x02))), Some(SourceFormat::AnimatedWebP));
        assert_eq!(detect_from_magic(&webp(Some(0x10))), Some(SourceFormat::WebP));
    }

    #[test]
    fn test_detect_speech_codecs() {
        assert_eq!(detect_from_magic(b"#!SILK_V3\x0c\x00"), Some(SourceFormat::Silk));
        assert_eq!(detect_from_magic(b"\x02#!SILK_V3\x0c\x00"), Some(SourceFormat::Silk));
        assert_eq!(detect_from_magic(b"#!AMR\n"), Some(SourceFormat::Amr));
        assert_eq!(detect_from_magic(b"OggS\x00\x02"), Some(SourceFormat::Ogg));
        assert_eq!(detect_from_magic(b"ID3\x04\x00"), Some(SourceFormat::Mp3));
    }

    #[test]
    fn test_detect_containers() {
        let mut mp4 = vec![0x00, 0x00, 0x00, 0x20];
        mp4.extend_from_slice(b"ftypisom");
        assert_eq!(detect_from_magic(&mp4), Some(SourceFormat::Mp4));

        let mut mov = vec![0x00, 0x00, 0x00, 0x14];
        mov.extend_from_slice(b"ftypqt  ");
        assert_eq!(detect_from_magic(&mov), Some(SourceFormat::Mov));

        let mut webm = vec![0x1A, 0x45, 0xDF, 0xA3, 0x00, 0x00];
        webm.extend_from_slice(b"webm");
        assert_eq!(detect_from_magic(&webm), Some(SourceFormat::WebM));

        let mut mkv = vec![0x1A, 0x45, 0xDF, 0xA3, 0x00, 0x00];
        mkv.extend_from_slice(b"matroska");
        assert_eq!(detect_from_magic(&mkv), Some(SourceFormat::Mkv));
    }

    #[test]
    fn test_detect_tgs() {
        assert_eq!(detect_from_magic(&[0x1F, 0x8B, 0x08, 0x00]), Some(SourceFormat::Tgs));
        assert!(SourceFormat::Tgs.is_animated());
        assert_eq!(SourceFormat::Tgs.kind(), MediaKind::Sticker);
    }

    #[test]
    fn test_short_or_unknown_data() {
        assert_eq!(detect_from_magic(&[0x1F, 0x8B]), None);
        assert_eq!(detect_from_magic(&[0x00; 20]), None);
        assert_eq!(detect_format(&[0x00; 20], None), SourceFormat::Unknown);
    }

    #[test]
    fn test_filename_fallback() {
        assert_eq!(detect_format(&[0x00; 20], Some("voice.SLK")), SourceFormat::Silk);
        assert_eq!(detect_format(&[0x00; 20], Some("clip.m4v")), SourceFormat::Mp4);
        // magic bytes win over the name
        assert_eq!(detect_format(b"OggS\x00\x02", Some("voice.silk")), SourceFormat::Ogg);
    }

    #[test]
    fn test_mime_round_trip() {
        for format in [
            SourceFormat::Png,
            SourceFormat::Jpeg,
            SourceFormat::Gif,
            SourceFormat::Tgs,
            SourceFormat::Silk,
            SourceFormat::Ogg,
            SourceFormat::Mp4,
            SourceFormat::WebM,
        ] {
            assert_eq!(SourceFormat::from_mime(format.mime_type()), Some(format));
            assert_eq!(SourceFormat::from_extension(format.extension()), Some(format));
        }
        assert_eq!(SourceFormat::from_mime("audio/ogg; codecs=opus"), Some(SourceFormat::Ogg));
    }
}
