//! Conversion keys.
//!
//! A key names one desired output artifact: `<contentHash>:<targetCodec>` with
//! an optional `:<variant>` suffix. Two requests with equal keys always get the
//! same artifact; the cache never looks at produced bytes to decide reuse.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::error::CacheError;

/// Length of the hex content hash embedded in keys.
const HASH_LEN: usize = 32;

/// Output codec requested from the conversion cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetCodec {
    /// Tencent SILK v3 speech (QQ voice messages).
    Silk,
    /// Opus in an Ogg container (Telegram voice messages).
    Ogg,
    /// Animated GIF, rendered from stickers or video.
    Gif,
    /// Static PNG, rendered from static stickers.
    Png,
    /// Byte-for-byte copy of the source, stored with the given extension.
    Raw(String),
}

impl TargetCodec {
    /// File extension used for artifacts of this codec.
    pub fn extension(&self) -> &str {
        match self {
            Self::Silk => "silk",
            Self::Ogg => "ogg",
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Raw(ext) => ext,
        }
    }

    /// Build a passthrough target, sanitizing the extension.
    pub fn raw(ext: &str) -> Self {
        let ext: String = ext
            .trim_start_matches('.')
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(8)
            .collect::<String>()
            .to_ascii_lowercase();
        if ext.is_empty() {
            Self::Raw("bin".to_string())
        } else {
            Self::Raw(ext)
        }
    }
}

impl fmt::Display for TargetCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silk => write!(f, "silk"),
            Self::Ogg => write!(f, "ogg"),
            Self::Gif => write!(f, "gif"),
            Self::Png => write!(f, "png"),
            Self::Raw(ext) => write!(f, "raw-{}", ext),
        }
    }
}

impl FromStr for TargetCodec {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silk" => Ok(Self::Silk),
            "ogg" => Ok(Self::Ogg),
            "gif" => Ok(Self::Gif),
            "png" => Ok(Self::Png),
            other => match other.strip_prefix("raw-") {
                Some(ext) if !ext.is_empty() => Ok(Self::raw(ext)),
                _ => Err(CacheError::InvalidKey(format!("unknown codec {:?}", other))),
            },
        }
    }
}

/// Identifier of one conversion artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversionKey {
    content_hash: String,
    target: TargetCodec,
    variant: Option<String>,
}

impl ConversionKey {
    pub fn new(content_hash: impl Into<String>, target: TargetCodec) -> Self {
        Self {
            content_hash: content_hash.into(),
            target,
            variant: None,
        }
    }

    /// Attach variant flags (size, fps, ...). Separators are replaced so the
    /// key stays parseable.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        let variant = variant.into().replace(':', "_");
        self.variant = if variant.is_empty() {
            None
        } else {
            Some(variant)
        };
        self
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn target(&self) -> &TargetCodec {
        &self.target
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// On-disk file name: a digest of the full key plus the codec extension.
    pub fn file_name(&self) -> String {
        let digest = blake3::hash(self.to_string().as_bytes()).to_hex();
        format!("{}.{}", &digest.as_str()[..HASH_LEN], self.target.extension())
    }
}

impl fmt::Display for ConversionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_hash, self.target)?;
        if let Some(variant) = &self.variant {
            write!(f, ":{}", variant)?;
        }
        Ok(())
    }
}

impl FromStr for ConversionKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let hash = parts.next().unwrap_or_default();
        let codec = parts
            .next()
            .ok_or_else(|| CacheError::InvalidKey(format!("missing codec in {:?}", s)))?;
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CacheError::InvalidKey(format!("bad content hash in {:?}", s)));
        }
        let mut key = Self::new(hash, codec.parse()?);
        if let Some(variant) = parts.next() {
            key = key.with_variant(variant);
        }
        Ok(key)
    }
}

/// BLAKE3 content hash, truncated to the key hash length.
pub fn hash_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().as_str()[..HASH_LEN].to_string()
}

/// [`hash_bytes`] of a file's content, read in chunks.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().as_str()[..HASH_LEN].to_string())
}

/// Hash for sources identified by a stable id rather than their bytes.
pub fn hash_source_id(id: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"source-id:");
    hasher.update(id.as_bytes());
    hasher.finalize().to_hex().as_str()[..HASH_LEN].to_string()
}
