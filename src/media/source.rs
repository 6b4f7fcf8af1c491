//! Media references carried by message segments.

use std::path::PathBuf;

use bytes::Bytes;
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};

use crate::error::MediaError;
use crate::media::fetch::MediaFetcher;
use crate::media::key::{ConversionKey, TargetCodec, hash_bytes, hash_file, hash_source_id};
use crate::message::Platform;

/// Opaque handle to media content.
///
/// Exactly one representation is held at a time. `Remote` is the lazy form:
/// the bytes are only pulled (through a [`MediaFetcher`]) when the conversion
/// cache needs them. `Pending` marks media that must pass through the
/// conversion cache before an outbound adapter can use it.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaRef {
    Bytes(Bytes),
    Path(PathBuf),
    Remote(RemoteMedia),
    Pending(Box<PendingMedia>),
}

/// Media that lives on a chat platform and has not been downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteMedia {
    pub platform: Platform,
    /// Platform file handle, reusable for re-sending on the same platform.
    pub file_id: String,
    /// Identifier that stays the same for the same content across uploads.
    pub unique_id: Option<String>,
    pub url: Option<String>,
}

impl RemoteMedia {
    pub fn new(platform: Platform, file_id: impl Into<String>) -> Self {
        Self {
            platform,
            file_id: file_id.into(),
            unique_id: None,
            url: None,
        }
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Platform-qualified identifier used in place of a content hash.
    pub fn stable_id(&self) -> String {
        let id = self.unique_id.as_deref().unwrap_or(&self.file_id);
        format!("{}:{}", self.platform, id)
    }
}

/// A deferred conversion: a source plus the codec it must be turned into.
///
/// Only the conversion cache resolves these; everything else passes them
/// around untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingMedia {
    pub source: MediaRef,
    pub target: TargetCodec,
    pub variant: Option<String>,
}

impl PendingMedia {
    pub fn new(source: MediaRef, target: TargetCodec) -> Self {
        Self {
            source,
            target,
            variant: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

impl MediaRef {
    pub fn pending(source: MediaRef, target: TargetCodec) -> Self {
        Self::Pending(Box::new(PendingMedia::new(source, target)))
    }

    /// Whether this reference already points at this platform's own storage.
    pub fn is_native_to(&self, platform: Platform) -> bool {
        matches!(self, Self::Remote(remote) if remote.platform == platform)
    }

    pub fn as_remote(&self) -> Option<&RemoteMedia> {
        match self {
            Self::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Hash identifying the source content, used as the key prefix.
    ///
    /// Inline bytes and local files are hashed by content; remote media by
    /// its stable id so no download is needed to check the cache.
    pub async fn content_hash(&self) -> Result<String, MediaError> {
        match self {
            Self::Bytes(data) => Ok(hash_bytes(data)),
            Self::Path(path) => Ok(hash_file(path).await?),
            Self::Remote(remote) => Ok(hash_source_id(&remote.stable_id())),
            Self::Pending(pending) => {
                let inner = Box::pin(pending.source.content_hash()).await?;
                let mut key = ConversionKey::new(inner, pending.target.clone());
                if let Some(variant) = &pending.variant {
                    key = key.with_variant(variant.as_str());
                }
                Ok(hash_source_id(&key.to_string()))
            }
        }
    }

    /// Load the referenced bytes.
    ///
    /// `Pending` references cannot be loaded directly: they only become bytes
    /// by going through the conversion cache.
    pub async fn load(&self, fetcher: &dyn MediaFetcher) -> Result<Bytes, MediaError> {
        match self {
            Self::Bytes(data) => Ok(data.clone()),
            Self::Path(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
            Self::Remote(remote) => fetcher.fetch(remote).await,
            Self::Pending(_) => Err(MediaError::ProcessingFailed {
                reason: "pending media must be resolved through the conversion cache".to_string(),
            }),
        }
    }
}

impl Serialize for MediaRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bytes(data) => {
                let mut s = serializer.serialize_struct("MediaRef", 2)?;
                s.serialize_field("kind", "bytes")?;
                s.serialize_field("len", &data.len())?;
                s.end()
            }
            Self::Path(path) => {
                let mut s = serializer.serialize_struct("MediaRef", 2)?;
                s.serialize_field("kind", "path")?;
                s.serialize_field("path", path)?;
                s.end()
            }
            Self::Remote(remote) => {
                let mut s = serializer.serialize_struct("MediaRef", 2)?;
                s.serialize_field("kind", "remote")?;
                s.serialize_field("remote", remote)?;
                s.end()
            }
            Self::Pending(pending) => {
                let mut s = serializer.serialize_struct("MediaRef", 2)?;
                s.serialize_field("kind", "pending")?;
                s.serialize_field("pending", pending.as_ref())?;
                s.end()
            }
        }
    }
}
