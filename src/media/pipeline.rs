//! Resolution of pending media through the conversion cache.
//!
//! The message converter never runs a transcode itself. It hands a
//! [`PendingMedia`] to [`MediaPipeline::resolve`], which derives the
//! conversion key and, on a miss, gives the cache a producer that loads the
//! source and dispatches to the right codec backend.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::{BridgeConfig, MediaLimits};
use crate::error::{CacheError, MediaError};
use crate::media::audio::AudioTranscoder;
use crate::media::cache::{ConversionCache, Produced};
use crate::media::detection::{SourceFormat, detect_from_magic};
use crate::media::fetch::MediaFetcher;
use crate::media::key::{ConversionKey, TargetCodec};
use crate::media::runner::ToolRunner;
use crate::media::source::{MediaRef, PendingMedia};
use crate::media::sticker::StickerTranscoder;
use crate::media::video::VideoTranscoder;

struct Backends {
    fetcher: Arc<dyn MediaFetcher>,
    audio: AudioTranscoder,
    sticker: StickerTranscoder,
    video: VideoTranscoder,
    limits: MediaLimits,
}

/// Conversion entry points backed by one [`ConversionCache`].
#[derive(Clone)]
pub struct MediaPipeline {
    cache: ConversionCache,
    backends: Arc<Backends>,
}

impl MediaPipeline {
    pub fn new(cache: ConversionCache, fetcher: Arc<dyn MediaFetcher>, config: &BridgeConfig) -> Self {
        let runner = ToolRunner::new(config.cache.max_concurrent_productions, config.tools.timeout);
        Self {
            cache,
            backends: Arc::new(Backends {
                fetcher,
                audio: AudioTranscoder::new(runner.clone(), config.tools.clone()),
                sticker: StickerTranscoder::new(runner.clone(), config.tools.clone(), &config.limits),
                video: VideoTranscoder::new(runner, config.tools.clone(), &config.limits),
                limits: config.limits.clone(),
            }),
        }
    }

    pub fn cache(&self) -> &ConversionCache {
        &self.cache
    }

    /// Key under which `pending` is stored.
    ///
    /// Image targets get a size variant by default so changing the sticker
    /// size produces fresh artifacts instead of reusing old ones.
    pub async fn key_for(&self, pending: &PendingMedia) -> Result<ConversionKey, CacheError> {
        let hash = pending
            .source
            .content_hash()
            .await
            .map_err(|e| CacheError::ProductionFailed {
                key: format!("?:{}", pending.target),
                reason: format!("cannot hash source: {}", e),
            })?;

        let key = ConversionKey::new(hash, pending.target.clone());
        let key = match (&pending.variant, &pending.target) {
            (Some(variant), _) => key.with_variant(variant.as_str()),
            (None, TargetCodec::Gif | TargetCodec::Png) => {
                key.with_variant(format!("s{}", self.backends.limits.sticker_size))
            }
            (None, _) => key,
        };
        Ok(key)
    }

    /// Produce (or reuse) the artifact for `pending` and return its path.
    pub async fn resolve(&self, pending: &PendingMedia) -> Result<PathBuf, CacheError> {
        // nested conversions resolve inside-out
        let source = match &pending.source {
            MediaRef::Pending(inner) => MediaRef::Path(Box::pin(self.resolve(inner)).await?),
            other => other.clone(),
        };
        let pending = PendingMedia {
            source,
            target: pending.target.clone(),
            variant: pending.variant.clone(),
        };

        let key = self.key_for(&pending).await?;
        let backends = Arc::clone(&self.backends);
        let producer = async move { backends.produce(pending.source, pending.target).await };

        self.cache.convert(&key, producer).await
    }

    /// Voice clip to SILK or Ogg/Opus.
    pub async fn convert_audio(&self, source: MediaRef, target: TargetCodec) -> Result<PathBuf, CacheError> {
        match target {
            TargetCodec::Silk | TargetCodec::Ogg => self.resolve(&PendingMedia::new(source, target)).await,
            other => Err(CacheError::InvalidKey(format!("{} is not an audio codec", other))),
        }
    }

    /// Sticker to GIF (animated) or PNG (static).
    pub async fn convert_sticker(&self, source: MediaRef, animated: bool) -> Result<PathBuf, CacheError> {
        let target = if animated { TargetCodec::Gif } else { TargetCodec::Png };
        self.resolve(&PendingMedia::new(source, target)).await
    }

    /// Short video to a looping GIF.
    pub async fn convert_video_to_gif(&self, source: MediaRef) -> Result<PathBuf, CacheError> {
        self.resolve(&PendingMedia::new(source, TargetCodec::Gif).with_variant("video"))
            .await
    }

    /// Materialize media unchanged so it can be uploaded elsewhere.
    pub async fn copy_raw(&self, source: MediaRef, extension: &str) -> Result<PathBuf, CacheError> {
        self.resolve(&PendingMedia::new(source, TargetCodec::raw(extension)))
            .await
    }
}

impl Backends {
    async fn produce(&self, source: MediaRef, target: TargetCodec) -> Result<Produced, MediaError> {
        if let (TargetCodec::Raw(_), MediaRef::Path(path)) = (&target, &source) {
            return Ok(Produced::File(path.clone()));
        }

        let data = self.load(&source).await?;
        let format = detect_from_magic(&data).unwrap_or(SourceFormat::Unknown);
        tracing::debug!(source = %format, target = %target, bytes = data.len(), "Producing conversion");

        let output = match target {
            TargetCodec::Ogg => self.audio.to_ogg(data).await?,
            TargetCodec::Silk => self.audio.to_silk(data).await?,
            TargetCodec::Gif => match format {
                SourceFormat::Tgs => self.sticker.tgs_to_gif(data).await?,
                _ => self.video.to_gif(data).await?,
            },
            TargetCodec::Png => self.sticker.to_png(data).await?,
            TargetCodec::Raw(_) => data,
        };

        Ok(Produced::Bytes(output))
    }

    async fn load(&self, source: &MediaRef) -> Result<Bytes, MediaError> {
        if let MediaRef::Path(path) = source {
            let size = tokio::fs::metadata(path).await?.len();
            if size > self.limits.max_bytes as u64 {
                return Err(MediaError::TooLarge {
                    size: usize::try_from(size).unwrap_or(usize::MAX),
                    max: self.limits.max_bytes,
                });
            }
        }
        let data = source.load(self.fetcher.as_ref()).await?;
        if data.len() > self.limits.max_bytes {
            return Err(MediaError::TooLarge {
                size: data.len(),
                max: self.limits.max_bytes,
            });
        }
        if data.is_empty() {
            return Err(MediaError::ProcessingFailed {
                reason: "source media is empty".to_string(),
            });
        }
        Ok(data)
    }
}
