//! Media handling for the bridge.
//!
//! - Content-addressed conversion cache with single-flight production
//! - Voice transcoding between SILK (QQ) and OGG/Opus (Telegram)
//! - Sticker conversion (TGS, WebP, WebM) to GIF or PNG
//! - Format sniffing from magic bytes
//! - Remote media download

mod audio;
mod cache;
pub mod detection;
mod fetch;
mod key;
mod pipeline;
mod runner;
mod source;
mod sticker;
mod video;

pub use audio::AudioTranscoder;
pub use cache::{CacheEntry, CacheStats, ConversionCache, Produced};
pub use detection::{MediaKind, SourceFormat, detect_format, detect_from_magic};
pub use fetch::{HttpFetcher, MediaFetcher};
pub use key::{ConversionKey, TargetCodec, hash_bytes, hash_source_id};
pub use pipeline::MediaPipeline;
pub use runner::ToolRunner;
pub use source::{MediaRef, PendingMedia, RemoteMedia};
pub use sticker::{StickerTranscoder, inflate_tgs};
pub use video::VideoTranscoder;
