//! Message normalization and media conversion for a QQ ↔ Telegram bridge.
//!
//! Platform-native messages (OneBot v11 events, Telegram Bot API messages)
//! are converted into a [`UnifiedMessage`] and back. Media the target
//! platform cannot use as-is goes through a content-addressed
//! [`ConversionCache`] that produces each conversion at most once, however
//! many messages ask for it concurrently.

pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod message;

pub use config::BridgeConfig;
pub use error::{CacheError, ConfigError, ConvertError, Error, MediaError, Result};
pub use media::{ConversionCache, ConversionKey, MediaPipeline, MediaRef, TargetCodec};
pub use message::{MessageContent, MessageConverter, Platform, UnifiedMessage};
