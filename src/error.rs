//! Error types for chatbridge.

use std::time::Duration;

/// Top-level error type for the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Media processing errors raised by codec backends and fetchers.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Unsupported media type: {mime_type}")]
    UnsupportedType { mime_type: String },

    #[error("Media processing failed: {reason}")]
    ProcessingFailed { reason: String },

    #[error("Media file too large: {size} bytes exceeds {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("Media download failed: {reason}")]
    DownloadFailed { reason: String },

    #[error("Tool {tool} is not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Tool {tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Tool {tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("Conversion produced an empty output")]
    EmptyOutput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the conversion cache.
///
/// Cloneable so one failed production can be handed to every waiter of the
/// same key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("Production failed for {key}: {reason}")]
    ProductionFailed { key: String, reason: String },

    #[error("Cache IO failed for {key}: {reason}")]
    CacheIo { key: String, reason: String },

    #[error("Invalid conversion key: {0}")]
    InvalidKey(String),
}

impl CacheError {
    /// The conversion key this error relates to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::ProductionFailed { key, .. } | Self::CacheIo { key, .. } => Some(key),
            Self::InvalidKey(_) => None,
        }
    }
}

/// Message conversion errors.
///
/// None of these abort a whole message: the converter recovers each one
/// locally and records it through tracing.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Segment {kind} has no representation on {platform}")]
    SegmentUnsupported { kind: String, platform: String },

    #[error("Lookup for {id} failed: {reason}")]
    LookupFailed { id: String, reason: String },

    #[error("Media conversion failed: {0}")]
    Media(#[from] CacheError),
}

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, Error>;
