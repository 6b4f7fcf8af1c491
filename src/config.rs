//! Bridge configuration.
//!
//! Every component takes its slice of [`BridgeConfig`] explicitly through its
//! constructor. Values come from the environment (optionally seeded from a
//! `.env` file) and fall back to defaults that work on a stock install with
//! `ffmpeg` on the `PATH`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Complete bridge configuration.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub cache: CacheConfig,
    pub tools: ToolConfig,
    pub limits: MediaLimits,
    pub lookup: LookupConfig,
}

/// Conversion cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory owned by the conversion cache.
    pub dir: PathBuf,
    /// Upper bound on concurrently running transcodes.
    pub max_concurrent_productions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_concurrent_productions: 4,
        }
    }
}

/// External tool locations.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub ffmpeg: PathBuf,
    /// SILK v3 decoder (`silk_v3_decoder <in> <out.pcm> -Fs_API 24000`).
    pub silk_decoder: PathBuf,
    /// SILK v3 encoder (`silk_v3_encoder <in.pcm> <out> -Fs_API 24000 -tencent`).
    pub silk_encoder: PathBuf,
    /// rlottie's `lottie2gif`.
    pub lottie2gif: PathBuf,
    /// Wall-clock budget for one tool invocation.
    pub timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            silk_decoder: PathBuf::from("silk_v3_decoder"),
            silk_encoder: PathBuf::from("silk_v3_encoder"),
            lottie2gif: PathBuf::from("lottie2gif"),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Limits applied to media before and during conversion.
#[derive(Debug, Clone)]
pub struct MediaLimits {
    pub max_bytes: usize,
    /// Edge length in pixels for rendered stickers.
    pub sticker_size: u32,
    pub gif_fps: u32,
    pub gif_max_width: u32,
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024, // 100MB
            sticker_size: 256,
            gif_fps: 15,
            gif_max_width: 480,
        }
    }
}

/// Lookup collaborator settings.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub timeout: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1500),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = get("BRIDGE_CACHE_DIR").filter(|v| !v.is_empty()) {
            config.cache.dir = expand_tilde(&dir);
        }
        if let Some(n) = parse_var::<usize>(&get, "BRIDGE_MAX_PRODUCTIONS")? {
            if n == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "BRIDGE_MAX_PRODUCTIONS".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config.cache.max_concurrent_productions = n;
        }

        if let Some(path) = get("BRIDGE_FFMPEG").filter(|v| !v.is_empty()) {
            config.tools.ffmpeg = expand_tilde(&path);
        }
        if let Some(path) = get("BRIDGE_SILK_DECODER").filter(|v| !v.is_empty()) {
            config.tools.silk_decoder = expand_tilde(&path);
        }
        if let Some(path) = get("BRIDGE_SILK_ENCODER").filter(|v| !v.is_empty()) {
            config.tools.silk_encoder = expand_tilde(&path);
        }
        if let Some(path) = get("BRIDGE_LOTTIE2GIF").filter(|v| !v.is_empty()) {
            config.tools.lottie2gif = expand_tilde(&path);
        }
        if let Some(secs) = parse_var::<u64>(&get, "BRIDGE_TOOL_TIMEOUT_SECS")? {
            config.tools.timeout = Duration::from_secs(secs);
        }

        if let Some(max) = parse_var::<usize>(&get, "BRIDGE_MAX_MEDIA_BYTES")? {
            config.limits.max_bytes = max;
        }
        if let Some(size) = parse_var::<u32>(&get, "BRIDGE_STICKER_SIZE")? {
            config.limits.sticker_size = size;
        }

        if let Some(ms) = parse_var::<u64>(&get, "BRIDGE_LOOKUP_TIMEOUT_MS")? {
            config.lookup.timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{} ({:?})", e, raw),
                })
        }
        _ => Ok(None),
    }
}

/// Default cache location, `~/.chatbridge/media-cache`.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".chatbridge")
        .join("media-cache")
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}
