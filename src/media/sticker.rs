//! Sticker rendering.
//!
//! Telegram stickers come in three flavors: static WebP, animated TGS
//! (gzip-compressed Lottie JSON) and video WebM. QQ cannot display any of
//! them as stickers, so static ones become PNG and TGS ones are rendered to
//! GIF with rlottie. Video stickers go through the video backend.

use std::ffi::OsStr;
use std::io::Read;

use bytes::Bytes;

use crate::config::{MediaLimits, ToolConfig};
use crate::error::MediaError;
use crate::media::audio::ffmpeg_args;
use crate::media::detection::{SourceFormat, detect_from_magic};
use crate::media::runner::{ToolRunner, first_success, read_output, scratch_dir};

/// Upper bound on inflated Lottie JSON, guarding against gzip bombs.
const MAX_LOTTIE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StickerStrategy {
    Lottie2Gif,
    FfmpegStill,
}

impl std::fmt::Display for StickerStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lottie2Gif => write!(f, "lottie2gif"),
            Self::FfmpegStill => write!(f, "ffmpeg-still"),
        }
    }
}

/// Sticker backend.
#[derive(Clone)]
pub struct StickerTranscoder {
    runner: ToolRunner,
    tools: ToolConfig,
    size: u32,
}

impl StickerTranscoder {
    pub fn new(runner: ToolRunner, tools: ToolConfig, limits: &MediaLimits) -> Self {
        Self {
            runner,
            tools,
            size: limits.sticker_size,
        }
    }

    /// Render an animated TGS sticker to GIF.
    pub async fn tgs_to_gif(&self, data: Bytes) -> Result<Bytes, MediaError> {
        let lottie = self.runner.run_blocking(move || inflate_tgs(&data)).await?;

        first_success("tgs", &[StickerStrategy::Lottie2Gif], |_| {
            let lottie = lottie.clone();
            async move { self.render_lottie(&lottie).await }
        })
        .await
    }

    /// Render a static sticker (or the first frame of an animated one) to PNG.
    pub async fn to_png(&self, data: Bytes) -> Result<Bytes, MediaError> {
        let format = detect_from_magic(&data).unwrap_or(SourceFormat::Unknown);
        match format {
            SourceFormat::Png => return Ok(data),
            SourceFormat::Tgs => {
                return Err(MediaError::UnsupportedType {
                    mime_type: format.mime_type().to_string(),
                });
            }
            _ => {}
        }

        first_success("png", &[StickerStrategy::FfmpegStill], |_| {
            let data = data.clone();
            async move { self.ffmpeg_still(&data, format).await }
        })
        .await
    }

    async fn render_lottie(&self, lottie: &[u8]) -> Result<Bytes, MediaError> {
        let scratch = scratch_dir()?;
        let json = scratch.path().join("sticker.json");
        tokio::fs::write(&json, lottie).await?;

        // lottie2gif writes `<input>.gif` next to its input
        let resolution = format!("{}x{}", self.size, self.size);
        self.runner
            .run(
                &self.tools.lottie2gif,
                [json.as_os_str(), OsStr::new(&resolution), OsStr::new("ffffff")],
            )
            .await?;

        read_output(&scratch.path().join("sticker.json.gif")).await
    }

    async fn ffmpeg_still(&self, data: &[u8], format: SourceFormat) -> Result<Bytes, MediaError> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join(format!("input.{}", format.extension()));
        let output = scratch.path().join("output.png");
        tokio::fs::write(&input, data).await?;

        self.runner
            .run(
                &self.tools.ffmpeg,
                ffmpeg_args(&["-i"], &input, &["-frames:v", "1"], &output),
            )
            .await?;

        read_output(&output).await
    }
}

/// Decompress a TGS sticker and check that it holds Lottie JSON.
pub fn inflate_tgs(data: &[u8]) -> Result<Bytes, MediaError> {
    if !data.starts_with(&[0x1F, 0x8B]) {
        return Err(MediaError::ProcessingFailed {
            reason: "TGS data does not start with gzip magic bytes".to_string(),
        });
    }

    let mut decompressed = Vec::new();
    flate2::read::GzDecoder::new(data)
        .take(MAX_LOTTIE_BYTES + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| MediaError::ProcessingFailed {
            reason: format!("Failed to decompress TGS data: {}", e),
        })?;

    if decompressed.len() as u64 > MAX_LOTTIE_BYTES {
        return Err(MediaError::TooLarge {
            size: decompressed.len(),
            max: MAX_LOTTIE_BYTES as usize,
        });
    }

    let lottie: serde_json::Value =
        serde_json::from_slice(&decompressed).map_err(|e| MediaError::ProcessingFailed {
            reason: format!("TGS decompressed data is not valid Lottie JSON: {}", e),
        })?;
    if lottie.get("layers").is_none() {
        return Err(MediaError::ProcessingFailed {
            reason: "TGS Lottie JSON has no layers".to_string(),
        });
    }

    Ok(Bytes::from(decompressed))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    fn gzip(payload: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    const LOTTIE: &[u8] = br#"{"v":"5.5.2","fr":60,"ip":0,"op":180,"w":512,"h":512,"layers":[]}"#;

    #[test]
    fn test_inflate_valid_tgs() {
        let lottie = inflate_tgs(&gzip(LOTTIE)).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&lottie).unwrap();
        assert_eq!(parsed["v"], "5.5.2");
    }

    #[test]
    fn test_inflate_rejects_non_gzip() {
        assert!(inflate_tgs(&[0x00, 0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn test_inflate_rejects_corrupt_gzip() {
        assert!(inflate_tgs(&[0x1F, 0x8B, 0x00, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_inflate_rejects_non_lottie_json() {
        assert!(inflate_tgs(&gzip(b"not json")).is_err());
        assert!(inflate_tgs(&gzip(br#"{"v":"5.5.2"}"#)).is_err());
    }

    #[tokio::test]
    async fn test_png_passthrough() {
        let transcoder = StickerTranscoder::new(
            ToolRunner::new(1, Duration::from_secs(1)),
            ToolConfig::default(),
            &MediaLimits::default(),
        );
        let png = Bytes::from_static(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
        assert_eq!(transcoder.to_png(png.clone()).await.unwrap(), png);
    }

    #[tokio::test]
    async fn test_tgs_cannot_become_png() {
        let transcoder = StickerTranscoder::new(
            ToolRunner::new(1, Duration::from_secs(1)),
            ToolConfig::default(),
            &MediaLimits::default(),
        );
        let err = transcoder.to_png(Bytes::from(gzip(LOTTIE))).await.unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedType { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tgs_rendered_with_lottie2gif() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let tool = dir.path().join("lottie2gif");
        std::fs::write(
            &tool,
            "#!/bin/sh\ngrep -q layers \"$1\" || exit 1\n[ \"$2\" = 128x128 ] || exit 2\nprintf 'GIF89a' > \"$1.gif\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tools = ToolConfig {
            lottie2gif: tool,
            ..ToolConfig::default()
        };
        let limits = MediaLimits {
            sticker_size: 128,
            ..MediaLimits::default()
        };
        let transcoder = StickerTranscoder::new(ToolRunner::new(1, Duration::from_secs(5)), tools, &limits);

        let gif = transcoder.tgs_to_gif(Bytes::from(gzip(LOTTIE))).await.unwrap();
        assert_eq!(gif, Bytes::from_static(b"GIF89a"));
    }
}
