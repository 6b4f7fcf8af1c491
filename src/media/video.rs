//! Short video to GIF rendering.
//!
//! Telegram video stickers (WebM), animations (silent MP4) and animated WebP
//! have no QQ equivalent that autoplays, so they are rendered to GIF.

use bytes::Bytes;

use crate::config::{MediaLimits, ToolConfig};
use crate::error::MediaError;
use crate::media::audio::ffmpeg_args;
use crate::media::detection::{MediaKind, SourceFormat, detect_from_magic};
use crate::media::runner::{ToolRunner, first_success, read_output, scratch_dir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GifStrategy {
    /// Two-pass palette generation. Better colors, slower, and fails on
    /// some odd pixel formats.
    FfmpegPalette,
    FfmpegSimple,
}

impl std::fmt::Display for GifStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FfmpegPalette => write!(f, "ffmpeg-palette"),
            Self::FfmpegSimple => write!(f, "ffmpeg-simple"),
        }
    }
}

/// Video backend.
#[derive(Clone)]
pub struct VideoTranscoder {
    runner: ToolRunner,
    tools: ToolConfig,
    fps: u32,
    max_width: u32,
}

impl VideoTranscoder {
    pub fn new(runner: ToolRunner, tools: ToolConfig, limits: &MediaLimits) -> Self {
        Self {
            runner,
            tools,
            fps: limits.gif_fps,
            max_width: limits.gif_max_width,
        }
    }

    /// Render a clip to a looping GIF. GIF input is returned unchanged.
    pub async fn to_gif(&self, data: Bytes) -> Result<Bytes, MediaError> {
        let format = detect_from_magic(&data).unwrap_or(SourceFormat::Unknown);
        if format == SourceFormat::Gif {
            return Ok(data);
        }
        // Lottie needs the sticker backend
        if format == SourceFormat::Tgs || (!format.is_animated() && format.kind() != MediaKind::Video) {
            return Err(MediaError::UnsupportedType {
                mime_type: format.mime_type().to_string(),
            });
        }

        first_success(
            "gif",
            &[GifStrategy::FfmpegPalette, GifStrategy::FfmpegSimple],
            |strategy| {
                let data = data.clone();
                async move { self.ffmpeg_gif(&data, format, strategy).await }
            },
        )
        .await
    }

    async fn ffmpeg_gif(
        &self,
        data: &[u8],
        format: SourceFormat,
        strategy: GifStrategy,
    ) -> Result<Bytes, MediaError> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join(format!("input.{}", format.extension()));
        let output = scratch.path().join("output.gif");
        tokio::fs::write(&input, data).await?;

        let filter = self.filter(strategy);
        self.runner
            .run(
                &self.tools.ffmpeg,
                ffmpeg_args(&["-i"], &input, &["-an", "-vf", filter.as_str(), "-loop", "0"], &output),
            )
            .await?;

        read_output(&output).await
    }

    fn filter(&self, strategy: GifStrategy) -> String {
        let base = format!(
            "fps={},scale='min({},iw)':-2:flags=lanczos",
            self.fps, self.max_width
        );
        match strategy {
            GifStrategy::FfmpegPalette => {
                format!("{base},split[a][b];[a]palettegen[p];[b][p]paletteuse")
            }
            GifStrategy::FfmpegSimple => base,
        }
    }
}
