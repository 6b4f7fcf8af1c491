//! Voice message transcoding between SILK v3 and Ogg/Opus.
//!
//! QQ voice messages are SILK v3 (sometimes AMR on older clients); Telegram
//! voice notes must be Opus in an Ogg container. SILK is handled by the
//! dedicated codec tools first because most ffmpeg builds cannot read it;
//! ffmpeg is the fallback for anything else.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use bytes::Bytes;

use crate::config::ToolConfig;
use crate::error::MediaError;
use crate::media::detection::{SourceFormat, detect_from_magic};
use crate::media::runner::{ToolRunner, first_success, read_output, scratch_dir};

/// Sample rate used for the intermediate PCM between SILK and ffmpeg.
const PCM_RATE: &str = "24000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioStrategy {
    /// SILK codec tool plus ffmpeg for the PCM leg.
    SilkCodec,
    /// ffmpeg alone.
    Ffmpeg,
}

impl std::fmt::Display for AudioStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SilkCodec => write!(f, "silk-codec"),
            Self::Ffmpeg => write!(f, "ffmpeg"),
        }
    }
}

/// Audio backend.
#[derive(Clone)]
pub struct AudioTranscoder {
    runner: ToolRunner,
    tools: ToolConfig,
}

impl AudioTranscoder {
    pub fn new(runner: ToolRunner, tools: ToolConfig) -> Self {
        Self { runner, tools }
    }

    /// Transcode a voice clip to Ogg/Opus.
    pub async fn to_ogg(&self, data: Bytes) -> Result<Bytes, MediaError> {
        let format = detect_from_magic(&data).unwrap_or(SourceFormat::Unknown);
        if format == SourceFormat::Ogg {
            return Ok(data);
        }

        let strategies: &[AudioStrategy] = if format == SourceFormat::Silk {
            &[AudioStrategy::SilkCodec, AudioStrategy::Ffmpeg]
        } else {
            &[AudioStrategy::Ffmpeg]
        };

        first_success("ogg", strategies, |strategy| {
            let data = data.clone();
            async move {
                match strategy {
                    AudioStrategy::SilkCodec => self.silk_to_ogg(&data).await,
                    AudioStrategy::Ffmpeg => self.ffmpeg_to_ogg(&data, format).await,
                }
            }
        })
        .await
    }

    /// Transcode a voice clip to SILK v3.
    pub async fn to_silk(&self, data: Bytes) -> Result<Bytes, MediaError> {
        let format = detect_from_magic(&data).unwrap_or(SourceFormat::Unknown);
        if format == SourceFormat::Silk {
            return Ok(data);
        }

        first_success("silk", &[AudioStrategy::SilkCodec], |_| {
            let data = data.clone();
            async move { self.encode_silk(&data, format).await }
        })
        .await
    }

    async fn silk_to_ogg(&self, data: &[u8]) -> Result<Bytes, MediaError> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join("input.silk");
        let pcm = scratch.path().join("decoded.pcm");
        let output = scratch.path().join("output.ogg");
        tokio::fs::write(&input, data).await?;

        self.runner
            .run(
                &self.tools.silk_decoder,
                [
                    input.as_os_str(),
                    pcm.as_os_str(),
                    OsStr::new("-Fs_API"),
                    OsStr::new(PCM_RATE),
                    OsStr::new("-quiet"),
                ],
            )
            .await?;

        self.runner
            .run(
                &self.tools.ffmpeg,
                ffmpeg_args(
                    &["-f", "s16le", "-ar", PCM_RATE, "-ac", "1", "-i"],
                    &pcm,
                    &["-c:a", "libopus", "-b:a", "32k"],
                    &output,
                ),
            )
            .await?;

        read_output(&output).await
    }

    async fn ffmpeg_to_ogg(&self, data: &[u8], format: SourceFormat) -> Result<Bytes, MediaError> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join(format!("input.{}", format.extension()));
        let output = scratch.path().join("output.ogg");
        tokio::fs::write(&input, data).await?;

        self.runner
            .run(
                &self.tools.ffmpeg,
                ffmpeg_args(
                    &["-i"],
                    &input,
                    &["-vn", "-ac", "1", "-c:a", "libopus", "-b:a", "32k"],
                    &output,
                ),
            )
            .await?;

        read_output(&output).await
    }

    async fn encode_silk(&self, data: &[u8], format: SourceFormat) -> Result<Bytes, MediaError> {
        let scratch = scratch_dir()?;
        let input = scratch.path().join(format!("input.{}", format.extension()));
        let pcm = scratch.path().join("decoded.pcm");
        let output = scratch.path().join("output.silk");
        tokio::fs::write(&input, data).await?;

        self.runner
            .run(
                &self.tools.ffmpeg,
                ffmpeg_args(
                    &["-i"],
                    &input,
                    &["-vn", "-f", "s16le", "-ar", PCM_RATE, "-ac", "1"],
                    &pcm,
                ),
            )
            .await?;

        self.runner
            .run(
                &self.tools.silk_encoder,
                [
                    pcm.as_os_str(),
                    output.as_os_str(),
                    OsStr::new("-Fs_API"),
                    OsStr::new(PCM_RATE),
                    OsStr::new("-tencent"),
                    OsStr::new("-quiet"),
                ],
            )
            .await?;

        read_output(&output).await
    }
}

/// `ffmpeg -hide_banner -loglevel error -y <pre> <input> <post> <output>`.
pub(crate) fn ffmpeg_args(
    pre: &[&str],
    input: &Path,
    post: &[&str],
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y"]
        .iter()
        .map(Into::into)
        .collect();
    args.extend(pre.iter().map(Into::into));
    args.push(input.as_os_str().to_owned());
    args.extend(post.iter().map(Into::into));
    args.push(output.as_os_str().to_owned());
    args
}
