//! Media CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::config::BridgeConfig;
use crate::media::{
    ConversionCache, HttpFetcher, MediaPipeline, MediaRef, PendingMedia, SourceFormat, TargetCodec,
    detect_format, hash_bytes, inflate_tgs,
};

/// Open the configured cache and wire a pipeline with the HTTP fetcher.
pub(crate) async fn open_pipeline(config: &BridgeConfig) -> anyhow::Result<MediaPipeline> {
    let cache = ConversionCache::open(&config.cache.dir)
        .await
        .with_context(|| format!("Failed to open cache at {}", config.cache.dir.display()))?;
    let fetcher = HttpFetcher::new(config.limits.max_bytes)?;
    Ok(MediaPipeline::new(cache, Arc::new(fetcher), config))
}

/// Convert `input` to `target` through the cache and print the artifact path.
pub async fn run_convert_command(
    config: &BridgeConfig,
    input: &Path,
    target: TargetCodec,
    variant: Option<String>,
) -> anyhow::Result<()> {
    if !input.is_file() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let pipeline = open_pipeline(config).await?;

    let mut pending = PendingMedia::new(MediaRef::Path(input.to_path_buf()), target);
    if let Some(variant) = variant {
        pending = pending.with_variant(variant);
    }
    let key = pipeline.key_for(&pending).await?;
    let path = pipeline.resolve(&pending).await?;

    tracing::info!(key = %key, path = %path.display(), "Conversion ready");
    println!("{}", path.display());
    Ok(())
}

/// Print what the bridge would detect for a media file.
pub async fn run_inspect_command(file: &Path) -> anyhow::Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = file.file_name().map(|n| n.to_string_lossy().to_string());
    let format = detect_format(&data, name.as_deref());

    println!("File:     {}", file.display());
    println!("Size:     {} bytes", data.len());
    println!("Format:   {}", format);
    println!("MIME:     {}", format.mime_type());
    println!("Kind:     {:?}", format.kind());
    println!("Animated: {}", format.is_animated());
    println!("Hash:     {}", hash_bytes(&data));

    if format == SourceFormat::Tgs {
        match inflate_tgs(&data) {
            Ok(json) => println!("Lottie:   {} bytes of JSON", json.len()),
            Err(e) => println!("Lottie:   invalid ({})", e),
        }
    }
    Ok(())
}
