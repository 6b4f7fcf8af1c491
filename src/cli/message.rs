//! Message conversion CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::cli::media::open_pipeline;
use crate::config::BridgeConfig;
use crate::message::qq::{QqMessage, QqTarget};
use crate::message::telegram::TgMessage;
use crate::message::{MessageConverter, NoLookup, Platform, UnifiedMessage};

/// Print the unified form of a native message.
pub async fn run_normalize_command(config: &BridgeConfig, from: Platform, file: &Path) -> anyhow::Result<()> {
    let converter = converter(config).await?;
    let unified = normalize(&converter, from, file).await?;
    println!("{}", serde_json::to_string_pretty(&unified)?);
    Ok(())
}

/// Print the send calls that deliver a native message to the other platform.
pub async fn run_render_command(
    config: &BridgeConfig,
    from: Platform,
    chat: &str,
    private: bool,
    file: &Path,
) -> anyhow::Result<()> {
    let converter = converter(config).await?;
    let unified = normalize(&converter, from, file).await?;

    let rendered = match from {
        Platform::Qq => serde_json::to_value(converter.to_telegram(&unified, chat).await)?,
        Platform::Telegram => {
            let target = if private {
                QqTarget::Private {
                    user_id: chat.to_string(),
                }
            } else {
                QqTarget::Group {
                    group_id: chat.to_string(),
                }
            };
            serde_json::to_value(converter.to_qq(&unified, target).await)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

async fn converter(config: &BridgeConfig) -> anyhow::Result<MessageConverter> {
    let pipeline = open_pipeline(config).await?;
    Ok(MessageConverter::new(Arc::new(NoLookup), pipeline, &config.lookup))
}

async fn normalize(converter: &MessageConverter, from: Platform, file: &Path) -> anyhow::Result<UnifiedMessage> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let unified = match from {
        Platform::Qq => {
            let message: QqMessage =
                serde_json::from_str(&raw).with_context(|| format!("{} is not a OneBot message event", file.display()))?;
            converter.from_qq(&message).await
        }
        Platform::Telegram => {
            let message: TgMessage =
                serde_json::from_str(&raw).with_context(|| format!("{} is not a Telegram message", file.display()))?;
            converter.from_telegram(&message).await
        }
    };
    Ok(unified)
}
