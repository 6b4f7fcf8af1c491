//! Whole-message conversion between QQ, Telegram and the unified model.
//!
//! Inbound, native segments are mapped one by one and mention display names
//! are resolved through the [`LookupService`]. Outbound, media that the
//! target cannot use as-is is planned as a [`PendingMedia`] and resolved
//! through the [`MediaPipeline`], and reply targets are mapped across
//! platforms. No failure aborts a message: the affected segment becomes a
//! text placeholder.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::config::LookupConfig;
use crate::media::{MediaPipeline, MediaRef, PendingMedia, TargetCodec};
use crate::message::lookup::{LookupService, bounded};
use crate::message::qq::{self, QqMessage, QqOutgoing, QqSegment, QqTarget};
use crate::message::segment::{REPLY_PLACEHOLDER, media_extension, placeholder_text};
use crate::message::telegram::{self, TgMessage, TgOutgoing, TgPart};
use crate::message::{
    ChannelId, MessageContent, MessageRef, Platform, Sender, UnifiedMessage, UserId,
};

/// Converts whole messages between the platforms and the unified model.
///
/// Cheap to share: lookups and the media pipeline sit behind handles, so
/// one converter serves every chat.
pub struct MessageConverter {
    lookup: Arc<dyn LookupService>,
    media: MediaPipeline,
    lookup_timeout: Duration,
}

impl MessageConverter {
    pub fn new(lookup: Arc<dyn LookupService>, media: MediaPipeline, config: &LookupConfig) -> Self {
        Self {
            lookup,
            media,
            lookup_timeout: config.timeout,
        }
    }

    pub fn media(&self) -> &MediaPipeline {
        &self.media
    }

    /// Normalize a OneBot message event.
    pub async fn from_qq(&self, message: &QqMessage) -> UnifiedMessage {
        let mut content: Vec<MessageContent> = message.message.iter().map(qq::to_unified).collect();
        self.resolve_mentions(&mut content).await;

        let mut sender = Sender::new(UserId::new(Platform::Qq, message.user_id.as_str()));
        sender.display_name = [&message.sender.card, &message.sender.nickname]
            .into_iter()
            .find(|name| !name.is_empty())
            .cloned();

        let channel = match (&message.group_id, message.is_group()) {
            (Some(group_id), true) => ChannelId::group(Platform::Qq, group_id.as_str()),
            _ => ChannelId::private(Platform::Qq, message.user_id.as_str()),
        };

        let reply_to = content.iter().find_map(|c| match c {
            MessageContent::Reply { target } => Some(target.clone()),
            _ => None,
        });

        let mut unified = UnifiedMessage::new(
            MessageRef::new(Platform::Qq, message.message_id.as_str()),
            sender,
            channel,
            content,
        )
        .with_timestamp(timestamp(message.time));
        unified.reply_to = reply_to;

        tracing::debug!(
            message = %unified.id,
            segments = unified.content().len(),
            "Normalized QQ message"
        );
        unified
    }

    /// Normalize a Telegram message.
    pub async fn from_telegram(&self, message: &TgMessage) -> UnifiedMessage {
        let mut content: Vec<MessageContent> = telegram::decompose(message)
            .into_iter()
            .map(telegram::to_unified)
            .collect();
        self.resolve_mentions(&mut content).await;

        let sender = match &message.from {
            Some(user) => Sender::new(UserId::new(Platform::Telegram, user.id.to_string()))
                .with_display_name(user.display_name()),
            // channel posts have no author
            None => {
                let sender = Sender::new(UserId::new(Platform::Telegram, message.chat.id.to_string()));
                match &message.chat.title {
                    Some(title) => sender.with_display_name(title.as_str()),
                    None => sender,
                }
            }
        };

        let channel = if message.chat.kind == "private" {
            ChannelId::private(Platform::Telegram, message.chat.id.to_string())
        } else {
            ChannelId::group(Platform::Telegram, message.chat.id.to_string())
        };

        let mut unified = UnifiedMessage::new(
            MessageRef::new(Platform::Telegram, message.message_id.to_string()),
            sender,
            channel,
            content,
        )
        .with_timestamp(timestamp(message.date));
        if let Some(reply) = &message.reply_to_message {
            unified = unified.with_reply_to(MessageRef::new(Platform::Telegram, reply.message_id.to_string()));
        }

        tracing::debug!(
            message = %unified.id,
            segments = unified.content().len(),
            "Normalized Telegram message"
        );
        unified
    }

    /// Render a message as a OneBot `send_msg` call.
    pub async fn to_qq(&self, message: &UnifiedMessage, target: QqTarget) -> QqOutgoing {
        let mut content = self.prepare_media(message, Platform::Qq).await;

        for segment in content.iter_mut() {
            let MessageContent::Reply { target } = &*segment else {
                continue;
            };
            let mapped = self.reply_segment(target, Platform::Qq).await;
            *segment = mapped;
        }
        let has_reply = message.content().iter().any(|c| matches!(c, MessageContent::Reply { .. }));
        if let (Some(reply_to), false) = (&message.reply_to, has_reply) {
            content.insert(0, self.reply_segment(reply_to, Platform::Qq).await);
        }

        let mut segments: Vec<QqSegment> = Vec::with_capacity(content.len());
        for item in &content {
            match qq::from_unified(item) {
                Ok(converted) => segments.extend(converted),
                Err(e) => {
                    tracing::warn!(message = %message.id, kind = item.kind(), error = %e, "Segment replaced by placeholder");
                    segments.push(QqSegment::text(placeholder_text(item.kind())));
                }
            }
        }

        QqOutgoing {
            target,
            message: segments,
        }
    }

    /// Render a message as a sequence of Telegram send calls.
    pub async fn to_telegram(&self, message: &UnifiedMessage, chat_id: &str) -> TgOutgoing {
        let content = self.prepare_media(message, Platform::Telegram).await;

        let reply_target = message.reply_to.clone().or_else(|| {
            content.iter().find_map(|c| match c {
                MessageContent::Reply { target } => Some(target.clone()),
                _ => None,
            })
        });

        let mut parts = Vec::new();
        let mut reply_to_message_id = None;
        if let Some(target) = &reply_target {
            match self.map_reply(target, Platform::Telegram).await {
                Some(mapped) => reply_to_message_id = Some(mapped.id),
                None => parts.push(TgPart::Text(format!("{} ", REPLY_PLACEHOLDER))),
            }
        }

        for item in &content {
            match telegram::from_unified(item) {
                Ok(converted) => parts.extend(converted),
                Err(e) => {
                    tracing::warn!(message = %message.id, kind = item.kind(), error = %e, "Segment replaced by placeholder");
                    parts.push(TgPart::Text(placeholder_text(item.kind())));
                }
            }
        }

        TgOutgoing {
            chat_id: chat_id.to_string(),
            reply_to_message_id,
            sends: telegram::assemble(parts),
        }
    }

    /// Fill in missing mention display names, concurrently and in order.
    async fn resolve_mentions(&self, content: &mut [MessageContent]) {
        let pending: Vec<(usize, UserId)> = content
            .iter()
            .enumerate()
            .filter_map(|(index, c)| match c {
                MessageContent::At {
                    target,
                    display_name: None,
                } if !target.is_everyone() => Some((index, target.clone())),
                _ => None,
            })
            .collect();
        if pending.is_empty() {
            return;
        }

        let lookups = pending.iter().map(|(_, user)| {
            let id = user.to_string();
            async move {
                bounded(
                    self.lookup_timeout,
                    &id,
                    self.lookup.resolve_display_name(user),
                )
                .await
            }
        });
        let results = join_all(lookups).await;

        for ((index, user), result) in pending.iter().zip(results) {
            match result {
                Ok(name) => {
                    if let MessageContent::At { display_name, .. } = &mut content[*index] {
                        *display_name = Some(name);
                    }
                }
                Err(e) => tracing::debug!(user = %user, error = %e, "Mention lookup failed, keeping raw id"),
            }
        }
    }

    /// Resolve media the target platform cannot use directly.
    async fn prepare_media(&self, message: &UnifiedMessage, platform: Platform) -> Vec<MessageContent> {
        let jobs = message.content().iter().map(|item| async move {
            let Some(pending) = plan_media(item, platform) else {
                return item.clone();
            };
            match self.media.resolve(&pending).await {
                Ok(path) => {
                    let mut item = item.clone();
                    if let Some(media) = item.media_mut() {
                        *media = MediaRef::Path(path);
                    }
                    item
                }
                Err(e) => {
                    tracing::warn!(
                        message = %message.id,
                        kind = item.kind(),
                        target = %pending.target,
                        error = %e,
                        "Media conversion failed, using placeholder"
                    );
                    MessageContent::unsupported(item.kind())
                }
            }
        });
        join_all(jobs).await
    }

    async fn map_reply(&self, target: &MessageRef, platform: Platform) -> Option<MessageRef> {
        if target.platform == platform {
            return Some(target.clone());
        }
        match bounded(
            self.lookup_timeout,
            &target.to_string(),
            self.lookup.map_message_id(target, platform),
        )
        .await
        {
            Ok(mapped) => Some(mapped),
            Err(e) => {
                tracing::debug!(reply = %target, error = %e, "Reply target not mapped");
                None
            }
        }
    }

    async fn reply_segment(&self, target: &MessageRef, platform: Platform) -> MessageContent {
        match self.map_reply(target, platform).await {
            Some(mapped) => MessageContent::Reply { target: mapped },
            None => MessageContent::text(REPLY_PLACEHOLDER),
        }
    }
}

/// Conversion needed before `item` can be sent to `platform`, if any.
///
/// Media already stored on the target platform is re-sent by id. Voice and
/// stickers are transcoded into the target's codec; everything else is
/// downloaded and passed through unchanged when it lives on the other
/// platform.
fn plan_media(item: &MessageContent, platform: Platform) -> Option<PendingMedia> {
    let media = item.media()?;
    if let MediaRef::Pending(pending) = media {
        return Some(pending.as_ref().clone());
    }
    if media.is_native_to(platform) {
        return None;
    }

    let target = match (item, platform) {
        (MessageContent::Audio { .. }, Platform::Qq) => TargetCodec::Silk,
        (MessageContent::Audio { .. }, Platform::Telegram) => TargetCodec::Ogg,
        (MessageContent::Sticker { animated: true, .. }, Platform::Qq) => TargetCodec::Gif,
        (MessageContent::Sticker { animated: false, .. }, Platform::Qq) => TargetCodec::Png,
        (MessageContent::Image { mime: Some(mime), .. }, Platform::Qq) if mime == "image/gif" => TargetCodec::Gif,
        _ if matches!(media, MediaRef::Remote(_)) => TargetCodec::raw(&media_extension(item)),
        _ => return None,
    };
    Some(PendingMedia::new(media.clone(), target))
}

fn timestamp(unix_seconds: i64) -> DateTime<Utc> {
    if unix_seconds <= 0 {
        return Utc::now();
    }
    DateTime::from_timestamp(unix_seconds, 0).unwrap_or_else(Utc::now)
}
