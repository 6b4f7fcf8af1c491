//! Lookup collaborator used while converting messages.
//!
//! Display names and cross-platform message ids live outside the converter
//! (platform APIs, the bridge's message database). They are injected through
//! [`LookupService`] and every call is bounded by a timeout.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ConvertError;
use crate::message::{MessageRef, Platform, UserId};

#[async_trait]
pub trait LookupService: Send + Sync {
    /// Display name of a user, `None` when unknown.
    async fn resolve_display_name(&self, user: &UserId) -> Option<String>;

    /// The copy of `message` that was bridged to `target`, if any.
    async fn map_message_id(&self, _message: &MessageRef, _target: Platform) -> Option<MessageRef> {
        None
    }
}

/// Lookup that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

#[async_trait]
impl LookupService for NoLookup {
    async fn resolve_display_name(&self, _user: &UserId) -> Option<String> {
        None
    }
}

/// In-memory lookup tables, filled as messages are bridged.
#[derive(Debug, Default)]
pub struct MemoryLookup {
    names: RwLock<HashMap<UserId, String>>,
    messages: RwLock<HashMap<(MessageRef, Platform), MessageRef>>,
}

impl MemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_display_name(&self, user: UserId, name: impl Into<String>) {
        self.names.write().await.insert(user, name.into());
    }

    /// Record that `a` and `b` are the same message on two platforms.
    pub async fn link_messages(&self, a: MessageRef, b: MessageRef) {
        let mut messages = self.messages.write().await;
        messages.insert((a.clone(), b.platform), b.clone());
        messages.insert((b, a.platform), a);
    }
}

#[async_trait]
impl LookupService for MemoryLookup {
    async fn resolve_display_name(&self, user: &UserId) -> Option<String> {
        self.names.read().await.get(user).cloned()
    }

    async fn map_message_id(&self, message: &MessageRef, target: Platform) -> Option<MessageRef> {
        if message.platform == target {
            return Some(message.clone());
        }
        self.messages
            .read()
            .await
            .get(&(message.clone(), target))
            .cloned()
    }
}

/// Await a lookup, turning a timeout or a miss into [`ConvertError::LookupFailed`].
pub(crate) async fn bounded<T, F>(timeout: Duration, id: &str, lookup: F) -> Result<T, ConvertError>
where
    F: Future<Output = Option<T>>,
{
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(ConvertError::LookupFailed {
            id: id.to_string(),
            reason: "not found".to_string(),
        }),
        Err(_) => Err(ConvertError::LookupFailed {
            id: id.to_string(),
            reason: format!("timed out after {:?}", timeout),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowLookup;

    #[async_trait]
    impl LookupService for SlowLookup {
        async fn resolve_display_name(&self, _user: &UserId) -> Option<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Some("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_memory_lookup_names() {
        let lookup = MemoryLookup::new();
        let alice = UserId::new(Platform::Qq, "10001");
        lookup.set_display_name(alice.clone(), "Alice").await;

        assert_eq!(lookup.resolve_display_name(&alice).await.as_deref(), Some("Alice"));
        assert_eq!(
            lookup
                .resolve_display_name(&UserId::new(Platform::Qq, "10002"))
                .await,
            None
        );
    }

    #[tokio::test]
    async fn test_linked_messages_map_both_ways() {
        let lookup = MemoryLookup::new();
        let qq = MessageRef::new(Platform::Qq, "123");
        let tg = MessageRef::new(Platform::Telegram, "456");
        lookup.link_messages(qq.clone(), tg.clone()).await;

        assert_eq!(lookup.map_message_id(&qq, Platform::Telegram).await, Some(tg.clone()));
        assert_eq!(lookup.map_message_id(&tg, Platform::Qq).await, Some(qq.clone()));
        assert_eq!(lookup.map_message_id(&qq, Platform::Qq).await, Some(qq));
        assert_eq!(NoLookup.map_message_id(&tg, Platform::Qq).await, None);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let user = UserId::new(Platform::Qq, "1");
        let err = bounded(
            Duration::from_millis(100),
            "qq:1",
            SlowLookup.resolve_display_name(&user),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvertError::LookupFailed { reason, .. } if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn test_bounded_miss_is_failure() {
        let user = UserId::new(Platform::Qq, "1");
        let err = bounded(Duration::from_secs(1), "qq:1", NoLookup.resolve_display_name(&user))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::LookupFailed { .. }));
    }
}
