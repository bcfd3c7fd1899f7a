//! Transient notices
//!
//! Success and error messages shown to the player for a limited time. Expired
//! notices are dropped whenever the list is read.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default time a notice stays visible
pub const DEFAULT_NOTICE_TTL_MS: u64 = 4000;

/// Notice kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// A message waiting to be shown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub id: u64,
    pub kind: NoticeKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Notice queue with a time-to-live
pub struct NoticeService {
    notices: Arc<RwLock<Vec<Notice>>>,
    next_id: AtomicU64,
    ttl: Duration,
}

impl NoticeService {
    /// Create a queue whose notices live for `ttl_ms` milliseconds
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            notices: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
            ttl: Duration::milliseconds(i64::try_from(ttl_ms).unwrap_or(i64::MAX / 2)),
        }
    }

    async fn push(&self, kind: NoticeKind, message: String) -> Notice {
        let notice = Notice {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            message,
            created_at: Utc::now(),
        };
        self.notices.write().await.push(notice.clone());
        notice
    }

    /// Queue a success message
    pub async fn success(&self, message: impl Into<String>) -> Notice {
        self.push(NoticeKind::Success, message.into()).await
    }

    /// Queue an error message
    pub async fn error(&self, message: impl Into<String>) -> Notice {
        self.push(NoticeKind::Error, message.into()).await
    }

    /// Queue an error message from a failed operation
    pub async fn from_error(&self, error: &impl Display) -> Notice {
        tracing::debug!("Notice for error: {}", error);
        self.push(NoticeKind::Error, error.to_string()).await
    }

    /// Remove a notice before it expires
    pub async fn dismiss(&self, id: u64) {
        self.notices.write().await.retain(|n| n.id != id);
    }

    /// Notices still within their time-to-live, oldest first
    pub async fn active(&self) -> Vec<Notice> {
        let mut notices = self.notices.write().await;

        // Remove expired notices
        if let Some(cutoff) = Utc::now().checked_sub_signed(self.ttl) {
            notices.retain(|n| n.created_at > cutoff);
        }

        notices.clone()
    }
}

impl Default for NoticeService {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_TTL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ChatServiceError;

    #[tokio::test]
    async fn test_notices_in_order() {
        let service = NoticeService::default();

        service.success("Profile saved").await;
        service.error("Could not save").await;

        let active = service.active().await;
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].kind, NoticeKind::Success);
        assert_eq!(active[1].kind, NoticeKind::Error);
        assert!(active[0].id < active[1].id);
    }

    #[tokio::test]
    async fn test_notices_expire() {
        let service = NoticeService::new(30);
        service.success("Saved").await;
        assert_eq!(service.active().await.len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        assert!(service.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_dismiss() {
        let service = NoticeService::default();
        let first = service.success("one").await;
        service.success("two").await;

        service.dismiss(first.id).await;

        let active = service.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "two");
    }

    #[tokio::test]
    async fn test_from_error_uses_display() {
        let service = NoticeService::default();
        let notice = service
            .from_error(&ChatServiceError::ValidationError("Message cannot be empty".to_string()))
            .await;

        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(notice.message, "Validation error: Message cannot be empty");
    }
}
