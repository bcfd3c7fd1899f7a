//! Chat service
//!
//! Global chat room: recent history, sending, and a live feed. Every message
//! handed out carries its author's summary when the profile lookup succeeds;
//! a failed lookup leaves `author` empty rather than failing the read.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::{require_user, Denied};
use crate::backend::{BackendError, MessageChannel, MessageSubscription, ProfileStore};
use crate::models::{ChatMessage, ProfileSummary};
use crate::session::AuthSnapshot;

/// Default number of messages loaded when the chat opens
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default maximum message length in characters
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 500;

/// Error types for chat operations
#[derive(Debug, thiserror::Error)]
pub enum ChatServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// No signed-in player
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Backend failure
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<Denied> for ChatServiceError {
    fn from(_: Denied) -> Self {
        Self::NotAuthenticated
    }
}

/// Attach author summaries to messages, by user id
async fn enrich(profiles: &dyn ProfileStore, messages: &mut [ChatMessage]) {
    let mut ids: Vec<Uuid> = messages.iter().map(|m| m.user_id).collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return;
    }

    let summaries: HashMap<Uuid, ProfileSummary> = match profiles.profile_summaries(&ids).await {
        Ok(list) => list.into_iter().map(|s| (s.id, s)).collect(),
        Err(e) => {
            tracing::warn!("Failed to load chat authors: {}", e);
            return;
        }
    };

    for message in messages.iter_mut() {
        message.author = summaries.get(&message.user_id).cloned();
    }
}

/// Chat service
pub struct ChatService {
    messages: Arc<dyn MessageChannel>,
    profiles: Arc<dyn ProfileStore>,
    history_limit: usize,
    max_message_length: usize,
}

impl ChatService {
    pub fn new(
        messages: Arc<dyn MessageChannel>,
        profiles: Arc<dyn ProfileStore>,
        history_limit: usize,
        max_message_length: usize,
    ) -> Self {
        Self {
            messages,
            profiles,
            history_limit,
            max_message_length,
        }
    }

    /// Most recent messages, oldest first
    pub async fn history(&self) -> Result<Vec<ChatMessage>, ChatServiceError> {
        let mut messages = self.messages.list_recent(self.history_limit).await?;
        messages.reverse();
        enrich(self.profiles.as_ref(), &mut messages).await;
        Ok(messages)
    }

    /// Post a message as the signed-in player
    pub async fn send(
        &self,
        snapshot: &AuthSnapshot,
        content: &str,
    ) -> Result<ChatMessage, ChatServiceError> {
        let user_id = require_user(snapshot)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ChatServiceError::ValidationError(
                "Message cannot be empty".to_string(),
            ));
        }
        if content.chars().count() > self.max_message_length {
            return Err(ChatServiceError::ValidationError(format!(
                "Message must be at most {} characters",
                self.max_message_length
            )));
        }

        let mut message = self.messages.send(user_id, content).await?;
        match &snapshot.profile {
            Some(profile) if profile.id == user_id => message.author = Some(profile.summary()),
            _ => enrich(self.profiles.as_ref(), std::slice::from_mut(&mut message)).await,
        }
        Ok(message)
    }

    /// Live feed of newly posted messages
    pub fn feed(&self) -> ChatFeed {
        ChatFeed {
            subscription: self.messages.subscribe(),
            profiles: self.profiles.clone(),
            authors: HashMap::new(),
        }
    }
}

/// Stream of new chat messages with author summaries attached.
///
/// Author lookups are cached for the lifetime of the feed. Dropping the feed
/// unsubscribes.
pub struct ChatFeed {
    subscription: MessageSubscription,
    profiles: Arc<dyn ProfileStore>,
    authors: HashMap<Uuid, ProfileSummary>,
}

impl ChatFeed {
    /// Next message, or `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        let mut message = self.subscription.recv().await?;

        if message.author.is_none() {
            if let Some(summary) = self.authors.get(&message.user_id) {
                message.author = Some(summary.clone());
            } else {
                enrich(self.profiles.as_ref(), std::slice::from_mut(&mut message)).await;
                if let Some(ref summary) = message.author {
                    self.authors.insert(summary.id, summary.clone());
                }
            }
        }

        Some(message)
    }

    /// Stop receiving
    pub fn unsubscribe(self) {}
}
