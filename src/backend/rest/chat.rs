//! Chat over PostgREST, with polling subscriptions

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Query, RestBackend, RestClient};
use crate::backend::{BackendResult, MessageChannel, MessageSubscription};
use crate::models::ChatMessage;

const MESSAGES: &str = "chat_messages";

/// Buffer between the polling task and the subscriber
const SUBSCRIPTION_BUFFER: usize = 64;

fn cursor_value(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Position of a subscription in the message stream.
///
/// Polls ask for rows at or after `at`, so rows sharing the newest timestamp
/// come back again; `seen` holds the ids already delivered at `at`.
#[derive(Debug, Default)]
struct ChatCursor {
    at: Option<DateTime<Utc>>,
    seen: HashSet<Uuid>,
}

impl ChatCursor {
    /// Start after the newest stored row, or from the beginning of an empty table
    fn after(latest: Option<&ChatMessage>) -> Self {
        let mut cursor = Self::default();
        if let Some(message) = latest {
            cursor.at = Some(message.created_at);
            cursor.seen.insert(message.id);
        }
        cursor
    }

    fn query(&self) -> Query {
        let query = Query::new().select("*");
        let query = match self.at {
            Some(at) => query.gte("created_at", cursor_value(at)),
            None => query,
        };
        query.order("created_at.asc")
    }

    /// Keep the rows not delivered yet and move past them.
    ///
    /// `rows` must be ordered by `created_at` ascending.
    fn advance(&mut self, rows: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let mut fresh = Vec::with_capacity(rows.len());
        for message in rows {
            match self.at {
                Some(at) if message.created_at < at => continue,
                Some(at) if message.created_at == at => {
                    if !self.seen.insert(message.id) {
                        continue;
                    }
                }
                _ => {
                    self.at = Some(message.created_at);
                    self.seen.clear();
                    self.seen.insert(message.id);
                }
            }
            fresh.push(message);
        }
        fresh
    }
}

/// Newest stored row, read once to position a new subscription
async fn seed_cursor(client: &RestClient) -> BackendResult<ChatCursor> {
    let latest: Option<ChatMessage> = client
        .select_one(
            MESSAGES,
            Query::new().select("*").order("created_at.desc"),
        )
        .await?;
    Ok(ChatCursor::after(latest.as_ref()))
}

/// Forward rows newer than the last seen one until the subscriber goes away
async fn poll_messages(client: RestClient, interval: Duration, tx: mpsc::Sender<ChatMessage>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut cursor: Option<ChatCursor> = None;

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }

        let position = match cursor.as_mut() {
            Some(position) => position,
            None => {
                match seed_cursor(&client).await {
                    Ok(seeded) => cursor = Some(seeded),
                    Err(e) => tracing::warn!("Failed to read chat cursor: {}", e),
                }
                continue;
            }
        };

        let rows: Vec<ChatMessage> = match client.select(MESSAGES, position.query()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Chat poll failed: {}", e);
                continue;
            }
        };

        for message in position.advance(rows) {
            if tx.send(message).await.is_err() {
                return;
            }
        }
    }

    tracing::debug!("Chat polling stopped");
}

#[async_trait]
impl MessageChannel for RestBackend {
    async fn send(&self, user_id: Uuid, content: &str) -> BackendResult<ChatMessage> {
        self.client
            .insert(MESSAGES, &[json!({ "user_id": user_id, "content": content })])
            .await
    }

    async fn list_recent(&self, limit: usize) -> BackendResult<Vec<ChatMessage>> {
        self.client
            .select(
                MESSAGES,
                Query::new()
                    .select("*")
                    .order("created_at.desc")
                    .limit(limit),
            )
            .await
    }

    fn subscribe(&self) -> MessageSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task = tokio::spawn(poll_messages(self.client.clone(), self.poll_interval, tx));
        MessageSubscription::from_polling(rx, task)
    }
}
