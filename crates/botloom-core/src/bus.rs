//! Broadcast bus - the append-only message log of one workforce session.
//!
//! Every role can post and read; the orchestrator uses it to hand out
//! tasks and to pick up role requests.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Sender id used by the workforce orchestrator itself.
pub const ORCHESTRATOR: &str = "orchestrator";

/// Message body, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum BusPayload {
    TaskAssignment {
        role: String,
        task: String,
    },
    Message {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RoleRequest {
        role_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Result {
        success: bool,
        output: String,
    },
}

impl BusPayload {
    pub fn type_str(&self) -> &'static str {
        match self {
            Self::TaskAssignment { .. } => "task_assignment",
            Self::Message { .. } => "message",
            Self::RoleRequest { .. } => "role_request",
            Self::Result { .. } => "result",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    pub id: String,
    pub sender_role_id: String,
    #[serde(flatten)]
    pub payload: BusPayload,
    pub timestamp: DateTime<Utc>,
}

/// A role request picked up from the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleRequest {
    pub requested_by: String,
    pub role_name: String,
    pub reason: Option<String>,
}

/// Append-only, totally ordered message log. Cloning shares the log.
///
/// Timestamps are strictly increasing so `since` never drops a message
/// posted in the same clock tick as the cursor.
#[derive(Clone, Default)]
pub struct BroadcastBus {
    inner: Arc<RwLock<Vec<BroadcastMessage>>>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn post(&self, sender_role_id: &str, payload: BusPayload) -> BroadcastMessage {
        let mut log = self.inner.write().await;
        let mut timestamp = Utc::now();
        if let Some(last) = log.last() {
            if timestamp <= last.timestamp {
                timestamp = last.timestamp + Duration::microseconds(1);
            }
        }
        let message = BroadcastMessage {
            id: uuid::Uuid::new_v4().to_string(),
            sender_role_id: sender_role_id.to_string(),
            payload,
            timestamp,
        };
        tracing::debug!(
            "[Bus] {} posted {}",
            message.sender_role_id,
            message.payload.type_str()
        );
        log.push(message.clone());
        message
    }

    /// Messages strictly newer than `timestamp`, in posting order.
    pub async fn since(&self, timestamp: DateTime<Utc>) -> Vec<BroadcastMessage> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|m| m.timestamp > timestamp)
            .cloned()
            .collect()
    }

    /// Messages from log position `index` onwards.
    pub async fn from_index(&self, index: usize) -> Vec<BroadcastMessage> {
        let log = self.inner.read().await;
        log.get(index..).map(|s| s.to_vec()).unwrap_or_default()
    }

    pub async fn all(&self) -> Vec<BroadcastMessage> {
        self.inner.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Role requests posted at or after log position `index`.
    pub async fn role_requests_since(&self, index: usize) -> Vec<RoleRequest> {
        self.from_index(index)
            .await
            .into_iter()
            .filter_map(|m| match m.payload {
                BusPayload::RoleRequest { role_name, reason } => Some(RoleRequest {
                    requested_by: m.sender_role_id,
                    role_name,
                    reason,
                }),
                _ => None,
            })
            .collect()
    }
}
