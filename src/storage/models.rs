use serde::{Deserialize, Serialize};

use crate::common::types::display_server_time;
use crate::common::{BROADCAST, ChatMessage};

/// Message as the history API stores it. The API uses PascalCase field names;
/// camelCase is accepted on the way in as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryRecord {
    #[serde(alias = "user")]
    pub user: String,
    /// Broadcast records may come back without one.
    #[serde(default, alias = "recipient", skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(alias = "message")]
    pub message: String,
    #[serde(default, alias = "timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl HistoryRecord {
    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            user: self.user,
            recipient: self.recipient.unwrap_or_else(|| BROADCAST.to_string()),
            message: self.message,
            timestamp: self
                .timestamp
                .as_deref()
                .map(display_server_time)
                .unwrap_or_default(),
        }
    }
}

impl From<&ChatMessage> for HistoryRecord {
    fn from(message: &ChatMessage) -> Self {
        Self {
            user: message.user.clone(),
            recipient: Some(message.recipient.clone()),
            message: message.message.clone(),
            timestamp: Some(message.timestamp.clone()),
        }
    }
}

/// Body of `POST /Chat/broadcast`; the server fills in recipient and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BroadcastPost {
    pub user: String,
    pub message: String,
}

impl From<&ChatMessage> for BroadcastPost {
    fn from(message: &ChatMessage) -> Self {
        Self {
            user: message.user.clone(),
            message: message.message.clone(),
        }
    }
}
