use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};

use crate::common::{ChatMessage, Conversation, Recipient};
use crate::config::AppConfig;
use crate::error::HistoryError;

use super::models::{BroadcastPost, HistoryRecord};

/// Backlog and durability store for chat messages.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Messages of `conversation`, oldest first as the store returns them.
    async fn fetch_history(
        &self,
        conversation: &Conversation,
    ) -> Result<Vec<ChatMessage>, HistoryError>;

    async fn persist(&self, message: &ChatMessage) -> Result<(), HistoryError>;
}

/// Fetches the backlog, degrading any failure to an empty one.
pub async fn load_backlog(store: &dyn HistoryStore, conversation: &Conversation) -> Vec<ChatMessage> {
    match store.fetch_history(conversation).await {
        Ok(messages) => messages,
        Err(err) => {
            log::error!("Failed to load history for {conversation}: {err}");
            Vec::new()
        }
    }
}

/// Client for the `/Chat` REST API. Requests time out and are never retried.
#[derive(Debug, Clone)]
pub struct HistoryService {
    http: reqwest::Client,
    base_url: Url,
    broadcast_limit: u32,
}

impl HistoryService {
    pub fn new(base_url: &str, timeout: Duration, broadcast_limit: u32) -> Result<Self, HistoryError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| HistoryError::InvalidUrl(format!("{base_url}: {err}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(HistoryError::InvalidUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            broadcast_limit,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, HistoryError> {
        Self::new(
            &config.base_url,
            config.http_timeout(),
            config.broadcast_history_limit,
        )
    }

    /// Base url plus percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn execute(request: RequestBuilder) -> Result<reqwest::Response, HistoryError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status(status));
        }
        Ok(response)
    }
}

#[async_trait]
impl HistoryStore for HistoryService {
    async fn fetch_history(
        &self,
        conversation: &Conversation,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let request = match conversation.recipient() {
            Recipient::Broadcast => self
                .http
                .get(self.endpoint(&["Chat", "broadcast"]))
                .query(&[("limit", self.broadcast_limit)]),
            Recipient::User(peer) => self
                .http
                .get(self.endpoint(&["Chat", conversation.user(), peer.as_str()])),
        };

        let records: Vec<HistoryRecord> = Self::execute(request).await?.json().await?;
        log::debug!("Fetched {} history records for {conversation}", records.len());
        Ok(records.into_iter().map(HistoryRecord::into_message).collect())
    }

    async fn persist(&self, message: &ChatMessage) -> Result<(), HistoryError> {
        let request = if message.is_broadcast() {
            self.http
                .post(self.endpoint(&["Chat", "broadcast"]))
                .json(&BroadcastPost::from(message))
        } else {
            self.http
                .post(self.endpoint(&["Chat"]))
                .json(&HistoryRecord::from(message))
        };

        Self::execute(request).await?;
        Ok(())
    }
}
