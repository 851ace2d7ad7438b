use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;

/// Failures of the realtime hub transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid hub url: {0}")]
    InvalidUrl(String),
    #[error("negotiate request failed: {0}")]
    Negotiate(#[from] reqwest::Error),
    #[error("negotiate returned status {0}")]
    NegotiateStatus(StatusCode),
    #[error("negotiate rejected: {0}")]
    NegotiateRejected(String),
    #[error("server does not offer the websockets transport")]
    WebSocketsUnavailable,
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("handshake rejected: {0}")]
    Handshake(String),
    #[error("timed out opening the hub connection")]
    HandshakeTimeout,
    #[error("hub protocol error: {0}")]
    Protocol(String),
    #[error("invalid hub message: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("hub connection is not connected")]
    NotConnected,
    #[error("invocation `{target}` failed: {message}")]
    Invocation { target: String, message: String },
    #[error("invocation `{target}` got no completion within {after:?}")]
    InvocationTimeout { target: String, after: Duration },
    #[error("connection lost before the invocation completed")]
    ConnectionLost,
    #[error("hub connection closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Failures talking to the history HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("invalid history base url: {0}")]
    InvalidUrl(String),
    #[error("history request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("history server returned status {0}")]
    Status(StatusCode),
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("user name must not be empty")]
    EmptyUser,
    #[error("recipient must not be empty for a private chat")]
    EmptyRecipient,
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("no active hub session")]
    NotConnected,
    #[error("could not connect to the chat hub: {0}")]
    Connection(#[source] TransportError),
    #[error(transparent)]
    Send(#[from] SendFailure),
}

/// Outcome of a send where delivery or persistence (or both) failed. The two
/// are attempted independently and never rolled back.
#[derive(Debug)]
pub struct SendFailure {
    pub delivery: Option<TransportError>,
    pub persistence: Option<HistoryError>,
}

impl SendFailure {
    /// `None` when both halves succeeded.
    pub fn from_parts(
        delivery: Option<TransportError>,
        persistence: Option<HistoryError>,
    ) -> Option<Self> {
        if delivery.is_none() && persistence.is_none() {
            return None;
        }
        Some(Self {
            delivery,
            persistence,
        })
    }

    pub fn delivered(&self) -> bool {
        self.delivery.is_none()
    }

    pub fn persisted(&self) -> bool {
        self.persistence.is_none()
    }
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.delivery, &self.persistence) {
            (Some(delivery), Some(persistence)) => write!(
                f,
                "message was not delivered ({delivery}) and not saved ({persistence})"
            ),
            (Some(delivery), None) => write!(f, "message was saved but not delivered ({delivery})"),
            (None, Some(persistence)) => {
                write!(f, "message was delivered but not saved ({persistence})")
            }
            (None, None) => f.write_str("message sent"),
        }
    }
}

impl std::error::Error for SendFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match (&self.delivery, &self.persistence) {
            (Some(delivery), _) => Some(delivery),
            (None, Some(persistence)) => Some(persistence),
            (None, None) => None,
        }
    }
}
