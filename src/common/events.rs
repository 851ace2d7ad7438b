use super::types::{ChatMessage, ConnectionState, Conversation};

/// Sự kiện từ tầng mạng gửi lên UI.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    StateChanged(ConnectionState),
    /// A new session is live; everything shown for the previous one is stale.
    SessionStarted(Conversation),
    /// Backlog for the session, replaces the displayed sequence.
    HistoryLoaded(Vec<ChatMessage>),
    MessageReceived(ChatMessage),
    ConnectFailed(String),
    SendFailed(String),
}
