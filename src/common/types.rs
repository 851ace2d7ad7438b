use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Recipient value reserved for the room every participant sees.
pub const BROADCAST: &str = "BROADCAST";

const DISPLAY_TIME_FORMAT: &str = "%H:%M:%S";

/// Domain model đại diện một tin nhắn chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub user: String,
    pub recipient: String,
    pub message: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(
        user: impl Into<String>,
        recipient: impl Into<String>,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            recipient: recipient.into(),
            message: message.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST
    }
}

/// Trạng thái kết nối tới hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The transport lost the socket and is retrying on its own.
    Reconnecting,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Recipient {
    Broadcast,
    User(String),
}

impl Recipient {
    /// Returns `None` for a blank value.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => None,
            BROADCAST => Some(Self::Broadcast),
            user => Some(Self::User(user.to_owned())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Broadcast => BROADCAST,
            Self::User(user) => user,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The conversation a session is bound to, captured when it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    user: String,
    recipient: Recipient,
}

impl Conversation {
    pub fn new(user: &str, recipient: &str) -> Result<Self, ChatError> {
        let user = user.trim();
        if user.is_empty() {
            return Err(ChatError::EmptyUser);
        }
        let recipient = Recipient::parse(recipient).ok_or(ChatError::EmptyRecipient)?;
        Ok(Self {
            user: user.to_owned(),
            recipient,
        })
    }

    pub fn broadcast(user: &str) -> Result<Self, ChatError> {
        Self::new(user, BROADCAST)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn recipient(&self) -> &Recipient {
        &self.recipient
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_broadcast()
    }

    /// Membership filter: does an event from `sender` addressed `to` belong here?
    pub fn accepts(&self, sender: &str, to: &str) -> bool {
        let recipient = self.recipient.as_str();
        (self.is_broadcast() && to == BROADCAST)
            || (sender == self.user && to == recipient)
            || (sender == recipient && to == self.user)
    }

    pub fn contains(&self, message: &ChatMessage) -> bool {
        self.accepts(&message.user, &message.recipient)
    }
}

impl fmt::Display for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.recipient {
            Recipient::Broadcast => write!(f, "{} @ {BROADCAST}", self.user),
            Recipient::User(peer) => write!(f, "{} <-> {peer}", self.user),
        }
    }
}

/// Wall-clock time shown next to messages created on this side.
pub fn display_now() -> String {
    Local::now().format(DISPLAY_TIME_FORMAT).to_string()
}

/// Timestamp attached to outgoing messages.
pub fn wire_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Renders a server timestamp as local wall-clock time. Offset-less values are
/// taken as local time; anything unparseable is shown verbatim.
pub fn display_server_time(raw: &str) -> String {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return at
            .with_timezone(&Local)
            .format(DISPLAY_TIME_FORMAT)
            .to_string();
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return at.format(DISPLAY_TIME_FORMAT).to_string();
    }
    raw.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn private(user: &str, recipient: &str) -> Conversation {
        Conversation::new(user, recipient).unwrap()
    }

    #[test]
    fn private_filter_is_symmetric() {
        let as_sender = private("alice", "bob");
        let as_receiver = private("bob", "alice");

        assert!(as_sender.accepts("alice", "bob"));
        assert!(as_receiver.accepts("alice", "bob"));
        assert!(as_sender.accepts("bob", "alice"));
        assert!(as_receiver.accepts("bob", "alice"));
    }

    #[test]
    fn private_filter_rejects_other_pairs_and_broadcast() {
        let conversation = private("alice", "bob");

        assert!(!conversation.accepts("carol", "alice"));
        assert!(!conversation.accepts("alice", "carol"));
        assert!(!conversation.accepts("bob", "bob"));
        assert!(!conversation.accepts("bob", BROADCAST));
        assert!(!conversation.accepts("alice", BROADCAST));
    }

    #[test]
    fn broadcast_filter_only_checks_destination() {
        let conversation = Conversation::broadcast("alice").unwrap();

        assert!(conversation.accepts("carol", BROADCAST));
        assert!(conversation.accepts("alice", BROADCAST));
        assert!(!conversation.accepts("carol", "dave"));
        assert!(!conversation.accepts("carol", "alice"));
    }

    #[test]
    fn conversation_requires_user_and_recipient() {
        assert!(matches!(
            Conversation::new("  ", "bob"),
            Err(ChatError::EmptyUser)
        ));
        assert!(matches!(
            Conversation::new("alice", ""),
            Err(ChatError::EmptyRecipient)
        ));

        let conversation = private(" alice ", " bob ");
        assert_eq!(conversation.user(), "alice");
        assert_eq!(conversation.recipient(), &Recipient::User("bob".into()));
        assert_eq!(conversation.to_string(), "alice <-> bob");
    }

    #[test]
    fn sentinel_recipient_means_broadcast() {
        let conversation = private("alice", BROADCAST);
        assert!(conversation.is_broadcast());
        assert_eq!(conversation.to_string(), "alice @ BROADCAST");
    }

    #[test]
    fn server_time_falls_back_to_raw_text() {
        assert_eq!(display_server_time("yesterday"), "yesterday");
        assert_eq!(display_server_time("2024-05-01T10:20:30.123"), "10:20:30");
        assert_eq!(display_server_time("2024-05-01T10:20:30"), "10:20:30");
        assert_eq!(display_server_time("2024-05-01T10:20:30Z").len(), 8);
    }
}
