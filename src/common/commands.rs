/// Lệnh UI gửi xuống tầng mạng.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCommand {
    /// Open a session for `user`, talking to `recipient` or to the broadcast room.
    /// Any previous session is torn down first.
    Connect { user: String, recipient: String },
    /// Send text into the conversation captured by the last successful connect.
    SendMessage(String),
    Disconnect,
}
