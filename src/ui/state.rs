use crate::common::{BROADCAST, ChatMessage, ConnectionState, Conversation, NetworkEvent};

use super::colors::UserColors;

const CONNECT_FAILED_NOTICE: &str = "Could not connect to the chat. Try again.";

/// Ô nhập liệu của màn hình kết nối.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectForm {
    pub user_name: String,
    pub recipient: String,
    pub broadcast: bool,
}

impl ConnectForm {
    /// Validated `(user, recipient)` for a connect command.
    pub fn request(&self) -> Result<(String, String), String> {
        let user = self.user_name.trim();
        if user.is_empty() {
            return Err("Enter your user name.".to_string());
        }
        if self.broadcast {
            return Ok((user.to_string(), BROADCAST.to_string()));
        }

        let recipient = self.recipient.trim();
        if recipient.is_empty() {
            return Err("Enter a recipient for the private chat.".to_string());
        }
        Ok((user.to_string(), recipient.to_string()))
    }
}

/// Trạng thái cục bộ của UI.
#[derive(Debug, Default)]
pub struct AppState {
    pub form: ConnectForm,
    pub connection: ConnectionState,
    pub conversation: Option<Conversation>,
    pub messages: Vec<ChatMessage>,
    pub input_text: String,
    /// A connect request is in flight.
    pub loading: bool,
    pub error: Option<String>,
    pub send_error: Option<String>,
    pub user_colors: UserColors,
}

impl AppState {
    pub fn new(form: ConnectForm) -> Self {
        Self {
            form,
            ..Self::default()
        }
    }

    /// The chat view is shown while a session is live or recovering.
    pub fn in_chat(&self) -> bool {
        matches!(
            self.connection,
            ConnectionState::Connected | ConnectionState::Reconnecting
        ) && self.conversation.is_some()
    }

    /// Validates the form and marks a connect as pending.
    pub fn begin_connect(&mut self) -> Option<(String, String)> {
        match self.form.request() {
            Ok(request) => {
                self.loading = true;
                self.error = None;
                Some(request)
            }
            Err(message) => {
                self.error = Some(message);
                None
            }
        }
    }

    /// Takes the typed message if it is not blank.
    pub fn take_input(&mut self) -> Option<String> {
        if self.input_text.trim().is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.input_text))
    }

    /// Back to the connect form; the old conversation is discarded.
    pub fn leave_chat(&mut self) {
        self.conversation = None;
        self.messages.clear();
        self.input_text.clear();
        self.send_error = None;
    }

    pub fn apply(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::StateChanged(state) => {
                let dropped = self.in_chat() && state == ConnectionState::Disconnected;
                self.connection = state;
                if state != ConnectionState::Connecting {
                    self.loading = false;
                }
                if dropped && self.error.is_none() {
                    self.error = Some("Connection closed.".to_string());
                }
            }
            NetworkEvent::SessionStarted(conversation) => {
                self.conversation = Some(conversation);
                self.messages.clear();
                self.send_error = None;
                self.error = None;
            }
            NetworkEvent::HistoryLoaded(history) => self.messages = history,
            NetworkEvent::MessageReceived(message) => self.messages.push(message),
            NetworkEvent::ConnectFailed(notice) => {
                self.loading = false;
                self.error = Some(if notice.is_empty() {
                    CONNECT_FAILED_NOTICE.to_string()
                } else {
                    notice
                });
            }
            NetworkEvent::SendFailed(reason) => self.send_error = Some(reason),
        }
    }
}
