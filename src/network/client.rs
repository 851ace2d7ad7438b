use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::common::types::{display_now, wire_now};
use crate::common::{ChatMessage, ConnectionState, Conversation, NetworkCommand, NetworkEvent};
use crate::error::{ChatError, SendFailure, TransportError};
use crate::storage::{HistoryStore, load_backlog};

use super::hub::{HubConnector, HubEvent, HubSession};

/// Hub method the server calls to deliver a message.
pub const RECEIVE_METHOD: &str = "ReceiveMessage";
/// Hub method we call to send one.
pub const SEND_METHOD: &str = "SendMessage";

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

const CONNECT_FAILED_NOTICE: &str = "Could not connect to the chat. Try again.";

struct ActiveSession {
    conversation: Conversation,
    hub: Box<dyn HubSession>,
    inbound: mpsc::UnboundedReceiver<HubEvent>,
}

/// Connection manager: one hub session at a time, the message sequence of its
/// conversation, and the send path (hub delivery plus history persistence).
pub struct ChatClient {
    connector: Arc<dyn HubConnector>,
    history: Arc<dyn HistoryStore>,
    event_sender: mpsc::Sender<NetworkEvent>,
    echo_sent_messages: bool,
    send_timeout: Duration,
    state: ConnectionState,
    session: Option<ActiveSession>,
    messages: Vec<ChatMessage>,
}

impl ChatClient {
    pub fn new(
        connector: Arc<dyn HubConnector>,
        history: Arc<dyn HistoryStore>,
        event_sender: mpsc::Sender<NetworkEvent>,
    ) -> Self {
        Self {
            connector,
            history,
            event_sender,
            echo_sent_messages: false,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            state: ConnectionState::Disconnected,
            session: None,
            messages: Vec::new(),
        }
    }

    pub fn with_echo_sent_messages(mut self, echo: bool) -> Self {
        self.echo_sent_messages = echo;
        self
    }

    /// Longest a send waits on hub delivery before reporting it failed.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.session.as_ref().map(|session| &session.conversation)
    }

    pub async fn run(mut self, mut command_receiver: mpsc::Receiver<NetworkCommand>) {
        log::info!("Chat network loop started");

        loop {
            tokio::select! {
                command = command_receiver.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command).await;
                    } else {
                        break;
                    }
                }
                event = self.next_hub_event() => {
                    self.handle_hub_event(event.unwrap_or(HubEvent::Closed(None))).await;
                }
            }
        }

        self.disconnect().await;
        log::info!("Chat network loop stopped");
    }

    async fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::Connect { user, recipient } => {
                if let Err(err) = self.connect(&user, &recipient).await {
                    log::warn!("Connect failed: {err}");
                    let notice = match err {
                        ChatError::Connection(_) => CONNECT_FAILED_NOTICE.to_string(),
                        other => other.to_string(),
                    };
                    self.emit(NetworkEvent::ConnectFailed(notice)).await;
                }
            }
            NetworkCommand::SendMessage(text) => {
                if let Err(err) = self.send_in_session(&text).await {
                    self.emit(NetworkEvent::SendFailed(err.to_string())).await;
                }
            }
            NetworkCommand::Disconnect => self.disconnect().await,
        }
    }

    /// Opens a session for `(user, recipient)` and seeds the sequence with its
    /// history. Any previous session is stopped first.
    pub async fn connect(&mut self, user: &str, recipient: &str) -> Result<(), ChatError> {
        let conversation = Conversation::new(user, recipient)?;

        self.teardown().await;
        self.messages.clear();
        self.set_state(ConnectionState::Connecting).await;

        let (inbound_sender, inbound) = mpsc::unbounded_channel();
        log::info!("Opening hub session for {conversation}");
        let hub = match self.connector.connect(inbound_sender).await {
            Ok(hub) => hub,
            Err(err) => {
                log::error!("Failed to start hub session: {err}");
                self.set_state(ConnectionState::Disconnected).await;
                return Err(ChatError::Connection(err));
            }
        };

        self.session = Some(ActiveSession {
            conversation: conversation.clone(),
            hub,
            inbound,
        });
        self.emit(NetworkEvent::SessionStarted(conversation.clone()))
            .await;
        self.set_state(ConnectionState::Connected).await;

        let mut history = load_backlog(self.history.as_ref(), &conversation).await;
        let before = history.len();
        history.retain(|message| conversation.contains(message));
        if history.len() != before {
            log::warn!(
                "Dropped {} history records outside {conversation}",
                before - history.len()
            );
        }
        log::info!("Loaded {} history messages for {conversation}", history.len());

        self.messages = history.clone();
        self.emit(NetworkEvent::HistoryLoaded(history)).await;
        Ok(())
    }

    /// Sends on the active session, using the conversation captured at connect.
    pub async fn send_in_session(&mut self, message: &str) -> Result<(), ChatError> {
        let Some(conversation) = self.conversation().cloned() else {
            log::error!("No active hub session; message not sent");
            return Err(ChatError::NotConnected);
        };
        self.send(
            conversation.user(),
            conversation.recipient().as_str(),
            message,
        )
        .await
    }

    /// Delivers over the hub and persists through the history API. Both are
    /// attempted even if the other fails; neither is rolled back.
    pub async fn send(&mut self, user: &str, recipient: &str, message: &str) -> Result<(), ChatError> {
        let Some(session) = self.session.as_ref().filter(|session| session.hub.is_ready()) else {
            log::error!("No active hub session; message from {user} not sent");
            return Err(ChatError::NotConnected);
        };
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let outgoing = ChatMessage::new(user, recipient, message, wire_now());
        let in_conversation = session.conversation.contains(&outgoing);

        let arguments = vec![json!(user), json!(message), json!(recipient)];
        let delivery = match tokio::time::timeout(
            self.send_timeout,
            session.hub.invoke(SEND_METHOD, arguments),
        )
        .await
        {
            Ok(outcome) => outcome.err(),
            Err(_) => Some(TransportError::InvocationTimeout {
                target: SEND_METHOD.to_string(),
                after: self.send_timeout,
            }),
        };
        if let Some(err) = &delivery {
            log::error!("Failed to deliver message over hub: {err}");
        }

        let persistence = self.history.persist(&outgoing).await.err();
        if let Some(err) = &persistence {
            log::error!("Failed to persist message: {err}");
        }

        if delivery.is_none() && self.echo_sent_messages && in_conversation {
            let echoed = ChatMessage {
                timestamp: display_now(),
                ..outgoing
            };
            self.messages.push(echoed.clone());
            self.emit(NetworkEvent::MessageReceived(echoed)).await;
        }

        match SendFailure::from_parts(delivery, persistence) {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    pub async fn disconnect(&mut self) {
        self.teardown().await;
        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Next event of the active session. Pending forever when there is none.
    pub async fn next_hub_event(&mut self) -> Option<HubEvent> {
        match self.session.as_mut() {
            Some(session) => session.inbound.recv().await,
            None => std::future::pending().await,
        }
    }

    pub async fn handle_hub_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Invocation { target, arguments } => {
                if target.eq_ignore_ascii_case(RECEIVE_METHOD) {
                    self.handle_receive(&arguments).await;
                } else {
                    log::debug!("Ignoring hub invocation `{target}`");
                }
            }
            HubEvent::Reconnecting(reason) => {
                log::warn!(
                    "Hub connection interrupted ({}); reconnecting",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.set_state(ConnectionState::Reconnecting).await;
            }
            HubEvent::Reconnected => {
                log::info!("Hub connection recovered");
                self.set_state(ConnectionState::Connected).await;
            }
            HubEvent::Closed(reason) => {
                log::warn!(
                    "Hub connection closed: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.session = None;
                self.set_state(ConnectionState::Disconnected).await;
            }
        }
    }

    async fn handle_receive(&mut self, arguments: &[Value]) {
        let Some((sender, message, to)) = receive_arguments(arguments) else {
            log::warn!("Malformed {RECEIVE_METHOD} arguments: {arguments:?}");
            return;
        };
        let Some(session) = &self.session else {
            return;
        };

        if !session.conversation.accepts(sender, to) {
            log::info!(
                "Discarding message from {sender} to {to}; active conversation is {}",
                session.conversation
            );
            return;
        }

        log::debug!("Accepted message from {sender} to {to}");
        let accepted = ChatMessage::new(sender, to, message, display_now());
        self.messages.push(accepted.clone());
        self.emit(NetworkEvent::MessageReceived(accepted)).await;
    }

    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            log::info!("Closing hub session for {}", session.conversation);
            session.hub.stop().await;
        }
    }

    async fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        log::debug!("Connection state {} -> {}", self.state.label(), state.label());
        self.state = state;
        self.emit(NetworkEvent::StateChanged(state)).await;
    }

    async fn emit(&self, event: NetworkEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }
}

/// `ReceiveMessage(user, message, to)`.
fn receive_arguments(arguments: &[Value]) -> Option<(&str, &str, &str)> {
    match arguments {
        [Value::String(sender), Value::String(message), Value::String(to), ..] => {
            Some((sender, message, to))
        }
        _ => None,
    }
}
