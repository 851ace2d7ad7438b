use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;

use super::protocol::{self, HubMessage};
use super::transport::SignalRConnector;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// What a live session reports to whoever owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    Invocation { target: String, arguments: Vec<Value> },
    Reconnecting(Option<String>),
    Reconnected,
    /// The session is over and will not come back on its own.
    Closed(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Connected,
    Reconnecting,
    Disconnected,
}

/// Opens hub sessions. Events of the new session go to `events` until it stops.
#[async_trait]
pub trait HubConnector: Send + Sync {
    async fn connect(
        &self,
        events: mpsc::UnboundedSender<HubEvent>,
    ) -> Result<Box<dyn HubSession>, TransportError>;
}

#[async_trait]
pub trait HubSession: Send + Sync {
    /// True while invocations can be sent.
    fn is_ready(&self) -> bool;

    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, TransportError>;

    /// Closes the session and cancels any pending reconnect. Idempotent.
    async fn stop(&mut self);
}

enum DriverCommand {
    Invoke {
        target: String,
        arguments: Vec<Value>,
        reply: oneshot::Sender<Result<Value, TransportError>>,
    },
    Stop {
        done: oneshot::Sender<()>,
    },
}

/// Handle to a session driven by a background task.
pub struct HubConnection {
    commands: mpsc::Sender<DriverCommand>,
    invocation_timeout: Duration,
    state: watch::Receiver<HubState>,
    task: Option<JoinHandle<()>>,
}

impl HubConnection {
    pub(crate) fn spawn(
        connector: SignalRConnector,
        stream: WsStream,
        backlog: Vec<HubMessage>,
        events: mpsc::UnboundedSender<HubEvent>,
    ) -> Self {
        let (command_sender, command_receiver) = mpsc::channel(32);
        let (state_sender, state) = watch::channel(HubState::Connected);
        let invocation_timeout = connector.invocation_timeout();

        let driver = Driver {
            connector,
            commands: command_receiver,
            events,
            state: state_sender,
            pending: HashMap::new(),
            next_invocation_id: 0,
        };
        let task = tokio::spawn(driver.run(stream, backlog));

        Self {
            commands: command_sender,
            invocation_timeout,
            state,
            task: Some(task),
        }
    }

    pub fn state(&self) -> HubState {
        *self.state.borrow()
    }
}

#[async_trait]
impl HubSession for HubConnection {
    fn is_ready(&self) -> bool {
        self.task.is_some() && self.state() == HubState::Connected
    }

    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, TransportError> {
        if !self.is_ready() {
            return Err(TransportError::NotConnected);
        }

        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(DriverCommand::Invoke {
                target: target.to_owned(),
                arguments,
                reply,
            })
            .await
            .map_err(|_| TransportError::Closed)?;

        let deadline = self.invocation_timeout;
        match tokio::time::timeout(deadline, outcome).await {
            Ok(completion) => completion.map_err(|_| TransportError::ConnectionLost)?,
            Err(_) => Err(TransportError::InvocationTimeout {
                target: target.to_owned(),
                after: deadline,
            }),
        }
    }

    async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        let (done, stopped) = oneshot::channel();
        if self.commands.send(DriverCommand::Stop { done }).await.is_ok()
            && tokio::time::timeout(STOP_TIMEOUT, stopped).await.is_err()
        {
            log::warn!("Hub driver did not stop within {STOP_TIMEOUT:?}; aborting it");
        }
        task.abort();
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct PendingInvocation {
    target: String,
    reply: oneshot::Sender<Result<Value, TransportError>>,
}

enum Interrupt {
    /// The owner asked to stop (or dropped the handle).
    Stopped(Option<oneshot::Sender<()>>),
    Lost {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

enum Reconnect {
    Connected(WsStream, Vec<HubMessage>),
    Stopped(Option<oneshot::Sender<()>>),
    GaveUp,
}

struct Driver {
    connector: SignalRConnector,
    commands: mpsc::Receiver<DriverCommand>,
    events: mpsc::UnboundedSender<HubEvent>,
    state: watch::Sender<HubState>,
    pending: HashMap<String, PendingInvocation>,
    next_invocation_id: u64,
}

impl Driver {
    async fn run(mut self, mut stream: WsStream, mut backlog: Vec<HubMessage>) {
        loop {
            let interrupt = self.pump(&mut stream, std::mem::take(&mut backlog)).await;
            self.fail_pending();

            match interrupt {
                Interrupt::Stopped(done) => {
                    if let Err(err) = stream.close(None).await {
                        log::debug!("Closing hub websocket failed: {err}");
                    }
                    self.state.send_replace(HubState::Disconnected);
                    log::info!("Hub session stopped");
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    return;
                }
                Interrupt::Lost {
                    error,
                    allow_reconnect,
                } => {
                    log::warn!(
                        "Hub connection lost: {}",
                        error.as_deref().unwrap_or("no reason given")
                    );
                    if !allow_reconnect || self.connector.reconnect_delays().is_empty() {
                        self.finish(error);
                        return;
                    }

                    self.state.send_replace(HubState::Reconnecting);
                    self.emit(HubEvent::Reconnecting(error.clone()));

                    match self.reconnect().await {
                        Reconnect::Connected(next, leftover) => {
                            stream = next;
                            backlog = leftover;
                            self.state.send_replace(HubState::Connected);
                            self.emit(HubEvent::Reconnected);
                            log::info!("Hub connection re-established");
                        }
                        Reconnect::Stopped(done) => {
                            self.state.send_replace(HubState::Disconnected);
                            if let Some(done) = done {
                                let _ = done.send(());
                            }
                            return;
                        }
                        Reconnect::GaveUp => {
                            self.finish(error);
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn pump(&mut self, stream: &mut WsStream, backlog: Vec<HubMessage>) -> Interrupt {
        for message in backlog {
            if let Some(interrupt) = self.dispatch(message) {
                return interrupt;
            }
        }

        let server_timeout = self.connector.server_timeout();
        let mut keep_alive = tokio::time::interval_at(
            Instant::now() + self.connector.keep_alive_interval(),
            self.connector.keep_alive_interval(),
        );
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let watchdog = tokio::time::sleep(server_timeout);
        tokio::pin!(watchdog);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(DriverCommand::Invoke { target, arguments, reply }) => {
                        let invocation_id = self.next_id();
                        let frame = protocol::encode(&HubMessage::Invocation {
                            invocation_id: Some(invocation_id.clone()),
                            target: target.clone(),
                            arguments,
                        });
                        if let Err(err) = stream.send(Message::text(frame)).await {
                            let reason = err.to_string();
                            let _ = reply.send(Err(err.into()));
                            return Interrupt::Lost { error: Some(reason), allow_reconnect: true };
                        }
                        self.pending.insert(invocation_id, PendingInvocation { target, reply });
                    }
                    Some(DriverCommand::Stop { done }) => return Interrupt::Stopped(Some(done)),
                    None => return Interrupt::Stopped(None),
                },
                frame = stream.next() => {
                    watchdog.as_mut().reset(Instant::now() + server_timeout);
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            for record in protocol::records(text.as_str()) {
                                match protocol::parse_record(record) {
                                    Ok(Some(message)) => {
                                        if let Some(interrupt) = self.dispatch(message) {
                                            return interrupt;
                                        }
                                    }
                                    Ok(None) => {}
                                    Err(err) => log::warn!("Discarding malformed hub record: {err}"),
                                }
                            }
                        }
                        Some(Ok(Message::Close(close))) => {
                            return Interrupt::Lost {
                                error: close.map(|close| close.reason.as_str().to_owned()),
                                allow_reconnect: true,
                            };
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            return Interrupt::Lost { error: Some(err.to_string()), allow_reconnect: true };
                        }
                        None => {
                            return Interrupt::Lost {
                                error: Some("websocket stream ended".into()),
                                allow_reconnect: true,
                            };
                        }
                    }
                }
                _ = keep_alive.tick() => {
                    self.prune_abandoned();
                    if let Err(err) = stream.send(Message::text(protocol::encode(&HubMessage::Ping))).await {
                        return Interrupt::Lost { error: Some(err.to_string()), allow_reconnect: true };
                    }
                }
                () = &mut watchdog => {
                    return Interrupt::Lost {
                        error: Some(format!("no message from the server within {server_timeout:?}")),
                        allow_reconnect: true,
                    };
                }
            }
        }
    }

    fn dispatch(&mut self, message: HubMessage) -> Option<Interrupt> {
        match message {
            HubMessage::Invocation {
                target, arguments, ..
            } => self.emit(HubEvent::Invocation { target, arguments }),
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => match self.pending.remove(&invocation_id) {
                Some(pending) => {
                    let outcome = match error {
                        Some(message) => Err(TransportError::Invocation {
                            target: pending.target,
                            message,
                        }),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    let _ = pending.reply.send(outcome);
                }
                None => log::debug!("Completion for unknown invocation {invocation_id}"),
            },
            HubMessage::Ping => {}
            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                return Some(Interrupt::Lost {
                    error,
                    allow_reconnect,
                });
            }
            other => log::debug!("Ignoring unsupported hub message: {other:?}"),
        }
        None
    }

    async fn reconnect(&mut self) -> Reconnect {
        let delays = self.connector.reconnect_delays();
        let attempts = delays.len();

        for (attempt, delay) in delays.into_iter().enumerate() {
            log::info!(
                "Reconnecting to hub in {delay:?} (attempt {}/{attempts})",
                attempt + 1
            );

            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    () = &mut sleep => break,
                    command = self.commands.recv() => {
                        if let Offline::Stop(done) = refuse_offline(command) {
                            return Reconnect::Stopped(done);
                        }
                    }
                }
            }

            let dial = self.connector.dial();
            tokio::pin!(dial);
            let outcome = loop {
                tokio::select! {
                    outcome = &mut dial => break outcome,
                    command = self.commands.recv() => {
                        if let Offline::Stop(done) = refuse_offline(command) {
                            return Reconnect::Stopped(done);
                        }
                    }
                }
            };

            match outcome {
                Ok((stream, leftover)) => return Reconnect::Connected(stream, leftover),
                Err(err) => log::warn!("Reconnect attempt {} failed: {err}", attempt + 1),
            }
        }

        log::error!("Giving up on the hub after {attempts} reconnect attempts");
        Reconnect::GaveUp
    }

    fn finish(&mut self, error: Option<String>) {
        self.state.send_replace(HubState::Disconnected);
        self.emit(HubEvent::Closed(error));
    }

    /// Forgets invocations whose caller stopped waiting for them.
    fn prune_abandoned(&mut self) {
        self.pending.retain(|invocation_id, pending| {
            let waiting = !pending.reply.is_closed();
            if !waiting {
                log::debug!("Dropping abandoned invocation {invocation_id} (`{}`)", pending.target);
            }
            waiting
        });
    }

    fn fail_pending(&mut self) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(TransportError::ConnectionLost));
        }
    }

    fn emit(&self, event: HubEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Hub event receiver is gone; dropping event");
        }
    }

    fn next_id(&mut self) -> String {
        let id = self.next_invocation_id;
        self.next_invocation_id += 1;
        id.to_string()
    }
}

enum Offline {
    Continue,
    Stop(Option<oneshot::Sender<()>>),
}

/// Commands that arrive while there is no socket: invocations fail fast, a stop
/// (or a dropped handle) ends the reconnect schedule.
fn refuse_offline(command: Option<DriverCommand>) -> Offline {
    match command {
        Some(DriverCommand::Invoke { target, reply, .. }) => {
            log::debug!("Refusing `{target}` while reconnecting");
            let _ = reply.send(Err(TransportError::NotConnected));
            Offline::Continue
        }
        Some(DriverCommand::Stop { done }) => Offline::Stop(Some(done)),
        None => Offline::Stop(None),
    }
}
