use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::AppConfig;
use crate::error::TransportError;

use super::hub::{HubConnection, HubConnector, HubEvent, HubSession, WsStream};
use super::protocol::{self, HubMessage};

const WEBSOCKETS: &str = "WebSockets";

#[derive(Debug, Clone)]
pub struct HubOptions {
    pub hub_url: String,
    pub handshake_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub server_timeout: Duration,
    /// How long `invoke` waits for the server's completion.
    pub invocation_timeout: Duration,
    pub reconnect_delays: Vec<Duration>,
    pub skip_negotiation: bool,
}

impl HubOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            hub_url: config.hub_url(),
            handshake_timeout: config.handshake_timeout(),
            keep_alive_interval: config.keep_alive_interval(),
            server_timeout: config.server_timeout(),
            invocation_timeout: config.invocation_timeout(),
            reconnect_delays: config.reconnect_delays(),
            skip_negotiation: config.skip_negotiation,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    pub transport: String,
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    #[serde(default)]
    pub negotiate_version: u32,
    pub connection_id: Option<String>,
    pub connection_token: Option<String>,
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl NegotiateResponse {
    pub fn supports_websockets(&self) -> bool {
        self.available_transports.iter().any(|transport| {
            transport.transport == WEBSOCKETS
                && transport
                    .transfer_formats
                    .iter()
                    .any(|format| format == "Text")
        })
    }

    /// Value for the `id` query parameter: the token on version 1, the id before that.
    pub fn connection_key(&self) -> Result<&str, TransportError> {
        if let Some(error) = &self.error {
            return Err(TransportError::NegotiateRejected(error.clone()));
        }
        if let Some(url) = &self.url {
            return Err(TransportError::NegotiateRejected(format!(
                "redirect to {url} is not supported"
            )));
        }
        let key = if self.negotiate_version >= 1 {
            self.connection_token.as_deref()
        } else {
            self.connection_id.as_deref()
        };
        key.ok_or_else(|| TransportError::Protocol("negotiate response has no connection id".into()))
    }
}

/// Opens sessions on the `/chathub` endpoint over websockets.
#[derive(Debug, Clone)]
pub struct SignalRConnector {
    http: reqwest::Client,
    options: HubOptions,
}

impl SignalRConnector {
    pub fn new(options: HubOptions, http_timeout: Duration) -> Result<Self, TransportError> {
        websocket_url(&options.hub_url, None)?;
        let http = reqwest::Client::builder().timeout(http_timeout).build()?;
        Ok(Self { http, options })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, TransportError> {
        Self::new(HubOptions::from_config(config), config.http_timeout())
    }

    pub fn options(&self) -> &HubOptions {
        &self.options
    }

    pub(crate) fn keep_alive_interval(&self) -> Duration {
        self.options.keep_alive_interval
    }

    pub(crate) fn server_timeout(&self) -> Duration {
        self.options.server_timeout
    }

    pub(crate) fn invocation_timeout(&self) -> Duration {
        self.options.invocation_timeout
    }

    pub(crate) fn reconnect_delays(&self) -> Vec<Duration> {
        self.options.reconnect_delays.clone()
    }

    pub async fn negotiate(&self) -> Result<NegotiateResponse, TransportError> {
        let url = format!("{}/negotiate", self.options.hub_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .query(&[("negotiateVersion", 1)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::NegotiateStatus(status));
        }

        let negotiation: NegotiateResponse = response.json().await?;
        if !negotiation.supports_websockets() {
            return Err(TransportError::WebSocketsUnavailable);
        }
        Ok(negotiation)
    }

    /// Negotiates (unless skipped), opens the socket and completes the
    /// handshake. Also returns any messages the server sent along with it.
    pub(crate) async fn dial(&self) -> Result<(WsStream, Vec<HubMessage>), TransportError> {
        let connection_key = if self.options.skip_negotiation {
            None
        } else {
            let negotiation = self.negotiate().await?;
            Some(negotiation.connection_key()?.to_owned())
        };

        let url = websocket_url(&self.options.hub_url, connection_key.as_deref())?;
        // Socket open and handshake share one deadline.
        tokio::time::timeout(self.options.handshake_timeout, open_socket(url))
            .await
            .map_err(|_| TransportError::HandshakeTimeout)?
    }
}

#[async_trait]
impl HubConnector for SignalRConnector {
    async fn connect(
        &self,
        events: mpsc::UnboundedSender<HubEvent>,
    ) -> Result<Box<dyn HubSession>, TransportError> {
        log::info!("Connecting to hub at {}", self.options.hub_url);
        let (stream, backlog) = self.dial().await?;
        log::info!("Hub handshake complete");
        Ok(Box::new(HubConnection::spawn(
            self.clone(),
            stream,
            backlog,
            events,
        )))
    }
}

async fn open_socket(url: Url) -> Result<(WsStream, Vec<HubMessage>), TransportError> {
    let (mut stream, _) = connect_async(url.as_str()).await?;
    let backlog = handshake(&mut stream).await?;
    Ok((stream, backlog))
}

async fn handshake(stream: &mut WsStream) -> Result<Vec<HubMessage>, TransportError> {
    stream
        .send(Message::text(protocol::handshake_request()))
        .await?;

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let rest = protocol::split_handshake(text.as_str())?;
                return protocol::parse_messages(rest);
            }
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err.into()),
        }
    }
}

pub fn websocket_url(hub_url: &str, connection_key: Option<&str>) -> Result<Url, TransportError> {
    let mut url =
        Url::parse(hub_url).map_err(|err| TransportError::InvalidUrl(format!("{hub_url}: {err}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "{hub_url}: unsupported scheme `{other}`"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::InvalidUrl(hub_url.to_owned()))?;

    if let Some(key) = connection_key {
        url.query_pairs_mut().append_pair("id", key);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_swaps_scheme_and_appends_id() {
        let url = websocket_url("http://localhost:5000/chathub", Some("abc+/=")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:5000/chathub?id=abc%2B%2F%3D");

        let url = websocket_url("https://chat.example.com/api/chathub", None).unwrap();
        assert_eq!(url.as_str(), "wss://chat.example.com/api/chathub");
    }

    #[test]
    fn websocket_url_rejects_other_schemes() {
        assert!(matches!(
            websocket_url("ftp://chat.example.com/chathub", None),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            websocket_url("not a url", None),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn negotiate_v1_uses_connection_token() {
        let response: NegotiateResponse = serde_json::from_str(
            r#"{
                "negotiateVersion": 1,
                "connectionId": "id-1",
                "connectionToken": "token-1",
                "availableTransports": [
                    { "transport": "WebSockets", "transferFormats": ["Text", "Binary"] },
                    { "transport": "LongPolling", "transferFormats": ["Text"] }
                ]
            }"#,
        )
        .unwrap();

        assert!(response.supports_websockets());
        assert_eq!(response.connection_key().unwrap(), "token-1");
    }

    #[test]
    fn negotiate_v0_falls_back_to_connection_id() {
        let response: NegotiateResponse = serde_json::from_str(
            r#"{ "connectionId": "id-0", "availableTransports": [] }"#,
        )
        .unwrap();

        assert!(!response.supports_websockets());
        assert_eq!(response.connection_key().unwrap(), "id-0");
    }

    #[test]
    fn negotiate_error_and_redirect_are_rejected() {
        let response: NegotiateResponse =
            serde_json::from_str(r#"{ "error": "hub is full" }"#).unwrap();
        assert!(matches!(
            response.connection_key(),
            Err(TransportError::NegotiateRejected(message)) if message == "hub is full"
        ));

        let response: NegotiateResponse = serde_json::from_str(
            r#"{ "url": "https://other.example.com/client", "accessToken": "t" }"#,
        )
        .unwrap();
        assert!(matches!(
            response.connection_key(),
            Err(TransportError::NegotiateRejected(_))
        ));
    }

    #[test]
    fn connector_rejects_bad_hub_url() {
        let options = HubOptions {
            hub_url: "mailto:someone@example.com".into(),
            ..HubOptions::from_config(&AppConfig::default())
        };
        assert!(SignalRConnector::new(options, Duration::from_secs(1)).is_err());
    }
}
