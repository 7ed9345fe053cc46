//! HTTP bridge connector for the external messaging-network service.
//!
//! The messaging network itself is reached through a small bridge daemon
//! that owns the raw device protocol. This connector drives the bridge's
//! REST surface: start a handshake, long-poll typed events into the
//! session's channel, send outbound text, and persist credential
//! artifacts the bridge hands back after pairing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use atendo_contract::SessionProfile;

use crate::credential_store::CredentialStore;
use crate::transport::{
    ChatTransport, DisconnectReason, InboundTransportMessage, TransportConnector, TransportEvent,
    TransportHandshake,
};

const BRIDGE_EVENT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_POLL_WAIT_MS: u64 = 20_000;
const POLL_REQUEST_MARGIN_MS: u64 = 5_000;

#[derive(Debug, Clone, Deserialize)]
struct BridgeEventPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    profile: Option<SessionProfile>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    from_self: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    artifact: Option<String>,
}

/// Public struct `HttpBridgeConnector` used across Atendo components.
pub struct HttpBridgeConnector {
    client: Client,
    base_url: String,
    poll_wait_ms: u64,
}

impl HttpBridgeConnector {
    pub fn new(base_url: &str) -> Self {
        Self::with_poll_wait(base_url, DEFAULT_POLL_WAIT_MS)
    }

    pub fn with_poll_wait(base_url: &str, poll_wait_ms: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_wait_ms: poll_wait_ms.max(1_000),
        }
    }

    fn connection_url(&self, session_id: &str, suffix: &str) -> String {
        format!("{}/connections/{session_id}/{suffix}", self.base_url)
    }
}

#[async_trait]
impl TransportConnector for HttpBridgeConnector {
    async fn connect(
        &self,
        session_id: &str,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<TransportHandshake> {
        let artifact = credentials
            .read_artifact(session_id)
            .context("failed to read persisted credential artifact")?;
        let response = self
            .client
            .post(self.connection_url(session_id, "connect"))
            .json(&json!({ "credentials": artifact }))
            .send()
            .await
            .context("bridge connect request failed")?;
        if !response.status().is_success() {
            bail!(
                "bridge connect returned status {} for session {session_id}",
                response.status().as_u16()
            );
        }

        let (event_tx, event_rx) = mpsc::channel(BRIDGE_EVENT_CHANNEL_CAPACITY);
        let poll_client = self.client.clone();
        let events_url = self.connection_url(session_id, "events");
        let poll_wait_ms = self.poll_wait_ms;
        let poll_session_id = session_id.to_string();
        tokio::spawn(async move {
            run_bridge_event_poll(
                poll_client,
                events_url,
                poll_wait_ms,
                poll_session_id,
                credentials,
                event_tx,
            )
            .await;
        });

        let transport = Arc::new(HttpBridgeTransport {
            client: self.client.clone(),
            send_url: self.connection_url(session_id, "send-message"),
            logout_url: self.connection_url(session_id, "logout"),
        });
        Ok(TransportHandshake {
            transport,
            events: event_rx,
        })
    }
}

async fn run_bridge_event_poll(
    client: Client,
    events_url: String,
    poll_wait_ms: u64,
    session_id: String,
    credentials: Arc<dyn CredentialStore>,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    loop {
        let request = client
            .get(&events_url)
            .query(&[("wait_ms", poll_wait_ms)])
            .timeout(Duration::from_millis(poll_wait_ms + POLL_REQUEST_MARGIN_MS));
        let payloads: Vec<BridgeEventPayload> = match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json().await {
                    Ok(payloads) => payloads,
                    Err(error) => {
                        let _ = event_tx
                            .send(TransportEvent::Disconnected(DisconnectReason::Closed(
                                format!("bridge event payload unreadable: {error}"),
                            )))
                            .await;
                        return;
                    }
                }
            }
            Ok(response) => {
                let _ = event_tx
                    .send(TransportEvent::Disconnected(DisconnectReason::Closed(
                        format!("bridge event poll status {}", response.status().as_u16()),
                    )))
                    .await;
                return;
            }
            Err(error) => {
                let _ = event_tx
                    .send(TransportEvent::Disconnected(DisconnectReason::Closed(
                        format!("bridge event poll failed: {error}"),
                    )))
                    .await;
                return;
            }
        };

        for payload in payloads {
            if payload.kind == "credentials" {
                // Pairing produced a fresh artifact; persist for recovery.
                let artifact = payload.artifact.unwrap_or_default();
                if let Err(error) = credentials.write_artifact(&session_id, &artifact) {
                    tracing::warn!(session_id, %error, "failed to persist credential artifact");
                }
                continue;
            }
            let Some(event) = map_bridge_event(payload) else {
                continue;
            };
            let disconnect = matches!(event, TransportEvent::Disconnected(_));
            if event_tx.send(event).await.is_err() {
                return;
            }
            if disconnect {
                return;
            }
        }
    }
}

fn map_bridge_event(payload: BridgeEventPayload) -> Option<TransportEvent> {
    match payload.kind.as_str() {
        "pairing_code" => Some(TransportEvent::PairingCode(payload.code.unwrap_or_default())),
        "connected" => Some(TransportEvent::Connected(payload.profile.unwrap_or_default())),
        "message" => Some(TransportEvent::Inbound(InboundTransportMessage {
            raw_address: payload.address.unwrap_or_default(),
            text: payload.text.unwrap_or_default(),
            from_self: payload.from_self,
        })),
        "disconnected" => {
            let reason = payload.reason.unwrap_or_default();
            let detail = payload.detail.unwrap_or_default();
            Some(TransportEvent::Disconnected(
                DisconnectReason::from_reason_code(&reason, &detail),
            ))
        }
        other => {
            tracing::debug!(kind = other, "ignoring unknown bridge event kind");
            None
        }
    }
}

struct HttpBridgeTransport {
    client: Client,
    send_url: String,
    logout_url: String,
}

#[async_trait]
impl ChatTransport for HttpBridgeTransport {
    async fn send_text(&self, conversation_ref: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.send_url)
            .json(&json!({ "address": conversation_ref, "text": text }))
            .send()
            .await
            .context("bridge send-message request failed")?;
        if !response.status().is_success() {
            bail!(
                "bridge send-message returned status {}",
                response.status().as_u16()
            );
        }
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        let response = self
            .client
            .post(&self.logout_url)
            .send()
            .await
            .context("bridge logout request failed")?;
        if !response.status().is_success() {
            bail!("bridge logout returned status {}", response.status().as_u16());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential_store::FileCredentialStore;

    fn payload(raw: serde_json::Value) -> BridgeEventPayload {
        serde_json::from_value(raw).expect("payload")
    }

    #[test]
    fn map_bridge_event_covers_known_kinds() {
        let code = map_bridge_event(payload(json!({"type": "pairing_code", "code": "AB12"})));
        assert!(matches!(code, Some(TransportEvent::PairingCode(value)) if value == "AB12"));

        let connected = map_bridge_event(payload(
            json!({"type": "connected", "profile": {"display_name": "Loja"}}),
        ));
        let Some(TransportEvent::Connected(profile)) = connected else {
            panic!("expected connected event");
        };
        assert_eq!(profile.display_name.as_deref(), Some("Loja"));

        let message = map_bridge_event(payload(json!({
            "type": "message",
            "address": "551199@chat.example.net/2",
            "text": "Oi",
            "from_self": false
        })));
        let Some(TransportEvent::Inbound(inbound)) = message else {
            panic!("expected inbound event");
        };
        assert_eq!(inbound.raw_address, "551199@chat.example.net/2");
        assert!(!inbound.from_self);

        assert!(map_bridge_event(payload(json!({"type": "presence"}))).is_none());
    }

    #[test]
    fn map_bridge_event_classifies_disconnect_reasons() {
        let conflict =
            map_bridge_event(payload(json!({"type": "disconnected", "reason": "conflict"})));
        assert!(matches!(
            conflict,
            Some(TransportEvent::Disconnected(DisconnectReason::Conflict))
        ));

        let unauthorized = map_bridge_event(payload(
            json!({"type": "disconnected", "reason": "unauthorized"}),
        ));
        assert!(matches!(
            unauthorized,
            Some(TransportEvent::Disconnected(DisconnectReason::LoggedOut))
        ));

        let other = map_bridge_event(payload(
            json!({"type": "disconnected", "reason": "stream_error", "detail": "code 515"}),
        ));
        let Some(TransportEvent::Disconnected(DisconnectReason::Closed(detail))) = other else {
            panic!("expected closed reason");
        };
        assert_eq!(detail, "stream_error: code 515");
    }

    #[tokio::test]
    async fn integration_connect_polls_events_and_persists_credentials() {
        let server = httpmock::MockServer::start_async().await;
        let connect_mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/connections/sess_1/connect");
                then.status(200).json_body(json!({"status": "connecting"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET)
                    .path("/connections/sess_1/events");
                then.status(200).json_body(json!([
                    {"type": "pairing_code", "code": "CODE1234"},
                    {"type": "credentials", "artifact": "{\"keys\":[1]}"},
                    {"type": "connected", "profile": {"display_name": "Loja"}},
                    {"type": "disconnected", "reason": "logged_out"}
                ]));
            })
            .await;

        let tempdir = tempfile::tempdir().expect("tempdir");
        let credentials = Arc::new(FileCredentialStore::new(tempdir.path()));
        let connector = HttpBridgeConnector::with_poll_wait(&server.base_url(), 1_000);

        let mut handshake = connector
            .connect("sess_1", Arc::clone(&credentials) as Arc<dyn CredentialStore>)
            .await
            .expect("connect");
        connect_mock.assert_async().await;

        let mut observed = Vec::new();
        while let Some(event) = handshake.events.recv().await {
            let done = matches!(event, TransportEvent::Disconnected(_));
            observed.push(event);
            if done {
                break;
            }
        }
        assert_eq!(observed.len(), 3, "credentials events are absorbed");
        assert!(matches!(observed[0], TransportEvent::PairingCode(_)));
        assert!(matches!(observed[1], TransportEvent::Connected(_)));
        assert!(matches!(
            observed[2],
            TransportEvent::Disconnected(DisconnectReason::LoggedOut)
        ));
        assert_eq!(
            credentials.read_artifact("sess_1").expect("read").as_deref(),
            Some("{\"keys\":[1]}")
        );
    }
}
