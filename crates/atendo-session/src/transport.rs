use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use atendo_contract::SessionProfile;

/// Structured classification of a transport disconnect, mirroring the
/// messaging network's error taxonomy. Drives the reconnection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The issued pairing code lapsed before a device scanned it.
    PairingExpired,
    /// The session was superseded by a login elsewhere; the local
    /// credential artifact is corrupt and must be re-paired.
    Conflict,
    /// Explicit unauthorized/logged-out; requires a fresh session.
    LoggedOut,
    /// Any other transport-level close, with a detail string.
    Closed(String),
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PairingExpired => "pairing_expired",
            Self::Conflict => "conflict",
            Self::LoggedOut => "logged_out",
            Self::Closed(_) => "closed",
        }
    }

    /// Maps a bridge-reported reason code to the structured form.
    pub fn from_reason_code(code: &str, detail: &str) -> Self {
        match code {
            "pairing_expired" => Self::PairingExpired,
            "conflict" => Self::Conflict,
            "logged_out" | "unauthorized" => Self::LoggedOut,
            other => {
                if detail.is_empty() {
                    Self::Closed(other.to_string())
                } else {
                    Self::Closed(format!("{other}: {detail}"))
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
/// A message observed on the live transport.
pub struct InboundTransportMessage {
    pub raw_address: String,
    pub text: String,
    /// Authored by the local account (echoes of our own sends).
    pub from_self: bool,
}

#[derive(Debug, Clone)]
/// Enumerates supported `TransportEvent` values.
pub enum TransportEvent {
    PairingCode(String),
    Connected(SessionProfile),
    Inbound(InboundTransportMessage),
    Disconnected(DisconnectReason),
}

/// Live transport handle for one session. Implementations must tolerate
/// concurrent callers; the manager serializes sends per session.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, conversation_ref: &str, text: &str) -> Result<()>;
    /// Best-effort logout used during session removal.
    async fn logout(&self) -> Result<()>;
}

/// Result of starting a pairing/connect handshake: the transport handle
/// plus the typed event stream consumed by the session's processing loop.
pub struct TransportHandshake {
    pub transport: Arc<dyn ChatTransport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
/// Trait contract for `TransportConnector` behavior.
///
/// Connectors receive the credential store so they can reload a persisted
/// auth artifact (resumed login) or write a fresh one after pairing.
pub trait TransportConnector: Send + Sync {
    async fn connect(
        &self,
        session_id: &str,
        credentials: Arc<dyn crate::CredentialStore>,
    ) -> Result<TransportHandshake>;
}
