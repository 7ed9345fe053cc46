//! Session lifecycle management for the messaging network.
//!
//! One finite-state session per connected account: pairing-code issuance,
//! connect/disconnect transitions, a reconnection policy keyed by the
//! disconnect reason, credential persistence, and startup recovery. The
//! manager is the only component that delivers inbound events and
//! transmits outbound replies.

mod bridge_connector;
mod credential_store;
mod session_manager;
mod transport;

pub use bridge_connector::HttpBridgeConnector;
pub use credential_store::{
    CredentialStore, FileCredentialStore, SessionCredentialMetadata, CREDENTIAL_ARTIFACT_FILE_NAME,
    CREDENTIAL_METADATA_FILE_NAME,
};
pub use session_manager::{
    render_pairing_code, InboundDispatcher, InboundSessionMessage, SessionManager,
    SessionManagerConfig,
};
pub use transport::{
    ChatTransport, DisconnectReason, InboundTransportMessage, TransportConnector, TransportEvent,
    TransportHandshake,
};
