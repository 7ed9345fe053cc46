use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atendo_contract::{
    conversation_ref_from_address, AtendoError, SessionRecord, SessionState,
};
use atendo_core::{current_unix_timestamp_ms, mint_id};

use crate::credential_store::{CredentialStore, SessionCredentialMetadata};
use crate::transport::{DisconnectReason, TransportConnector, TransportEvent};

const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5_000;
const DEFAULT_CONFLICT_BACKOFF_MS: u64 = 10_000;
const DEFAULT_RECOVERY_STAGGER_MS: u64 = 250;
const PAIRING_CODE_GROUP_SIZE: usize = 4;

#[derive(Debug, Clone)]
/// Public struct `SessionManagerConfig` used across Atendo components.
pub struct SessionManagerConfig {
    /// Backoff before re-handshaking after an ordinary transport close.
    pub reconnect_backoff_ms: u64,
    /// Backoff before re-pairing after a session-superseded conflict.
    pub conflict_backoff_ms: u64,
    /// Delay between session starts during startup recovery.
    pub recovery_stagger_ms: u64,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            conflict_backoff_ms: DEFAULT_CONFLICT_BACKOFF_MS,
            recovery_stagger_ms: DEFAULT_RECOVERY_STAGGER_MS,
        }
    }
}

#[derive(Debug, Clone)]
/// Inbound message forwarded to the decision pipeline.
pub struct InboundSessionMessage {
    pub session_id: String,
    pub tenant_id: String,
    pub account_id: String,
    pub conversation_ref: String,
    pub raw_address: String,
    pub text: String,
}

/// Receives inbound messages from session event loops.
///
/// Dispatch is fire-and-forget from the transport's perspective:
/// implementations must hand the work to an independent task and never
/// block the caller on oracle calls or storage I/O.
pub trait InboundDispatcher: Send + Sync {
    fn dispatch(&self, inbound: InboundSessionMessage);
}

struct SessionRuntimeState {
    record: SessionRecord,
    transport: Option<Arc<dyn crate::ChatTransport>>,
    removed: bool,
}

struct SessionEntry {
    state: Mutex<SessionRuntimeState>,
    /// Serializes outbound sends on this session's transport.
    send_lock: tokio::sync::Mutex<()>,
}

/// Owns one finite-state session per connected account.
///
/// The registry lock is held only for map lookups; all per-session state
/// sits behind each entry's own lock so sessions never contend with each
/// other. Each session runs one processing loop over its transport's
/// typed event stream.
pub struct SessionManager {
    config: SessionManagerConfig,
    credentials: Arc<dyn CredentialStore>,
    connector: Arc<dyn TransportConnector>,
    dispatcher: Mutex<Option<Arc<dyn InboundDispatcher>>>,
    registry: Mutex<HashMap<String, Arc<SessionEntry>>>,
}

impl SessionManager {
    pub fn new(
        config: SessionManagerConfig,
        credentials: Arc<dyn CredentialStore>,
        connector: Arc<dyn TransportConnector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            credentials,
            connector,
            dispatcher: Mutex::new(None),
            registry: Mutex::new(HashMap::new()),
        })
    }

    /// Wires the decision pipeline in after construction; the pipeline
    /// itself needs the manager for outbound sends.
    pub fn set_inbound_dispatcher(&self, dispatcher: Arc<dyn InboundDispatcher>) {
        if let Ok(mut slot) = self.dispatcher.lock() {
            *slot = Some(dispatcher);
        }
    }

    /// Allocates a session, persists its metadata, and starts the pairing
    /// handshake asynchronously. Returns immediately; callers poll
    /// `get_session` for the pairing code and the `connected` transition.
    pub fn create_session(
        self: &Arc<Self>,
        owner_account_id: &str,
        tenant_id: &str,
    ) -> Result<SessionRecord, AtendoError> {
        if owner_account_id.trim().is_empty() {
            return Err(AtendoError::Validation(
                "owner_account_id is required".to_string(),
            ));
        }
        if tenant_id.trim().is_empty() {
            return Err(AtendoError::Validation("tenant_id is required".to_string()));
        }

        let session_id = mint_id("sess");
        let metadata = SessionCredentialMetadata {
            owner_account_id: owner_account_id.to_string(),
            tenant_id: tenant_id.to_string(),
            outbound_auth_token: Some(mint_id("token")),
        };
        self.credentials
            .save_metadata(&session_id, &metadata)
            .map_err(AtendoError::storage)?;

        let record = SessionRecord {
            id: session_id.clone(),
            owner_account_id: owner_account_id.to_string(),
            tenant_id: tenant_id.to_string(),
            state: SessionState::Pairing,
            pairing_code: None,
            created_unix_ms: current_unix_timestamp_ms(),
            profile: None,
        };
        self.insert_entry(record.clone());
        self.spawn_session_loop(session_id);
        Ok(record)
    }

    pub fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        let entry = self.entry(session_id)?;
        let state = entry.state.lock().ok()?;
        Some(state.record.clone())
    }

    /// Best-effort logout on the live transport, then releases in-memory
    /// state. Credential material on disk is intentionally left for audit
    /// and manual cleanup.
    pub async fn remove_session(&self, session_id: &str) -> Result<(), AtendoError> {
        let entry = {
            let mut registry = self
                .registry
                .lock()
                .map_err(|_| AtendoError::storage("session registry lock poisoned"))?;
            registry
                .remove(session_id)
                .ok_or_else(|| AtendoError::NotFound(format!("session {session_id}")))?
        };
        let transport = {
            let mut state = entry
                .state
                .lock()
                .map_err(|_| AtendoError::storage("session state lock poisoned"))?;
            state.removed = true;
            state.record.state = SessionState::Disconnected;
            state.record.pairing_code = None;
            state.transport.take()
        };
        if let Some(transport) = transport {
            if let Err(error) = transport.logout().await {
                tracing::warn!(session_id, %error, "best-effort logout failed during removal");
            }
        }
        println!("session {session_id} removed");
        Ok(())
    }

    /// Sends text on a connected session. Never retries; the caller owns
    /// the retry decision.
    pub async fn send(
        &self,
        session_id: &str,
        conversation_ref: &str,
        text: &str,
    ) -> Result<(), AtendoError> {
        if conversation_ref.trim().is_empty() {
            return Err(AtendoError::Validation(
                "conversation_ref is required".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(AtendoError::Validation("text is required".to_string()));
        }
        let entry = self
            .entry(session_id)
            .ok_or_else(|| AtendoError::NotFound(format!("session {session_id}")))?;
        let transport = {
            let state = entry
                .state
                .lock()
                .map_err(|_| AtendoError::storage("session state lock poisoned"))?;
            if state.record.state != SessionState::Connected {
                return Err(AtendoError::NotConnected(session_id.to_string()));
            }
            state
                .transport
                .clone()
                .ok_or_else(|| AtendoError::NotConnected(session_id.to_string()))?
        };
        let _send_guard = entry.send_lock.lock().await;
        transport
            .send_text(conversation_ref, text)
            .await
            .map_err(|error| AtendoError::Transport(format!("{error:#}")))
    }

    /// Reconstructs sessions from persisted credential entries at process
    /// start, staggering handshakes to avoid a connection burst. Safe to
    /// call again: already-registered ids are skipped, so at most one
    /// live transport exists per session id.
    pub async fn recover_sessions(self: &Arc<Self>) -> Result<usize, AtendoError> {
        let session_ids = self
            .credentials
            .list_session_ids()
            .map_err(AtendoError::storage)?;
        let mut recovered = 0usize;
        for session_id in session_ids {
            if self.entry(&session_id).is_some() {
                continue;
            }
            let metadata = match self.credentials.load_metadata(&session_id) {
                Ok(Some(metadata)) => metadata,
                Ok(None) => {
                    tracing::warn!(session_id, "credential entry has no metadata; skipping");
                    continue;
                }
                Err(error) => {
                    tracing::warn!(session_id, %error, "failed to load session metadata; skipping");
                    continue;
                }
            };
            let record = SessionRecord {
                id: session_id.clone(),
                owner_account_id: metadata.owner_account_id,
                tenant_id: metadata.tenant_id,
                state: SessionState::Connecting,
                pairing_code: None,
                created_unix_ms: current_unix_timestamp_ms(),
                profile: None,
            };
            self.insert_entry(record);
            self.spawn_session_loop(session_id);
            recovered += 1;
            tokio::time::sleep(Duration::from_millis(self.config.recovery_stagger_ms)).await;
        }
        Ok(recovered)
    }

    fn entry(&self, session_id: &str) -> Option<Arc<SessionEntry>> {
        let registry = self.registry.lock().ok()?;
        registry.get(session_id).cloned()
    }

    fn insert_entry(&self, record: SessionRecord) {
        let session_id = record.id.clone();
        let entry = Arc::new(SessionEntry {
            state: Mutex::new(SessionRuntimeState {
                record,
                transport: None,
                removed: false,
            }),
            send_lock: tokio::sync::Mutex::new(()),
        });
        if let Ok(mut registry) = self.registry.lock() {
            registry.insert(session_id, entry);
        }
    }

    fn spawn_session_loop(self: &Arc<Self>, session_id: String) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_session_loop(session_id).await;
        });
    }

    fn set_state(&self, entry: &SessionEntry, state: SessionState) {
        if let Ok(mut runtime) = entry.state.lock() {
            runtime.record.state = state;
            // A lapsed or consumed code must never linger on the record;
            // the next PairingCode event repopulates it.
            runtime.record.pairing_code = None;
        }
    }

    /// Waits out a reconnection backoff; returns false when the session
    /// was removed in the meantime and no new attempt may start.
    async fn backoff(&self, session_id: &str, delay_ms: u64) -> bool {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        match self.entry(session_id) {
            Some(entry) => entry
                .state
                .lock()
                .map(|state| !state.removed)
                .unwrap_or(false),
            None => false,
        }
    }

    async fn run_session_loop(self: Arc<Self>, session_id: String) {
        loop {
            let Some(entry) = self.entry(&session_id) else {
                break;
            };
            if entry.state.lock().map(|state| state.removed).unwrap_or(true) {
                break;
            }

            let handshake = match self
                .connector
                .connect(&session_id, Arc::clone(&self.credentials))
                .await
            {
                Ok(handshake) => handshake,
                Err(error) => {
                    eprintln!("session {session_id} handshake failed: {error:#}");
                    self.set_state(&entry, SessionState::Disconnected);
                    if !self.backoff(&session_id, self.config.reconnect_backoff_ms).await {
                        break;
                    }
                    self.set_state(&entry, SessionState::Connecting);
                    continue;
                }
            };

            if let Ok(mut state) = entry.state.lock() {
                state.transport = Some(Arc::clone(&handshake.transport));
            }

            let reason = self
                .consume_events(&entry, &session_id, handshake.events)
                .await;

            if let Ok(mut state) = entry.state.lock() {
                state.transport = None;
            }

            match reason {
                DisconnectReason::PairingExpired => {
                    println!("session {session_id} pairing code expired; reissuing");
                    self.set_state(&entry, SessionState::Pairing);
                    continue;
                }
                DisconnectReason::Conflict => {
                    eprintln!("session {session_id} superseded elsewhere; re-pairing after backoff");
                    // Only the corrupt artifact is dropped; metadata stays.
                    if let Err(error) = self.credentials.delete_artifact(&session_id) {
                        tracing::warn!(session_id, %error, "failed to delete credential artifact");
                    }
                    self.set_state(&entry, SessionState::Pairing);
                    if !self.backoff(&session_id, self.config.conflict_backoff_ms).await {
                        break;
                    }
                    continue;
                }
                DisconnectReason::LoggedOut => {
                    println!("session {session_id} logged out; a new session is required");
                    self.set_state(&entry, SessionState::Disconnected);
                    break;
                }
                DisconnectReason::Closed(detail) => {
                    eprintln!("session {session_id} transport closed: {detail}");
                    self.set_state(&entry, SessionState::Disconnected);
                    if !self.backoff(&session_id, self.config.reconnect_backoff_ms).await {
                        break;
                    }
                    self.set_state(&entry, SessionState::Connecting);
                    continue;
                }
            }
        }
    }

    async fn consume_events(
        &self,
        entry: &Arc<SessionEntry>,
        session_id: &str,
        mut events: tokio::sync::mpsc::Receiver<TransportEvent>,
    ) -> DisconnectReason {
        loop {
            match events.recv().await {
                Some(TransportEvent::PairingCode(code)) => {
                    if let Ok(mut state) = entry.state.lock() {
                        state.record.state = SessionState::Pairing;
                        state.record.pairing_code = Some(render_pairing_code(&code));
                    }
                }
                Some(TransportEvent::Connected(profile)) => {
                    println!("session {session_id} connected");
                    if let Ok(mut state) = entry.state.lock() {
                        state.record.state = SessionState::Connected;
                        state.record.pairing_code = None;
                        state.record.profile = Some(profile);
                    }
                }
                Some(TransportEvent::Inbound(message)) => {
                    if message.from_self {
                        continue;
                    }
                    self.dispatch_inbound(entry, session_id, message);
                }
                Some(TransportEvent::Disconnected(reason)) => return reason,
                None => return DisconnectReason::Closed("event stream ended".to_string()),
            }
        }
    }

    fn dispatch_inbound(
        &self,
        entry: &Arc<SessionEntry>,
        session_id: &str,
        message: crate::InboundTransportMessage,
    ) {
        let dispatcher = self
            .dispatcher
            .lock()
            .ok()
            .and_then(|slot| slot.clone());
        let Some(dispatcher) = dispatcher else {
            tracing::debug!(session_id, "no inbound dispatcher wired; dropping message");
            return;
        };
        let (tenant_id, account_id) = match entry.state.lock() {
            Ok(state) => (
                state.record.tenant_id.clone(),
                state.record.owner_account_id.clone(),
            ),
            Err(_) => return,
        };
        dispatcher.dispatch(InboundSessionMessage {
            session_id: session_id.to_string(),
            tenant_id,
            account_id,
            conversation_ref: conversation_ref_from_address(&message.raw_address),
            raw_address: message.raw_address,
            text: message.text,
        });
    }
}

/// Renders a raw pairing code into the displayable grouped form stored on
/// the session while pairing is in progress.
pub fn render_pairing_code(code: &str) -> String {
    let compact: Vec<char> = code.chars().filter(|ch| !ch.is_whitespace()).collect();
    compact
        .chunks(PAIRING_CODE_GROUP_SIZE)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<String>>()
        .join("-")
}
