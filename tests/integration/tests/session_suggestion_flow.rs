//! End-to-end scenarios over the full stack: fake transport connector,
//! mocked (or unreachable) suggestion oracle, real stores on a temp dir,
//! and the HTTP gateway in front.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use atendo_contract::SessionProfile;
use atendo_engine::{
    FallbackSuggestionSource, LocalTemplateSource, RemoteOracleSource, SuggestionPipeline,
};
use atendo_gateway::{
    build_gateway_router, GatewayState, PipelineInboundDispatcher, SessionOutboundSender,
};
use atendo_session::{
    ChatTransport, CredentialStore, FileCredentialStore, InboundTransportMessage, SessionManager,
    SessionManagerConfig, TransportConnector, TransportEvent, TransportHandshake,
};
use atendo_store::{ConversationStore, SuggestionStore, TrustStore};

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, conversation_ref: &str, text: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((conversation_ref.to_string(), text.to_string()));
        Ok(())
    }

    async fn logout(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Pairs and connects instantly, then emits one scripted inbound customer
/// message. Senders are held so the event streams stay open.
struct ScriptedConnector {
    transport: Arc<RecordingTransport>,
    inbound_text: String,
    held_senders: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
}

impl ScriptedConnector {
    fn new(transport: Arc<RecordingTransport>, inbound_text: &str) -> Self {
        Self {
            transport,
            inbound_text: inbound_text.to_string(),
            held_senders: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn connect(
        &self,
        _session_id: &str,
        _credentials: Arc<dyn CredentialStore>,
    ) -> anyhow::Result<TransportHandshake> {
        let (sender, events) = mpsc::channel(16);
        sender
            .send(TransportEvent::PairingCode("WXYZ9876".to_string()))
            .await
            .ok();
        sender
            .send(TransportEvent::Connected(SessionProfile::default()))
            .await
            .ok();
        sender
            .send(TransportEvent::Inbound(InboundTransportMessage {
                raw_address: "5511999887766@chat.example.net/3EB0".to_string(),
                text: self.inbound_text.clone(),
                from_self: false,
            }))
            .await
            .ok();
        self.held_senders.lock().expect("held lock").push(sender);
        Ok(TransportHandshake {
            transport: self.transport.clone(),
            events,
        })
    }
}

struct Stack {
    _tempdir: tempfile::TempDir,
    base_url: String,
    client: reqwest::Client,
    transport: Arc<RecordingTransport>,
}

async fn spawn_stack(oracle_url: &str, inbound_text: &str) -> Stack {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let transport = Arc::new(RecordingTransport::default());
    let credentials = Arc::new(FileCredentialStore::new(tempdir.path()));
    let sessions = SessionManager::new(
        SessionManagerConfig {
            reconnect_backoff_ms: 40,
            conflict_backoff_ms: 60,
            recovery_stagger_ms: 5,
        },
        credentials,
        Arc::new(ScriptedConnector::new(transport.clone(), inbound_text)),
    );
    let conversations = Arc::new(ConversationStore::new(tempdir.path()));
    let suggestions = Arc::new(SuggestionStore::load(tempdir.path()).expect("suggestions"));
    let trust = Arc::new(TrustStore::load(tempdir.path()).expect("trust"));
    let source = Arc::new(FallbackSuggestionSource::new(
        Arc::new(RemoteOracleSource::new(oracle_url, 300)),
        Arc::new(LocalTemplateSource),
    ));
    let pipeline = Arc::new(SuggestionPipeline::new(
        conversations,
        suggestions,
        trust,
        source,
        Arc::new(SessionOutboundSender::new(sessions.clone())),
        10,
    ));
    sessions.set_inbound_dispatcher(Arc::new(PipelineInboundDispatcher::new(pipeline.clone())));

    let state = GatewayState { sessions, pipeline };
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
    tokio::spawn(async move {
        axum::serve(listener, build_gateway_router(state))
            .await
            .expect("serve");
    });
    Stack {
        _tempdir: tempdir,
        base_url,
        client: reqwest::Client::new(),
        transport,
    }
}

async fn wait_until<F>(mut condition: F, what: &str)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn post_json(stack: &Stack, path: &str, body: Value) -> reqwest::Response {
    stack
        .client
        .post(format!("{}{path}", stack.base_url))
        .json(&body)
        .send()
        .await
        .expect("post")
}

#[tokio::test]
async fn integration_trusted_inbound_message_is_auto_answered() {
    let oracle = httpmock::MockServer::start_async().await;
    oracle
        .mock_async(|when, then| {
            when.method(httpmock::Method::POST).path("/suggestions");
            then.status(200).json_body(json!({
                "text": "Atendemos de segunda a sexta, das 8h às 18h.",
                "confidence": 0.9
            }));
        })
        .await;
    let stack = spawn_stack(&oracle.base_url(), "Qual é o horário de atendimento?").await;

    // Trust the account before its session comes up.
    let toggled = post_json(
        &stack,
        "/accounts/a1/auto-respond",
        json!({ "tenant_id": "t1", "enabled": true }),
    )
    .await;
    assert!(toggled.status().is_success());

    let created: Value = post_json(
        &stack,
        "/sessions",
        json!({ "tenant_id": "t1", "owner_account_id": "a1" }),
    )
    .await
    .json()
    .await
    .expect("create json");
    let session_id = created["id"].as_str().expect("session id").to_string();

    wait_until(
        || {
            stack
                .transport
                .sent
                .lock()
                .expect("sent lock")
                .iter()
                .any(|(address, text)| {
                    address == "5511999887766@chat.example.net"
                        && text == "Atendemos de segunda a sexta, das 8h às 18h."
                })
        },
        "auto-sent reply on the session transport",
    )
    .await;

    // The suggestion reached a terminal status, so nothing is pending.
    let pending: Value = stack
        .client
        .get(format!(
            "{}/suggestions/pending?tenant_id=t1&account_id=a1",
            stack.base_url
        ))
        .send()
        .await
        .expect("pending")
        .json()
        .await
        .expect("pending json");
    assert!(pending.as_array().expect("array").is_empty());

    let session: Value = stack
        .client
        .get(format!("{}/sessions/{session_id}", stack.base_url))
        .send()
        .await
        .expect("session")
        .json()
        .await
        .expect("session json");
    assert_eq!(session["state"], "connected");
}

#[tokio::test]
async fn integration_unreachable_oracle_degrades_to_pending_fallback() {
    // Nothing listens on this port; every oracle call fails fast.
    let stack = spawn_stack("http://127.0.0.1:9", "irrelevant").await;

    let suggestion: Value = post_json(
        &stack,
        "/suggestions/inbound",
        json!({
            "tenant_id": "t1",
            "account_id": "a1",
            "conversation_ref": "5511999887766@chat.example.net",
            "text": "Qual é o horário de atendimento?"
        }),
    )
    .await
    .json()
    .await
    .expect("suggestion json");

    assert_eq!(suggestion["status"], "pending");
    let confidence = suggestion["confidence"].as_f64().expect("confidence");
    assert!(
        (confidence - 0.45).abs() < 1e-9 || (confidence - 0.5).abs() < 1e-9,
        "fallback confidence was {confidence}"
    );
    assert!(suggestion["suggested_text"]
        .as_str()
        .expect("text")
        .contains("Qual é o horário de atendimento?"));

    // A human approves the fallback text; trust advances to 0.5005.
    let suggestion_id = suggestion["id"].as_str().expect("suggestion id");
    let approved: Value = post_json(
        &stack,
        &format!("/suggestions/{suggestion_id}/approve"),
        json!({ "tenant_id": "t1" }),
    )
    .await
    .json()
    .await
    .expect("approve json");
    assert_eq!(approved["status"], "approved");

    let status: Value = stack
        .client
        .get(format!(
            "{}/accounts/a1/auto-respond?tenant_id=t1",
            stack.base_url
        ))
        .send()
        .await
        .expect("status")
        .json()
        .await
        .expect("status json");
    assert_eq!(status["total_approvals"], 1);
    let score = status["confidence_score"].as_f64().expect("score");
    assert!((score - 0.5005).abs() < 1e-9);
}

#[tokio::test]
async fn regression_untrusted_account_keeps_high_confidence_suggestions_pending() {
    let oracle = httpmock::MockServer::start_async().await;
    oracle
        .mock_async(|when, then| {
            when.method(httpmock::Method::POST).path("/suggestions");
            then.status(200)
                .json_body(json!({ "text": "Claro!", "confidence": 0.99 }));
        })
        .await;
    let stack = spawn_stack(&oracle.base_url(), "Oi, tudo bem?").await;

    let created: Value = post_json(
        &stack,
        "/sessions",
        json!({ "tenant_id": "t1", "owner_account_id": "a1" }),
    )
    .await
    .json()
    .await
    .expect("create json");
    assert_eq!(created["state"], "pairing");

    // The inbound message flows through the pipeline and lands as a
    // pending suggestion; nothing is ever transmitted.
    let url = format!(
        "{}/suggestions/pending?tenant_id=t1&account_id=a1",
        stack.base_url
    );
    let mut observed = false;
    for _ in 0..200 {
        let pending: Value = stack
            .client
            .get(&url)
            .send()
            .await
            .expect("pending")
            .json()
            .await
            .expect("pending json");
        if !pending.as_array().expect("array").is_empty() {
            observed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(observed, "pending suggestion never appeared");

    assert!(stack.transport.sent.lock().expect("sent lock").is_empty());
}
