use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use atendo_contract::{
    AtendoError, MessageDirection, MessageRecord, SuggestionRecord, SuggestionStatus, TrustProfile,
};
use atendo_core::{current_unix_timestamp_ms, mint_id};
use atendo_store::{ConversationStore, SuggestionStore, TrustStore};

use crate::context::ContextAssembler;
use crate::intent::classify_intent;
use crate::source::{SuggestionPrompt, SuggestionSource};

/// Minimum confidence required before a suggestion may be sent without a
/// human in the loop.
pub const AUTO_RESPOND_CONFIDENCE_THRESHOLD: f64 = 0.70;
/// Ceiling of the approval-driven trust score.
pub const TRUST_CONFIDENCE_CAP: f64 = 0.95;
pub const DEFAULT_PENDING_LIMIT: usize = 20;

#[async_trait]
/// Trait contract for `OutboundSender` behavior. The pipeline never talks
/// to a transport directly; delivery goes through this seam.
pub trait OutboundSender: Send + Sync {
    async fn send_text(
        &self,
        session_id: &str,
        address: &str,
        text: &str,
    ) -> Result<(), AtendoError>;
}

#[derive(Debug, Clone, Deserialize)]
/// Public struct `InboundSuggestionRequest` used across Atendo components.
pub struct InboundSuggestionRequest {
    pub tenant_id: String,
    pub account_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub conversation_ref: String,
    #[serde(default)]
    pub raw_address: Option<String>,
    pub text: String,
}

/// Drives one inbound message from context assembly to a stored
/// suggestion, auto-sending when the trust gate allows it.
pub struct SuggestionPipeline {
    conversations: Arc<ConversationStore>,
    suggestions: Arc<SuggestionStore>,
    trust: Arc<TrustStore>,
    assembler: ContextAssembler,
    source: Arc<dyn SuggestionSource>,
    sender: Arc<dyn OutboundSender>,
    context_limit: usize,
}

impl SuggestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversations: Arc<ConversationStore>,
        suggestions: Arc<SuggestionStore>,
        trust: Arc<TrustStore>,
        source: Arc<dyn SuggestionSource>,
        sender: Arc<dyn OutboundSender>,
        context_limit: usize,
    ) -> Self {
        let assembler = ContextAssembler::new(conversations.clone());
        Self {
            conversations,
            suggestions,
            trust,
            assembler,
            source,
            sender,
            context_limit,
        }
    }

    /// Handles one inbound customer message end to end.
    ///
    /// The inbound message is persisted on every path, including source
    /// failures downstream of it, so the conversation log never loses
    /// customer text.
    pub async fn handle_inbound(
        &self,
        request: InboundSuggestionRequest,
    ) -> Result<SuggestionRecord, AtendoError> {
        validate_inbound(&request)?;

        let context = self
            .assembler
            .build_context(
                &request.tenant_id,
                &request.account_id,
                &request.conversation_ref,
                self.context_limit,
            )
            .map_err(AtendoError::storage)?;
        let intent = classify_intent(&request.text);

        let prompt = SuggestionPrompt {
            tenant_id: request.tenant_id.clone(),
            incoming_text: request.text.clone(),
            context_summary: context.summary.clone(),
            intent,
        };
        let draft = self
            .source
            .draft(&prompt)
            .await
            .map_err(|error| AtendoError::Transport(error.to_string()))?;

        let now = current_unix_timestamp_ms();
        let inbound = MessageRecord {
            id: mint_id("msg"),
            tenant_id: request.tenant_id.clone(),
            account_id: request.account_id.clone(),
            session_id: request.session_id.clone(),
            conversation_ref: request.conversation_ref.clone(),
            direction: MessageDirection::Received,
            text: request.text.clone(),
            metadata: json!({ "raw_address": request.raw_address }),
            created_unix_ms: now,
        };
        self.conversations
            .append(&inbound)
            .map_err(AtendoError::storage)?;

        let mut record = SuggestionRecord {
            id: mint_id("sug"),
            tenant_id: request.tenant_id.clone(),
            account_id: request.account_id.clone(),
            session_id: request.session_id.clone(),
            conversation_ref: request.conversation_ref.clone(),
            incoming_text: request.text.clone(),
            suggested_text: draft.text.clone(),
            approved_text: None,
            status: SuggestionStatus::Pending,
            confidence: draft.confidence,
            feedback: None,
            metadata: json!({ "source": draft.source, "intent": intent.as_str() }),
            created_unix_ms: now,
            updated_unix_ms: now,
        };
        self.suggestions
            .upsert(&record)
            .map_err(AtendoError::storage)?;

        if self.auto_send_allowed(&request, record.confidence)? {
            // The decision is committed before delivery is attempted: a
            // transport failure never turns an auto-sent suggestion back
            // into a pending one.
            record.status = SuggestionStatus::AutoSent;
            record.approved_text = Some(record.suggested_text.clone());
            record.metadata["auto_sent"] = json!(true);
            record.updated_unix_ms = current_unix_timestamp_ms();
            self.suggestions
                .upsert(&record)
                .map_err(AtendoError::storage)?;

            let outbound = MessageRecord {
                id: mint_id("msg"),
                tenant_id: record.tenant_id.clone(),
                account_id: record.account_id.clone(),
                session_id: record.session_id.clone(),
                conversation_ref: record.conversation_ref.clone(),
                direction: MessageDirection::Sent,
                text: record.suggested_text.clone(),
                metadata: json!({ "auto_sent": true, "suggestion_id": record.id }),
                created_unix_ms: record.updated_unix_ms,
            };
            self.conversations
                .append(&outbound)
                .map_err(AtendoError::storage)?;

            self.deliver(&record).await;
        }

        Ok(record)
    }

    /// Marks a pending suggestion approved, sends the approved text, and
    /// advances the account's trust score.
    pub async fn approve(
        &self,
        tenant_id: &str,
        suggestion_id: &str,
        approved_text: Option<String>,
    ) -> Result<SuggestionRecord, AtendoError> {
        let mut record = self.owned_suggestion(tenant_id, suggestion_id)?;
        if record.status.is_terminal() {
            return Err(AtendoError::Validation(format!(
                "suggestion {suggestion_id} is already {}",
                record.status.as_str()
            )));
        }

        let text = approved_text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| record.suggested_text.clone());
        record.status = SuggestionStatus::Approved;
        record.approved_text = Some(text.clone());
        record.updated_unix_ms = current_unix_timestamp_ms();
        self.suggestions
            .upsert(&record)
            .map_err(AtendoError::storage)?;

        let outbound = MessageRecord {
            id: mint_id("msg"),
            tenant_id: record.tenant_id.clone(),
            account_id: record.account_id.clone(),
            session_id: record.session_id.clone(),
            conversation_ref: record.conversation_ref.clone(),
            direction: MessageDirection::Sent,
            text,
            metadata: json!({ "suggestion_id": record.id }),
            created_unix_ms: record.updated_unix_ms,
        };
        self.conversations
            .append(&outbound)
            .map_err(AtendoError::storage)?;

        let mut profile = self
            .trust
            .get(&record.account_id)
            .map_err(AtendoError::storage)?
            .unwrap_or_else(|| TrustProfile::new(&record.account_id, &record.tenant_id));
        profile.total_approvals += 1;
        profile.confidence_score = trust_confidence(profile.total_approvals);
        self.trust.upsert(&profile).map_err(AtendoError::storage)?;

        self.deliver(&record).await;
        Ok(record)
    }

    /// Marks a pending suggestion rejected. Nothing is sent and the trust
    /// score does not move.
    pub fn reject(
        &self,
        tenant_id: &str,
        suggestion_id: &str,
        feedback: Option<String>,
    ) -> Result<SuggestionRecord, AtendoError> {
        let mut record = self.owned_suggestion(tenant_id, suggestion_id)?;
        if record.status.is_terminal() {
            return Err(AtendoError::Validation(format!(
                "suggestion {suggestion_id} is already {}",
                record.status.as_str()
            )));
        }
        record.status = SuggestionStatus::Rejected;
        record.feedback = feedback.filter(|feedback| !feedback.trim().is_empty());
        record.updated_unix_ms = current_unix_timestamp_ms();
        self.suggestions
            .upsert(&record)
            .map_err(AtendoError::storage)?;
        Ok(record)
    }

    /// Flips the auto-respond flag. The trust score is left untouched so
    /// a toggle cycle never resets earned trust.
    pub fn set_auto_respond(
        &self,
        tenant_id: &str,
        account_id: &str,
        enabled: bool,
    ) -> Result<TrustProfile, AtendoError> {
        let mut profile = self.owned_trust_profile(tenant_id, account_id)?;
        profile.auto_respond_enabled = enabled;
        self.trust.upsert(&profile).map_err(AtendoError::storage)?;
        Ok(profile)
    }

    pub fn auto_respond_status(
        &self,
        tenant_id: &str,
        account_id: &str,
    ) -> Result<TrustProfile, AtendoError> {
        self.owned_trust_profile(tenant_id, account_id)
    }

    pub fn pending_suggestions(
        &self,
        tenant_id: &str,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<SuggestionRecord>, AtendoError> {
        self.suggestions
            .pending_for_account(tenant_id, account_id, limit)
            .map_err(AtendoError::storage)
    }

    fn auto_send_allowed(
        &self,
        request: &InboundSuggestionRequest,
        confidence: f64,
    ) -> Result<bool, AtendoError> {
        // No live session means nothing to transmit on; the suggestion
        // stays pending for review.
        if request.session_id.is_none() {
            return Ok(false);
        }
        if confidence < AUTO_RESPOND_CONFIDENCE_THRESHOLD {
            return Ok(false);
        }
        let profile = self
            .trust
            .get(&request.account_id)
            .map_err(AtendoError::storage)?;
        Ok(profile
            .map(|profile| profile.auto_respond_enabled && profile.tenant_id == request.tenant_id)
            .unwrap_or(false))
    }

    /// Best-effort delivery of a resolved suggestion. The stored decision
    /// is already final; a transport failure is logged, not propagated.
    async fn deliver(&self, record: &SuggestionRecord) {
        let Some(session_id) = record.session_id.as_deref() else {
            return;
        };
        let text = record
            .approved_text
            .as_deref()
            .unwrap_or(&record.suggested_text);
        if let Err(error) = self
            .sender
            .send_text(session_id, &record.conversation_ref, text)
            .await
        {
            tracing::warn!(
                suggestion_id = %record.id,
                session_id,
                %error,
                "failed to deliver resolved suggestion"
            );
        }
    }

    fn owned_suggestion(
        &self,
        tenant_id: &str,
        suggestion_id: &str,
    ) -> Result<SuggestionRecord, AtendoError> {
        let record = self
            .suggestions
            .get(suggestion_id)
            .map_err(AtendoError::storage)?
            .ok_or_else(|| AtendoError::NotFound(format!("suggestion {suggestion_id}")))?;
        if record.tenant_id != tenant_id {
            return Err(AtendoError::Unauthorized(format!(
                "suggestion {suggestion_id} belongs to another tenant"
            )));
        }
        Ok(record)
    }

    fn owned_trust_profile(
        &self,
        tenant_id: &str,
        account_id: &str,
    ) -> Result<TrustProfile, AtendoError> {
        match self.trust.get(account_id).map_err(AtendoError::storage)? {
            Some(profile) if profile.tenant_id != tenant_id => Err(AtendoError::Unauthorized(
                format!("account {account_id} belongs to another tenant"),
            )),
            Some(profile) => Ok(profile),
            None => Ok(TrustProfile::new(account_id, tenant_id)),
        }
    }
}

fn validate_inbound(request: &InboundSuggestionRequest) -> Result<(), AtendoError> {
    for (field, value) in [
        ("tenant_id", &request.tenant_id),
        ("account_id", &request.account_id),
        ("conversation_ref", &request.conversation_ref),
        ("text", &request.text),
    ] {
        if value.trim().is_empty() {
            return Err(AtendoError::Validation(format!("{field} must not be empty")));
        }
    }
    Ok(())
}

/// Trust grows by half a basis point of confidence per approval, capped.
fn trust_confidence(total_approvals: u64) -> f64 {
    let earned = 0.5 + (total_approvals as f64) * 0.05 / 100.0;
    earned.min(TRUST_CONFIDENCE_CAP)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::source::{OracleError, SuggestionDraft};

    struct FixedSource {
        text: String,
        confidence: f64,
    }

    #[async_trait]
    impl SuggestionSource for FixedSource {
        async fn draft(&self, _prompt: &SuggestionPrompt) -> Result<SuggestionDraft, OracleError> {
            Ok(SuggestionDraft {
                text: self.text.clone(),
                confidence: self.confidence,
                source: "oracle",
            })
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl OutboundSender for RecordingSender {
        async fn send_text(
            &self,
            session_id: &str,
            address: &str,
            text: &str,
        ) -> Result<(), AtendoError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AtendoError::Transport("link down".to_string()));
            }
            self.sent.lock().expect("sent lock").push((
                session_id.to_string(),
                address.to_string(),
                text.to_string(),
            ));
            Ok(())
        }
    }

    struct Harness {
        _tempdir: tempfile::TempDir,
        pipeline: SuggestionPipeline,
        sender: Arc<RecordingSender>,
        conversations: Arc<ConversationStore>,
        trust: Arc<TrustStore>,
    }

    fn harness(confidence: f64) -> Harness {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let conversations = Arc::new(ConversationStore::new(tempdir.path()));
        let suggestions = Arc::new(SuggestionStore::load(tempdir.path()).expect("suggestions"));
        let trust = Arc::new(TrustStore::load(tempdir.path()).expect("trust"));
        let sender = Arc::new(RecordingSender::default());
        let pipeline = SuggestionPipeline::new(
            conversations.clone(),
            suggestions,
            trust.clone(),
            Arc::new(FixedSource {
                text: "Claro! Atendemos das 8h às 18h.".to_string(),
                confidence,
            }),
            sender.clone(),
            10,
        );
        Harness {
            _tempdir: tempdir,
            pipeline,
            sender,
            conversations,
            trust,
        }
    }

    fn inbound_request() -> InboundSuggestionRequest {
        InboundSuggestionRequest {
            tenant_id: "t1".to_string(),
            account_id: "a1".to_string(),
            session_id: Some("sess_1".to_string()),
            conversation_ref: "5511999887766@chat.example.net".to_string(),
            raw_address: Some("5511999887766@chat.example.net/3EB0".to_string()),
            text: "Qual é o horário de atendimento?".to_string(),
        }
    }

    fn enable_auto_respond(harness: &Harness) {
        harness
            .pipeline
            .set_auto_respond("t1", "a1", true)
            .expect("toggle");
    }

    #[tokio::test]
    async fn functional_inbound_yields_pending_suggestion_and_persists_message() {
        let harness = harness(0.9);
        let record = harness
            .pipeline
            .handle_inbound(inbound_request())
            .await
            .expect("handle");
        assert_eq!(record.status, SuggestionStatus::Pending);
        assert!((record.confidence - 0.9).abs() < 1e-9);
        assert_eq!(record.metadata["intent"], "hours");

        let messages = harness
            .conversations
            .recent("t1", "a1", "5511999887766@chat.example.net", 10)
            .expect("recent");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, MessageDirection::Received);
        assert!(harness.sender.sent.lock().expect("sent lock").is_empty());
    }

    #[tokio::test]
    async fn functional_auto_send_fires_at_threshold() {
        let harness = harness(AUTO_RESPOND_CONFIDENCE_THRESHOLD);
        enable_auto_respond(&harness);

        let record = harness
            .pipeline
            .handle_inbound(inbound_request())
            .await
            .expect("handle");
        assert_eq!(record.status, SuggestionStatus::AutoSent);
        assert_eq!(record.approved_text.as_deref(), Some(record.suggested_text.as_str()));
        assert_eq!(record.metadata["auto_sent"], true);

        let sent = harness.sender.sent.lock().expect("sent lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "sess_1");

        let messages = harness
            .conversations
            .recent("t1", "a1", "5511999887766@chat.example.net", 10)
            .expect("recent");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].direction, MessageDirection::Sent);
        assert_eq!(messages[1].metadata["auto_sent"], true);
    }

    #[tokio::test]
    async fn regression_auto_send_stays_pending_just_below_threshold() {
        let harness = harness(0.69);
        enable_auto_respond(&harness);

        let record = harness
            .pipeline
            .handle_inbound(inbound_request())
            .await
            .expect("handle");
        assert_eq!(record.status, SuggestionStatus::Pending);
        assert!(harness.sender.sent.lock().expect("sent lock").is_empty());
    }

    #[tokio::test]
    async fn regression_sessionless_ingress_stays_pending_even_when_trusted() {
        let harness = harness(0.9);
        enable_auto_respond(&harness);

        let mut request = inbound_request();
        request.session_id = None;
        let record = harness
            .pipeline
            .handle_inbound(request)
            .await
            .expect("handle");
        assert_eq!(record.status, SuggestionStatus::Pending);
        assert!(harness.sender.sent.lock().expect("sent lock").is_empty());
    }

    #[tokio::test]
    async fn regression_auto_send_requires_enabled_profile() {
        let harness = harness(0.99);
        let record = harness
            .pipeline
            .handle_inbound(inbound_request())
            .await
            .expect("handle");
        assert_eq!(record.status, SuggestionStatus::Pending);
    }

    #[tokio::test]
    async fn regression_delivery_failure_never_reverts_auto_sent() {
        let harness = harness(0.9);
        enable_auto_respond(&harness);
        harness.sender.fail.store(true, Ordering::SeqCst);

        let record = harness
            .pipeline
            .handle_inbound(inbound_request())
            .await
            .expect("handle");
        assert_eq!(record.status, SuggestionStatus::AutoSent);
        let stored = harness
            .pipeline
            .pending_suggestions("t1", "a1", DEFAULT_PENDING_LIMIT)
            .expect("pending");
        assert!(stored.is_empty(), "auto-sent suggestion must not stay pending");
    }

    #[tokio::test]
    async fn functional_approval_sends_and_advances_trust() {
        let harness = harness(0.5);
        let record = harness
            .pipeline
            .handle_inbound(inbound_request())
            .await
            .expect("handle");

        let approved = harness
            .pipeline
            .approve("t1", &record.id, Some("Atendemos das 9h às 17h.".to_string()))
            .await
            .expect("approve");
        assert_eq!(approved.status, SuggestionStatus::Approved);
        assert_eq!(approved.approved_text.as_deref(), Some("Atendemos das 9h às 17h."));

        let profile = harness.trust.get("a1").expect("get").expect("profile");
        assert_eq!(profile.total_approvals, 1);
        assert!((profile.confidence_score - 0.5005).abs() < 1e-9);

        let sent = harness.sender.sent.lock().expect("sent lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].2, "Atendemos das 9h às 17h.");
    }

    #[tokio::test]
    async fn functional_trust_score_caps_at_ceiling() {
        assert!((trust_confidence(1) - 0.5005).abs() < 1e-12);
        assert!((trust_confidence(100) - 0.55).abs() < 1e-12);
        assert!((trust_confidence(900) - TRUST_CONFIDENCE_CAP).abs() < 1e-12);
        assert!((trust_confidence(10_000) - TRUST_CONFIDENCE_CAP).abs() < 1e-12);
    }

    #[tokio::test]
    async fn functional_reject_and_toggle_never_move_trust_score() {
        let harness = harness(0.5);
        let record = harness
            .pipeline
            .handle_inbound(inbound_request())
            .await
            .expect("handle");

        let rejected = harness
            .pipeline
            .reject("t1", &record.id, Some("tom errado".to_string()))
            .expect("reject");
        assert_eq!(rejected.status, SuggestionStatus::Rejected);
        assert_eq!(rejected.feedback.as_deref(), Some("tom errado"));

        harness
            .pipeline
            .set_auto_respond("t1", "a1", true)
            .expect("enable");
        harness
            .pipeline
            .set_auto_respond("t1", "a1", false)
            .expect("disable");

        let profile = harness
            .pipeline
            .auto_respond_status("t1", "a1")
            .expect("status");
        assert_eq!(profile.total_approvals, 0);
        assert!((profile.confidence_score - 0.0).abs() < 1e-12);
        assert!(!profile.auto_respond_enabled);
    }

    #[tokio::test]
    async fn regression_resolved_suggestion_cannot_be_resolved_again() {
        let harness = harness(0.5);
        let record = harness
            .pipeline
            .handle_inbound(inbound_request())
            .await
            .expect("handle");
        harness
            .pipeline
            .approve("t1", &record.id, None)
            .await
            .expect("approve");

        let error = harness
            .pipeline
            .reject("t1", &record.id, None)
            .expect_err("terminal");
        assert!(matches!(error, AtendoError::Validation(_)));
        let error = harness
            .pipeline
            .approve("t1", &record.id, None)
            .await
            .expect_err("terminal");
        assert!(matches!(error, AtendoError::Validation(_)));
    }

    #[tokio::test]
    async fn regression_cross_tenant_access_is_unauthorized() {
        let harness = harness(0.5);
        let record = harness
            .pipeline
            .handle_inbound(inbound_request())
            .await
            .expect("handle");

        let error = harness
            .pipeline
            .approve("t2", &record.id, None)
            .await
            .expect_err("foreign tenant");
        assert!(matches!(error, AtendoError::Unauthorized(_)));
        let error = harness
            .pipeline
            .reject("t2", &record.id, None)
            .expect_err("foreign tenant");
        assert!(matches!(error, AtendoError::Unauthorized(_)));

        harness
            .pipeline
            .set_auto_respond("t1", "a1", true)
            .expect("claim profile");
        let error = harness
            .pipeline
            .set_auto_respond("t2", "a1", true)
            .expect_err("foreign tenant");
        assert!(matches!(error, AtendoError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn regression_blank_fields_are_rejected_before_any_write() {
        let harness = harness(0.5);
        let mut request = inbound_request();
        request.text = "   ".to_string();
        let error = harness
            .pipeline
            .handle_inbound(request)
            .await
            .expect_err("validation");
        assert!(matches!(error, AtendoError::Validation(_)));
        assert!(harness
            .conversations
            .recent("t1", "a1", "5511999887766@chat.example.net", 10)
            .expect("recent")
            .is_empty());
    }
}
