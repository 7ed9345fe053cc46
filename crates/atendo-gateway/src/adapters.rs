use std::sync::Arc;

use async_trait::async_trait;

use atendo_contract::AtendoError;
use atendo_engine::{InboundSuggestionRequest, OutboundSender, SuggestionPipeline};
use atendo_session::{InboundDispatcher, InboundSessionMessage, SessionManager};

/// Routes pipeline-resolved replies out through the owning session.
pub struct SessionOutboundSender {
    sessions: Arc<SessionManager>,
}

impl SessionOutboundSender {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl OutboundSender for SessionOutboundSender {
    async fn send_text(
        &self,
        session_id: &str,
        address: &str,
        text: &str,
    ) -> Result<(), AtendoError> {
        self.sessions.send(session_id, address, text).await
    }
}

/// Hands inbound session messages to the pipeline on a fresh task so the
/// transport event loop never waits on the oracle or storage.
pub struct PipelineInboundDispatcher {
    pipeline: Arc<SuggestionPipeline>,
}

impl PipelineInboundDispatcher {
    pub fn new(pipeline: Arc<SuggestionPipeline>) -> Self {
        Self { pipeline }
    }
}

impl InboundDispatcher for PipelineInboundDispatcher {
    fn dispatch(&self, inbound: InboundSessionMessage) {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            let request = InboundSuggestionRequest {
                tenant_id: inbound.tenant_id,
                account_id: inbound.account_id,
                session_id: Some(inbound.session_id.clone()),
                conversation_ref: inbound.conversation_ref,
                raw_address: Some(inbound.raw_address),
                text: inbound.text,
            };
            if let Err(error) = pipeline.handle_inbound(request).await {
                tracing::warn!(
                    session_id = %inbound.session_id,
                    %error,
                    "inbound message pipeline failed"
                );
            }
        });
    }
}
