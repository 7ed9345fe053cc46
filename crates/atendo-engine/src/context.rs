use std::sync::Arc;

use anyhow::Result;

use atendo_contract::MessageRecord;
use atendo_store::ConversationStore;

pub const DEFAULT_CONTEXT_LIMIT: usize = 10;
/// Sentinel summary used when a conversation has no recorded history.
pub const EMPTY_CONTEXT_SUMMARY: &str = "Nenhuma mensagem anterior";

#[derive(Debug, Clone)]
/// Bounded recent-history view of one conversation.
pub struct ConversationContext {
    pub messages: Vec<MessageRecord>,
    pub summary: String,
}

/// Pure read over the conversation store; no side effects.
pub struct ContextAssembler {
    store: Arc<ConversationStore>,
}

impl ContextAssembler {
    pub fn new(store: Arc<ConversationStore>) -> Self {
        Self { store }
    }

    /// Builds a chronological transcript of the most recent `limit`
    /// messages rendered as `DIRECTION: text` lines.
    pub fn build_context(
        &self,
        tenant_id: &str,
        account_id: &str,
        conversation_ref: &str,
        limit: usize,
    ) -> Result<ConversationContext> {
        let messages = self
            .store
            .recent(tenant_id, account_id, conversation_ref, limit)?;
        let summary = if messages.is_empty() {
            EMPTY_CONTEXT_SUMMARY.to_string()
        } else {
            messages
                .iter()
                .map(|message| {
                    format!(
                        "{}: {}",
                        message.direction.as_str().to_uppercase(),
                        message.text
                    )
                })
                .collect::<Vec<String>>()
                .join("\n")
        };
        Ok(ConversationContext { messages, summary })
    }
}
