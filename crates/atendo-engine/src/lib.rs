//! Inbound-message decision pipeline.
//!
//! Context assembly → reply suggestion → confidence-gated auto-send →
//! feedback-driven trust update. The suggestion source is a capability:
//! one remote oracle, one local templated generator, composed by a
//! fallback decorator so oracle failures always degrade to a usable
//! suggestion instead of surfacing.

mod context;
mod intent;
mod pipeline;
mod source;

pub use context::{ContextAssembler, ConversationContext, DEFAULT_CONTEXT_LIMIT, EMPTY_CONTEXT_SUMMARY};
pub use intent::{classify_intent, MessageIntent};
pub use pipeline::{
    InboundSuggestionRequest, OutboundSender, SuggestionPipeline,
    AUTO_RESPOND_CONFIDENCE_THRESHOLD, DEFAULT_PENDING_LIMIT, TRUST_CONFIDENCE_CAP,
};
pub use source::{
    FallbackSuggestionSource, LocalTemplateSource, OracleError, RemoteOracleSource,
    SuggestionDraft, SuggestionPrompt, SuggestionSource, FALLBACK_ERROR_CONFIDENCE,
    FALLBACK_TIMEOUT_CONFIDENCE, INCOMING_ECHO_MAX_CHARS, ORACLE_DEFAULT_CONFIDENCE,
};
