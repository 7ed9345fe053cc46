//! HTTP surface over the session manager and the suggestion pipeline.
//!
//! Thin handlers: parse, delegate, map the error taxonomy to status
//! codes. The gateway also hosts the two adapters that close the loop
//! between the session layer and the pipeline.

mod adapters;
mod router;

pub use adapters::{PipelineInboundDispatcher, SessionOutboundSender};
pub use router::{
    build_gateway_router, run_gateway_server, GatewayState, ACCOUNT_AUTO_RESPOND_ENDPOINT,
    HEALTH_ENDPOINT, SESSIONS_ENDPOINT, SESSION_ENDPOINT, SESSION_SEND_ENDPOINT,
    SUGGESTIONS_INBOUND_ENDPOINT, SUGGESTIONS_PENDING_ENDPOINT, SUGGESTION_APPROVE_ENDPOINT,
    SUGGESTION_REJECT_ENDPOINT,
};
