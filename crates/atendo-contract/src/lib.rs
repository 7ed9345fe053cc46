//! Shared domain records and the caller-visible error taxonomy.
//!
//! Every crate in the workspace exchanges these types; stores persist them
//! verbatim as their wire form, so enum variants use stable snake_case
//! strings and additive `#[serde(default)]` fields.

mod error;
mod records;

pub use error::AtendoError;
pub use records::{
    conversation_ref_from_address, MessageDirection, MessageRecord, SessionProfile, SessionRecord,
    SessionState, SuggestionRecord, SuggestionStatus, TrustProfile,
};
