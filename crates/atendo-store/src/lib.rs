//! File-backed stores for conversation history, suggestions, and trust.
//!
//! Conversation logs are append-only JSONL files per tenant+account so
//! writers never cross tenant boundaries. Suggestion and trust state are
//! schema-versioned JSON snapshots rewritten atomically; concurrent
//! updates to one record resolve last-write-wins.

mod conversation_store;
mod suggestion_store;
mod trust_store;

pub use conversation_store::ConversationStore;
pub use suggestion_store::{SuggestionStore, SUGGESTION_STORE_FILE_NAME};
pub use trust_store::{TrustStore, TRUST_STORE_FILE_NAME};
