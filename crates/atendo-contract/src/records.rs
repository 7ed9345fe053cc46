use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `SessionState` values.
pub enum SessionState {
    Disconnected,
    Pairing,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Pairing => "pairing",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Profile details the messaging network reports for a connected account.
pub struct SessionProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub network_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `SessionRecord` used across Atendo components.
///
/// One record per physical connected account. The id is stable across
/// reconnects and is the join key used by messages and suggestions.
pub struct SessionRecord {
    pub id: String,
    pub owner_account_id: String,
    pub tenant_id: String,
    pub state: SessionState,
    #[serde(default)]
    pub pairing_code: Option<String>,
    pub created_unix_ms: u64,
    #[serde(default)]
    pub profile: Option<SessionProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MessageDirection` values.
pub enum MessageDirection {
    Received,
    Sent,
}

impl MessageDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Sent => "sent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `MessageRecord` used across Atendo components.
///
/// Immutable once written; ordered by `created_unix_ms` with ties broken
/// by insertion order in the conversation log.
pub struct MessageRecord {
    pub id: String,
    pub tenant_id: String,
    pub account_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub conversation_ref: String,
    pub direction: MessageDirection,
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_unix_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `SuggestionStatus` values.
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
    AutoSent,
}

impl SuggestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::AutoSent => "auto_sent",
        }
    }

    /// A suggestion reaches exactly one terminal status once.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `SuggestionRecord` used across Atendo components.
pub struct SuggestionRecord {
    pub id: String,
    pub tenant_id: String,
    pub account_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub conversation_ref: String,
    pub incoming_text: String,
    pub suggested_text: String,
    #[serde(default)]
    pub approved_text: Option<String>,
    pub status: SuggestionStatus,
    pub confidence: f64,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub created_unix_ms: u64,
    pub updated_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Per-account trust state mutated only by human approval decisions.
///
/// `tenant_id` is carried so ownership checks on toggle/status work
/// without consulting the out-of-scope tenant/user store.
pub struct TrustProfile {
    pub account_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub auto_respond_enabled: bool,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub total_approvals: u64,
}

impl TrustProfile {
    pub fn new(account_id: &str, tenant_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            tenant_id: tenant_id.to_string(),
            auto_respond_enabled: false,
            confidence_score: 0.0,
            total_approvals: 0,
        }
    }
}

/// Derives the opaque stable conversation reference from a counterpart's
/// raw network address.
///
/// Device suffixes (`/device`) and resource hints (`:resource`) vary per
/// login, so they are stripped before the address is normalized.
pub fn conversation_ref_from_address(raw_address: &str) -> String {
    let trimmed = raw_address.trim();
    let without_device = trimmed.split('/').next().unwrap_or(trimmed);
    let without_resource = without_device.split(':').next().unwrap_or(without_device);
    without_resource.to_ascii_lowercase()
}
