use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use atendo_contract::{SuggestionRecord, SuggestionStatus};
use atendo_core::write_text_atomic;

pub const SUGGESTION_STORE_FILE_NAME: &str = "suggestions.json";
const SUGGESTION_STORE_SCHEMA_VERSION: u32 = 1;

fn suggestion_store_schema_version() -> u32 {
    SUGGESTION_STORE_SCHEMA_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SuggestionStoreState {
    #[serde(default = "suggestion_store_schema_version")]
    schema_version: u32,
    #[serde(default)]
    suggestions: BTreeMap<String, SuggestionRecord>,
}

impl Default for SuggestionStoreState {
    fn default() -> Self {
        Self {
            schema_version: SUGGESTION_STORE_SCHEMA_VERSION,
            suggestions: BTreeMap::new(),
        }
    }
}

/// Keyed snapshot store for suggestion records; last write wins.
pub struct SuggestionStore {
    path: PathBuf,
    state: Mutex<SuggestionStoreState>,
}

impl SuggestionStore {
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(SUGGESTION_STORE_FILE_NAME);
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read suggestion store {}", path.display()))?;
            let state: SuggestionStoreState = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse suggestion store {}", path.display()))?;
            if state.schema_version != SUGGESTION_STORE_SCHEMA_VERSION {
                bail!(
                    "unsupported suggestion store schema: expected {}, found {}",
                    SUGGESTION_STORE_SCHEMA_VERSION,
                    state.schema_version
                );
            }
            state
        } else {
            SuggestionStoreState::default()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn upsert(&self, record: &SuggestionRecord) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("suggestion store lock poisoned"))?;
        state.suggestions.insert(record.id.clone(), record.clone());
        self.persist_locked(&state)
    }

    pub fn get(&self, suggestion_id: &str) -> Result<Option<SuggestionRecord>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("suggestion store lock poisoned"))?;
        Ok(state.suggestions.get(suggestion_id).cloned())
    }

    /// Pending suggestions for one tenant+account, newest first.
    pub fn pending_for_account(
        &self,
        tenant_id: &str,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<SuggestionRecord>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("suggestion store lock poisoned"))?;
        let mut pending: Vec<SuggestionRecord> = state
            .suggestions
            .values()
            .filter(|record| {
                record.status == SuggestionStatus::Pending
                    && record.tenant_id == tenant_id
                    && record.account_id == account_id
            })
            .cloned()
            .collect();
        pending.sort_by(|left, right| right.created_unix_ms.cmp(&left.created_unix_ms));
        pending.truncate(limit);
        Ok(pending)
    }

    fn persist_locked(&self, state: &SuggestionStoreState) -> Result<()> {
        let serialized = serde_json::to_string_pretty(state)
            .context("failed to serialize suggestion store state")?;
        write_text_atomic(&self.path, &serialized)
    }
}
