use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use atendo_contract::TrustProfile;
use atendo_core::write_text_atomic;

pub const TRUST_STORE_FILE_NAME: &str = "trust-profiles.json";
const TRUST_STORE_SCHEMA_VERSION: u32 = 1;

fn trust_store_schema_version() -> u32 {
    TRUST_STORE_SCHEMA_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrustStoreState {
    #[serde(default = "trust_store_schema_version")]
    schema_version: u32,
    #[serde(default)]
    profiles: BTreeMap<String, TrustProfile>,
}

impl Default for TrustStoreState {
    fn default() -> Self {
        Self {
            schema_version: TRUST_STORE_SCHEMA_VERSION,
            profiles: BTreeMap::new(),
        }
    }
}

/// Per-account trust profiles keyed by account id.
pub struct TrustStore {
    path: PathBuf,
    state: Mutex<TrustStoreState>,
}

impl TrustStore {
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(TRUST_STORE_FILE_NAME);
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read trust store {}", path.display()))?;
            let state: TrustStoreState = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse trust store {}", path.display()))?;
            if state.schema_version != TRUST_STORE_SCHEMA_VERSION {
                bail!(
                    "unsupported trust store schema: expected {}, found {}",
                    TRUST_STORE_SCHEMA_VERSION,
                    state.schema_version
                );
            }
            state
        } else {
            TrustStoreState::default()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn get(&self, account_id: &str) -> Result<Option<TrustProfile>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("trust store lock poisoned"))?;
        Ok(state.profiles.get(account_id).cloned())
    }

    pub fn upsert(&self, profile: &TrustProfile) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("trust store lock poisoned"))?;
        state
            .profiles
            .insert(profile.account_id.clone(), profile.clone());
        let serialized =
            serde_json::to_string_pretty(&*state).context("failed to serialize trust store")?;
        write_text_atomic(&self.path, &serialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functional_upsert_round_trips_across_reload() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let store = TrustStore::load(tempdir.path()).expect("load");
        let mut profile = TrustProfile::new("a1", "t1");
        profile.auto_respond_enabled = true;
        profile.confidence_score = 0.5005;
        profile.total_approvals = 1;
        store.upsert(&profile).expect("upsert");

        let reloaded = TrustStore::load(tempdir.path()).expect("reload");
        let fetched = reloaded.get("a1").expect("get").expect("present");
        assert_eq!(fetched, profile);
        assert!(reloaded.get("missing").expect("get").is_none());
    }
}
