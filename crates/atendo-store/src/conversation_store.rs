use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};

use atendo_contract::MessageRecord;
use atendo_core::sanitize_for_path;

/// Append-only log of inbound/outbound message records.
///
/// One JSONL file per (tenant, account); queries filter by conversation
/// reference. File order is the insertion-order tiebreak for records that
/// share a timestamp.
pub struct ConversationStore {
    log_dir: PathBuf,
    append_lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            log_dir: state_dir.join("conversations"),
            append_lock: Mutex::new(()),
        }
    }

    fn log_path(&self, tenant_id: &str, account_id: &str) -> PathBuf {
        self.log_dir.join(format!(
            "{}--{}.jsonl",
            sanitize_for_path(tenant_id),
            sanitize_for_path(account_id)
        ))
    }

    pub fn append(&self, record: &MessageRecord) -> Result<()> {
        let path = self.log_path(&record.tenant_id, &record.account_id);
        let line = serde_json::to_string(record).context("failed to serialize message record")?;
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| anyhow!("conversation append lock poisoned"))?;
        std::fs::create_dir_all(&self.log_dir)
            .with_context(|| format!("failed to create {}", self.log_dir.display()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open conversation log {}", path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to conversation log {}", path.display()))?;
        Ok(())
    }

    /// Returns the newest `limit` messages for the scope in chronological
    /// order (oldest first). Timestamps are strictly non-decreasing in the
    /// returned slice.
    pub fn recent(
        &self,
        tenant_id: &str,
        account_id: &str,
        conversation_ref: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let path = self.log_path(tenant_id, account_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read conversation log {}", path.display()))?;
        let mut matching: Vec<MessageRecord> = Vec::new();
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: MessageRecord = serde_json::from_str(trimmed)
                .with_context(|| format!("corrupt conversation log {}", path.display()))?;
            if record.tenant_id == tenant_id
                && record.account_id == account_id
                && record.conversation_ref == conversation_ref
            {
                matching.push(record);
            }
        }
        // Stable sort keeps file (insertion) order for equal timestamps.
        matching.sort_by_key(|record| record.created_unix_ms);
        if matching.len() > limit {
            let keep_from = matching.len() - limit;
            matching.drain(0..keep_from);
        }
        Ok(matching)
    }
}
