use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};

static STAGE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Replaces `path` with `content` so readers only ever observe the old or
/// the new version: the content is staged into a `.part` sibling, flushed
/// to disk, then renamed over the destination.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        bail!("'{}' is not a writable file path", path.display());
    };
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let staged_path = stage_path_for(path, file_name);
    let written = stage_content(&staged_path, content).and_then(|_| {
        fs::rename(&staged_path, path)
            .with_context(|| format!("failed to move staged file over {}", path.display()))
    });
    if written.is_err() {
        // A failed write must not leave a .part file next to the state.
        let _ = fs::remove_file(&staged_path);
    }
    written
}

fn stage_path_for(path: &Path, file_name: &str) -> PathBuf {
    let sequence = STAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let staged_name = format!("{file_name}.{}-{sequence}.part", std::process::id());
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(staged_name),
        _ => PathBuf::from(staged_name),
    }
}

fn stage_content(staged_path: &Path, content: &str) -> Result<()> {
    let mut staged = File::create(staged_path)
        .with_context(|| format!("failed to stage {}", staged_path.display()))?;
    staged
        .write_all(content.as_bytes())
        .with_context(|| format!("failed to write staged file {}", staged_path.display()))?;
    staged
        .sync_all()
        .with_context(|| format!("failed to flush staged file {}", staged_path.display()))
}
