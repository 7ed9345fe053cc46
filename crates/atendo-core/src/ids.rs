use std::sync::atomic::{AtomicU64, Ordering};

use crate::time_utils::current_unix_timestamp_ms;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static PICK_COUNTER: AtomicU64 = AtomicU64::new(1);

fn mix(seed: u64) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17) ^ 0xA24B_AED4_963E_E407
}

/// Mints a process-unique identifier such as `sess_00a1b2c3d4e5f607`.
///
/// Combines a monotonic counter with the current time so identifiers stay
/// unique within a process and unlikely to collide across restarts.
pub fn mint_id(prefix: &str) -> String {
    let sequence = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = mix(sequence ^ current_unix_timestamp_ms().rotate_left(23));
    format!("{prefix}_{mixed:016x}")
}

/// Deterministic selector over `0..options`.
///
/// Counter-seeded so repeated calls spread evenly across options without
/// pulling in a random-number dependency.
pub fn deterministic_pick(options: usize) -> usize {
    if options <= 1 {
        return 0;
    }
    let seed = PICK_COUNTER.fetch_add(1, Ordering::Relaxed);
    (mix(seed) % options as u64) as usize
}

/// Reduces an arbitrary identifier to a filesystem-safe directory/file name.
pub fn sanitize_for_path(raw: &str) -> String {
    let sanitized: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    if sanitized.is_empty() {
        return "unnamed".to_string();
    }
    sanitized
}
