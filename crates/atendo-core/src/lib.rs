//! Foundational low-level utilities shared across Atendo crates.
//!
//! Provides atomic file-write helpers, unix-time utilities, and identifier
//! helpers used by session state, store persistence, and fallback selection.

pub mod atomic_io;
pub mod ids;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use ids::{deterministic_pick, mint_id, sanitize_for_path};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
