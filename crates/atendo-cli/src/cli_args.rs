use std::path::PathBuf;

use clap::Parser;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "atendo",
    about = "Messaging session manager with suggestion-driven auto-response",
    version
)]
/// Public struct `Cli` used across Atendo components.
pub struct Cli {
    #[arg(
        long,
        env = "ATENDO_STATE_DIR",
        default_value = ".atendo",
        help = "Directory holding credential, conversation, suggestion, and trust state."
    )]
    pub state_dir: PathBuf,

    #[arg(
        long,
        env = "ATENDO_BIND",
        default_value = "127.0.0.1:4000",
        help = "Bind address for the HTTP gateway."
    )]
    pub bind: String,

    #[arg(
        long,
        env = "ATENDO_ORACLE_URL",
        default_value = "http://127.0.0.1:5000",
        help = "Base URL of the remote suggestion oracle."
    )]
    pub oracle_url: String,

    #[arg(
        long,
        env = "ATENDO_ORACLE_TIMEOUT_MS",
        default_value_t = 4_000,
        value_parser = parse_positive_u64,
        help = "Deadline for one oracle call; on overrun the local fallback answers."
    )]
    pub oracle_timeout_ms: u64,

    #[arg(
        long,
        env = "ATENDO_BRIDGE_URL",
        default_value = "http://127.0.0.1:4001",
        help = "Base URL of the messaging network bridge."
    )]
    pub bridge_url: String,

    #[arg(
        long,
        env = "ATENDO_RECONNECT_BACKOFF_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Backoff before reconnecting after an ordinary transport close."
    )]
    pub reconnect_backoff_ms: u64,

    #[arg(
        long,
        env = "ATENDO_CONFLICT_BACKOFF_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Backoff before re-pairing after a session-superseded conflict."
    )]
    pub conflict_backoff_ms: u64,

    #[arg(
        long,
        env = "ATENDO_RECOVERY_STAGGER_MS",
        default_value_t = 250,
        value_parser = parse_positive_u64,
        help = "Delay between session starts during startup recovery."
    )]
    pub recovery_stagger_ms: u64,

    #[arg(
        long,
        env = "ATENDO_CONTEXT_LIMIT",
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Maximum number of recent messages assembled into suggestion context."
    )]
    pub context_limit: usize,
}
