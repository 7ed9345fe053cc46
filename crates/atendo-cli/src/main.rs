//! Process entry point: argument parsing, tracing, wiring, recovery,
//! gateway serve loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use atendo_engine::{
    FallbackSuggestionSource, LocalTemplateSource, RemoteOracleSource, SuggestionPipeline,
};
use atendo_gateway::{
    run_gateway_server, GatewayState, PipelineInboundDispatcher, SessionOutboundSender,
};
use atendo_session::{
    FileCredentialStore, HttpBridgeConnector, SessionManager, SessionManagerConfig,
};
use atendo_store::{ConversationStore, SuggestionStore, TrustStore};

mod cli_args;

use cli_args::Cli;

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    std::fs::create_dir_all(&cli.state_dir)
        .with_context(|| format!("failed to create state dir {}", cli.state_dir.display()))?;

    let credentials = Arc::new(FileCredentialStore::new(&cli.state_dir));
    let connector = Arc::new(HttpBridgeConnector::new(&cli.bridge_url));
    let sessions = SessionManager::new(
        SessionManagerConfig {
            reconnect_backoff_ms: cli.reconnect_backoff_ms,
            conflict_backoff_ms: cli.conflict_backoff_ms,
            recovery_stagger_ms: cli.recovery_stagger_ms,
        },
        credentials,
        connector,
    );

    let conversations = Arc::new(ConversationStore::new(&cli.state_dir));
    let suggestions = Arc::new(SuggestionStore::load(&cli.state_dir)?);
    let trust = Arc::new(TrustStore::load(&cli.state_dir)?);
    let source = Arc::new(FallbackSuggestionSource::new(
        Arc::new(RemoteOracleSource::new(
            &cli.oracle_url,
            cli.oracle_timeout_ms,
        )),
        Arc::new(LocalTemplateSource),
    ));
    let pipeline = Arc::new(SuggestionPipeline::new(
        conversations,
        suggestions,
        trust,
        source,
        Arc::new(SessionOutboundSender::new(sessions.clone())),
        cli.context_limit,
    ));
    sessions.set_inbound_dispatcher(Arc::new(PipelineInboundDispatcher::new(pipeline.clone())));

    let recovered = sessions.recover_sessions().await?;
    println!("recovered {recovered} persisted session(s)");

    run_gateway_server(&cli.bind, GatewayState { sessions, pipeline }).await
}
