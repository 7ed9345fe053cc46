use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use atendo_core::deterministic_pick;

use crate::intent::MessageIntent;

/// Confidence assumed when the oracle answers without a score.
pub const ORACLE_DEFAULT_CONFIDENCE: f64 = 0.6;
/// Fallback confidence after an oracle deadline overrun.
pub const FALLBACK_TIMEOUT_CONFIDENCE: f64 = 0.45;
/// Fallback confidence after any other oracle failure.
pub const FALLBACK_ERROR_CONFIDENCE: f64 = 0.5;
/// Maximum number of incoming-text characters echoed into a template.
pub const INCOMING_ECHO_MAX_CHARS: usize = 140;
const CONTEXT_EXCERPT_MAX_CHARS: usize = 120;
const ORACLE_ERROR_BODY_MAX_CHARS: usize = 256;

#[derive(Debug, Error)]
/// Enumerates supported `OracleError` values. Never surfaced to callers;
/// the fallback decorator absorbs every variant.
pub enum OracleError {
    #[error("oracle call timed out")]
    Timeout,
    #[error("oracle returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("oracle http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
/// Input to a suggestion source.
pub struct SuggestionPrompt {
    pub tenant_id: String,
    pub incoming_text: String,
    pub context_summary: String,
    pub intent: MessageIntent,
}

#[derive(Debug, Clone)]
/// Candidate reply with its confidence and originating source label.
pub struct SuggestionDraft {
    pub text: String,
    pub confidence: f64,
    pub source: &'static str,
}

#[async_trait]
/// Trait contract for `SuggestionSource` behavior.
pub trait SuggestionSource: Send + Sync {
    async fn draft(&self, prompt: &SuggestionPrompt) -> Result<SuggestionDraft, OracleError>;
}

#[derive(Debug, Serialize)]
struct OracleRequestBody<'a> {
    incoming_text: &'a str,
    context_summary: &'a str,
    intent: &'a str,
    tenant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct OracleResponseBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Remote scoring oracle reached over HTTP with a hard deadline.
pub struct RemoteOracleSource {
    client: Client,
    base_url: String,
    timeout_ms: u64,
}

impl RemoteOracleSource {
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
        }
    }

    async fn request_draft(&self, prompt: &SuggestionPrompt) -> Result<SuggestionDraft, OracleError> {
        let body = OracleRequestBody {
            incoming_text: &prompt.incoming_text,
            context_summary: &prompt.context_summary,
            intent: prompt.intent.as_str(),
            tenant_id: &prompt.tenant_id,
        };
        let response = self
            .client
            .post(format!("{}/suggestions", self.base_url))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::HttpStatus {
                status: status.as_u16(),
                body: truncate_chars(&body, ORACLE_ERROR_BODY_MAX_CHARS),
            });
        }
        let payload: OracleResponseBody = response
            .json()
            .await
            .map_err(|error| OracleError::InvalidResponse(error.to_string()))?;
        let text = payload
            .text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| OracleError::InvalidResponse("missing suggestion text".to_string()))?;
        let confidence = payload
            .confidence
            .unwrap_or(ORACLE_DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);
        Ok(SuggestionDraft {
            text,
            confidence,
            source: "oracle",
        })
    }
}

#[async_trait]
impl SuggestionSource for RemoteOracleSource {
    async fn draft(&self, prompt: &SuggestionPrompt) -> Result<SuggestionDraft, OracleError> {
        // The deadline bounds the whole call; on overrun the request is
        // abandoned, never retried.
        tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            self.request_draft(prompt),
        )
        .await
        .map_err(|_| OracleError::Timeout)?
    }
}

/// Local templated generation used when the oracle is unavailable.
pub struct LocalTemplateSource;

#[async_trait]
impl SuggestionSource for LocalTemplateSource {
    async fn draft(&self, prompt: &SuggestionPrompt) -> Result<SuggestionDraft, OracleError> {
        Ok(local_template_draft(prompt, FALLBACK_ERROR_CONFIDENCE))
    }
}

/// Composes a primary source with a fallback: any primary failure is
/// absorbed, logged, and answered from the fallback with a confidence
/// fixed by the failure type.
pub struct FallbackSuggestionSource {
    primary: Arc<dyn SuggestionSource>,
    fallback: Arc<dyn SuggestionSource>,
}

impl FallbackSuggestionSource {
    pub fn new(primary: Arc<dyn SuggestionSource>, fallback: Arc<dyn SuggestionSource>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl SuggestionSource for FallbackSuggestionSource {
    async fn draft(&self, prompt: &SuggestionPrompt) -> Result<SuggestionDraft, OracleError> {
        match self.primary.draft(prompt).await {
            Ok(draft) => Ok(draft),
            Err(error) => {
                let confidence = match error {
                    OracleError::Timeout => FALLBACK_TIMEOUT_CONFIDENCE,
                    _ => FALLBACK_ERROR_CONFIDENCE,
                };
                tracing::debug!(%error, confidence, "suggestion oracle failed; using local fallback");
                let mut draft = self.fallback.draft(prompt).await?;
                draft.confidence = confidence;
                Ok(draft)
            }
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Renders a category-specific templated reply, choosing between two
/// templates per intent and echoing a truncated copy of the incoming
/// text plus a short excerpt of the recent context.
pub(crate) fn local_template_draft(prompt: &SuggestionPrompt, confidence: f64) -> SuggestionDraft {
    let echo = truncate_chars(prompt.incoming_text.trim(), INCOMING_ECHO_MAX_CHARS);
    let excerpt = truncate_chars(
        prompt
            .context_summary
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or(crate::context::EMPTY_CONTEXT_SUMMARY),
        CONTEXT_EXCERPT_MAX_CHARS,
    );

    let templates: [String; 2] = match prompt.intent {
        MessageIntent::Scheduling => [
            format!(
                "Recebi seu pedido de agendamento: \"{echo}\". Vou verificar a agenda e confirmo o horário em breve."
            ),
            format!(
                "Obrigado pela mensagem! Sobre \"{echo}\": vou checar a disponibilidade e já retorno com as opções."
            ),
        ],
        MessageIntent::Hours => [
            format!(
                "Recebi sua pergunta sobre horário: \"{echo}\". Vou confirmar o horário de atendimento e respondo em seguida."
            ),
            format!(
                "Obrigado pelo contato! Sobre \"{echo}\": já verifico nosso horário de funcionamento e retorno."
            ),
        ],
        MessageIntent::Pricing => [
            format!(
                "Recebi seu pedido de orçamento: \"{echo}\". Vou levantar os valores e envio em breve."
            ),
            format!(
                "Obrigado pela mensagem! Sobre \"{echo}\": vou consultar os preços atualizados e já retorno."
            ),
        ],
        MessageIntent::Support => [
            format!(
                "Sinto muito pelo transtorno. Recebi seu relato: \"{echo}\". Vou verificar o que aconteceu e retorno em breve."
            ),
            format!(
                "Obrigado por avisar! Sobre \"{echo}\": vou analisar a situação e respondo o quanto antes. Último registro: {excerpt}"
            ),
        ],
        MessageIntent::Greeting => [
            format!("Olá! Recebi sua mensagem: \"{echo}\". Como posso ajudar?"),
            format!("Oi, tudo bem? Vi sua mensagem: \"{echo}\". Em que posso ajudar hoje?"),
        ],
        MessageIntent::General => [
            format!(
                "Obrigado pela mensagem: \"{echo}\". Vou verificar e respondo em breve."
            ),
            format!(
                "Recebi sua mensagem: \"{echo}\". Já estou verificando e retorno em seguida. Último registro: {excerpt}"
            ),
        ],
    };
    let pick = deterministic_pick(templates.len());
    SuggestionDraft {
        text: templates[pick].clone(),
        confidence,
        source: "local_template",
    }
}
