//! Keyword-based intent classification for inbound customer messages.
//!
//! Categories are ordered; the first category with a matching keyword
//! wins and unmatched text falls through to `General`. Keyword sets come
//! from the pt-BR vocabulary the product serves.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `MessageIntent` values.
pub enum MessageIntent {
    Scheduling,
    Hours,
    Pricing,
    Support,
    Greeting,
    General,
}

impl MessageIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduling => "scheduling",
            Self::Hours => "hours",
            Self::Pricing => "pricing",
            Self::Support => "support",
            Self::Greeting => "greeting",
            Self::General => "general",
        }
    }
}

const SCHEDULING_KEYWORDS: &[&str] = &[
    "agendar",
    "agendamento",
    "marcar",
    "remarcar",
    "consulta",
    "reservar",
    "reserva",
];
const HOURS_KEYWORDS: &[&str] = &[
    "horário",
    "horario",
    "funcionamento",
    "atendimento",
    "aberto",
    "abre",
    "fecha",
];
const PRICING_KEYWORDS: &[&str] = &[
    "preço",
    "preco",
    "valor",
    "quanto custa",
    "orçamento",
    "orcamento",
    "promoção",
    "promocao",
];
const SUPPORT_KEYWORDS: &[&str] = &[
    "problema",
    "ajuda",
    "suporte",
    "erro",
    "reclamação",
    "reclamacao",
    "cancelar",
];
const GREETING_KEYWORDS: &[&str] = &[
    "olá",
    "ola",
    "oi",
    "bom dia",
    "boa tarde",
    "boa noite",
];

const ORDERED_CATEGORIES: &[(MessageIntent, &[&str])] = &[
    (MessageIntent::Scheduling, SCHEDULING_KEYWORDS),
    (MessageIntent::Hours, HOURS_KEYWORDS),
    (MessageIntent::Pricing, PRICING_KEYWORDS),
    (MessageIntent::Support, SUPPORT_KEYWORDS),
    (MessageIntent::Greeting, GREETING_KEYWORDS),
];

fn tokenize(normalized: &str) -> Vec<&str> {
    normalized
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect()
}

fn keyword_matches(normalized: &str, tokens: &[&str], keyword: &str) -> bool {
    // Short single-word keywords ("oi") must match whole tokens so they
    // do not fire inside unrelated words; phrases use substring search.
    if keyword.contains(' ') || keyword.chars().count() > 3 {
        return normalized.contains(keyword);
    }
    tokens.iter().any(|token| *token == keyword)
}

pub fn classify_intent(text: &str) -> MessageIntent {
    let normalized = text.to_lowercase();
    let tokens = tokenize(&normalized);
    for (intent, keywords) in ORDERED_CATEGORIES {
        if keywords
            .iter()
            .any(|keyword| keyword_matches(&normalized, &tokens, keyword))
        {
            return *intent;
        }
    }
    MessageIntent::General
}
