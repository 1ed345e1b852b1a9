use atende_core::integrations::{AiAction, AiReply};

#[derive(Clone, Debug, PartialEq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, replacement: AiReply },
    Degrade { reason_code: &'static str, replacement: AiReply },
}

impl GuardrailDecision {
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason_code, .. } | Self::Degrade { reason_code, .. } => {
                Some(*reason_code)
            }
        }
    }

    /// The reply that may reach the customer.
    pub fn into_reply(self, original: AiReply) -> AiReply {
        match self {
            Self::Allow => original,
            Self::Deny { replacement, .. } | Self::Degrade { replacement, .. } => replacement,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GuardrailPolicy {
    pub llm_can_quote_unlisted_prices: bool,
    pub min_action_confidence: f32,
    pub max_reply_chars: usize,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            llm_can_quote_unlisted_prices: false,
            min_action_confidence: 0.6,
            max_reply_chars: 600,
        }
    }
}

const EMPTY_REPLY_MESSAGE: &str =
    "Desculpe, não consegui entender. Digite *menu* para ver as opções de atendimento.";
const UNLISTED_PRICE_MESSAGE: &str =
    "Para valores atualizados, consulte a opção de cursos no menu ou fale com um atendente.";

impl GuardrailPolicy {
    /// Vets a model reply against the tenant knowledge it was given.
    pub fn evaluate(&self, reply: &AiReply, knowledge: Option<&str>) -> GuardrailDecision {
        let message = reply.message.trim();
        if message.is_empty() {
            return GuardrailDecision::Deny {
                reason_code: "empty_reply",
                replacement: AiReply {
                    message: EMPTY_REPLY_MESSAGE.to_string(),
                    action: AiAction::Menu,
                    confidence: 1.0,
                },
            };
        }

        if !self.llm_can_quote_unlisted_prices {
            let known = knowledge.map(money_amounts).unwrap_or_default();
            if money_amounts(message).iter().any(|amount| !known.contains(amount)) {
                return GuardrailDecision::Deny {
                    reason_code: "unlisted_price",
                    replacement: AiReply {
                        message: UNLISTED_PRICE_MESSAGE.to_string(),
                        action: AiAction::Menu,
                        confidence: 1.0,
                    },
                };
            }
        }

        let changes_state = reply.action != AiAction::Continue;
        let too_long = message.chars().count() > self.max_reply_chars;
        let unsure = changes_state && reply.confidence < self.min_action_confidence;
        if !too_long && !unsure {
            return GuardrailDecision::Allow;
        }

        let mut replacement = reply.clone();
        if too_long {
            replacement.message = truncate(message, self.max_reply_chars);
        }
        if unsure {
            replacement.action = AiAction::Continue;
        }
        GuardrailDecision::Degrade {
            reason_code: if unsure { "low_confidence_action" } else { "reply_too_long" },
            replacement,
        }
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    let cut: String = message.chars().take(max_chars.saturating_sub(1)).collect();
    let cut = match cut.rfind(char::is_whitespace) {
        Some(index) if index > max_chars / 2 => cut[..index].to_string(),
        _ => cut,
    };
    format!("{}…", cut.trim_end())
}

/// Every `R$` amount in `text`, in cents.
fn money_amounts(text: &str) -> Vec<u64> {
    text.match_indices("R$")
        .filter_map(|(index, marker)| {
            let rest = text[index + marker.len()..].trim_start();
            let literal: String = rest
                .chars()
                .take_while(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == ',')
                .collect();
            parse_cents(literal.trim_end_matches(['.', ',']))
        })
        .collect()
}

/// Accepts `350`, `350.00`, `350,00`, `1.234,50` and `1,234.50`.
fn parse_cents(literal: &str) -> Option<u64> {
    if literal.is_empty() {
        return None;
    }
    let (whole, fraction) = match literal.rfind(['.', ',']) {
        Some(index) if literal.len() - index - 1 == 2 => (&literal[..index], &literal[index + 1..]),
        _ => (literal, "00"),
    };
    let whole: String = whole.chars().filter(char::is_ascii_digit).collect();
    let whole = if whole.is_empty() { 0 } else { whole.parse::<u64>().ok()? };
    let fraction = fraction.parse::<u64>().ok()?;
    whole.checked_mul(100)?.checked_add(fraction)
}

#[cfg(test)]
mod tests {
    use atende_core::integrations::{AiAction, AiReply};

    use super::{money_amounts, GuardrailDecision, GuardrailPolicy};

    const KNOWLEDGE: &str = "Empresa: Escola\nCursos:\n- Inglês (R$ 350.00): conversação";

    fn reply(message: &str, action: AiAction, confidence: f32) -> AiReply {
        AiReply { message: message.to_string(), action, confidence }
    }

    #[test]
    fn catalog_prices_are_allowed_in_any_notation() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(
            &reply("O curso de Inglês custa R$ 350,00 por mês.", AiAction::Continue, 0.9),
            Some(KNOWLEDGE),
        );
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn invented_price_is_denied_with_menu_fallback() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(
            &reply("Hoje sai por R$ 199,90!", AiAction::Enrollment, 0.95),
            Some(KNOWLEDGE),
        );

        assert_eq!(decision.reason_code(), Some("unlisted_price"));
        let safe = decision.into_reply(reply("", AiAction::Continue, 0.0));
        assert_eq!(safe.action, AiAction::Menu);
        assert!(!safe.message.contains("199"));

        let permissive = GuardrailPolicy { llm_can_quote_unlisted_prices: true, ..policy };
        assert_eq!(
            permissive
                .evaluate(&reply("Hoje sai por R$ 199,90!", AiAction::Continue, 0.95), None),
            GuardrailDecision::Allow
        );
    }

    #[test]
    fn unsure_state_changes_degrade_to_continue() {
        let policy = GuardrailPolicy::default();
        let original = reply("Quer agendar uma visita?", AiAction::Appointment, 0.4);

        let decision = policy.evaluate(&original, Some(KNOWLEDGE));

        assert_eq!(decision.reason_code(), Some("low_confidence_action"));
        let degraded = decision.into_reply(original.clone());
        assert_eq!(degraded.action, AiAction::Continue);
        assert_eq!(degraded.message, original.message);
    }

    #[test]
    fn long_and_empty_replies_are_bounded() {
        let policy = GuardrailPolicy { max_reply_chars: 40, ..GuardrailPolicy::default() };
        let long = reply(
            "Temos turmas pela manhã, à tarde e à noite durante toda a semana.",
            AiAction::Continue,
            0.9,
        );
        let decision = policy.evaluate(&long, None);
        assert_eq!(decision.reason_code(), Some("reply_too_long"));
        let bounded = decision.into_reply(long);
        assert!(bounded.message.chars().count() <= 40, "{}", bounded.message);
        assert!(bounded.message.ends_with('…'));

        let empty = policy.evaluate(&reply("   ", AiAction::Transfer, 1.0), None);
        assert_eq!(empty.reason_code(), Some("empty_reply"));
    }

    #[test]
    fn amounts_are_read_in_cents() {
        assert_eq!(
            money_amounts("R$ 1.234,50 ou R$1,234.50, R$ 80 e R$ 0,99."),
            vec![123_450, 123_450, 8_000, 99]
        );
        assert!(money_amounts("sem valores").is_empty());
    }
}
