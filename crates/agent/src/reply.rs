use serde::Deserialize;

use atende_core::integrations::{AiAction, AiReply};

/// Confidence assigned to answers that ignored the JSON contract.
pub const PLAIN_TEXT_CONFIDENCE: f32 = 0.5;

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    message: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Extracts `{message, action, confidence}` from a model answer.
///
/// Models wrap JSON in code fences or prose often enough that the first balanced object
/// is searched for. Anything unparseable is treated as a plain-text `continue` answer.
pub fn parse_reply(raw: &str) -> AiReply {
    let trimmed = raw.trim();
    let parsed = json_object(trimmed)
        .and_then(|candidate| serde_json::from_str::<RawReply>(candidate).ok())
        .filter(|reply| !reply.message.trim().is_empty());

    match parsed {
        Some(reply) => AiReply {
            message: reply.message.trim().to_string(),
            action: reply.action.as_deref().and_then(AiAction::parse).unwrap_or_default(),
            confidence: reply.confidence.unwrap_or(PLAIN_TEXT_CONFIDENCE).clamp(0.0, 1.0),
        },
        None => AiReply {
            message: strip_fences(trimmed).to_string(),
            action: AiAction::Continue,
            confidence: PLAIN_TEXT_CONFIDENCE,
        },
    }
}

fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_fences(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.split_once('\n').map_or(inner, |(_, rest)| rest);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
