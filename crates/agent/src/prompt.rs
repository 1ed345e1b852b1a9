use atende_core::domain::session::HistoryRole;
use atende_core::integrations::AiRequest;

use crate::llm::ChatMessage;

const BASE_INSTRUCTIONS: &str = "Você é o assistente virtual de atendimento desta empresa. \
Responda em português do Brasil, com no máximo três frases curtas e cordiais. \
Use somente as informações da base de conhecimento; se não souber, \
ofereça falar com um atendente. Nunca invente preços, datas ou horários.";

const ANSWER_CONTRACT: &str = "Responda APENAS com um objeto JSON no formato \
{\"message\": \"texto para o cliente\", \
\"action\": \"continue|transfer|menu|appointment|enrollment\", \"confidence\": 0.0-1.0}. \
Use \"appointment\" quando o cliente quiser agendar uma visita, \"enrollment\" para \
matrícula, \"transfer\" para falar com uma pessoa, \"menu\" para ver as opções e \
\"continue\" nos demais casos.";

/// Builds the chat transcript for one assistant turn: system prompt, bounded history, then
/// the new user text.
pub fn build_messages(request: &AiRequest, history_limit: usize) -> Vec<ChatMessage> {
    let mut system = String::from(BASE_INSTRUCTIONS);
    if let Some(instructions) = request.instructions.as_deref().map(str::trim) {
        if !instructions.is_empty() {
            system.push_str("\n\nInstruções da empresa:\n");
            system.push_str(instructions);
        }
    }
    if let Some(knowledge) = request.knowledge.as_deref().map(str::trim) {
        if !knowledge.is_empty() {
            system.push_str("\n\nBase de conhecimento:\n");
            system.push_str(knowledge);
        }
    }
    system.push_str("\n\n");
    system.push_str(ANSWER_CONTRACT);

    let skip = request.history.len().saturating_sub(history_limit);
    let mut messages = Vec::with_capacity(request.history.len() - skip + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(request.history.iter().skip(skip).map(|entry| match entry.role {
        HistoryRole::User => ChatMessage::user(entry.text.clone()),
        HistoryRole::Assistant => ChatMessage::assistant(entry.text.clone()),
    }));
    messages.push(ChatMessage::user(request.text.clone()));
    messages
}
