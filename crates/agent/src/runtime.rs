use async_trait::async_trait;
use tracing::{info, warn};

use atende_core::errors::ApplicationError;
use atende_core::integrations::{AiCollaborator, AiReply, AiRequest};

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::LlmClient;
use crate::prompt::build_messages;
use crate::reply::parse_reply;

/// Prompt, complete, parse, vet. Failures surface as integration errors so the engine can
/// fall back to rule-based handling.
pub struct AssistantRuntime<C> {
    client: C,
    guardrails: GuardrailPolicy,
    history_limit: usize,
}

impl<C: LlmClient> AssistantRuntime<C> {
    pub fn new(client: C, guardrails: GuardrailPolicy, history_limit: usize) -> Self {
        Self { client, guardrails, history_limit }
    }

    pub fn guardrails(&self) -> &GuardrailPolicy {
        &self.guardrails
    }
}

#[async_trait]
impl<C: LlmClient> AiCollaborator for AssistantRuntime<C> {
    async fn process_message(&self, request: AiRequest) -> Result<AiReply, ApplicationError> {
        let messages = build_messages(&request, self.history_limit);
        let raw = self.client.complete(&messages).await.map_err(|error| {
            warn!(
                event_name = "agent.completion_failed",
                tenant_id = %request.tenant_id,
                user_id = %request.user_id,
                error = %error,
                "assistant completion failed"
            );
            ApplicationError::Integration(format!("assistant: {error}"))
        })?;

        let reply = parse_reply(&raw);
        let decision = self.guardrails.evaluate(&reply, request.knowledge.as_deref());
        if let GuardrailDecision::Deny { reason_code, .. }
        | GuardrailDecision::Degrade { reason_code, .. } = &decision
        {
            info!(
                event_name = "agent.guardrail_applied",
                tenant_id = %request.tenant_id,
                user_id = %request.user_id,
                reason_code = *reason_code,
                "assistant reply adjusted by guardrail"
            );
        }

        let reply = decision.into_reply(reply);
        info!(
            event_name = "agent.reply_ready",
            tenant_id = %request.tenant_id,
            user_id = %request.user_id,
            action = reply.action.as_str(),
            confidence = reply.confidence,
            "assistant reply ready"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use atende_core::domain::session::UserId;
    use atende_core::domain::tenant::TenantId;
    use atende_core::errors::ApplicationError;
    use atende_core::integrations::{AiAction, AiCollaborator, AiRequest};

    use super::AssistantRuntime;
    use crate::guardrails::GuardrailPolicy;
    use crate::llm::{ChatMessage, ChatRole, LlmClient, LlmError};

    struct CannedClient {
        answer: Result<String, u16>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl CannedClient {
        fn answering(answer: &str) -> Self {
            Self { answer: Ok(answer.to_string()), seen: Mutex::new(Vec::new()) }
        }

        fn failing(status: u16) -> Self {
            Self { answer: Err(status), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.seen.lock().expect("lock").push(messages.to_vec());
            match &self.answer {
                Ok(answer) => Ok(answer.clone()),
                Err(status) => Err(LlmError::Status { status: *status, body: String::new() }),
            }
        }
    }

    fn request(text: &str) -> AiRequest {
        AiRequest {
            tenant_id: TenantId("escola".to_string()),
            user_id: UserId("5511900000001".to_string()),
            text: text.to_string(),
            history: Vec::new(),
            knowledge: Some("Cursos:\n- Inglês (R$ 350.00): conversação".to_string()),
            instructions: None,
        }
    }

    #[tokio::test]
    async fn parsed_reply_passes_through_when_guardrails_allow() {
        let runtime = AssistantRuntime::new(
            CannedClient::answering(
                r#"{"message": "Vamos agendar sua visita.", "action": "appointment",
                    "confidence": 0.9}"#,
            ),
            GuardrailPolicy::default(),
            10,
        );

        let reply = runtime.process_message(request("quero visitar")).await.expect("reply");

        assert_eq!(reply.action, AiAction::Appointment);
        assert_eq!(reply.message, "Vamos agendar sua visita.");
        let seen = runtime.client.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].last().map(|message| message.role), Some(ChatRole::User));
    }

    #[tokio::test]
    async fn guardrails_replace_invented_prices() {
        let runtime = AssistantRuntime::new(
            CannedClient::answering("O curso sai por R$ 99,00 hoje!"),
            GuardrailPolicy::default(),
            10,
        );

        let reply = runtime.process_message(request("quanto custa?")).await.expect("reply");

        assert_eq!(reply.action, AiAction::Menu);
        assert!(!reply.message.contains("99"));
    }

    #[tokio::test]
    async fn completion_failures_become_integration_errors() {
        let runtime =
            AssistantRuntime::new(CannedClient::failing(503), GuardrailPolicy::default(), 10);

        let error = runtime.process_message(request("oi")).await.expect_err("fails");

        assert!(matches!(error, ApplicationError::Integration(message) if message.contains("503")));
    }
}
