use std::sync::Arc;

use atende_agent::{AssistantRuntime, GuardrailPolicy, HttpLlmClient};
use atende_core::clock::{Clock, SystemClock};
use atende_core::config::AppConfig;
use atende_core::domain::message::{InboundMessage, MessageType};
use atende_core::domain::session::UserId;
use atende_core::domain::tenant::TenantId;
use atende_core::flows::{ConversationEngine, EngineParts, EngineSettings};
use atende_core::memory::RecordingReplySender;
use atende_core::notify::LogNotificationSink;
use atende_core::scheduling::SchedulingEngine;
use atende_db::{DbPool, SqlAppointmentRepository, SqlMessageLog, SqlSessionRepository};
use chrono::Utc;
use serde_json::json;

use crate::commands::slots::tenants;
use crate::commands::{block_on, load_config, open_database, CommandResult, StepError};

/// Sends one message as `user` and prints every reply the engine produced for it. The
/// session persists in the database, so consecutive invocations continue the conversation.
pub fn run(tenant: &str, user: &str, text: &str) -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let message = InboundMessage {
        tenant_id: TenantId(tenant.trim().to_string()),
        sender_id: UserId(user.trim().to_string()),
        sender_name: None,
        text: text.to_string(),
        message_type: MessageType::Text,
        timestamp: Utc::now(),
    };

    let result = block_on("chat", async {
        let pool = open_database(&config).await?;
        let engine = conversation(&config, &pool)?;
        let replies = RecordingReplySender::default();
        let response = engine.handle_message(&message, &replies).await;
        pool.close().await;

        let mut messages = replies.texts();
        messages.extend(response.messages);
        Ok((messages, response.state))
    });

    match result {
        Ok((messages, state)) => CommandResult::success_with(
            "chat",
            messages.join("\n\n"),
            Some(json!({ "state": state, "messages": messages })),
        ),
        Err(failure) => failure,
    }
}

fn conversation(config: &AppConfig, pool: &DbPool) -> Result<ConversationEngine, StepError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tenants = tenants(config, pool, Arc::clone(&clock));
    let scheduling = Arc::new(SchedulingEngine::new(
        Arc::clone(&tenants),
        Arc::new(SqlAppointmentRepository::new(pool.clone())),
        Arc::new(LogNotificationSink),
        Arc::clone(&clock),
    ));

    let engine = ConversationEngine::new(EngineParts {
        tenants,
        sessions: Arc::new(SqlSessionRepository::new(pool.clone())),
        scheduling,
        notifications: Arc::new(LogNotificationSink),
        messages: Arc::new(SqlMessageLog::new(pool.clone())),
        clock,
        settings: EngineSettings::from_config(config),
    });

    let client = HttpLlmClient::from_config(&config.ai)
        .map_err(|error| ("assistant_setup", error.to_string(), 6u8))?;
    Ok(match client {
        Some(client) => engine.with_ai(Arc::new(AssistantRuntime::new(
            client,
            GuardrailPolicy::default(),
            config.ai.history_limit,
        ))),
        None => engine,
    })
}
