use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::domain::message::{InboundMessage, LoggedMessage, MessageDirection};
use crate::domain::session::{
    ActiveFlow, ContextPatch, HistoryEntry, HistoryRole, Session, UserId,
};
use crate::domain::tenant::TenantId;
use crate::errors::ApplicationError;
use crate::flows::handlers::{self, appointment, enrollment, human, menu, Effect, Outcome, Turn};
use crate::flows::intent::{Command, IntentClassifier, IntentKind, KeywordTable};
use crate::flows::render::{TemplateKey, TemplateRenderer};
use crate::flows::states::ConversationState;
use crate::integrations::{
    AiAction, AiCollaborator, AiRequest, MessageLog, PaymentCollaborator, ReplySender,
};
use crate::notify::NotificationSink;
use crate::scheduling::SchedulingEngine;
use crate::session::{is_timed_out, SessionRepository, SessionStore};
use crate::tenant::TenantConfigResolver;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Global switch; a tenant must also enable AI for the hand-off to happen.
    pub ai_enabled: bool,
    pub history_limit: usize,
    pub default_session_timeout_minutes: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { ai_enabled: false, history_limit: 10, default_session_timeout_minutes: 30 }
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ai_enabled: config.ai.enabled,
            history_limit: config.ai.history_limit,
            default_session_timeout_minutes: config.engine.default_session_timeout_minutes,
        }
    }
}

/// Ordered replies for one inbound message plus the state the session ended in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub messages: Vec<String>,
    pub state: ConversationState,
}

/// Collaborators the engine is assembled from.
pub struct EngineParts {
    pub tenants: Arc<TenantConfigResolver>,
    pub sessions: Arc<dyn SessionRepository>,
    pub scheduling: Arc<SchedulingEngine>,
    pub notifications: Arc<dyn NotificationSink>,
    pub messages: Arc<dyn MessageLog>,
    pub clock: Arc<dyn Clock>,
    pub settings: EngineSettings,
}

/// The conversation orchestrator: one inbound message in, ordered replies out, with the
/// session persisted in between.
pub struct ConversationEngine {
    pub(crate) tenants: Arc<TenantConfigResolver>,
    pub(crate) sessions: SessionStore,
    pub(crate) scheduling: Arc<SchedulingEngine>,
    pub(crate) notifications: Arc<dyn NotificationSink>,
    pub(crate) messages: Arc<dyn MessageLog>,
    pub(crate) ai: Option<Arc<dyn AiCollaborator>>,
    pub(crate) payments: Option<Arc<dyn PaymentCollaborator>>,
    pub(crate) clock: Arc<dyn Clock>,
    settings: EngineSettings,
    classifier: IntentClassifier,
}

impl ConversationEngine {
    pub fn new(parts: EngineParts) -> Self {
        Self {
            sessions: SessionStore::new(parts.sessions, Arc::clone(&parts.clock)),
            tenants: parts.tenants,
            scheduling: parts.scheduling,
            notifications: parts.notifications,
            messages: parts.messages,
            ai: None,
            payments: None,
            clock: parts.clock,
            settings: parts.settings,
            classifier: IntentClassifier::new(),
        }
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiCollaborator>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_payments(mut self, payments: Arc<dyn PaymentCollaborator>) -> Self {
        self.payments = Some(payments);
        self
    }

    pub fn tenants(&self) -> &Arc<TenantConfigResolver> {
        &self.tenants
    }

    pub fn scheduling(&self) -> &Arc<SchedulingEngine> {
        &self.scheduling
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Never fails: internal errors are logged and answered with a generic apology.
    pub async fn handle_message(
        &self,
        message: &InboundMessage,
        reply: &dyn ReplySender,
    ) -> EngineResponse {
        tracing::info!(
            event_name = "engine.message_received",
            tenant_id = %message.tenant_id,
            user_id = %message.sender_id,
            message_type = ?message.message_type,
            "inbound message"
        );
        let (tenant_id, user_id) = (&message.tenant_id, &message.sender_id);
        self.record(tenant_id, user_id, MessageDirection::Inbound, &message.text).await;

        let response = match self.process(message, reply).await {
            Ok(response) => response,
            Err(error) => self.apologize(message, error).await,
        };

        for text in &response.messages {
            self.record(tenant_id, user_id, MessageDirection::Outbound, text).await;
        }
        tracing::info!(
            event_name = "engine.message_handled",
            tenant_id = %message.tenant_id,
            user_id = %message.sender_id,
            state = response.state.as_str(),
            replies = response.messages.len(),
            "inbound message handled"
        );
        response
    }

    /// Out-of-band payment confirmation. Returns `None` when the user's session is not
    /// waiting on `order_id`.
    pub async fn confirm_payment(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        order_id: &str,
    ) -> Result<Option<EngineResponse>, ApplicationError> {
        let session = self.sessions.get(tenant_id, user_id).await?;
        let waiting = session.current_state == ConversationState::PaymentPending
            && matches!(
                &session.context.flow,
                ActiveFlow::Order(order) if order.order_id == order_id
            );
        if !waiting {
            tracing::info!(
                event_name = "engine.payment_confirmation_ignored",
                tenant_id = %tenant_id,
                user_id = %user_id,
                order_id,
                state = session.current_state.as_str(),
                "session is not waiting on this order"
            );
            return Ok(None);
        }

        let tenant = self.tenants.resolve(tenant_id).await?;
        let text =
            TemplateRenderer::new(&tenant.templates).render_plain(TemplateKey::PaymentConfirmed);
        let session = self
            .sessions
            .transition(
                tenant_id,
                user_id,
                ConversationState::MainMenu,
                Some(ContextPatch::flow(ActiveFlow::Menu { path: Vec::new() })),
            )
            .await?;
        self.record(tenant_id, user_id, MessageDirection::Outbound, &text).await;

        tracing::info!(
            event_name = "engine.payment_confirmed",
            tenant_id = %tenant_id,
            user_id = %user_id,
            order_id,
            "payment confirmed"
        );
        Ok(Some(EngineResponse { messages: vec![text], state: session.current_state }))
    }

    async fn process(
        &self,
        message: &InboundMessage,
        reply: &dyn ReplySender,
    ) -> Result<EngineResponse, ApplicationError> {
        let tenant_id = &message.tenant_id;
        let user_id = &message.sender_id;
        let tenant = self.tenants.resolve(tenant_id).await?;
        let now = self.clock.now();

        if tenant.is_suspended(now) {
            tracing::warn!(
                event_name = "engine.tenant_suspended",
                tenant_id = %tenant_id,
                user_id = %user_id,
                "tenant suspended; answering with notice"
            );
            let session = self
                .sessions
                .transition(tenant_id, user_id, ConversationState::HumanTransfer, None)
                .await?;
            let text =
                TemplateRenderer::new(&tenant.templates).render_plain(TemplateKey::Suspended);
            return Ok(EngineResponse { messages: vec![text], state: session.current_state });
        }

        let timeout = tenant
            .session_timeout_minutes
            .unwrap_or(self.settings.default_session_timeout_minutes);
        let mut session = self.sessions.get(tenant_id, user_id).await?;
        if is_timed_out(&session, timeout, now) {
            tracing::info!(
                event_name = "engine.session_expired",
                tenant_id = %tenant_id,
                user_id = %user_id,
                state = session.current_state.as_str(),
                "idle session reset"
            );
            session = self.sessions.reset(tenant_id, user_id).await?;
        }

        let keywords = KeywordTable::merged(&tenant.keyword_routes);
        let intent = self.classifier.classify(&message.text, session.current_state, &keywords);
        tracing::debug!(
            event_name = "engine.intent_classified",
            tenant_id = %tenant_id,
            user_id = %user_id,
            state = session.current_state.as_str(),
            intent = ?intent.kind,
            value = %intent.value,
            confidence = intent.confidence,
            "intent classified"
        );

        if message.message_type.is_unsupported_media() {
            let text = TemplateRenderer::new(&tenant.templates)
                .render_plain(TemplateKey::UnsupportedMedia);
            return Ok(EngineResponse { messages: vec![text], state: session.current_state });
        }

        let turn = Turn {
            engine: self,
            tenant: &tenant,
            session: &session,
            message,
            intent: &intent,
            now,
        };
        let outcome = self.route(&turn, &keywords, reply).await?;
        let state = self.apply(&session, outcome.effect).await?;
        Ok(EngineResponse { messages: outcome.messages, state })
    }

    async fn route(
        &self,
        turn: &Turn<'_>,
        keywords: &KeywordTable,
        reply: &dyn ReplySender,
    ) -> Result<Outcome, ApplicationError> {
        let state = turn.session.current_state;

        if let Some(command) = turn.intent.command() {
            return navigate(turn, command).await;
        }

        if self.ai_applies(turn) {
            if let Some(outcome) = self.consult_ai(turn, reply).await {
                return Ok(outcome);
            }
        }

        if turn.intent.kind == IntentKind::Keyword
            && !state.collects_free_input()
            && !state.awaits_human()
        {
            if let Some(target) = keywords.route(&turn.intent.value) {
                tracing::info!(
                    event_name = "engine.keyword_routed",
                    tenant_id = %turn.tenant.tenant_id,
                    user_id = %turn.message.sender_id,
                    keyword = %turn.intent.value,
                    from = state.as_str(),
                    to = target.as_str(),
                    "keyword routed past the current flow"
                );
                return handlers::enter(turn, target).await;
            }
        }

        handlers::dispatch(turn).await
    }

    fn ai_applies(&self, turn: &Turn<'_>) -> bool {
        self.settings.ai_enabled
            && self.ai.is_some()
            && turn.tenant.ai_enabled()
            && turn.session.current_state.allows_ai_handoff()
            && (turn.intent.kind == IntentKind::FreeText
                || turn.intent.is_low_confidence_keyword())
    }

    /// `None` when the assistant failed; the caller falls back to rule-based handling.
    async fn consult_ai(&self, turn: &Turn<'_>, reply: &dyn ReplySender) -> Option<Outcome> {
        let ai = self.ai.as_ref()?;
        let tenant = turn.tenant;
        let user_id = &turn.message.sender_id;
        let request = AiRequest {
            tenant_id: tenant.tenant_id.clone(),
            user_id: user_id.clone(),
            text: turn.text().to_string(),
            history: turn.session.context.history.clone(),
            knowledge: Some(tenant.knowledge_context()),
            instructions: tenant.ai.as_ref().and_then(|ai| ai.instructions.clone()),
        };

        let answer = match ai.process_message(request).await {
            Ok(answer) => answer,
            Err(error) => {
                tracing::warn!(
                    event_name = "engine.ai_failed",
                    tenant_id = %tenant.tenant_id,
                    user_id = %user_id,
                    error = %error,
                    "assistant unavailable; falling back to rules"
                );
                return None;
            }
        };

        if let Err(error) = reply.send(&tenant.tenant_id, user_id, &answer.message).await {
            tracing::warn!(
                event_name = "engine.reply_failed",
                tenant_id = %tenant.tenant_id,
                user_id = %user_id,
                error = %error,
                "could not deliver assistant reply"
            );
        }
        self.record(&tenant.tenant_id, user_id, MessageDirection::Outbound, &answer.message).await;
        tracing::info!(
            event_name = "engine.ai_answered",
            tenant_id = %tenant.tenant_id,
            user_id = %user_id,
            action = answer.action.as_str(),
            confidence = answer.confidence,
            "assistant answered"
        );

        let mut history = turn.session.context.history.clone();
        history.push(HistoryEntry { role: HistoryRole::User, text: turn.text().to_string() });
        history.push(HistoryEntry { role: HistoryRole::Assistant, text: answer.message });
        let overflow = history.len().saturating_sub(self.settings.history_limit);
        history.drain(..overflow);

        let outcome = match answer.action {
            AiAction::Continue => Outcome::stay(Vec::new()),
            AiAction::Transfer => human::assistant_transfer(turn),
            AiAction::Menu => menu::show_root(turn),
            AiAction::Appointment => appointment::start(turn, appointment::current_purpose(turn)),
            AiAction::Enrollment => enrollment::start(turn, None),
        };
        Some(outcome.with_history(history))
    }

    async fn apply(
        &self,
        session: &Session,
        effect: Effect,
    ) -> Result<ConversationState, ApplicationError> {
        let (tenant_id, user_id) = (&session.tenant_id, &session.user_id);
        let updated = match effect {
            Effect::Stay => {
                self.sessions.update_context(tenant_id, user_id, ContextPatch::default()).await?
            }
            Effect::Update(patch) => self.sessions.update_context(tenant_id, user_id, patch).await?,
            Effect::Transition { to, patch } => {
                self.sessions.transition(tenant_id, user_id, to, patch).await?
            }
        };
        Ok(updated.current_state)
    }

    async fn apologize(
        &self,
        message: &InboundMessage,
        error: ApplicationError,
    ) -> EngineResponse {
        let correlation_id = Uuid::new_v4().to_string();
        tracing::error!(
            event_name = "engine.message_failed",
            correlation_id = %correlation_id,
            tenant_id = %message.tenant_id,
            user_id = %message.sender_id,
            error = %error,
            "failed to handle inbound message"
        );

        let state = match self.sessions.get(&message.tenant_id, &message.sender_id).await {
            Ok(session) => session.current_state,
            Err(_) => ConversationState::initial(),
        };
        let templates = BTreeMap::new();
        let text = TemplateRenderer::new(&templates).render_plain(TemplateKey::InternalError);
        EngineResponse { messages: vec![text], state }
    }

    async fn record(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        direction: MessageDirection,
        body: &str,
    ) {
        let entry = LoggedMessage {
            tenant_id: tenant_id.clone(),
            user_id: user_id.clone(),
            direction,
            body: body.to_string(),
            created_at: self.clock.now(),
        };
        if let Err(error) = self.messages.append(entry).await {
            tracing::warn!(
                event_name = "engine.message_log_failed",
                tenant_id = %tenant_id,
                user_id = %user_id,
                direction = direction.as_str(),
                error = %error,
                "could not persist message"
            );
        }
    }
}

/// `menu` and `back` are answered here, once, for every state.
async fn navigate(turn: &Turn<'_>, command: Command) -> Result<Outcome, ApplicationError> {
    match (command, turn.session.current_state) {
        (_, ConversationState::MainMenu) => Ok(menu::pop_level(turn)),
        (Command::Menu, _) => Ok(menu::show_root(turn)),
        (Command::Back, state) => handlers::enter(turn, state.parent()).await,
    }
}
