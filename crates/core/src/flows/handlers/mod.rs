//! Per-state message handlers. Each handler inspects the turn and returns an [`Outcome`]:
//! the replies to send plus the session effect the engine applies afterwards.

pub(crate) mod appointment;
pub(crate) mod catalog;
pub(crate) mod enrollment;
pub(crate) mod faq;
pub(crate) mod form;
pub(crate) mod human;
pub(crate) mod menu;

use chrono::{DateTime, Utc};
use tera::Context;

use crate::domain::message::InboundMessage;
use crate::domain::session::{ContextPatch, HistoryEntry, Session};
use crate::domain::tenant::TenantConfig;
use crate::errors::ApplicationError;
use crate::flows::engine::ConversationEngine;
use crate::flows::intent::Intent;
use crate::flows::render::{TemplateKey, TemplateRenderer};
use crate::flows::states::ConversationState;
use crate::notify::{Notification, NotificationKind};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Effect {
    Stay,
    Update(ContextPatch),
    Transition { to: ConversationState, patch: Option<ContextPatch> },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Outcome {
    pub messages: Vec<String>,
    pub effect: Effect,
}

impl Outcome {
    pub fn stay(messages: Vec<String>) -> Self {
        Self { messages, effect: Effect::Stay }
    }

    pub fn update(patch: ContextPatch, messages: Vec<String>) -> Self {
        Self { messages, effect: Effect::Update(patch) }
    }

    pub fn goto(to: ConversationState, patch: Option<ContextPatch>, messages: Vec<String>) -> Self {
        Self { messages, effect: Effect::Transition { to, patch } }
    }

    /// Puts `messages` ahead of the outcome's own replies.
    pub fn after(mut self, mut messages: Vec<String>) -> Self {
        messages.append(&mut self.messages);
        self.messages = messages;
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.effect = match self.effect {
            Effect::Stay => Effect::Update(ContextPatch::history(history)),
            Effect::Update(mut patch) => {
                patch.history = Some(history);
                Effect::Update(patch)
            }
            Effect::Transition { to, patch } => {
                let mut patch = patch.unwrap_or_default();
                patch.history = Some(history);
                Effect::Transition { to, patch: Some(patch) }
            }
        };
        self
    }

    pub fn resulting_state(&self, current: ConversationState) -> ConversationState {
        match &self.effect {
            Effect::Transition { to, .. } => *to,
            Effect::Stay | Effect::Update(_) => current,
        }
    }
}

/// Everything a handler may read while processing one inbound message.
pub(crate) struct Turn<'a> {
    pub engine: &'a ConversationEngine,
    pub tenant: &'a TenantConfig,
    pub session: &'a Session,
    pub message: &'a InboundMessage,
    pub intent: &'a Intent,
    pub now: DateTime<Utc>,
}

impl<'a> Turn<'a> {
    pub fn renderer(&self) -> TemplateRenderer<'a> {
        TemplateRenderer::new(&self.tenant.templates)
    }

    pub fn render(&self, key: TemplateKey, context: &Context) -> String {
        self.renderer().render(key, context)
    }

    pub fn render_plain(&self, key: TemplateKey) -> String {
        self.renderer().render_plain(key)
    }

    /// Trimmed raw text as typed by the user.
    pub fn text(&self) -> &'a str {
        self.message.text.trim()
    }

    /// Lowercased trimmed text, the same normalization the classifier applies.
    pub fn normalized(&self) -> String {
        crate::flows::intent::normalize(&self.message.text)
    }

    pub fn notify<I, K, V>(&self, kind: NotificationKind, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut notification = Notification::new(
            self.tenant.tenant_id.clone(),
            Some(self.message.sender_id.clone()),
            kind,
        )
        .with_fields(fields)
        .with_field("user_phone", self.message.sender_id.0.clone());
        if let Some(name) = &self.message.sender_name {
            notification = notification.with_field("user_name", name.clone());
        }
        self.engine.notifications.notify(notification);
    }

    /// Display name for the user, falling back to their transport id.
    pub fn requester_name(&self) -> String {
        self.message
            .sender_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.message.sender_id.0.clone())
    }
}

/// Exhaustive state→handler table.
pub(crate) async fn dispatch(turn: &Turn<'_>) -> Result<Outcome, ApplicationError> {
    use ConversationState as S;

    match turn.session.current_state {
        S::Welcome => Ok(menu::welcome(turn)),
        S::MainMenu => Ok(menu::handle_selection(turn)),
        S::CoursesList => Ok(catalog::handle_list(turn)),
        S::CourseDetail => Ok(catalog::handle_detail(turn)),
        S::FaqCategories => Ok(faq::handle_categories(turn)),
        S::FaqQuestions => Ok(faq::handle_questions(turn)),
        S::FaqAnswer => Ok(faq::handle_answer(turn)),
        S::AppointmentStart => appointment::handle_date(turn).await,
        S::AppointmentTime => appointment::handle_time(turn).await,
        S::AppointmentConfirm => appointment::handle_confirmation(turn).await,
        S::EnrollmentStart => enrollment::handle_name(turn).await,
        S::HumanTransfer | S::HumanQueue => Ok(human::handle_waiting(turn)),
        S::LeaveMessage => Ok(human::handle_left_message(turn)),
        S::Documents => Ok(menu::handle_documents(turn)),
        S::DynamicForm => Ok(form::handle_answer(turn)),
        S::PaymentPending => Ok(enrollment::handle_pending(turn)),
    }
}

/// Renders the entry of `state` using whatever the session context already holds,
/// falling back to the nearest state the context can support.
pub(crate) async fn enter(
    turn: &Turn<'_>,
    state: ConversationState,
) -> Result<Outcome, ApplicationError> {
    use ConversationState as S;

    match state {
        S::Welcome | S::MainMenu => Ok(menu::show_root(turn)),
        S::CoursesList => Ok(catalog::show_list(turn)),
        S::CourseDetail => Ok(catalog::show_current_detail(turn)),
        S::FaqCategories => Ok(faq::show_categories(turn)),
        S::FaqQuestions => Ok(faq::show_current_questions(turn)),
        S::FaqAnswer => Ok(faq::show_current_answer(turn)),
        S::AppointmentStart => Ok(appointment::start(turn, appointment::current_purpose(turn))),
        S::AppointmentTime => appointment::show_current_slots(turn).await,
        S::AppointmentConfirm => Ok(appointment::show_current_confirmation(turn)),
        S::EnrollmentStart => Ok(enrollment::start(turn, catalog::current_course_id(turn))),
        S::HumanTransfer | S::HumanQueue => Ok(human::hand_off(turn)),
        S::LeaveMessage => Ok(human::leave_message_prompt(turn)),
        S::Documents => Ok(menu::show_documents(turn)),
        S::DynamicForm => Ok(form::resume(turn)),
        S::PaymentPending => Ok(enrollment::show_pending(turn)),
    }
}

/// Shared invalid-input reply: the state is kept and the current options re-sent.
pub(crate) fn invalid_option(turn: &Turn<'_>, mut current: Vec<String>) -> Outcome {
    let mut messages = vec![turn.render_plain(TemplateKey::InvalidOption)];
    messages.append(&mut current);
    Outcome::stay(messages)
}

/// Completion of a sub-flow: `messages`, then the root menu, landing on `MAIN_MENU`.
pub(crate) fn finish(turn: &Turn<'_>, messages: Vec<String>) -> Outcome {
    menu::show_root(turn).after(messages)
}
