use std::collections::BTreeMap;

use crate::domain::session::{ActiveFlow, ContextPatch, FormProgress};
use crate::domain::tenant::{FieldType, FormStep};
use crate::flows::render::{context, TemplateKey};
use crate::flows::states::ConversationState;
use crate::notify::NotificationKind;

use super::{finish, menu, Outcome, Turn};

pub(crate) fn start(turn: &Turn<'_>, form_id: &str) -> Outcome {
    let Some(form) = turn.tenant.form(form_id) else {
        tracing::warn!(
            event_name = "engine.form_missing",
            tenant_id = %turn.tenant.tenant_id,
            form_id,
            "menu references an unknown form"
        );
        return menu::show_root(turn);
    };
    let Some(first) = form.steps.first() else {
        return menu::show_root(turn);
    };

    let progress =
        FormProgress { form_id: form.id.clone(), step_index: 0, data: BTreeMap::new() };
    Outcome::goto(
        ConversationState::DynamicForm,
        Some(ContextPatch::flow(ActiveFlow::Form(progress))),
        vec![format!("*{}*\n{}", form.title, first.prompt)],
    )
}

/// Re-asks the pending question, or leaves the form when the context lost track of it.
pub(crate) fn resume(turn: &Turn<'_>) -> Outcome {
    match pending_step(turn) {
        Some((_, step)) => {
            Outcome::goto(ConversationState::DynamicForm, None, vec![step.prompt.clone()])
        }
        None => menu::show_root(turn),
    }
}

pub(crate) fn handle_answer(turn: &Turn<'_>) -> Outcome {
    let Some((progress, step)) = pending_step(turn) else {
        return menu::show_root(turn);
    };

    let answer = turn.text();
    if let Some(rejection) = validate(step.field_type, answer) {
        return Outcome::stay(vec![
            turn.render(rejection, &context([("prompt", step.prompt.clone())]))
        ]);
    }

    let mut progress = progress.clone();
    progress.data.insert(step.field.clone(), answer.to_string());
    progress.step_index += 1;

    let Some(form) = turn.tenant.form(&progress.form_id) else {
        return menu::show_root(turn);
    };
    if let Some(next) = form.steps.get(progress.step_index) {
        let prompt = next.prompt.clone();
        return Outcome::update(ContextPatch::flow(ActiveFlow::Form(progress)), vec![prompt]);
    }

    let mut fields = vec![
        ("form_id".to_string(), form.id.clone()),
        ("form_title".to_string(), form.title.clone()),
    ];
    fields.extend(progress.data);
    turn.notify(NotificationKind::FormComplete, fields);
    tracing::info!(
        event_name = "engine.form_completed",
        tenant_id = %turn.tenant.tenant_id,
        user_id = %turn.message.sender_id,
        form_id = %form.id,
        "dynamic form completed"
    );

    finish(turn, vec![turn.render_plain(TemplateKey::FormComplete)])
}

fn pending_step<'t>(turn: &Turn<'t>) -> Option<(&'t FormProgress, &'t FormStep)> {
    let ActiveFlow::Form(progress) = &turn.session.context.flow else {
        return None;
    };
    let step = turn.tenant.form(&progress.form_id)?.steps.get(progress.step_index)?;
    Some((progress, step))
}

/// The template to answer with when `answer` is unacceptable for the field.
fn validate(field_type: FieldType, answer: &str) -> Option<TemplateKey> {
    if answer.is_empty() {
        return Some(TemplateKey::FormInvalid);
    }

    match field_type {
        FieldType::Email => (!is_email(answer)).then_some(TemplateKey::FormInvalidEmail),
        FieldType::Text | FieldType::Phone | FieldType::Number => None,
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !value.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
