use chrono::NaiveDate;

use crate::domain::session::{ActiveFlow, AppointmentDraft, ContextPatch};
use crate::domain::tenant::Course;
use crate::errors::ApplicationError;
use crate::flows::dates::{format_date, parse_date, parse_time};
use crate::flows::render::{context, TemplateKey};
use crate::flows::states::ConversationState;
use crate::notify::NotificationKind;
use crate::scheduling::{BookingRequest, SchedulingError};

use super::{finish, Outcome, Turn};

const DEFAULT_PURPOSE: &str = "Atendimento";
const AFFIRMATIVE: [&str; 5] = ["1", "sim", "s", "confirmar", "ok"];
const NEGATIVE: [&str; 4] = ["2", "não", "nao", "n"];

pub(crate) fn visit_purpose(course: &Course) -> String {
    format!("Visita - {}", course.title)
}

/// Purpose carried by an in-progress draft, or derived from the course on display.
pub(crate) fn current_purpose(turn: &Turn<'_>) -> Option<String> {
    match &turn.session.context.flow {
        ActiveFlow::Appointment(draft) => draft.purpose.clone(),
        ActiveFlow::Catalog { course_id: Some(id) } => turn.tenant.course(id).map(visit_purpose),
        _ => None,
    }
}

pub(crate) fn start(turn: &Turn<'_>, purpose: Option<String>) -> Outcome {
    Outcome::goto(
        ConversationState::AppointmentStart,
        Some(ContextPatch::flow(ActiveFlow::Appointment(AppointmentDraft {
            purpose,
            ..AppointmentDraft::default()
        }))),
        vec![turn.render_plain(TemplateKey::AppointmentDatePrompt)],
    )
}

pub(crate) async fn handle_date(turn: &Turn<'_>) -> Result<Outcome, ApplicationError> {
    let today = turn.engine.scheduling.today_for(turn.tenant);
    let Some(date) = parse_date(turn.text(), today) else {
        return Ok(Outcome::stay(vec![turn.render_plain(TemplateKey::AppointmentInvalidDate)]));
    };

    let slots = available(turn, date).await?;
    if slots.is_empty() {
        return Ok(Outcome::stay(vec![no_slots_text(turn, date)]));
    }

    let draft = AppointmentDraft { date: Some(date), time: None, purpose: draft(turn).purpose };
    Ok(Outcome::goto(
        ConversationState::AppointmentTime,
        Some(ContextPatch::flow(ActiveFlow::Appointment(draft))),
        vec![slots_text(turn, date, &slots)],
    ))
}

/// Re-lists slots for the draft's date; without a date the flow restarts.
pub(crate) async fn show_current_slots(turn: &Turn<'_>) -> Result<Outcome, ApplicationError> {
    let draft = draft(turn);
    let Some(date) = draft.date else {
        return Ok(start(turn, draft.purpose));
    };

    let slots = available(turn, date).await?;
    if slots.is_empty() {
        return Ok(start(turn, draft.purpose).after(vec![no_slots_text(turn, date)]));
    }

    let draft = AppointmentDraft { date: Some(date), time: None, purpose: draft.purpose };
    Ok(Outcome::goto(
        ConversationState::AppointmentTime,
        Some(ContextPatch::flow(ActiveFlow::Appointment(draft))),
        vec![slots_text(turn, date, &slots)],
    ))
}

/// The chosen time is checked against freshly computed slots, not the list shown earlier.
pub(crate) async fn handle_time(turn: &Turn<'_>) -> Result<Outcome, ApplicationError> {
    let draft = draft(turn);
    let Some(date) = draft.date else {
        return Ok(start(turn, draft.purpose));
    };

    let slots = available(turn, date).await?;
    if slots.is_empty() {
        return Ok(start(turn, draft.purpose).after(vec![no_slots_text(turn, date)]));
    }

    match parse_time(turn.text()) {
        Some(time) if slots.contains(&time) => {
            let prompt = confirmation_text(turn, date, &time);
            let draft = AppointmentDraft { time: Some(time), ..draft };
            Ok(Outcome::goto(
                ConversationState::AppointmentConfirm,
                Some(ContextPatch::flow(ActiveFlow::Appointment(draft))),
                vec![prompt],
            ))
        }
        _ => Ok(Outcome::stay(vec![turn.render(
            TemplateKey::AppointmentInvalidTime,
            &context([("slots", slots.join(", "))]),
        )])),
    }
}

pub(crate) fn show_current_confirmation(turn: &Turn<'_>) -> Outcome {
    let draft = draft(turn);
    match (draft.date, draft.time.clone()) {
        (Some(date), Some(time)) => Outcome::goto(
            ConversationState::AppointmentConfirm,
            None,
            vec![confirmation_text(turn, date, &time)],
        ),
        _ => start(turn, draft.purpose),
    }
}

pub(crate) async fn handle_confirmation(turn: &Turn<'_>) -> Result<Outcome, ApplicationError> {
    let draft = draft(turn);
    let (Some(date), Some(time)) = (draft.date, draft.time.clone()) else {
        return Ok(start(turn, draft.purpose));
    };
    let answer = turn.normalized();

    if NEGATIVE.contains(&answer.as_str()) {
        return Ok(finish(turn, vec![turn.render_plain(TemplateKey::AppointmentDeclined)]));
    }
    if !AFFIRMATIVE.contains(&answer.as_str()) {
        return Ok(Outcome::stay(vec![turn.render_plain(TemplateKey::AppointmentConfirmRetry)]));
    }

    let purpose = draft.purpose.clone().unwrap_or_else(|| DEFAULT_PURPOSE.to_string());
    turn.notify(
        NotificationKind::AppointmentRequested,
        [
            ("date", date.to_string()),
            ("time", time.clone()),
            ("purpose", purpose.clone()),
        ],
    );

    let request = BookingRequest {
        date,
        time: time.clone(),
        requester_name: turn.requester_name(),
        requester_phone: turn.message.sender_id.0.clone(),
        purpose,
        user_id: Some(turn.message.sender_id.clone()),
    };

    match turn.engine.scheduling.create_appointment(&turn.tenant.tenant_id, request).await {
        Ok(booking) => {
            let created = turn.render(
                TemplateKey::AppointmentCreated,
                &context([
                    ("date", format_date(date)),
                    ("time", time),
                    ("code", booking.code.0),
                ]),
            );
            Ok(finish(turn, vec![created]))
        }
        Err(SchedulingError::Conflict { .. }) => {
            tracing::info!(
                event_name = "engine.appointment_conflict",
                tenant_id = %turn.tenant.tenant_id,
                user_id = %turn.message.sender_id,
                date = %date,
                time = %time,
                "slot taken between listing and confirmation"
            );
            Ok(start(turn, draft.purpose)
                .after(vec![turn.render_plain(TemplateKey::AppointmentConflict)]))
        }
        Err(error) => Err(error.into()),
    }
}

fn draft(turn: &Turn<'_>) -> AppointmentDraft {
    match &turn.session.context.flow {
        ActiveFlow::Appointment(draft) => draft.clone(),
        _ => AppointmentDraft { purpose: current_purpose(turn), ..AppointmentDraft::default() },
    }
}

async fn available(turn: &Turn<'_>, date: NaiveDate) -> Result<Vec<String>, ApplicationError> {
    Ok(turn.engine.scheduling.get_available_slots(&turn.tenant.tenant_id, date).await?)
}

fn slots_text(turn: &Turn<'_>, date: NaiveDate, slots: &[String]) -> String {
    turn.render(
        TemplateKey::AppointmentSlots,
        &context([("date", format_date(date)), ("slots", slots.join("\n"))]),
    )
}

fn no_slots_text(turn: &Turn<'_>, date: NaiveDate) -> String {
    turn.render(
        TemplateKey::AppointmentNoSlots,
        &context([("date", format_date(date)), ("slots", String::new())]),
    )
}

fn confirmation_text(turn: &Turn<'_>, date: NaiveDate, time: &str) -> String {
    turn.render(
        TemplateKey::AppointmentConfirm,
        &context([("date", format_date(date)), ("time", time.to_string())]),
    )
}
