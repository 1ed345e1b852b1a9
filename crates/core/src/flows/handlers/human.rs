use crate::domain::session::{ActiveFlow, ContextPatch};
use crate::flows::render::TemplateKey;
use crate::flows::states::ConversationState;
use crate::notify::NotificationKind;
use crate::scheduling::within_business_hours;

use super::{finish, Outcome, Turn};

/// Within working hours the user is queued for an operator; otherwise they may leave a
/// message.
pub(crate) fn hand_off(turn: &Turn<'_>) -> Outcome {
    if !within_business_hours(turn.tenant, turn.now) {
        return leave_message_prompt(turn);
    }

    request_operator(turn);
    Outcome::goto(
        ConversationState::HumanQueue,
        Some(ContextPatch::flow(ActiveFlow::Idle)),
        vec![turn.render_plain(TemplateKey::HumanQueue)],
    )
}

/// The assistant decided a person should take over; its own reply already went out.
pub(crate) fn assistant_transfer(turn: &Turn<'_>) -> Outcome {
    request_operator(turn);
    Outcome::goto(
        ConversationState::HumanTransfer,
        Some(ContextPatch::flow(ActiveFlow::Idle)),
        Vec::new(),
    )
}

pub(crate) fn leave_message_prompt(turn: &Turn<'_>) -> Outcome {
    Outcome::goto(
        ConversationState::LeaveMessage,
        Some(ContextPatch::flow(ActiveFlow::Idle)),
        vec![turn.render_plain(TemplateKey::LeaveMessagePrompt)],
    )
}

/// An operator owns the conversation; nothing is answered automatically.
pub(crate) fn handle_waiting(_turn: &Turn<'_>) -> Outcome {
    Outcome::stay(Vec::new())
}

pub(crate) fn handle_left_message(turn: &Turn<'_>) -> Outcome {
    let message = turn.text();
    if message.is_empty() {
        return Outcome::stay(vec![turn.render_plain(TemplateKey::LeaveMessagePrompt)]);
    }

    turn.notify(NotificationKind::MessageLeft, [("message", message.to_string())]);
    finish(turn, vec![turn.render_plain(TemplateKey::MessageLeft)])
}

fn request_operator(turn: &Turn<'_>) {
    tracing::info!(
        event_name = "engine.human_transfer_requested",
        tenant_id = %turn.tenant.tenant_id,
        user_id = %turn.message.sender_id,
        from_state = turn.session.current_state.as_str(),
        "conversation handed to a human operator"
    );
    turn.notify(
        NotificationKind::HumanTransferRequested,
        [
            ("last_message", turn.text().to_string()),
            ("from_state", turn.session.current_state.as_str().to_string()),
        ],
    );
}
