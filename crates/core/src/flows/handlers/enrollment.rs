use rust_decimal::Decimal;

use crate::domain::session::{ActiveFlow, ContextPatch, OrderProgress};
use crate::domain::tenant::Course;
use crate::errors::ApplicationError;
use crate::flows::render::{context, format_brl, TemplateKey};
use crate::flows::states::ConversationState;
use crate::integrations::PixRequest;
use crate::notify::NotificationKind;

use super::{finish, Outcome, Turn};

pub(crate) fn start(turn: &Turn<'_>, course_id: Option<String>) -> Outcome {
    let course = course_id.as_deref().and_then(|id| turn.tenant.course(id));
    let prompt = turn.render(
        TemplateKey::EnrollmentPrompt,
        &context([("course", course.map(|course| course.title.clone()).unwrap_or_default())]),
    );

    Outcome::goto(
        ConversationState::EnrollmentStart,
        Some(ContextPatch::flow(ActiveFlow::Enrollment {
            course_id: course.map(|course| course.id.clone()),
        })),
        vec![prompt],
    )
}

pub(crate) async fn handle_name(turn: &Turn<'_>) -> Result<Outcome, ApplicationError> {
    let name = turn.text();
    if !is_full_name(name) {
        return Ok(Outcome::stay(vec![turn.render_plain(TemplateKey::EnrollmentInvalidName)]));
    }

    let course = match &turn.session.context.flow {
        ActiveFlow::Enrollment { course_id: Some(id) } => turn.tenant.course(id),
        _ => None,
    };
    turn.notify(
        NotificationKind::EnrollmentRequested,
        [
            ("name", name.to_string()),
            ("course_id", course.map(|course| course.id.clone()).unwrap_or_default()),
            ("course", course.map(|course| course.title.clone()).unwrap_or_default()),
        ],
    );

    let received =
        turn.render(TemplateKey::EnrollmentReceived, &context([("name", name.to_string())]));
    let chargeable = course.and_then(|course| match course.price {
        Some(price) if price > Decimal::ZERO => Some((course, price)),
        _ => None,
    });

    match chargeable {
        Some((course, price)) if turn.tenant.payments_enabled() => {
            Ok(request_payment(turn, course, price, received).await)
        }
        _ => Ok(finish(turn, vec![received])),
    }
}

/// Any input while waiting on a charge re-sends the copy-paste code.
pub(crate) fn handle_pending(turn: &Turn<'_>) -> Outcome {
    show_pending(turn)
}

pub(crate) fn show_pending(turn: &Turn<'_>) -> Outcome {
    match &turn.session.context.flow {
        ActiveFlow::Order(order) => Outcome::goto(
            ConversationState::PaymentPending,
            None,
            vec![turn.render(
                TemplateKey::PaymentPending,
                &context([("copy_paste", order.copy_paste.clone())]),
            )],
        ),
        _ => super::menu::show_root(turn),
    }
}

async fn request_payment(
    turn: &Turn<'_>,
    course: &Course,
    amount: Decimal,
    received: String,
) -> Outcome {
    let (Some(payments), Some(settings)) = (&turn.engine.payments, &turn.tenant.payment) else {
        return finish(turn, vec![received]);
    };

    let request = PixRequest {
        tenant_id: turn.tenant.tenant_id.clone(),
        user_id: turn.message.sender_id.clone(),
        item_id: course.id.clone(),
        amount,
        settings: settings.clone(),
    };

    match payments.generate_pix(request).await {
        Ok(charge) if charge.success => {
            turn.notify(
                NotificationKind::PaymentRequested,
                [
                    ("order_id", charge.order_id.clone()),
                    ("course_id", course.id.clone()),
                    ("amount", amount.to_string()),
                ],
            );
            let text = turn.render(
                TemplateKey::PaymentPix,
                &context([
                    ("course", course.title.clone()),
                    ("amount", format_brl(amount)),
                    ("copy_paste", charge.copy_paste.clone()),
                ]),
            );
            let order = OrderProgress {
                order_id: charge.order_id,
                course_id: course.id.clone(),
                amount,
                copy_paste: charge.copy_paste,
                qr_code: charge.qr_code,
            };
            Outcome::goto(
                ConversationState::PaymentPending,
                Some(ContextPatch::flow(ActiveFlow::Order(order))),
                vec![received, text],
            )
        }
        Ok(charge) => {
            tracing::warn!(
                event_name = "engine.payment_declined",
                tenant_id = %turn.tenant.tenant_id,
                user_id = %turn.message.sender_id,
                order_id = %charge.order_id,
                "payment provider did not issue a charge"
            );
            finish(turn, vec![received, turn.render_plain(TemplateKey::PaymentFailed)])
        }
        Err(error) => {
            tracing::warn!(
                event_name = "engine.payment_failed",
                tenant_id = %turn.tenant.tenant_id,
                user_id = %turn.message.sender_id,
                error = %error,
                "pix generation failed"
            );
            finish(turn, vec![received, turn.render_plain(TemplateKey::PaymentFailed)])
        }
    }
}

/// At least two letters and no digits.
fn is_full_name(text: &str) -> bool {
    text.chars().filter(|ch| ch.is_alphabetic()).count() >= 2
        && !text.chars().any(|ch| ch.is_ascii_digit())
}
