use crate::domain::session::{ActiveFlow, ContextPatch};
use crate::domain::tenant::Course;
use crate::flows::render::{context, format_brl, numbered, TemplateKey};
use crate::flows::states::ConversationState;

use super::{appointment, enrollment, finish, invalid_option, Outcome, Turn};

/// Course the conversation is currently about, if any.
pub(crate) fn current_course_id(turn: &Turn<'_>) -> Option<String> {
    match &turn.session.context.flow {
        ActiveFlow::Catalog { course_id } | ActiveFlow::Enrollment { course_id } => {
            course_id.clone()
        }
        ActiveFlow::Order(order) => Some(order.course_id.clone()),
        _ => None,
    }
}

pub(crate) fn show_list(turn: &Turn<'_>) -> Outcome {
    if turn.tenant.courses.is_empty() {
        return finish(turn, vec![turn.render_plain(TemplateKey::CoursesEmpty)]);
    }

    Outcome::goto(
        ConversationState::CoursesList,
        Some(ContextPatch::flow(ActiveFlow::Catalog { course_id: None })),
        vec![list_text(turn)],
    )
}

pub(crate) fn show_current_detail(turn: &Turn<'_>) -> Outcome {
    match current_course_id(turn).as_deref().and_then(|id| turn.tenant.course(id)) {
        Some(course) => show_detail(turn, course),
        None => show_list(turn),
    }
}

pub(crate) fn handle_list(turn: &Turn<'_>) -> Outcome {
    let chosen = turn
        .intent
        .selection()
        .and_then(|choice| choice.checked_sub(1))
        .and_then(|index| turn.tenant.courses.get(index));

    match chosen {
        Some(course) => show_detail(turn, course),
        None => invalid_option(turn, vec![list_text(turn)]),
    }
}

/// `1` enrolls in the course on display, `2` schedules a visit about it.
pub(crate) fn handle_detail(turn: &Turn<'_>) -> Outcome {
    let Some(course) = current_course_id(turn).and_then(|id| turn.tenant.course(&id).cloned())
    else {
        return show_list(turn);
    };

    match turn.intent.selection() {
        Some(1) => enrollment::start(turn, Some(course.id)),
        Some(2) => appointment::start(turn, Some(appointment::visit_purpose(&course))),
        _ => invalid_option(turn, vec![detail_text(turn, &course)]),
    }
}

fn show_detail(turn: &Turn<'_>, course: &Course) -> Outcome {
    Outcome::goto(
        ConversationState::CourseDetail,
        Some(ContextPatch::flow(ActiveFlow::Catalog { course_id: Some(course.id.clone()) })),
        vec![detail_text(turn, course)],
    )
}

fn list_text(turn: &Turn<'_>) -> String {
    let titles: Vec<String> = turn
        .tenant
        .courses
        .iter()
        .map(|course| match course.price {
            Some(price) => format!("{} - {}", course.title, format_brl(price)),
            None => course.title.clone(),
        })
        .collect();

    turn.render(
        TemplateKey::CoursesList,
        &context([("options", numbered(titles.iter().map(String::as_str)))]),
    )
}

fn detail_text(turn: &Turn<'_>, course: &Course) -> String {
    turn.render(
        TemplateKey::CourseDetail,
        &context([
            ("title", course.title.clone()),
            ("description", course.description.clone()),
            ("price", course.price.map(format_brl).unwrap_or_default()),
        ]),
    )
}
