use crate::domain::session::{ActiveFlow, ContextPatch};
use crate::domain::tenant::{FaqCategory, FaqQuestion};
use crate::flows::render::{context, numbered, TemplateKey};
use crate::flows::states::ConversationState;

use super::{finish, invalid_option, Outcome, Turn};

pub(crate) fn show_categories(turn: &Turn<'_>) -> Outcome {
    if turn.tenant.faq.is_empty() {
        return finish(turn, vec![turn.render_plain(TemplateKey::FaqEmpty)]);
    }

    Outcome::goto(
        ConversationState::FaqCategories,
        Some(ContextPatch::flow(ActiveFlow::Faq { category_id: None, question_id: None })),
        vec![categories_text(turn)],
    )
}

pub(crate) fn show_current_questions(turn: &Turn<'_>) -> Outcome {
    match current_category(turn) {
        Some(category) => show_questions(turn, category),
        None => show_categories(turn),
    }
}

pub(crate) fn show_current_answer(turn: &Turn<'_>) -> Outcome {
    let Some(category) = current_category(turn) else {
        return show_categories(turn);
    };
    let question = match &turn.session.context.flow {
        ActiveFlow::Faq { question_id: Some(id), .. } => {
            category.questions.iter().find(|question| &question.id == id)
        }
        _ => None,
    };

    match question {
        Some(question) => show_answer(turn, category, question),
        None => show_questions(turn, category),
    }
}

pub(crate) fn handle_categories(turn: &Turn<'_>) -> Outcome {
    let chosen = turn
        .intent
        .selection()
        .and_then(|choice| choice.checked_sub(1))
        .and_then(|index| turn.tenant.faq.get(index));

    match chosen {
        Some(category) => show_questions(turn, category),
        None => invalid_option(turn, vec![categories_text(turn)]),
    }
}

pub(crate) fn handle_questions(turn: &Turn<'_>) -> Outcome {
    let Some(category) = current_category(turn) else {
        return show_categories(turn);
    };
    let chosen = turn
        .intent
        .selection()
        .and_then(|choice| choice.checked_sub(1))
        .and_then(|index| category.questions.get(index));

    match chosen {
        Some(question) => show_answer(turn, category, question),
        None => invalid_option(turn, vec![questions_text(turn, category)]),
    }
}

/// After an answer, a number picks another question from the same category.
pub(crate) fn handle_answer(turn: &Turn<'_>) -> Outcome {
    handle_questions(turn)
}

fn current_category<'t>(turn: &Turn<'t>) -> Option<&'t FaqCategory> {
    match &turn.session.context.flow {
        ActiveFlow::Faq { category_id: Some(id), .. } => turn.tenant.faq_category(id),
        _ => None,
    }
}

fn show_questions(turn: &Turn<'_>, category: &FaqCategory) -> Outcome {
    if category.questions.is_empty() {
        return Outcome::goto(
            ConversationState::FaqCategories,
            Some(ContextPatch::flow(ActiveFlow::Faq { category_id: None, question_id: None })),
            vec![turn.render_plain(TemplateKey::FaqEmpty), categories_text(turn)],
        );
    }

    Outcome::goto(
        ConversationState::FaqQuestions,
        Some(ContextPatch::flow(ActiveFlow::Faq {
            category_id: Some(category.id.clone()),
            question_id: None,
        })),
        vec![questions_text(turn, category)],
    )
}

fn show_answer(turn: &Turn<'_>, category: &FaqCategory, question: &FaqQuestion) -> Outcome {
    let text = turn.render(
        TemplateKey::FaqAnswer,
        &context([
            ("question", question.question.clone()),
            ("answer", question.answer.clone()),
        ]),
    );
    Outcome::goto(
        ConversationState::FaqAnswer,
        Some(ContextPatch::flow(ActiveFlow::Faq {
            category_id: Some(category.id.clone()),
            question_id: Some(question.id.clone()),
        })),
        vec![text],
    )
}

fn categories_text(turn: &Turn<'_>) -> String {
    let options = numbered(turn.tenant.faq.iter().map(|category| category.title.as_str()));
    turn.render(TemplateKey::FaqCategories, &context([("options", options)]))
}

fn questions_text(turn: &Turn<'_>, category: &FaqCategory) -> String {
    let options = numbered(category.questions.iter().map(|question| question.question.as_str()));
    turn.render(
        TemplateKey::FaqQuestions,
        &context([("category", category.title.clone()), ("options", options)]),
    )
}
