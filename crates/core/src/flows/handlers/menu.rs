use crate::domain::session::{ActiveFlow, ContextPatch};
use crate::domain::tenant::{MenuAction, MenuNode, TenantConfig};
use crate::flows::render::{context, numbered, TemplateKey};
use crate::flows::states::ConversationState;

use super::{appointment, catalog, enrollment, faq, form, human, invalid_option, Outcome, Turn};

const ROOT_TITLE: &str = "Como posso ajudar?";

/// First contact: greeting followed by the root menu.
pub(crate) fn welcome(turn: &Turn<'_>) -> Outcome {
    let greeting = turn.render(
        TemplateKey::Welcome,
        &context([
            ("name", turn.message.sender_name.clone().unwrap_or_default()),
            ("business_name", turn.tenant.business_name.clone()),
        ]),
    );
    show_root(turn).after(vec![greeting])
}

pub(crate) fn show_root(turn: &Turn<'_>) -> Outcome {
    Outcome::goto(
        ConversationState::MainMenu,
        Some(ContextPatch::flow(ActiveFlow::Menu { path: Vec::new() })),
        vec![render_level(turn, &[])],
    )
}

/// Pops one submenu level; at the root the root menu is simply re-rendered.
pub(crate) fn pop_level(turn: &Turn<'_>) -> Outcome {
    let (mut path, _) = resolve_path(turn.tenant, turn.session.context.menu_path());
    path.pop();
    let text = render_level(turn, &path);
    Outcome::goto(
        ConversationState::MainMenu,
        Some(ContextPatch::flow(ActiveFlow::Menu { path })),
        vec![text],
    )
}

pub(crate) fn handle_selection(turn: &Turn<'_>) -> Outcome {
    let (path, _) = resolve_path(turn.tenant, turn.session.context.menu_path());
    select(turn, path)
}

/// `DOCUMENTS` shows a fixed text; whatever comes next is read against the root menu.
pub(crate) fn handle_documents(turn: &Turn<'_>) -> Outcome {
    select(turn, Vec::new())
}

pub(crate) fn show_documents(turn: &Turn<'_>) -> Outcome {
    let text = turn.render(
        TemplateKey::Documents,
        &context([("documents", turn.tenant.documents_info.clone().unwrap_or_default())]),
    );
    Outcome::goto(ConversationState::Documents, None, vec![text])
}

fn select(turn: &Turn<'_>, path: Vec<String>) -> Outcome {
    let level = turn.tenant.menu_level(&path);
    let chosen = turn
        .intent
        .selection()
        .and_then(|choice| choice.checked_sub(1))
        .and_then(|index| level.get(index));

    match chosen {
        Some(node) => apply(turn, node, path),
        None => invalid_option(turn, vec![render_level(turn, &path)]),
    }
}

fn apply(turn: &Turn<'_>, node: &MenuNode, mut path: Vec<String>) -> Outcome {
    tracing::debug!(
        event_name = "engine.menu_selected",
        tenant_id = %turn.tenant.tenant_id,
        user_id = %turn.message.sender_id,
        node_id = %node.id,
        "menu option selected"
    );

    match &node.action {
        MenuAction::Submenu if !node.children.is_empty() => {
            path.push(node.id.clone());
            let text = render_level(turn, &path);
            Outcome::goto(
                ConversationState::MainMenu,
                Some(ContextPatch::flow(ActiveFlow::Menu { path })),
                vec![text],
            )
        }
        MenuAction::Submenu => invalid_option(turn, vec![render_level(turn, &path)]),
        MenuAction::Courses => catalog::show_list(turn),
        MenuAction::Appointment => appointment::start(turn, None),
        MenuAction::Enrollment => enrollment::start(turn, None),
        MenuAction::Faq => faq::show_categories(turn),
        MenuAction::Human => human::hand_off(turn),
        MenuAction::Documents => show_documents(turn),
        MenuAction::Contact => stay_on_level(path, contact_text(turn)),
        MenuAction::Custom { text } => stay_on_level(path, text.clone()),
        MenuAction::Form { form_id } => form::start(turn, form_id),
    }
}

fn stay_on_level(path: Vec<String>, text: String) -> Outcome {
    Outcome::goto(
        ConversationState::MainMenu,
        Some(ContextPatch::flow(ActiveFlow::Menu { path })),
        vec![text],
    )
}

fn contact_text(turn: &Turn<'_>) -> String {
    turn.render(
        TemplateKey::Contact,
        &context([
            ("contact", turn.tenant.contact_info.clone().unwrap_or_default()),
            ("business_name", turn.tenant.business_name.clone()),
        ]),
    )
}

fn render_level(turn: &Turn<'_>, path: &[String]) -> String {
    let (_, title) = resolve_path(turn.tenant, path);
    let level = turn.tenant.menu_level(path);
    let mut options = numbered(level.iter().map(|node| node.title.as_str()));
    if !path.is_empty() {
        options.push_str("\n0. Voltar");
    }

    turn.render(
        TemplateKey::Menu,
        &context([("title", title.unwrap_or(ROOT_TITLE).to_string()), ("options", options)]),
    )
}

/// Deepest valid prefix of `path` and the title of the submenu it lands on.
fn resolve_path<'t>(tenant: &'t TenantConfig, path: &[String]) -> (Vec<String>, Option<&'t str>) {
    let mut level: &[MenuNode] = &tenant.menu;
    let mut valid = Vec::new();
    let mut title = None;
    for id in path {
        match level.iter().find(|node| &node.id == id) {
            Some(node) if !node.children.is_empty() => {
                valid.push(id.clone());
                title = Some(node.title.as_str());
                level = &node.children;
            }
            _ => break,
        }
    }
    (valid, title)
}
