use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::schedule::ScheduleConfig;
use crate::flows::states::ConversationState;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    #[default]
    Active,
    Inactive,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Per-tenant business rules. Everything the conversation engine needs to answer on
/// behalf of one business lives here and is treated as immutable once resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: TenantId,
    pub business_name: String,
    #[serde(default)]
    pub status: TenantStatus,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub grace_period_days: u32,
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub session_timeout_minutes: Option<u32>,
    #[serde(default)]
    pub contact_info: Option<String>,
    #[serde(default)]
    pub documents_info: Option<String>,
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(default)]
    pub menu: Vec<MenuNode>,
    #[serde(default)]
    pub faq: Vec<FaqCategory>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub forms: Vec<FormDefinition>,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub ai: Option<AiSettings>,
    #[serde(default)]
    pub payment: Option<PaymentSettings>,
    #[serde(default)]
    pub keyword_routes: BTreeMap<String, ConversationState>,
}

fn default_utc_offset_minutes() -> i32 {
    -180
}

impl TenantConfig {
    /// Minimal configuration used when a tenant has no stored configuration.
    pub fn fallback(tenant_id: TenantId) -> Self {
        Self {
            business_name: tenant_id.0.clone(),
            tenant_id,
            status: TenantStatus::Active,
            expires_at: None,
            grace_period_days: 0,
            utc_offset_minutes: default_utc_offset_minutes(),
            session_timeout_minutes: None,
            contact_info: None,
            documents_info: None,
            templates: BTreeMap::new(),
            menu: default_menu(),
            faq: Vec::new(),
            courses: Vec::new(),
            forms: Vec::new(),
            schedule: None,
            ai: None,
            payment: None,
            keyword_routes: BTreeMap::new(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// A tenant is suspended when deactivated or once its subscription expired longer
    /// ago than the grace period.
    pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
        if self.status == TenantStatus::Inactive {
            return true;
        }
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        // A grace period past the calendar's end never lapses.
        Duration::try_days(i64::from(self.grace_period_days))
            .and_then(|grace| expires_at.checked_add_signed(grace))
            .is_some_and(|deadline| now > deadline)
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai.as_ref().map(|ai| ai.enabled).unwrap_or(false)
    }

    pub fn payments_enabled(&self) -> bool {
        self.payment.as_ref().map(|payment| payment.enabled).unwrap_or(false)
    }

    pub fn course(&self, course_id: &str) -> Option<&Course> {
        self.courses.iter().find(|course| course.id == course_id)
    }

    pub fn faq_category(&self, category_id: &str) -> Option<&FaqCategory> {
        self.faq.iter().find(|category| category.id == category_id)
    }

    pub fn form(&self, form_id: &str) -> Option<&FormDefinition> {
        self.forms.iter().find(|form| form.id == form_id)
    }

    /// Walks the menu tree following `path` (a stack of submenu ids) and returns the
    /// nodes rendered at that depth. Unknown ids stop the walk at the deepest valid level.
    pub fn menu_level(&self, path: &[String]) -> &[MenuNode] {
        let mut level: &[MenuNode] = &self.menu;
        for id in path {
            match level.iter().find(|node| &node.id == id) {
                Some(node) if !node.children.is_empty() => level = &node.children,
                _ => break,
            }
        }
        level
    }

    /// Free-text knowledge handed to the AI collaborator.
    pub fn knowledge_context(&self) -> String {
        let mut lines = vec![format!("Empresa: {}", self.business_name)];
        if !self.courses.is_empty() {
            lines.push("Cursos:".to_string());
            for course in &self.courses {
                let price = course
                    .price
                    .map(|price| format!(" (R$ {price})"))
                    .unwrap_or_default();
                lines.push(format!("- {}{}: {}", course.title, price, course.description));
            }
        }
        for category in &self.faq {
            lines.push(format!("FAQ - {}:", category.title));
            for question in &category.questions {
                lines.push(format!("P: {}\nR: {}", question.question, question.answer));
            }
        }
        lines.join("\n")
    }
}

fn default_menu() -> Vec<MenuNode> {
    vec![
        MenuNode::leaf("courses", "Cursos", MenuAction::Courses),
        MenuNode::leaf("appointment", "Agendar atendimento", MenuAction::Appointment),
        MenuNode::leaf("faq", "Dúvidas frequentes", MenuAction::Faq),
        MenuNode::leaf("human", "Falar com um atendente", MenuAction::Human),
    ]
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuNode {
    pub id: String,
    pub title: String,
    pub action: MenuAction,
    #[serde(default)]
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    pub fn leaf(id: &str, title: &str, action: MenuAction) -> Self {
        Self { id: id.to_string(), title: title.to_string(), action, children: Vec::new() }
    }

    pub fn submenu(id: &str, title: &str, children: Vec<MenuNode>) -> Self {
        Self { id: id.to_string(), title: title.to_string(), action: MenuAction::Submenu, children }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MenuAction {
    Courses,
    Appointment,
    Enrollment,
    Faq,
    Human,
    Contact,
    Documents,
    Custom { text: String },
    Form { form_id: String },
    Submenu,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqCategory {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<FaqQuestion>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqQuestion {
    pub id: String,
    pub question: String,
    pub answer: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub steps: Vec<FormStep>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormStep {
    pub field: String,
    pub prompt: String,
    #[serde(default)]
    pub field_type: FieldType,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Email,
    Phone,
    Number,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSettings {
    pub enabled: bool,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSettings {
    pub enabled: bool,
    #[serde(default)]
    pub pix_key: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
}
