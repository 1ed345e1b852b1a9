use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;
use crate::flows::states::ConversationState;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub current_state: ConversationState,
    pub previous_state: Option<ConversationState>,
    pub context: SessionContext,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn fresh(tenant_id: TenantId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            user_id,
            current_state: ConversationState::initial(),
            previous_state: None,
            context: SessionContext::default(),
            last_activity_at: now,
        }
    }
}

/// Conversation context. Exactly one sub-flow is live at a time; the history is kept
/// alongside it for the AI collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default)]
    pub flow: ActiveFlow,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl SessionContext {
    /// Shallow merge: fields present in the patch overwrite, absent ones are preserved.
    pub fn merge(&mut self, patch: ContextPatch) {
        if let Some(flow) = patch.flow {
            self.flow = flow;
        }
        if let Some(history) = patch.history {
            self.history = history;
        }
    }

    pub fn menu_path(&self) -> &[String] {
        match &self.flow {
            ActiveFlow::Menu { path } => path,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActiveFlow {
    #[default]
    Idle,
    Menu {
        path: Vec<String>,
    },
    Catalog {
        course_id: Option<String>,
    },
    Faq {
        category_id: Option<String>,
        question_id: Option<String>,
    },
    Form(FormProgress),
    Appointment(AppointmentDraft),
    Enrollment {
        course_id: Option<String>,
    },
    Order(OrderProgress),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormProgress {
    pub form_id: String,
    pub step_index: usize,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDraft {
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProgress {
    pub order_id: String,
    pub course_id: String,
    pub amount: Decimal,
    pub copy_paste: String,
    #[serde(default)]
    pub qr_code: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextPatch {
    pub flow: Option<ActiveFlow>,
    pub history: Option<Vec<HistoryEntry>>,
}

impl ContextPatch {
    pub fn flow(flow: ActiveFlow) -> Self {
        Self { flow: Some(flow), history: None }
    }

    pub fn history(history: Vec<HistoryEntry>) -> Self {
        Self { flow: None, history: Some(history) }
    }
}

#[cfg(test)]
mod tests {
    use super::{ActiveFlow, ContextPatch, HistoryEntry, HistoryRole, SessionContext};

    #[test]
    fn merge_preserves_absent_fields() {
        let mut context = SessionContext {
            flow: ActiveFlow::Menu { path: vec!["secretaria".to_string()] },
            history: vec![HistoryEntry { role: HistoryRole::User, text: "oi".to_string() }],
        };

        context.merge(ContextPatch::flow(ActiveFlow::Catalog { course_id: None }));
        assert_eq!(context.flow, ActiveFlow::Catalog { course_id: None });
        assert_eq!(context.history.len(), 1);

        context.merge(ContextPatch::history(Vec::new()));
        assert_eq!(context.flow, ActiveFlow::Catalog { course_id: None });
        assert!(context.history.is_empty());
    }

    #[test]
    fn context_json_is_tagged_by_flow_kind() {
        let context = SessionContext {
            flow: ActiveFlow::Menu { path: vec!["a".to_string()] },
            history: Vec::new(),
        };
        let json = serde_json::to_value(&context).expect("serialize context");

        assert_eq!(json["flow"]["kind"], "menu");
        let decoded: SessionContext = serde_json::from_value(json).expect("deserialize context");
        assert_eq!(decoded.menu_path(), ["a".to_string()]);
    }
}
