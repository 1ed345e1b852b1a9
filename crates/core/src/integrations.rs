//! Narrow ports to the collaborators the conversation engine talks to but does not own:
//! the AI assistant, the PIX payment provider, the outbound transport and the message log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::message::LoggedMessage;
use crate::domain::session::{HistoryEntry, UserId};
use crate::domain::tenant::{PaymentSettings, TenantId};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub text: String,
    pub history: Vec<HistoryEntry>,
    pub knowledge: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiAction {
    #[default]
    Continue,
    Transfer,
    Menu,
    Appointment,
    Enrollment,
}

impl AiAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Transfer => "transfer",
            Self::Menu => "menu",
            Self::Appointment => "appointment",
            Self::Enrollment => "enrollment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "continue" => Some(Self::Continue),
            "transfer" => Some(Self::Transfer),
            "menu" => Some(Self::Menu),
            "appointment" => Some(Self::Appointment),
            "enrollment" => Some(Self::Enrollment),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AiReply {
    pub message: String,
    pub action: AiAction,
    pub confidence: f32,
}

#[async_trait]
pub trait AiCollaborator: Send + Sync {
    async fn process_message(&self, request: AiRequest) -> Result<AiReply, ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixRequest {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub item_id: String,
    pub amount: Decimal,
    pub settings: PaymentSettings,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixCharge {
    pub success: bool,
    pub order_id: String,
    pub copy_paste: String,
    #[serde(default)]
    pub qr_code: Option<String>,
}

#[async_trait]
pub trait PaymentCollaborator: Send + Sync {
    async fn generate_pix(&self, request: PixRequest) -> Result<PixCharge, ApplicationError>;
}

/// Out-of-band delivery back to the end user, used when a reply must go out before the
/// engine finishes handling the message.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        text: &str,
    ) -> Result<(), ApplicationError>;
}

/// Drops every reply; useful where only the returned message list matters.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardReplies;

#[async_trait]
impl ReplySender for DiscardReplies {
    async fn send(&self, _: &TenantId, _: &UserId, _: &str) -> Result<(), ApplicationError> {
        Ok(())
    }
}

#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append(&self, entry: LoggedMessage) -> Result<(), ApplicationError>;

    async fn recent(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<LoggedMessage>, ApplicationError>;
}

#[cfg(test)]
mod tests {
    use super::AiAction;

    #[test]
    fn ai_actions_parse_case_insensitively() {
        assert_eq!(AiAction::parse(" Transfer "), Some(AiAction::Transfer));
        assert_eq!(AiAction::parse("enrollment"), Some(AiAction::Enrollment));
        assert_eq!(AiAction::parse("escalate"), None);
        assert_eq!(AiAction::default().as_str(), "continue");
    }
}
