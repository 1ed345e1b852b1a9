use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::UserId;
use crate::domain::tenant::TenantId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Audio,
    Sticker,
    Image,
    Document,
    Location,
}

impl MessageType {
    /// Media the engine cannot interpret and answers with a fixed notice.
    pub fn is_unsupported_media(&self) -> bool {
        matches!(self, Self::Audio | Self::Sticker)
    }
}

/// One message delivered by the transport adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub tenant_id: TenantId,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub direction: MessageDirection,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
