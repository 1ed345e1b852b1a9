use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::UserId;
use crate::domain::tenant::TenantId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AppointmentRequested,
    AppointmentCreated,
    AppointmentCancelled,
    EnrollmentRequested,
    FormComplete,
    HumanTransferRequested,
    MessageLeft,
    PaymentRequested,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppointmentRequested => "appointment_requested",
            Self::AppointmentCreated => "appointment_created",
            Self::AppointmentCancelled => "appointment_cancelled",
            Self::EnrollmentRequested => "enrollment_requested",
            Self::FormComplete => "form_complete",
            Self::HumanTransferRequested => "human_transfer_requested",
            Self::MessageLeft => "message_left",
            Self::PaymentRequested => "payment_requested",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event_id: String,
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    pub kind: NotificationKind,
    pub payload: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(tenant_id: TenantId, user_id: Option<UserId>, kind: NotificationKind) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            tenant_id,
            user_id,
            kind,
            payload: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn with_fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in fields {
            self.payload.insert(key.into(), value.into());
        }
        self
    }
}

/// Best-effort domain event delivery. Implementations must not block the caller and
/// must swallow their own failures.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the structured log only.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn notify(&self, notification: Notification) {
        tracing::info!(
            event_name = "notify.emitted",
            notification = notification.kind.as_str(),
            event_id = %notification.event_id,
            tenant_id = %notification.tenant_id,
            user_id = notification.user_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            "domain notification emitted"
        );
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn notifications(&self) -> Vec<Notification> {
        match self.notifications.lock() {
            Ok(notifications) => notifications.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.notifications().iter().map(|notification| notification.kind).collect()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, notification: Notification) {
        match self.notifications.lock() {
            Ok(mut notifications) => notifications.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
