//! Process-local implementations of the storage and delivery ports. Used by tests, the
//! `chat` dry-run and any deployment that does not need durability.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use crate::domain::message::LoggedMessage;
use crate::domain::session::{Session, UserId};
use crate::domain::tenant::{TenantConfig, TenantId};
use crate::errors::ApplicationError;
use crate::integrations::{MessageLog, ReplySender};
use crate::scheduling::AppointmentRepository;
use crate::session::SessionRepository;
use crate::tenant::TenantConfigSource;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<Mutex<HashMap<(TenantId, UserId), Session>>>,
}

impl InMemorySessionRepository {
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<Option<Session>, ApplicationError> {
        Ok(lock(&self.sessions).get(&(tenant_id.clone(), user_id.clone())).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), ApplicationError> {
        lock(&self.sessions)
            .insert((session.tenant_id.clone(), session.user_id.clone()), session.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTenantSource {
    tenants: Arc<Mutex<HashMap<TenantId, TenantConfig>>>,
}

impl InMemoryTenantSource {
    pub fn put(&self, config: TenantConfig) {
        lock(&self.tenants).insert(config.tenant_id.clone(), config);
    }
}

#[async_trait]
impl TenantConfigSource for InMemoryTenantSource {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<TenantConfig>, ApplicationError> {
        Ok(lock(&self.tenants).get(tenant_id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAppointmentRepository {
    appointments: Arc<Mutex<Vec<Appointment>>>,
}

impl InMemoryAppointmentRepository {
    pub fn all(&self) -> Vec<Appointment> {
        lock(&self.appointments).clone()
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn list_for_date(
        &self,
        tenant_id: &TenantId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, ApplicationError> {
        Ok(lock(&self.appointments)
            .iter()
            .filter(|appointment| &appointment.tenant_id == tenant_id && appointment.date() == date)
            .cloned()
            .collect())
    }

    async fn list_between(
        &self,
        tenant_id: &TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, ApplicationError> {
        let mut matching: Vec<Appointment> = lock(&self.appointments)
            .iter()
            .filter(|appointment| {
                &appointment.tenant_id == tenant_id
                    && appointment.date() >= start
                    && appointment.date() <= end
            })
            .cloned()
            .collect();
        matching.sort_by_key(|appointment| appointment.scheduled_at);
        Ok(matching)
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, ApplicationError> {
        Ok(lock(&self.appointments)
            .iter()
            .find(|appointment| &appointment.tenant_id == tenant_id && &appointment.id == id)
            .cloned())
    }

    async fn insert_if_free(&self, appointment: &Appointment) -> Result<bool, ApplicationError> {
        let mut appointments = lock(&self.appointments);
        let taken = appointments.iter().any(|existing| {
            existing.tenant_id == appointment.tenant_id
                && existing.overlaps(appointment.scheduled_at, appointment.end_at)
        });
        if taken {
            return Ok(false);
        }
        appointments.push(appointment.clone());
        Ok(true)
    }

    async fn update_status(
        &self,
        tenant_id: &TenantId,
        id: &AppointmentId,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        let mut appointments = lock(&self.appointments);
        let appointment = appointments
            .iter_mut()
            .find(|appointment| &appointment.tenant_id == tenant_id && &appointment.id == id)
            .ok_or_else(|| ApplicationError::NotFound(format!("appointment `{}`", id.0)))?;
        appointment.status = status;
        appointment.updated_at = updated_at;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMessageLog {
    entries: Arc<Mutex<Vec<LoggedMessage>>>,
}

impl InMemoryMessageLog {
    pub fn entries(&self) -> Vec<LoggedMessage> {
        lock(&self.entries).clone()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(&self, entry: LoggedMessage) -> Result<(), ApplicationError> {
        lock(&self.entries).push(entry);
        Ok(())
    }

    async fn recent(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<LoggedMessage>, ApplicationError> {
        let entries = lock(&self.entries);
        let matching: Vec<LoggedMessage> = entries
            .iter()
            .filter(|entry| &entry.tenant_id == tenant_id && &entry.user_id == user_id)
            .filter(|entry| since.map(|since| entry.created_at >= since).unwrap_or(true))
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit as usize);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

/// Collects out-of-band replies in delivery order.
#[derive(Clone, Default)]
pub struct RecordingReplySender {
    sent: Arc<Mutex<Vec<(TenantId, UserId, String)>>>,
}

impl RecordingReplySender {
    pub fn sent(&self) -> Vec<(TenantId, UserId, String)> {
        lock(&self.sent).clone()
    }

    pub fn texts(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|(_, _, text)| text.clone()).collect()
    }
}

#[async_trait]
impl ReplySender for RecordingReplySender {
    async fn send(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        text: &str,
    ) -> Result<(), ApplicationError> {
        lock(&self.sent).push((tenant_id.clone(), user_id.clone(), text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::InMemoryMessageLog;
    use crate::domain::message::{LoggedMessage, MessageDirection};
    use crate::domain::session::UserId;
    use crate::domain::tenant::TenantId;
    use crate::integrations::MessageLog;

    #[tokio::test]
    async fn message_log_returns_most_recent_entries_in_order() {
        let log = InMemoryMessageLog::default();
        let tenant = TenantId("escola".to_string());
        let user = UserId("5511900000001".to_string());
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).single().expect("instant");

        for index in 0..5 {
            log.append(LoggedMessage {
                tenant_id: tenant.clone(),
                user_id: user.clone(),
                direction: MessageDirection::Inbound,
                body: format!("msg-{index}"),
                created_at: start + Duration::minutes(index),
            })
            .await
            .expect("append");
        }

        let recent = log.recent(&tenant, &user, None, 2).await.expect("recent");
        let bodies: Vec<_> = recent.iter().map(|entry| entry.body.as_str()).collect();
        assert_eq!(bodies, vec!["msg-3", "msg-4"]);

        let since = log
            .recent(&tenant, &user, Some(start + Duration::minutes(3)), 10)
            .await
            .expect("since");
        assert_eq!(since.len(), 2);
    }
}
