//! Appointment scheduling: bookable slots computed from tenant working hours, and
//! double-booking prevention through a recheck followed by an overlap-guarded insert.

pub mod slots;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::appointment::{Appointment, AppointmentCode, AppointmentId, AppointmentStatus};
use crate::domain::schedule::ScheduleConfig;
use crate::domain::session::UserId;
use crate::domain::tenant::{TenantConfig, TenantId};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::dates::parse_time;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::tenant::TenantConfigResolver;

pub use slots::Slot;

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Appointments of every status whose start falls on `date`.
    async fn list_for_date(
        &self,
        tenant_id: &TenantId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, ApplicationError>;

    /// Inclusive date range, ordered by start.
    async fn list_between(
        &self,
        tenant_id: &TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, ApplicationError>;

    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, ApplicationError>;

    /// Inserts unless a non-cancelled appointment of the same tenant overlaps
    /// `[scheduled_at, end_at)`. The check and the write are one atomic step.
    /// Returns `false` when the slot was taken.
    async fn insert_if_free(&self, appointment: &Appointment) -> Result<bool, ApplicationError>;

    async fn update_status(
        &self,
        tenant_id: &TenantId,
        id: &AppointmentId,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("slot {date} {time} is no longer available")]
    Conflict { date: NaiveDate, time: String },
    #[error("appointment `{0}` was not found")]
    NotFound(String),
    #[error("invalid booking request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl From<SchedulingError> for ApplicationError {
    fn from(error: SchedulingError) -> Self {
        match error {
            SchedulingError::Application(error) => error,
            SchedulingError::Domain(error) => Self::Domain(error),
            SchedulingError::NotFound(id) => Self::NotFound(format!("appointment `{id}`")),
            other => Self::Domain(DomainError::InvariantViolation(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub date: NaiveDate,
    pub time: String,
    pub requester_name: String,
    pub requester_phone: String,
    pub purpose: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: AppointmentId,
    pub code: AppointmentCode,
    pub scheduled_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
}

pub struct SchedulingEngine {
    tenants: Arc<TenantConfigResolver>,
    appointments: Arc<dyn AppointmentRepository>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl SchedulingEngine {
    pub fn new(
        tenants: Arc<TenantConfigResolver>,
        appointments: Arc<dyn AppointmentRepository>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { tenants, appointments, notifications, clock }
    }

    pub async fn get_config(
        &self,
        tenant_id: &TenantId,
    ) -> Result<ScheduleConfig, SchedulingError> {
        let tenant = self.tenants.resolve(tenant_id).await?;
        Ok(schedule_of(&tenant))
    }

    pub async fn get_available_slots(
        &self,
        tenant_id: &TenantId,
        date: NaiveDate,
    ) -> Result<Vec<String>, SchedulingError> {
        let tenant = self.tenants.resolve(tenant_id).await?;
        let slots = self.compute_slots(&tenant, date).await?;
        Ok(slots::labels(&slots))
    }

    pub async fn create_appointment(
        &self,
        tenant_id: &TenantId,
        request: BookingRequest,
    ) -> Result<Booking, SchedulingError> {
        let time = parse_time(&request.time).ok_or_else(|| {
            SchedulingError::InvalidRequest(format!("`{}` is not an HH:MM time", request.time))
        })?;
        if request.requester_name.trim().is_empty() {
            return Err(SchedulingError::InvalidRequest("requester name is required".to_string()));
        }

        let tenant = self.tenants.resolve(tenant_id).await?;
        let available = self.compute_slots(&tenant, request.date).await?;
        let slot = available
            .into_iter()
            .find(|slot| slot.label() == time)
            .ok_or_else(|| SchedulingError::Conflict { date: request.date, time: time.clone() })?;

        let now = self.clock.now();
        let appointment = Appointment {
            id: AppointmentId(Uuid::new_v4().to_string()),
            code: AppointmentCode::generate(),
            tenant_id: tenant_id.clone(),
            scheduled_at: slot.start,
            end_at: slot.end,
            status: AppointmentStatus::Confirmed,
            requester_name: request.requester_name.trim().to_string(),
            requester_phone: request.requester_phone.trim().to_string(),
            purpose: request.purpose.trim().to_string(),
            created_at: now,
            updated_at: now,
        };

        if !self.appointments.insert_if_free(&appointment).await? {
            tracing::warn!(
                event_name = "scheduling.booking_conflict",
                tenant_id = %tenant_id,
                date = %request.date,
                time = %time,
                "slot taken between recheck and insert"
            );
            return Err(SchedulingError::Conflict { date: request.date, time });
        }

        tracing::info!(
            event_name = "scheduling.appointment_created",
            tenant_id = %tenant_id,
            appointment_id = %appointment.id.0,
            code = %appointment.code.0,
            scheduled_at = %appointment.scheduled_at,
            "appointment created"
        );
        self.notifications.notify(
            Notification::new(
                tenant_id.clone(),
                request.user_id,
                NotificationKind::AppointmentCreated,
            )
            .with_fields([
                ("appointment_id", appointment.id.0.clone()),
                ("code", appointment.code.0.clone()),
                ("scheduled_at", appointment.scheduled_at.to_string()),
                ("end_at", appointment.end_at.to_string()),
                ("requester_name", appointment.requester_name.clone()),
                ("requester_phone", appointment.requester_phone.clone()),
                ("purpose", appointment.purpose.clone()),
            ]),
        );

        Ok(Booking {
            id: appointment.id,
            code: appointment.code,
            scheduled_at: appointment.scheduled_at,
            end_at: appointment.end_at,
        })
    }

    /// Idempotent: an already-cancelled appointment is returned unchanged and no
    /// notification is emitted again.
    pub async fn cancel_appointment(
        &self,
        tenant_id: &TenantId,
        id: &AppointmentId,
    ) -> Result<Appointment, SchedulingError> {
        let mut appointment = self
            .appointments
            .find(tenant_id, id)
            .await?
            .ok_or_else(|| SchedulingError::NotFound(id.0.clone()))?;

        if appointment.status == AppointmentStatus::Cancelled {
            return Ok(appointment);
        }

        appointment.transition_to(AppointmentStatus::Cancelled)?;
        appointment.updated_at = self.clock.now();
        self.appointments
            .update_status(tenant_id, id, appointment.status, appointment.updated_at)
            .await?;

        tracing::info!(
            event_name = "scheduling.appointment_cancelled",
            tenant_id = %tenant_id,
            appointment_id = %id.0,
            "appointment cancelled"
        );
        self.notifications.notify(
            Notification::new(tenant_id.clone(), None, NotificationKind::AppointmentCancelled)
                .with_field("appointment_id", id.0.clone())
                .with_field("code", appointment.code.0.clone())
                .with_field("scheduled_at", appointment.scheduled_at.to_string()),
        );

        Ok(appointment)
    }

    pub async fn list_appointments(
        &self,
        tenant_id: &TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        if start > end {
            return Err(SchedulingError::InvalidRequest(format!(
                "range start {start} is after range end {end}"
            )));
        }

        let mut appointments = self.appointments.list_between(tenant_id, start, end).await?;
        appointments.sort_by_key(|appointment| appointment.scheduled_at);
        Ok(appointments)
    }

    /// Whether `at` falls inside the tenant's working hours, evaluated in tenant-local time.
    pub async fn is_within_business_hours(
        &self,
        tenant_id: &TenantId,
        at: DateTime<Utc>,
    ) -> Result<bool, SchedulingError> {
        let tenant = self.tenants.resolve(tenant_id).await?;
        Ok(within_business_hours(&tenant, at))
    }

    /// Tenant-local "today".
    pub fn today_for(&self, tenant: &TenantConfig) -> NaiveDate {
        local_now(tenant, self.clock.now()).date()
    }

    async fn compute_slots(
        &self,
        tenant: &TenantConfig,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, SchedulingError> {
        let config = schedule_of(tenant);
        let now_local = local_now(tenant, self.clock.now());
        if date < now_local.date() {
            return Ok(Vec::new());
        }

        let existing = self.appointments.list_for_date(&tenant.tenant_id, date).await?;
        Ok(slots::available_slots(&config, date, &existing, now_local))
    }
}

pub fn schedule_of(tenant: &TenantConfig) -> ScheduleConfig {
    tenant.schedule.clone().unwrap_or_default()
}

pub fn within_business_hours(tenant: &TenantConfig, at: DateTime<Utc>) -> bool {
    let local = local_now(tenant, at);
    schedule_of(tenant).is_open_at(local.weekday().into(), local.time())
}

fn local_now(tenant: &TenantConfig, now: DateTime<Utc>) -> NaiveDateTime {
    now.with_timezone(&tenant.offset()).naive_local()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{BookingRequest, SchedulingEngine, SchedulingError};
    use crate::clock::FixedClock;
    use crate::domain::appointment::{AppointmentId, AppointmentStatus};
    use crate::domain::schedule::{DayOfWeek, DaySchedule, ScheduleConfig, TimeInterval};
    use crate::domain::tenant::{TenantConfig, TenantId};
    use crate::memory::{InMemoryAppointmentRepository, InMemoryTenantSource};
    use crate::notify::{InMemoryNotificationSink, NotificationKind};
    use crate::tenant::TenantConfigResolver;

    struct Fixture {
        engine: Arc<SchedulingEngine>,
        clock: FixedClock,
        notifications: InMemoryNotificationSink,
        tenant: TenantId,
    }

    // 2026-03-02 is a Monday; 08:00 local at UTC-3 is 11:00 UTC.
    fn fixture() -> Fixture {
        let tenant = TenantId("escola".to_string());
        let mut config = TenantConfig::fallback(tenant.clone());
        let mut schedule = ScheduleConfig::default();
        schedule.days.insert(
            DayOfWeek::Monday,
            DaySchedule { enabled: true, intervals: vec![TimeInterval::new("09:00", "12:00")] },
        );
        config.schedule = Some(schedule);

        let clock = FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).single().expect("valid instant"),
        );
        let source = InMemoryTenantSource::default();
        source.put(config);
        let resolver = Arc::new(TenantConfigResolver::new(
            Arc::new(source),
            Arc::new(clock.clone()),
            Duration::seconds(300),
        ));
        let notifications = InMemoryNotificationSink::default();
        let engine = Arc::new(SchedulingEngine::new(
            resolver,
            Arc::new(InMemoryAppointmentRepository::default()),
            Arc::new(notifications.clone()),
            Arc::new(clock.clone()),
        ));

        Fixture { engine, clock, notifications, tenant }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date")
    }

    fn request(date: NaiveDate, time: &str, name: &str) -> BookingRequest {
        BookingRequest {
            date,
            time: time.to_string(),
            requester_name: name.to_string(),
            requester_phone: "5511999990000".to_string(),
            purpose: "Visita".to_string(),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn missing_schedule_uses_weekday_template() {
        let fixture = fixture();
        let other = TenantId("other".to_string());
        let config = fixture.engine.get_config(&other).await.expect("config");
        assert_eq!(config, ScheduleConfig::default());
    }

    #[tokio::test]
    async fn created_slot_disappears_from_availability() {
        let fixture = fixture();
        let before =
            fixture.engine.get_available_slots(&fixture.tenant, monday()).await.expect("slots");
        assert_eq!(before, vec!["09:00", "10:00", "11:00"]);

        let booking = fixture
            .engine
            .create_appointment(&fixture.tenant, request(monday(), "10:00", "Maria"))
            .await
            .expect("booking");
        assert!(booking.code.0.starts_with("AG-"));
        assert_eq!((booking.end_at - booking.scheduled_at).num_minutes(), 60);

        let after =
            fixture.engine.get_available_slots(&fixture.tenant, monday()).await.expect("slots");
        assert_eq!(after, vec!["09:00", "11:00"]);
        assert_eq!(fixture.notifications.kinds(), vec![NotificationKind::AppointmentCreated]);
    }

    #[tokio::test]
    async fn booking_a_taken_or_past_slot_conflicts() {
        let fixture = fixture();
        fixture
            .engine
            .create_appointment(&fixture.tenant, request(monday(), "09:00", "Maria"))
            .await
            .expect("first booking");

        let taken = fixture
            .engine
            .create_appointment(&fixture.tenant, request(monday(), "09:00", "João"))
            .await;
        assert!(matches!(taken, Err(SchedulingError::Conflict { .. })));

        fixture.clock.advance(Duration::hours(2));
        let past = fixture
            .engine
            .create_appointment(&fixture.tenant, request(monday(), "10:00", "João"))
            .await;
        assert!(matches!(past, Err(SchedulingError::Conflict { .. })));

        let yesterday = monday().pred_opt().expect("sunday");
        let slots =
            fixture.engine.get_available_slots(&fixture.tenant, yesterday).await.expect("slots");
        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected_before_touching_storage() {
        let fixture = fixture();
        let bad_time = fixture
            .engine
            .create_appointment(&fixture.tenant, request(monday(), "dez horas", "Maria"))
            .await;
        assert!(matches!(bad_time, Err(SchedulingError::InvalidRequest(_))));

        let no_name = fixture
            .engine
            .create_appointment(&fixture.tenant, request(monday(), "10:00", " "))
            .await;
        assert!(matches!(no_name, Err(SchedulingError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn concurrent_bookings_for_one_slot_confirm_exactly_once() {
        let fixture = fixture();
        let mut handles = Vec::new();
        for index in 0..8 {
            let engine = Arc::clone(&fixture.engine);
            let tenant = fixture.tenant.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .create_appointment(
                        &tenant,
                        request(monday(), "11:00", &format!("user-{index}")),
                    )
                    .await
            }));
        }

        let mut confirmed = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.expect("task joined") {
                Ok(_) => confirmed += 1,
                Err(SchedulingError::Conflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(confirmed, 1);
        assert_eq!(conflicts, 7);
        let listed = fixture
            .engine
            .list_appointments(&fixture.tenant, monday(), monday())
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_notifies_once() {
        let fixture = fixture();
        let booking = fixture
            .engine
            .create_appointment(&fixture.tenant, request(monday(), "09:00", "Maria"))
            .await
            .expect("booking");

        let first =
            fixture.engine.cancel_appointment(&fixture.tenant, &booking.id).await.expect("cancel");
        let second =
            fixture.engine.cancel_appointment(&fixture.tenant, &booking.id).await.expect("again");
        assert_eq!(first.status, AppointmentStatus::Cancelled);
        assert_eq!(second.status, AppointmentStatus::Cancelled);
        assert_eq!(
            fixture.notifications.kinds(),
            vec![NotificationKind::AppointmentCreated, NotificationKind::AppointmentCancelled]
        );

        let slots =
            fixture.engine.get_available_slots(&fixture.tenant, monday()).await.expect("slots");
        assert!(slots.contains(&"09:00".to_string()));

        let missing = fixture
            .engine
            .cancel_appointment(&fixture.tenant, &AppointmentId("nope".to_string()))
            .await;
        assert!(matches!(missing, Err(SchedulingError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_is_inclusive_and_chronological() {
        let fixture = fixture();
        for time in ["11:00", "09:00"] {
            fixture
                .engine
                .create_appointment(&fixture.tenant, request(monday(), time, "Maria"))
                .await
                .expect("booking");
        }

        let listed = fixture
            .engine
            .list_appointments(&fixture.tenant, monday(), monday())
            .await
            .expect("list");
        let times: Vec<_> =
            listed.iter().map(|item| item.scheduled_at.format("%H:%M").to_string()).collect();
        assert_eq!(times, vec!["09:00", "11:00"]);

        let inverted = fixture
            .engine
            .list_appointments(&fixture.tenant, monday(), monday().pred_opt().expect("sunday"))
            .await;
        assert!(matches!(inverted, Err(SchedulingError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn business_hours_are_evaluated_in_tenant_local_time() {
        let fixture = fixture();
        // 12:30 UTC is 09:30 local.
        let open = Utc.with_ymd_and_hms(2026, 3, 2, 12, 30, 0).single().expect("instant");
        // 15:30 UTC is 12:30 local, after the Monday window closes.
        let closed = Utc.with_ymd_and_hms(2026, 3, 2, 15, 30, 0).single().expect("instant");

        let is_open = fixture.engine.is_within_business_hours(&fixture.tenant, open).await;
        assert!(is_open.expect("open"));
        assert!(!fixture
            .engine
            .is_within_business_hours(&fixture.tenant, closed)
            .await
            .expect("closed"));
    }
}
