use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentCode(pub String);

impl AppointmentCode {
    /// Short customer-facing code, e.g. `AG-7KQ2XD`.
    pub fn generate() -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .map(|ch| ch.to_ascii_uppercase())
            .collect();
        Self(format!("AG-{suffix}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Non-cancelled appointments occupy their slot.
    pub fn blocks_slot(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// A booked slot. `scheduled_at`/`end_at` are tenant-local wall-clock times.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub code: AppointmentCode,
    pub tenant_id: TenantId,
    pub scheduled_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub status: AppointmentStatus,
    pub requester_name: String,
    pub requester_phone: String,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn date(&self) -> NaiveDate {
        self.scheduled_at.date()
    }

    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.status.blocks_slot() && start < self.end_at && end > self.scheduled_at
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self.status, next),
            (AppointmentStatus::Pending, AppointmentStatus::Confirmed)
                | (AppointmentStatus::Confirmed, AppointmentStatus::Completed)
                | (AppointmentStatus::Pending, AppointmentStatus::Cancelled)
                | (AppointmentStatus::Confirmed, AppointmentStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: AppointmentStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidAppointmentTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, Utc};

    use super::{Appointment, AppointmentCode, AppointmentId, AppointmentStatus};
    use crate::domain::tenant::TenantId;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .expect("valid local datetime")
    }

    fn appointment(status: AppointmentStatus) -> Appointment {
        Appointment {
            id: AppointmentId("apt-1".to_string()),
            code: AppointmentCode("AG-TEST01".to_string()),
            tenant_id: TenantId("t1".to_string()),
            scheduled_at: at(10, 0),
            end_at: at(11, 0),
            status,
            requester_name: "Maria".to_string(),
            requester_phone: "5511999990000".to_string(),
            purpose: "Visita".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn generated_codes_have_expected_shape() {
        let code = AppointmentCode::generate();
        assert!(code.0.starts_with("AG-"));
        assert_eq!(code.0.len(), 9);
        assert!(code.0[3..].chars().all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit()));
    }

    #[test]
    fn overlap_is_half_open() {
        let booked = appointment(AppointmentStatus::Confirmed);
        assert!(booked.overlaps(at(10, 30), at(11, 30)));
        assert!(!booked.overlaps(at(11, 0), at(12, 0)));
        assert!(!booked.overlaps(at(9, 0), at(10, 0)));

        let cancelled = appointment(AppointmentStatus::Cancelled);
        assert!(!cancelled.overlaps(at(10, 0), at(11, 0)));
    }

    #[test]
    fn cancellation_is_terminal() {
        let mut booked = appointment(AppointmentStatus::Confirmed);
        booked.transition_to(AppointmentStatus::Cancelled).expect("confirmed -> cancelled");

        let error = booked
            .transition_to(AppointmentStatus::Confirmed)
            .expect_err("cancelled cannot be revived");
        assert!(matches!(error, crate::errors::DomainError::InvalidAppointmentTransition { .. }));

        let mut done = appointment(AppointmentStatus::Completed);
        assert!(done.transition_to(AppointmentStatus::Cancelled).is_err());
    }
}
