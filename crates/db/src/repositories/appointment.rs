use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;

use atende_core::domain::appointment::{
    Appointment, AppointmentCode, AppointmentId, AppointmentStatus,
};
use atende_core::domain::tenant::TenantId;
use atende_core::errors::ApplicationError;
use atende_core::scheduling::AppointmentRepository;

use super::{column, format_local, parse_local, parse_utc, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT id, code, tenant_id, scheduled_at, end_at, status,
        requester_name, requester_phone, purpose, created_at, updated_at
 FROM appointments";

pub struct SqlAppointmentRepository {
    pool: DbPool,
}

impl SqlAppointmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_appointment(row: &SqliteRow) -> Result<Appointment, RepositoryError> {
    let id: String = column(row, "id")?;
    let code: String = column(row, "code")?;
    let tenant_id: String = column(row, "tenant_id")?;
    let scheduled_at: String = column(row, "scheduled_at")?;
    let end_at: String = column(row, "end_at")?;
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(Appointment {
        id: AppointmentId(id),
        code: AppointmentCode(code),
        tenant_id: TenantId(tenant_id),
        scheduled_at: parse_local(&scheduled_at, "scheduled_at")?,
        end_at: parse_local(&end_at, "end_at")?,
        status: AppointmentStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("status: unknown `{status}`")))?,
        requester_name: column(row, "requester_name")?,
        requester_phone: column(row, "requester_phone")?,
        purpose: column(row, "purpose")?,
        created_at: parse_utc(&created_at, "created_at")?,
        updated_at: parse_utc(&updated_at, "updated_at")?,
    })
}

/// `[start of first day, start of day after last)` in the local layout.
fn day_bounds(start: NaiveDate, end: NaiveDate) -> (String, String) {
    let from = start.and_hms_opt(0, 0, 0).unwrap_or_default();
    let until = (end + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap_or_default();
    (format_local(from), format_local(until))
}

impl SqlAppointmentRepository {
    async fn select_between(
        &self,
        tenant_id: &TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let (from, until) = day_bounds(start, end);
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS}
             WHERE tenant_id = ? AND scheduled_at >= ? AND scheduled_at < ?
             ORDER BY scheduled_at, created_at"
        ))
        .bind(&tenant_id.0)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_appointment).collect()
    }

    async fn select_one(
        &self,
        tenant_id: &TenantId,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE tenant_id = ? AND id = ?"))
            .bind(&tenant_id.0)
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_appointment).transpose()
    }

    /// The overlap guard and the insert are one statement inside one transaction, so two
    /// conversations racing for the same slot cannot both succeed.
    async fn guarded_insert(&self, appointment: &Appointment) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO appointments (id, code, tenant_id, scheduled_at, end_at, status,
                                       requester_name, requester_phone, purpose, created_at,
                                       updated_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE NOT EXISTS (
                 SELECT 1 FROM appointments
                 WHERE tenant_id = ?
                   AND status != 'cancelled'
                   AND scheduled_at < ?
                   AND end_at > ?
             )",
        )
        .bind(&appointment.id.0)
        .bind(&appointment.code.0)
        .bind(&appointment.tenant_id.0)
        .bind(format_local(appointment.scheduled_at))
        .bind(format_local(appointment.end_at))
        .bind(appointment.status.as_str())
        .bind(&appointment.requester_name)
        .bind(&appointment.requester_phone)
        .bind(&appointment.purpose)
        .bind(appointment.created_at.to_rfc3339())
        .bind(appointment.updated_at.to_rfc3339())
        .bind(&appointment.tenant_id.0)
        .bind(format_local(appointment.end_at))
        .bind(format_local(appointment.scheduled_at))
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn set_status(
        &self,
        tenant_id: &TenantId,
        id: &AppointmentId,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE appointments SET status = ?, updated_at = ? WHERE tenant_id = ? AND id = ?",
        )
        .bind(status.as_str())
        .bind(updated_at.to_rfc3339())
        .bind(&tenant_id.0)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AppointmentRepository for SqlAppointmentRepository {
    async fn list_for_date(
        &self,
        tenant_id: &TenantId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, ApplicationError> {
        Ok(self.select_between(tenant_id, date, date).await?)
    }

    async fn list_between(
        &self,
        tenant_id: &TenantId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, ApplicationError> {
        Ok(self.select_between(tenant_id, start, end).await?)
    }

    async fn find(
        &self,
        tenant_id: &TenantId,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, ApplicationError> {
        Ok(self.select_one(tenant_id, id).await?)
    }

    async fn insert_if_free(&self, appointment: &Appointment) -> Result<bool, ApplicationError> {
        let inserted = self.guarded_insert(appointment).await?;
        if !inserted {
            tracing::debug!(
                event_name = "db.appointment_overlap",
                tenant_id = %appointment.tenant_id,
                scheduled_at = %appointment.scheduled_at,
                "overlap guard rejected insert"
            );
        }
        Ok(inserted)
    }

    async fn update_status(
        &self,
        tenant_id: &TenantId,
        id: &AppointmentId,
        status: AppointmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        match self.set_status(tenant_id, id, status, updated_at).await? {
            0 => Err(ApplicationError::NotFound(format!("appointment `{}`", id.0))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

    use atende_core::domain::appointment::{
        Appointment, AppointmentCode, AppointmentId, AppointmentStatus,
    };
    use atende_core::domain::tenant::TenantId;
    use atende_core::errors::ApplicationError;
    use atende_core::scheduling::AppointmentRepository;

    use super::SqlAppointmentRepository;
    use crate::repositories::test_pool;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid local time")
    }

    fn appointment(id: &str, day: u32, hour: u32) -> Appointment {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("instant");
        Appointment {
            id: AppointmentId(id.to_string()),
            code: AppointmentCode(format!("AG-{}", id.to_ascii_uppercase())),
            tenant_id: TenantId("escola".to_string()),
            scheduled_at: at(day, hour),
            end_at: at(day, hour + 1),
            status: AppointmentStatus::Pending,
            requester_name: "Ana".to_string(),
            requester_phone: "5511900000001".to_string(),
            purpose: "Visita".to_string(),
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn overlapping_inserts_are_rejected_until_cancelled() {
        let repo = SqlAppointmentRepository::new(test_pool().await);

        assert!(repo.insert_if_free(&appointment("a1", 2, 10)).await.expect("insert"));
        assert!(!repo.insert_if_free(&appointment("a2", 2, 10)).await.expect("overlap"));
        assert!(repo.insert_if_free(&appointment("a3", 2, 11)).await.expect("adjacent"));

        let cancelled_at = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).single().expect("instant");
        repo.update_status(
            &TenantId("escola".to_string()),
            &AppointmentId("a1".to_string()),
            AppointmentStatus::Cancelled,
            cancelled_at,
        )
        .await
        .expect("cancel");
        assert!(repo.insert_if_free(&appointment("a4", 2, 10)).await.expect("reuse slot"));

        let mut other_tenant = appointment("b1", 2, 10);
        other_tenant.tenant_id = TenantId("outra".to_string());
        assert!(repo.insert_if_free(&other_tenant).await.expect("other tenant"));
    }

    #[tokio::test]
    async fn listing_is_per_day_and_ordered() {
        let repo = SqlAppointmentRepository::new(test_pool().await);
        for (id, day, hour) in [("c", 3, 15), ("a", 2, 9), ("b", 3, 9), ("d", 4, 9)] {
            assert!(repo.insert_if_free(&appointment(id, day, hour)).await.expect("insert"));
        }
        let tenant = TenantId("escola".to_string());
        let tuesday = NaiveDate::from_ymd_opt(2026, 3, 3).expect("date");
        let wednesday = NaiveDate::from_ymd_opt(2026, 3, 4).expect("date");

        let day: Vec<String> = repo
            .list_for_date(&tenant, tuesday)
            .await
            .expect("list day")
            .into_iter()
            .map(|appointment| appointment.id.0)
            .collect();
        assert_eq!(day, vec!["b".to_string(), "c".to_string()]);

        let range = repo.list_between(&tenant, tuesday, wednesday).await.expect("range");
        assert_eq!(range.len(), 3);
        assert_eq!(range[0], appointment("b", 3, 9));
    }

    #[tokio::test]
    async fn updating_an_unknown_appointment_is_not_found() {
        let repo = SqlAppointmentRepository::new(test_pool().await);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).single().expect("instant");

        let result = repo
            .update_status(
                &TenantId("escola".to_string()),
                &AppointmentId("missing".to_string()),
                AppointmentStatus::Cancelled,
                now,
            )
            .await;

        assert!(matches!(result, Err(ApplicationError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_bookings_for_one_slot_yield_one_winner() {
        let pool = test_pool().await;
        let repo = Arc::new(SqlAppointmentRepository::new(pool));

        let attempts = (0..8).map(|index| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                repo.insert_if_free(&appointment(&format!("race{index}"), 5, 14)).await
            })
        });
        let mut winners = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            if attempt.await.expect("join").expect("insert") {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }
}
