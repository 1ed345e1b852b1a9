use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use atende_core::domain::message::{LoggedMessage, MessageDirection};
use atende_core::domain::session::UserId;
use atende_core::domain::tenant::TenantId;
use atende_core::errors::ApplicationError;
use atende_core::integrations::MessageLog;

use super::{column, parse_utc, RepositoryError};
use crate::DbPool;

/// Append-only transcript of every inbound and outbound message.
pub struct SqlMessageLog {
    pool: DbPool,
}

impl SqlMessageLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, entry: &LoggedMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (tenant_id, user_id, direction, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.tenant_id.0)
        .bind(&entry.user_id.0)
        .bind(entry.direction.as_str())
        .bind(&entry.body)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Newest `limit` rows, returned oldest first.
    async fn select_recent(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<LoggedMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT tenant_id, user_id, direction, body, created_at
             FROM messages
             WHERE tenant_id = ? AND user_id = ? AND (? IS NULL OR created_at >= ?)
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(&tenant_id.0)
        .bind(&user_id.0)
        .bind(since.map(|since| since.to_rfc3339()))
        .bind(since.map(|since| since.to_rfc3339()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }
}

fn row_to_message(row: &SqliteRow) -> Result<LoggedMessage, RepositoryError> {
    let tenant_id: String = column(row, "tenant_id")?;
    let user_id: String = column(row, "user_id")?;
    let direction: String = column(row, "direction")?;
    let created_at: String = column(row, "created_at")?;

    Ok(LoggedMessage {
        tenant_id: TenantId(tenant_id),
        user_id: UserId(user_id),
        direction: MessageDirection::parse(&direction)
            .ok_or_else(|| RepositoryError::Decode(format!("direction: `{direction}`")))?,
        body: column(row, "body")?,
        created_at: parse_utc(&created_at, "created_at")?,
    })
}

#[async_trait]
impl MessageLog for SqlMessageLog {
    async fn append(&self, entry: LoggedMessage) -> Result<(), ApplicationError> {
        Ok(self.insert(&entry).await?)
    }

    async fn recent(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<LoggedMessage>, ApplicationError> {
        Ok(self.select_recent(tenant_id, user_id, since, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use atende_core::domain::message::{LoggedMessage, MessageDirection};
    use atende_core::domain::session::UserId;
    use atende_core::domain::tenant::TenantId;
    use atende_core::integrations::MessageLog;

    use super::SqlMessageLog;
    use crate::repositories::test_pool;

    #[tokio::test]
    async fn recent_returns_the_tail_in_chronological_order() {
        let log = SqlMessageLog::new(test_pool().await);
        let tenant = TenantId("escola".to_string());
        let user = UserId("5511900000001".to_string());
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).single().expect("instant");

        for (minute, body) in ["oi", "1", "2", "amanhã"].into_iter().enumerate() {
            let direction = match minute % 2 {
                0 => MessageDirection::Inbound,
                _ => MessageDirection::Outbound,
            };
            log.append(LoggedMessage {
                tenant_id: tenant.clone(),
                user_id: user.clone(),
                direction,
                body: body.to_string(),
                created_at: start + Duration::minutes(minute as i64),
            })
            .await
            .expect("append");
        }

        let tail = log.recent(&tenant, &user, None, 3).await.expect("recent");
        let bodies: Vec<&str> = tail.iter().map(|entry| entry.body.as_str()).collect();
        assert_eq!(bodies, vec!["1", "2", "amanhã"]);

        let since = log
            .recent(&tenant, &user, Some(start + Duration::minutes(2)), 10)
            .await
            .expect("recent since");
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].direction, MessageDirection::Inbound);

        let other = log.recent(&tenant, &UserId("outro".to_string()), None, 10).await;
        assert!(other.expect("other user").is_empty());
    }
}
