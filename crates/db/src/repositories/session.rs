use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use atende_core::domain::session::{Session, SessionContext, UserId};
use atende_core::domain::tenant::TenantId;
use atende_core::errors::ApplicationError;
use atende_core::flows::ConversationState;
use atende_core::session::SessionRepository;

use super::{column, parse_utc, RepositoryError};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self, tenant_id: &TenantId) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE tenant_id = ?")
            .bind(&tenant_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn parse_state(value: &str, field: &str) -> Result<ConversationState, RepositoryError> {
    ConversationState::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("{field}: unknown state `{value}`")))
}

fn row_to_session(row: &SqliteRow) -> Result<Session, RepositoryError> {
    let tenant_id: String = column(row, "tenant_id")?;
    let user_id: String = column(row, "user_id")?;
    let current_state: String = column(row, "current_state")?;
    let previous_state: Option<String> = column(row, "previous_state")?;
    let context_json: String = column(row, "context_json")?;
    let last_activity_at: String = column(row, "last_activity_at")?;

    let context: SessionContext = serde_json::from_str(&context_json)?;
    Ok(Session {
        tenant_id: TenantId(tenant_id),
        user_id: UserId(user_id),
        current_state: parse_state(&current_state, "current_state")?,
        previous_state: previous_state
            .as_deref()
            .map(|state| parse_state(state, "previous_state"))
            .transpose()?,
        context,
        last_activity_at: parse_utc(&last_activity_at, "last_activity_at")?,
    })
}

impl SqlSessionRepository {
    async fn find_row(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, user_id, current_state, previous_state, context_json,
                    last_activity_at
             FROM sessions WHERE tenant_id = ? AND user_id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn upsert(&self, session: &Session) -> Result<(), RepositoryError> {
        let context_json = serde_json::to_string(&session.context)?;

        sqlx::query(
            "INSERT INTO sessions (tenant_id, user_id, current_state, previous_state,
                                   context_json, last_activity_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, user_id) DO UPDATE SET
                 current_state = excluded.current_state,
                 previous_state = excluded.previous_state,
                 context_json = excluded.context_json,
                 last_activity_at = excluded.last_activity_at",
        )
        .bind(&session.tenant_id.0)
        .bind(&session.user_id.0)
        .bind(session.current_state.as_str())
        .bind(session.previous_state.map(|state| state.as_str()))
        .bind(context_json)
        .bind(session.last_activity_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<Option<Session>, ApplicationError> {
        Ok(self.find_row(tenant_id, user_id).await?)
    }

    async fn save(&self, session: &Session) -> Result<(), ApplicationError> {
        Ok(self.upsert(session).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use atende_core::domain::session::{
        ActiveFlow, AppointmentDraft, HistoryEntry, HistoryRole, Session, UserId,
    };
    use atende_core::domain::tenant::TenantId;
    use atende_core::flows::ConversationState;
    use atende_core::session::SessionRepository;

    use super::SqlSessionRepository;
    use crate::repositories::test_pool;

    #[tokio::test]
    async fn saved_sessions_round_trip_with_context() {
        let repo = SqlSessionRepository::new(test_pool().await);
        let tenant = TenantId("escola".to_string());
        let user = UserId("5511900000001".to_string());
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).single().expect("instant");

        assert!(repo.find(&tenant, &user).await.expect("find").is_none());

        let mut session = Session::fresh(tenant.clone(), user.clone(), now);
        session.current_state = ConversationState::AppointmentTime;
        session.previous_state = Some(ConversationState::AppointmentStart);
        session.context.flow = ActiveFlow::Appointment(AppointmentDraft {
            date: chrono::NaiveDate::from_ymd_opt(2026, 3, 3),
            time: None,
            purpose: Some("Visita - Inglês".to_string()),
        });
        session.context.history =
            vec![HistoryEntry { role: HistoryRole::User, text: "quero visitar".to_string() }];
        repo.save(&session).await.expect("save");

        let loaded = repo.find(&tenant, &user).await.expect("find").expect("stored");
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn save_overwrites_the_single_row_per_user() {
        let repo = SqlSessionRepository::new(test_pool().await);
        let tenant = TenantId("escola".to_string());
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 13, 0, 0).single().expect("instant");

        let mut session = Session::fresh(tenant.clone(), UserId("a".to_string()), now);
        repo.save(&session).await.expect("first save");
        session.current_state = ConversationState::MainMenu;
        session.previous_state = Some(ConversationState::Welcome);
        repo.save(&session).await.expect("second save");
        repo.save(&Session::fresh(tenant.clone(), UserId("b".to_string()), now))
            .await
            .expect("other user");

        assert_eq!(repo.count(&tenant).await.expect("count"), 2);
        let loaded =
            repo.find(&tenant, &UserId("a".to_string())).await.expect("find").expect("stored");
        assert_eq!(loaded.current_state, ConversationState::MainMenu);
        assert!(repo
            .find(&TenantId("outra".to_string()), &UserId("a".to_string()))
            .await
            .expect("find other tenant")
            .is_none());
    }
}
