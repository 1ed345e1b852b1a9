use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use atende_core::domain::tenant::{TenantConfig, TenantId, TenantStatus};
use atende_core::errors::ApplicationError;
use atende_core::tenant::TenantConfigSource;

use super::{column, parse_utc, RepositoryError};
use crate::DbPool;

/// Stores each tenant's configuration as one JSON document.
pub struct SqlTenantRepository {
    pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantSummary {
    pub tenant_id: TenantId,
    pub business_name: String,
    pub status: TenantStatus,
    pub updated_at: DateTime<Utc>,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<TenantConfig>, RepositoryError> {
        let config_json: Option<String> =
            sqlx::query_scalar("SELECT config_json FROM tenants WHERE tenant_id = ?")
                .bind(&tenant_id.0)
                .fetch_optional(&self.pool)
                .await?;

        let Some(config_json) = config_json else {
            return Ok(None);
        };
        let config: TenantConfig = serde_json::from_str(&config_json)?;
        if &config.tenant_id != tenant_id {
            return Err(RepositoryError::Decode(format!(
                "config stored under `{}` declares tenant `{}`",
                tenant_id, config.tenant_id
            )));
        }
        Ok(Some(config))
    }

    /// Upserts the document; `created_at` survives updates.
    pub async fn save(
        &self,
        config: &TenantConfig,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let config_json = serde_json::to_string(config)?;

        sqlx::query(
            "INSERT INTO tenants (tenant_id, business_name, status, config_json, created_at,
                                  updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                 business_name = excluded.business_name,
                 status = excluded.status,
                 config_json = excluded.config_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&config.tenant_id.0)
        .bind(&config.business_name)
        .bind(config.status.as_str())
        .bind(config_json)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<TenantSummary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT tenant_id, business_name, status, updated_at
             FROM tenants ORDER BY tenant_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_summary).collect()
    }
}

fn row_to_summary(row: &SqliteRow) -> Result<TenantSummary, RepositoryError> {
    let tenant_id: String = column(row, "tenant_id")?;
    let business_name: String = column(row, "business_name")?;
    let status: String = column(row, "status")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(TenantSummary {
        tenant_id: TenantId(tenant_id),
        business_name,
        status: TenantStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("status: unknown `{status}`")))?,
        updated_at: parse_utc(&updated_at, "updated_at")?,
    })
}

#[async_trait]
impl TenantConfigSource for SqlTenantRepository {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<TenantConfig>, ApplicationError> {
        Ok(self.find(tenant_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use atende_core::domain::tenant::{TenantConfig, TenantId, TenantStatus};
    use atende_core::tenant::TenantConfigSource;

    use super::SqlTenantRepository;
    use crate::repositories::test_pool;

    #[tokio::test]
    async fn configs_round_trip_and_unknown_tenants_load_as_none() {
        let repo = SqlTenantRepository::new(test_pool().await);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("instant");
        let mut config = TenantConfig::fallback(TenantId("escola".to_string()));
        config.business_name = "Escola Centro".to_string();
        config.session_timeout_minutes = Some(45);

        repo.save(&config, now).await.expect("save");

        let loaded = repo.load(&config.tenant_id).await.expect("load").expect("stored");
        assert_eq!(loaded, config);
        assert!(repo.load(&TenantId("ausente".to_string())).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn resaving_updates_the_summary() {
        let repo = SqlTenantRepository::new(test_pool().await);
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("instant");
        let mut config = TenantConfig::fallback(TenantId("escola".to_string()));
        repo.save(&config, created).await.expect("save");

        config.status = TenantStatus::Inactive;
        config.business_name = "Escola Centro".to_string();
        repo.save(&config, created + Duration::hours(1)).await.expect("resave");

        let summaries = repo.list().await.expect("list");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status, TenantStatus::Inactive);
        assert_eq!(summaries[0].business_name, "Escola Centro");
        assert_eq!(summaries[0].updated_at, created + Duration::hours(1));
    }
}
