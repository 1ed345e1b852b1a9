use chrono::{DateTime, Utc};

use atende_core::domain::tenant::{TenantConfig, TenantId};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlTenantRepository};

/// Demo tenant used by `atende seed` and local smoke runs.
pub struct DemoTenant;

impl DemoTenant {
    pub const JSON: &'static str = include_str!("../../../config/fixtures/demo_tenant.json");
    pub const TENANT_ID: &'static str = "escola-demo";

    pub fn config() -> Result<TenantConfig, RepositoryError> {
        Ok(serde_json::from_str(Self::JSON)?)
    }

    /// Upserts the demo tenant; loading twice leaves one row.
    pub async fn load(pool: &DbPool, now: DateTime<Utc>) -> Result<SeedResult, RepositoryError> {
        let config = Self::config()?;
        SqlTenantRepository::new(pool.clone()).save(&config, now).await?;

        tracing::info!(
            event_name = "db.seed_loaded",
            tenant_id = %config.tenant_id,
            courses = config.courses.len(),
            "demo tenant seeded"
        );
        Ok(SeedResult {
            tenant_id: config.tenant_id,
            business_name: config.business_name,
            menu_entries: config.menu.len(),
            courses: config.courses.len(),
            faq_categories: config.faq.len(),
            forms: config.forms.len(),
        })
    }

    /// Checks that the stored document still matches the bundled fixture.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let expected = Self::config()?;
        let stored =
            SqlTenantRepository::new(pool.clone()).find(&TenantId(Self::TENANT_ID.into())).await?;

        let checks = match stored {
            None => vec![("tenant-row", false)],
            Some(stored) => vec![
                ("tenant-row", true),
                ("business-name", stored.business_name == expected.business_name),
                ("menu", stored.menu == expected.menu),
                ("courses", stored.courses == expected.courses),
                ("faq", stored.faq == expected.faq),
                ("forms", stored.forms == expected.forms),
                ("schedule", stored.schedule == expected.schedule),
            ],
        };
        Ok(VerificationResult { all_present: checks.iter().all(|(_, ok)| *ok), checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let tenant_id = Self::TENANT_ID;
        let mut tx = pool.begin().await?;
        for table in ["messages", "appointments", "sessions", "tenants"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE tenant_id = ?"))
                .bind(tenant_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub tenant_id: TenantId,
    pub business_name: String,
    pub menu_entries: usize,
    pub courses: usize,
    pub faq_categories: usize,
    pub forms: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::DemoTenant;
    use crate::repositories::test_pool;

    #[test]
    fn bundled_fixture_parses() {
        let config = DemoTenant::config().expect("fixture parses");
        assert_eq!(config.tenant_id.0, DemoTenant::TENANT_ID);
        assert!(config.payments_enabled());
        assert!(config.form("interesse").is_some());
    }

    #[tokio::test]
    async fn seeding_is_idempotent_and_verifiable() {
        let pool = test_pool().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("instant");

        let before = DemoTenant::verify(&pool).await.expect("verify empty");
        assert!(!before.all_present);

        let first = DemoTenant::load(&pool, now).await.expect("first load");
        let second = DemoTenant::load(&pool, now).await.expect("second load");
        assert_eq!(first.courses, second.courses);
        assert_eq!(first.menu_entries, 5);

        let verification = DemoTenant::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "{:?}", verification.checks);

        DemoTenant::clean(&pool).await.expect("clean");
        assert!(!DemoTenant::verify(&pool).await.expect("verify cleaned").all_present);
    }
}
