use std::sync::Arc;

use atende_core::clock::{Clock, SystemClock};
use atende_core::config::AppConfig;
use atende_core::domain::tenant::TenantId;
use atende_core::notify::LogNotificationSink;
use atende_core::scheduling::SchedulingEngine;
use atende_core::tenant::TenantConfigResolver;
use atende_db::{DbPool, SqlAppointmentRepository, SqlTenantRepository};
use chrono::NaiveDate;
use serde_json::json;

use crate::commands::{block_on, load_config, open_database, CommandResult};

pub fn run(tenant: &str, date: &str) -> CommandResult {
    let Ok(date) = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") else {
        return CommandResult::failure(
            "slots",
            "invalid_argument",
            format!("--date must be YYYY-MM-DD, got `{date}`"),
            2,
        );
    };
    let config = match load_config("slots") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let tenant_id = TenantId(tenant.trim().to_string());
    let result = block_on("slots", async {
        let pool = open_database(&config).await?;
        let slots = scheduling(&config, &pool)
            .get_available_slots(&tenant_id, date)
            .await
            .map_err(|error| ("scheduling", error.to_string(), 6u8));
        pool.close().await;
        slots
    });

    match result {
        Ok(slots) => CommandResult::success_with(
            "slots",
            format!("{} free slot(s) for `{tenant_id}` on {date}", slots.len()),
            Some(json!({ "tenant_id": tenant_id.0, "date": date, "slots": slots })),
        ),
        Err(failure) => failure,
    }
}

/// Scheduling over the SQL stores; notifications only reach the log from the CLI.
pub(crate) fn scheduling(config: &AppConfig, pool: &DbPool) -> SchedulingEngine {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    SchedulingEngine::new(
        tenants(config, pool, Arc::clone(&clock)),
        Arc::new(SqlAppointmentRepository::new(pool.clone())),
        Arc::new(LogNotificationSink),
        clock,
    )
}

pub(crate) fn tenants(
    config: &AppConfig,
    pool: &DbPool,
    clock: Arc<dyn Clock>,
) -> Arc<TenantConfigResolver> {
    Arc::new(TenantConfigResolver::new(
        Arc::new(SqlTenantRepository::new(pool.clone())),
        clock,
        chrono::Duration::seconds(config.engine.tenant_cache_ttl_secs as i64),
    ))
}
