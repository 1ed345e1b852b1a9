use atende_db::SqlTenantRepository;

use crate::commands::{block_on, load_config, open_database, CommandResult};

/// Startup preflight: config validates, the database is reachable and migrated. The
/// long-running process itself is `atende-server`.
pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let tenants = block_on("start", async {
        let pool = open_database(&config).await?;
        let tenants = SqlTenantRepository::new(pool.clone())
            .list()
            .await
            .map_err(|error| ("tenant_lookup", error.to_string(), 6u8))?;
        pool.close().await;
        Ok(tenants.len())
    });

    match tenants {
        Ok(count) => CommandResult::success(
            "start",
            format!(
                "preflight passed: {count} tenant(s) configured; serve with `atende-server` on \
                 {}:{}",
                config.server.bind_address, config.server.port
            ),
        ),
        Err(failure) => failure,
    }
}
