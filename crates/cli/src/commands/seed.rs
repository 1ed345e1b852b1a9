use atende_db::{DemoTenant, SeedResult};
use chrono::Utc;

use crate::commands::{block_on, load_config, open_database, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let result = block_on("seed", async {
        let pool = open_database(&config).await?;

        let seeded = DemoTenant::load(&pool, Utc::now())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoTenant::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if !verification.all_present {
            return Err(("seed_verification", verification_message(&verification.checks), 6u8));
        }
        Ok(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", render_summary(&seeded)),
        Err(failure) => failure,
    }
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "demo tenant failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed.join(", "))
    }
}

fn render_summary(seeded: &SeedResult) -> String {
    [
        format!("seeded demo tenant `{}` ({})", seeded.tenant_id, seeded.business_name),
        format!("  - menu entries: {}", seeded.menu_entries),
        format!("  - courses: {}", seeded.courses),
        format!("  - faq categories: {}", seeded.faq_categories),
        format!("  - forms: {}", seeded.forms),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use atende_core::domain::tenant::TenantId;
    use atende_db::SeedResult;

    use super::{render_summary, verification_message};

    #[test]
    fn verification_message_names_failed_checks() {
        let message =
            verification_message(&[("tenant-row", true), ("menu", false), ("faq", false)]);
        assert_eq!(message, "seed verification failed for checks: menu, faq");
        assert_eq!(verification_message(&[]), "demo tenant failed to load");
    }

    #[test]
    fn summary_lists_seeded_content() {
        let summary = render_summary(&SeedResult {
            tenant_id: TenantId("escola-demo".to_string()),
            business_name: "Escola Demo".to_string(),
            menu_entries: 6,
            courses: 3,
            faq_categories: 2,
            forms: 1,
        });
        assert!(summary.starts_with("seeded demo tenant `escola-demo` (Escola Demo)"));
        assert!(summary.contains("  - courses: 3"));
    }
}
