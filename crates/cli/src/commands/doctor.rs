use atende_core::config::{AppConfig, LoadOptions};
use atende_db::{connect_from_config, SqlTenantRepository};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated (gateway token present)".to_string(),
            });
            checks.push(check_assistant(&config));
            checks.push(check_payments(&config));
            checks.push(check_notifications(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["assistant", "payments", "notifications", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_assistant(config: &AppConfig) -> DoctorCheck {
    let (status, details) = match (config.ai.enabled, config.ai.endpoint.as_deref()) {
        (false, _) => (CheckStatus::Pass, "disabled; menus only".to_string()),
        (true, Some(endpoint)) if !endpoint.trim().is_empty() => (
            CheckStatus::Pass,
            format!("model `{}` at `{endpoint}`", config.ai.model),
        ),
        (true, _) => (
            CheckStatus::Warn,
            "enabled without ai.endpoint; free text falls back to the menu".to_string(),
        ),
    };
    DoctorCheck { name: "assistant", status, details }
}

fn check_payments(config: &AppConfig) -> DoctorCheck {
    match config.payment.endpoint.as_deref().filter(|endpoint| !endpoint.trim().is_empty()) {
        Some(endpoint) => DoctorCheck {
            name: "payments",
            status: CheckStatus::Pass,
            details: format!("PIX charges via `{endpoint}`"),
        },
        None => DoctorCheck {
            name: "payments",
            status: CheckStatus::Warn,
            details: "payment.endpoint unset; course purchases are unavailable".to_string(),
        },
    }
}

fn check_notifications(config: &AppConfig) -> DoctorCheck {
    let notifications = &config.notifications;
    match (notifications.webhook_url.as_deref(), notifications.signing_secret.is_some()) {
        (Some(url), true) => DoctorCheck {
            name: "notifications",
            status: CheckStatus::Pass,
            details: format!("signed webhook `{url}`"),
        },
        (Some(url), false) => DoctorCheck {
            name: "notifications",
            status: CheckStatus::Warn,
            details: format!("webhook `{url}` is unsigned; set notifications.signing_secret"),
        },
        (None, _) => DoctorCheck {
            name: "notifications",
            status: CheckStatus::Pass,
            details: "events are written to the log only".to_string(),
        },
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        // A missing table means migrations were never applied.
        let tenants = SqlTenantRepository::new(pool.clone()).list().await.map(|rows| rows.len());
        pool.close().await;
        Ok::<_, String>(tenants)
    });

    match result {
        Ok(Ok(tenants)) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`; {tenants} tenant(s)", config.database.url),
        },
        Ok(Err(error)) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Warn,
            details: format!("connected but schema is not ready (run `atende migrate`): {error}"),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
