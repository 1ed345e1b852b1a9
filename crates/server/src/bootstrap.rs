use std::sync::Arc;

use atende_agent::{AssistantRuntime, GuardrailPolicy, HttpLlmClient};
use atende_core::clock::{Clock, SystemClock};
use atende_core::config::{AppConfig, ConfigError};
use atende_core::flows::{ConversationEngine, EngineParts, EngineSettings};
use atende_core::notify::{LogNotificationSink, NotificationSink};
use atende_core::scheduling::SchedulingEngine;
use atende_core::tenant::TenantConfigResolver;
use atende_db::{
    connect_with_settings, migrations, DbPool, SqlAppointmentRepository, SqlMessageLog,
    SqlSessionRepository, SqlTenantRepository,
};
use atende_gateway::{LaneDispatcher, LaneSettings, NoopOutbound};
use thiserror::Error;
use tracing::info;

use crate::health::HealthState;
use crate::integrations::{HttpPaymentCollaborator, WebhookNotificationSink};
use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub dispatcher: Arc<LaneDispatcher<ConversationEngine>>,
}

impl Application {
    pub fn api_state(&self) -> AppState {
        AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            outbound: Arc::new(NoopOutbound),
            api_token: self.config.gateway.api_token.clone(),
        }
    }

    pub fn health_state(&self) -> HealthState {
        HealthState::new(self.db_pool.clone())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("integration client setup failed: {0}")]
    Integration(String),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let engine = build_engine(&config, &db_pool)?;
    let dispatcher = Arc::new(LaneDispatcher::new(Arc::new(engine), LaneSettings::default()));

    Ok(Application { config, db_pool, dispatcher })
}

fn build_engine(
    config: &AppConfig,
    db_pool: &DbPool,
) -> Result<ConversationEngine, BootstrapError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tenants = Arc::new(TenantConfigResolver::new(
        Arc::new(SqlTenantRepository::new(db_pool.clone())),
        Arc::clone(&clock),
        chrono::Duration::seconds(config.engine.tenant_cache_ttl_secs as i64),
    ));

    let notifications: Arc<dyn NotificationSink> =
        match WebhookNotificationSink::from_config(&config.notifications) {
            Some(sink) => Arc::new(sink),
            None => Arc::new(LogNotificationSink),
        };
    let scheduling = Arc::new(SchedulingEngine::new(
        Arc::clone(&tenants),
        Arc::new(SqlAppointmentRepository::new(db_pool.clone())),
        Arc::clone(&notifications),
        Arc::clone(&clock),
    ));

    let mut engine = ConversationEngine::new(EngineParts {
        tenants,
        sessions: Arc::new(SqlSessionRepository::new(db_pool.clone())),
        scheduling,
        notifications,
        messages: Arc::new(SqlMessageLog::new(db_pool.clone())),
        clock,
        settings: EngineSettings::from_config(config),
    });

    let llm = HttpLlmClient::from_config(&config.ai)
        .map_err(|error| BootstrapError::Integration(error.to_string()))?;
    let assistant_mode = match llm {
        Some(client) => {
            let runtime = AssistantRuntime::new(
                client,
                GuardrailPolicy::default(),
                config.ai.history_limit,
            );
            engine = engine.with_ai(Arc::new(runtime));
            "llm"
        }
        None => "disabled",
    };

    let payments = HttpPaymentCollaborator::from_config(&config.payment)
        .map_err(|error| BootstrapError::Integration(error.to_string()))?;
    let payment_mode = match payments {
        Some(payments) => {
            engine = engine.with_payments(Arc::new(payments));
            "http"
        }
        None => "disabled",
    };

    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        assistant = assistant_mode,
        payments = payment_mode,
        notifications = if config.notifications.webhook_url.is_some() { "webhook" } else { "log" },
        "conversation engine assembled"
    );
    Ok(engine)
}
