use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use atende_db::DbPool;

/// Inbound messages only arrive through `POST /webhook/messages`.
pub const TRANSPORT_MODE: &str = "webhook";

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

impl HealthState {
    pub fn new(db_pool: DbPool) -> Self {
        Self { db_pool }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub transport: &'static str,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(Arc::new(state))
}

pub async fn health(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "atende-server runtime initialized".to_string(),
        },
        database,
        transport: TRANSPORT_MODE,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use atende_db::{connect_with_settings, DbPool};
    use axum::{extract::State, http::StatusCode, Json};

    use crate::health::{health, HealthState};

    fn state(db_pool: DbPool) -> State<Arc<HealthState>> {
        State(Arc::new(HealthState::new(db_pool)))
    }

    #[tokio::test]
    async fn health_is_ready_when_the_database_answers() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");

        let (status, Json(payload)) = health(state(pool.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.transport, "webhook");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_degrades_when_the_database_is_gone() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        pool.close().await;

        let (status, Json(payload)) = health(state(pool)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
