use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use atende_core::errors::ApplicationError;

pub mod appointment;
pub mod message;
pub mod session;
pub mod tenant;

pub use appointment::SqlAppointmentRepository;
pub use message::SqlMessageLog;
pub use session::SqlSessionRepository;
pub use tenant::{SqlTenantRepository, TenantSummary};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Wall-clock layout for local timestamps; sorts lexicographically.
pub(crate) const LOCAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|error| RepositoryError::Decode(format!("{name}: {error}")))
}

pub(crate) fn parse_utc(value: &str, field: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

pub(crate) fn parse_local(value: &str, field: &str) -> Result<NaiveDateTime, RepositoryError> {
    NaiveDateTime::parse_from_str(value, LOCAL_TIMESTAMP_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

pub(crate) fn format_local(value: NaiveDateTime) -> String {
    value.format(LOCAL_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
pub(crate) async fn test_pool() -> crate::DbPool {
    let pool = crate::connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    crate::migrations::run_pending(&pool).await.expect("run migrations");
    pool
}
