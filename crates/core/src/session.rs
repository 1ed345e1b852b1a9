use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::domain::session::{ContextPatch, Session, SessionContext, UserId};
use crate::domain::tenant::TenantId;
use crate::errors::ApplicationError;
use crate::flows::states::ConversationState;

/// Row-level persistence for sessions. One row per (tenant, user); `save` is an upsert.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<Option<Session>, ApplicationError>;

    async fn save(&self, session: &Session) -> Result<(), ApplicationError>;
}

/// The only writer of conversation state. Concurrent writers for the same user are
/// last-write-wins; callers serialize per user upstream.
#[derive(Clone)]
pub struct SessionStore {
    repository: Arc<dyn SessionRepository>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(repository: Arc<dyn SessionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Loads the session, creating and persisting a fresh one on first contact.
    pub async fn get(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<Session, ApplicationError> {
        if let Some(session) = self.repository.find(tenant_id, user_id).await? {
            return Ok(session);
        }

        let session = Session::fresh(tenant_id.clone(), user_id.clone(), self.clock.now());
        self.repository.save(&session).await?;
        tracing::debug!(
            event_name = "session.created",
            tenant_id = %tenant_id,
            user_id = %user_id,
            "created fresh session"
        );
        Ok(session)
    }

    pub async fn transition(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        next: ConversationState,
        patch: Option<ContextPatch>,
    ) -> Result<Session, ApplicationError> {
        let mut session = self.get(tenant_id, user_id).await?;
        let from = session.current_state;

        session.previous_state = Some(from);
        session.current_state = next;
        if let Some(patch) = patch {
            session.context.merge(patch);
        }
        session.last_activity_at = self.clock.now();
        self.repository.save(&session).await?;

        tracing::debug!(
            event_name = "session.transitioned",
            tenant_id = %tenant_id,
            user_id = %user_id,
            from = from.as_str(),
            to = next.as_str(),
            "session state transitioned"
        );
        Ok(session)
    }

    pub async fn update_context(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        patch: ContextPatch,
    ) -> Result<Session, ApplicationError> {
        let mut session = self.get(tenant_id, user_id).await?;
        session.context.merge(patch);
        session.last_activity_at = self.clock.now();
        self.repository.save(&session).await?;
        Ok(session)
    }

    pub async fn check_timeout(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        timeout_minutes: u32,
    ) -> Result<bool, ApplicationError> {
        let session = self.get(tenant_id, user_id).await?;
        Ok(is_timed_out(&session, timeout_minutes, self.clock.now()))
    }

    /// Back to the initial state with an empty context. Rows are never deleted.
    pub async fn reset(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<Session, ApplicationError> {
        let mut session = self.get(tenant_id, user_id).await?;
        session.previous_state = Some(session.current_state);
        session.current_state = ConversationState::initial();
        session.context = SessionContext::default();
        session.last_activity_at = self.clock.now();
        self.repository.save(&session).await?;

        tracing::info!(
            event_name = "session.reset",
            tenant_id = %tenant_id,
            user_id = %user_id,
            "session reset to initial state"
        );
        Ok(session)
    }
}

pub fn is_timed_out(session: &Session, timeout_minutes: u32, now: DateTime<Utc>) -> bool {
    now - session.last_activity_at > Duration::minutes(i64::from(timeout_minutes))
}
