use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use atende_core::domain::session::UserId;
use atende_core::domain::tenant::TenantId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport send failed: {0}")]
    Send(String),
}

/// Channel-side delivery of one text to one end user.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn deliver(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        text: &str,
    ) -> Result<(), TransportError>;
}

/// Delivers an ordered batch, stopping at the first failure so later replies never arrive
/// ahead of an earlier one.
pub async fn deliver_all(
    sender: &dyn OutboundSender,
    tenant_id: &TenantId,
    user_id: &UserId,
    texts: &[String],
) -> Result<usize, TransportError> {
    for (index, text) in texts.iter().enumerate() {
        if let Err(error) = sender.deliver(tenant_id, user_id, text).await {
            warn!(
                event_name = "gateway.delivery_failed",
                tenant_id = %tenant_id,
                user_id = %user_id,
                delivered = index,
                pending = texts.len() - index,
                error = %error,
                "outbound delivery interrupted"
            );
            return Err(error);
        }
    }
    Ok(texts.len())
}

/// Used when replies travel back only in the webhook response body.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOutbound;

#[async_trait]
impl OutboundSender for NoopOutbound {
    async fn deliver(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        text: &str,
    ) -> Result<(), TransportError> {
        debug!(
            event_name = "gateway.noop_delivery",
            tenant_id = %tenant_id,
            user_id = %user_id,
            chars = text.chars().count(),
            "reply left to the webhook response"
        );
        Ok(())
    }
}
