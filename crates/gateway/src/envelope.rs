use serde::{Deserialize, Serialize};

use atende_core::domain::message::InboundMessage;
use atende_core::domain::session::UserId;
use atende_core::domain::tenant::TenantId;

/// One inbound delivery from the channel. `envelope_id` is the transport's own id and is
/// used as the correlation id and for acknowledgements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub envelope_id: String,
    #[serde(flatten)]
    pub message: InboundMessage,
}

impl InboundEnvelope {
    pub fn new(envelope_id: impl Into<String>, message: InboundMessage) -> Self {
        Self { envelope_id: envelope_id.into(), message }
    }

    /// Messages sharing a lane key are handled strictly in arrival order.
    pub fn lane_key(&self) -> (TenantId, UserId) {
        (self.message.tenant_id.clone(), self.message.sender_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use atende_core::domain::message::MessageType;

    use super::InboundEnvelope;

    #[test]
    fn flat_wire_shape_deserializes_with_defaults() {
        let envelope: InboundEnvelope = serde_json::from_str(
            r#"{
                "envelope_id": "wamid.1",
                "tenant_id": "escola",
                "sender_id": "5511900000001",
                "text": "oi",
                "timestamp": "2026-03-02T13:00:00Z"
            }"#,
        )
        .expect("envelope parses");

        assert_eq!(envelope.envelope_id, "wamid.1");
        assert_eq!(envelope.message.message_type, MessageType::Text);
        assert_eq!(envelope.message.sender_name, None);
        let (tenant, user) = envelope.lane_key();
        assert_eq!((tenant.0.as_str(), user.0.as_str()), ("escola", "5511900000001"));
    }

    #[test]
    fn media_type_is_carried() {
        let envelope: InboundEnvelope = serde_json::from_str(
            r#"{"envelope_id": "e", "tenant_id": "t", "sender_id": "u",
                "message_type": "audio", "timestamp": "2026-03-02T13:00:00Z"}"#,
        )
        .expect("envelope parses");

        assert!(envelope.message.message_type.is_unsupported_media());
        assert!(envelope.message.text.is_empty());
    }
}
