//! Transport adapter seam between a messaging channel and the conversation engine.
//!
//! - **Envelopes** (`envelope`) - inbound wire shape and its correlation id
//! - **Lanes** (`lanes`) - per-user serialized dispatch; different users run concurrently
//! - **Delivery** (`delivery`) - outbound sender port and ordered batch delivery
//!
//! ```text
//! POST /webhook/messages → LaneDispatcher → ConversationEngine
//!                                  ↓
//!                      OutboundSender ← ordered replies
//! ```

pub mod delivery;
pub mod envelope;
pub mod lanes;

pub use delivery::{deliver_all, NoopOutbound, OutboundSender, TransportError};
pub use envelope::InboundEnvelope;
pub use lanes::{DispatchError, LaneDispatcher, LaneSettings, MessageHandler};
