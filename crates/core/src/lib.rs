pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod integrations;
pub mod memory;
pub mod notify;
pub mod scheduling;
pub mod session;
pub mod tenant;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::appointment::{Appointment, AppointmentCode, AppointmentId, AppointmentStatus};
pub use domain::message::{InboundMessage, LoggedMessage, MessageDirection, MessageType};
pub use domain::session::{Session, UserId};
pub use domain::tenant::{TenantConfig, TenantId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    ConversationEngine, ConversationState, EngineParts, EngineResponse, EngineSettings,
};
pub use integrations::{AiCollaborator, MessageLog, PaymentCollaborator, ReplySender};
pub use notify::{Notification, NotificationKind, NotificationSink};
pub use scheduling::{
    AppointmentRepository, Booking, BookingRequest, SchedulingEngine, SchedulingError,
};
pub use session::{SessionRepository, SessionStore};
pub use tenant::{TenantConfigResolver, TenantConfigSource};
