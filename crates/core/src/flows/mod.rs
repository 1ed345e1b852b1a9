pub mod dates;
pub mod engine;
pub(crate) mod handlers;
pub mod intent;
pub mod render;
pub mod states;

pub use engine::{ConversationEngine, EngineParts, EngineResponse, EngineSettings};
pub use intent::{Command, Intent, IntentClassifier, IntentKind, KeywordTable};
pub use render::{TemplateKey, TemplateRenderer};
pub use states::ConversationState;
