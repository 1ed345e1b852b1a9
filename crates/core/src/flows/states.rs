use serde::{Deserialize, Serialize};

/// Conversation FSM states. The graph is cyclic and has no terminal state; every state
/// except the root names the state one level up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    Welcome,
    MainMenu,
    CoursesList,
    CourseDetail,
    FaqCategories,
    FaqQuestions,
    FaqAnswer,
    AppointmentStart,
    AppointmentTime,
    AppointmentConfirm,
    EnrollmentStart,
    HumanTransfer,
    HumanQueue,
    LeaveMessage,
    Documents,
    DynamicForm,
    PaymentPending,
}

impl ConversationState {
    pub const ALL: [ConversationState; 17] = [
        Self::Welcome,
        Self::MainMenu,
        Self::CoursesList,
        Self::CourseDetail,
        Self::FaqCategories,
        Self::FaqQuestions,
        Self::FaqAnswer,
        Self::AppointmentStart,
        Self::AppointmentTime,
        Self::AppointmentConfirm,
        Self::EnrollmentStart,
        Self::HumanTransfer,
        Self::HumanQueue,
        Self::LeaveMessage,
        Self::Documents,
        Self::DynamicForm,
        Self::PaymentPending,
    ];

    pub const fn initial() -> Self {
        Self::Welcome
    }

    pub const fn root() -> Self {
        Self::MainMenu
    }

    /// One level up in the navigation graph. The root is its own parent.
    pub fn parent(&self) -> Self {
        match self {
            Self::CourseDetail => Self::CoursesList,
            Self::FaqQuestions => Self::FaqCategories,
            Self::FaqAnswer => Self::FaqQuestions,
            Self::AppointmentTime => Self::AppointmentStart,
            Self::AppointmentConfirm => Self::AppointmentTime,
            Self::Welcome
            | Self::MainMenu
            | Self::CoursesList
            | Self::FaqCategories
            | Self::AppointmentStart
            | Self::EnrollmentStart
            | Self::HumanTransfer
            | Self::HumanQueue
            | Self::LeaveMessage
            | Self::Documents
            | Self::DynamicForm
            | Self::PaymentPending => Self::MainMenu,
        }
    }

    /// Chain of states from `self` up to the root, inclusive of both ends.
    pub fn ancestors(&self) -> Vec<Self> {
        let mut chain = vec![*self];
        let mut current = *self;
        while current != Self::root() {
            current = current.parent();
            chain.push(current);
        }
        chain
    }

    /// States where the user is typing data rather than navigating; keyword routing is
    /// suppressed so answers are never hijacked.
    pub fn collects_free_input(&self) -> bool {
        matches!(
            self,
            Self::DynamicForm
                | Self::AppointmentStart
                | Self::AppointmentTime
                | Self::AppointmentConfirm
                | Self::EnrollmentStart
                | Self::LeaveMessage
        )
    }

    /// A human operator owns the conversation; only navigation commands are answered.
    pub fn awaits_human(&self) -> bool {
        matches!(self, Self::HumanTransfer | Self::HumanQueue)
    }

    /// States where the AI collaborator may take over free text.
    pub fn allows_ai_handoff(&self) -> bool {
        matches!(self, Self::Welcome | Self::MainMenu)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "WELCOME",
            Self::MainMenu => "MAIN_MENU",
            Self::CoursesList => "COURSES_LIST",
            Self::CourseDetail => "COURSE_DETAIL",
            Self::FaqCategories => "FAQ_CATEGORIES",
            Self::FaqQuestions => "FAQ_QUESTIONS",
            Self::FaqAnswer => "FAQ_ANSWER",
            Self::AppointmentStart => "APPOINTMENT_START",
            Self::AppointmentTime => "APPOINTMENT_TIME",
            Self::AppointmentConfirm => "APPOINTMENT_CONFIRM",
            Self::EnrollmentStart => "ENROLLMENT_START",
            Self::HumanTransfer => "HUMAN_TRANSFER",
            Self::HumanQueue => "HUMAN_QUEUE",
            Self::LeaveMessage => "LEAVE_MESSAGE",
            Self::Documents => "DOCUMENTS",
            Self::DynamicForm => "DYNAMIC_FORM",
            Self::PaymentPending => "PAYMENT_PENDING",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|state| state.as_str() == normalized)
    }
}
