use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::flows::states::ConversationState;

const MENU_COMMANDS: &[&str] = &["menu", "0", "início", "inicio"];
const BACK_COMMANDS: &[&str] = &["voltar", "v"];

/// Built-in keyword routes; tenants may override or extend them.
const DEFAULT_KEYWORDS: &[(&str, ConversationState)] = &[
    ("curso", ConversationState::CoursesList),
    ("cursos", ConversationState::CoursesList),
    ("matrícula", ConversationState::EnrollmentStart),
    ("matricula", ConversationState::EnrollmentStart),
    ("agendar", ConversationState::AppointmentStart),
    ("agendamento", ConversationState::AppointmentStart),
    ("visita", ConversationState::AppointmentStart),
    ("atendente", ConversationState::HumanTransfer),
    ("humano", ConversationState::HumanTransfer),
    ("dúvida", ConversationState::FaqCategories),
    ("duvida", ConversationState::FaqCategories),
    ("faq", ConversationState::FaqCategories),
    ("documento", ConversationState::Documents),
    ("documentos", ConversationState::Documents),
];

/// Common misspellings mapped to the canonical keyword.
const TYPO_CORRECTIONS: &[(&str, &str)] = &[
    ("curs", "curso"),
    ("matricla", "matrícula"),
    ("matricua", "matrícula"),
    ("agenda", "agendar"),
    ("atendete", "atendente"),
    ("documeto", "documento"),
];

pub const KEYWORD_CONFIDENCE: f32 = 0.8;
pub const TYPO_CONFIDENCE: f32 = 0.6;
pub const FREE_TEXT_CONFIDENCE: f32 = 0.3;
/// Keyword matches below this confidence may be handed to the AI collaborator.
pub const AI_HANDOFF_CONFIDENCE: f32 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Menu,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Command,
    MenuSelection,
    Keyword,
    FreeText,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub value: String,
    pub confidence: f32,
}

impl Intent {
    pub fn command(&self) -> Option<Command> {
        if self.kind != IntentKind::Command {
            return None;
        }
        match self.value.as_str() {
            "menu" => Some(Command::Menu),
            "back" => Some(Command::Back),
            _ => None,
        }
    }

    /// 1-based numeric choice.
    pub fn selection(&self) -> Option<usize> {
        if self.kind != IntentKind::MenuSelection {
            return None;
        }
        self.value.parse().ok()
    }

    pub fn is_low_confidence_keyword(&self) -> bool {
        self.kind == IntentKind::Keyword && self.confidence < AI_HANDOFF_CONFIDENCE
    }
}

/// Read-only keyword→state routing table: defaults merged with tenant overrides, the
/// tenant entry winning on conflicts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordTable {
    routes: BTreeMap<String, ConversationState>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::merged(&BTreeMap::new())
    }
}

impl KeywordTable {
    pub fn merged(overrides: &BTreeMap<String, ConversationState>) -> Self {
        let mut routes: BTreeMap<String, ConversationState> = DEFAULT_KEYWORDS
            .iter()
            .map(|(keyword, state)| ((*keyword).to_string(), *state))
            .collect();
        for (keyword, state) in overrides {
            let keyword = normalize(keyword);
            if !keyword.is_empty() {
                routes.insert(keyword, *state);
            }
        }
        Self { routes }
    }

    pub fn route(&self, keyword: &str) -> Option<ConversationState> {
        self.routes.get(keyword).copied()
    }

    /// Longest key contained in `text`; ties resolve to the lexicographically smaller key.
    fn find_in(&self, text: &str) -> Option<&str> {
        self.routes
            .keys()
            .filter(|keyword| text.contains(keyword.as_str()))
            .max_by(|left, right| {
                left.chars().count().cmp(&right.chars().count()).then_with(|| right.cmp(left))
            })
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// First match wins: commands, then digits, then keywords, then typo corrections.
    /// Digits are checked before keywords so numeric navigation is never hijacked.
    pub fn classify(
        &self,
        text: &str,
        _state: ConversationState,
        keywords: &KeywordTable,
    ) -> Intent {
        let normalized = normalize(text);

        if MENU_COMMANDS.contains(&normalized.as_str()) {
            return Intent { kind: IntentKind::Command, value: "menu".to_string(), confidence: 1.0 };
        }
        if BACK_COMMANDS.contains(&normalized.as_str()) {
            return Intent { kind: IntentKind::Command, value: "back".to_string(), confidence: 1.0 };
        }
        if !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit()) {
            return Intent { kind: IntentKind::MenuSelection, value: normalized, confidence: 1.0 };
        }
        if let Some(keyword) = keywords.find_in(&normalized) {
            return Intent {
                kind: IntentKind::Keyword,
                value: keyword.to_string(),
                confidence: KEYWORD_CONFIDENCE,
            };
        }
        if let Some((_, corrected)) =
            TYPO_CORRECTIONS.iter().find(|(typo, _)| normalized.contains(typo))
        {
            return Intent {
                kind: IntentKind::Keyword,
                value: (*corrected).to_string(),
                confidence: TYPO_CONFIDENCE,
            };
        }

        Intent { kind: IntentKind::FreeText, value: normalized, confidence: FREE_TEXT_CONFIDENCE }
    }
}

pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{Command, IntentClassifier, IntentKind, KeywordTable};
    use crate::flows::states::ConversationState;

    fn classify(text: &str) -> super::Intent {
        let table = KeywordTable::default();
        IntentClassifier::new().classify(text, ConversationState::MainMenu, &table)
    }

    #[test]
    fn exact_commands_win_over_everything() {
        assert_eq!(classify("0").command(), Some(Command::Menu));
        assert_eq!(classify("  Início ").command(), Some(Command::Menu));
        assert_eq!(classify("MENU").command(), Some(Command::Menu));
        assert_eq!(classify("v").command(), Some(Command::Back));
        assert_eq!(classify("Voltar").command(), Some(Command::Back));
    }

    #[test]
    fn digits_are_menu_selections_with_full_confidence() {
        let intent = classify(" 12 ");
        assert_eq!(intent.kind, IntentKind::MenuSelection);
        assert_eq!(intent.selection(), Some(12));
        assert_eq!(intent.confidence, 1.0);
    }

    #[test]
    fn mixed_digits_and_keywords_are_not_selections() {
        let intent = classify("curso 2");
        assert_eq!(intent.kind, IntentKind::Keyword);
        assert_eq!(intent.value, "curso");
    }

    #[test]
    fn keyword_substring_match_prefers_longest_key() {
        let intent = classify("quero ver os cursos disponíveis");
        assert_eq!(intent.kind, IntentKind::Keyword);
        assert_eq!(intent.value, "cursos");
        assert_eq!(intent.confidence, 0.8);
    }

    #[test]
    fn typo_table_corrects_with_lower_confidence() {
        let intent = classify("como faço a matricla?");
        assert_eq!(intent.kind, IntentKind::Keyword);
        assert_eq!(intent.value, "matrícula");
        assert_eq!(intent.confidence, 0.6);
        assert!(intent.is_low_confidence_keyword());
    }

    #[test]
    fn unmatched_text_is_free_text() {
        let intent = classify("Qual o valor da mensalidade?");
        assert_eq!(intent.kind, IntentKind::FreeText);
        assert_eq!(intent.value, "qual o valor da mensalidade?");
        assert_eq!(intent.confidence, 0.3);
    }

    #[test]
    fn tenant_overrides_take_precedence() {
        let mut overrides = BTreeMap::new();
        overrides.insert("Curso".to_string(), ConversationState::FaqCategories);
        overrides.insert("bolsa".to_string(), ConversationState::FaqCategories);
        let table = KeywordTable::merged(&overrides);

        assert_eq!(table.route("curso"), Some(ConversationState::FaqCategories));
        assert_eq!(table.route("bolsa"), Some(ConversationState::FaqCategories));
        assert_eq!(table.route("agendar"), Some(ConversationState::AppointmentStart));
        assert_eq!(table.len(), KeywordTable::default().len() + 1);

        let intent =
            IntentClassifier::new().classify("tem bolsa?", ConversationState::FaqQuestions, &table);
        assert_eq!(intent.value, "bolsa");
    }
}
