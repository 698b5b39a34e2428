//! Question catalog — the fixed battery asked during a diagnosis.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::channels::ChoiceOption;
use crate::error::CatalogError;

use super::scoring::RATING_MAX;

/// Lowest and highest tier reported to the user.
pub const TIER_MIN: u32 = 1;
pub const TIER_MAX: u32 = 10;

/// Upper bound on a catalog's achievable score. Keeps every per-session
/// running total well inside `u32`.
pub const MAX_TOTAL_SCORE: u32 = 1_000_000;

/// What kind of answer a question expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionKind {
    Choice { options: Vec<ChoiceOption> },
    FreeText,
}

/// One question of the battery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    pub fn choice(prompt: impl Into<String>, options: Vec<ChoiceOption>) -> Self {
        Self {
            prompt: prompt.into(),
            kind: QuestionKind::Choice { options },
        }
    }

    pub fn free_text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            kind: QuestionKind::FreeText,
        }
    }

    /// Options of a choice question; empty for free-text questions.
    pub fn options(&self) -> &[ChoiceOption] {
        match &self.kind {
            QuestionKind::Choice { options } => options,
            QuestionKind::FreeText => &[],
        }
    }

    /// Highest score this question can contribute.
    fn max_score(&self) -> u64 {
        match &self.kind {
            QuestionKind::Choice { options } => {
                options.iter().map(|o| u64::from(o.value)).max().unwrap_or(0)
            }
            QuestionKind::FreeText => u64::from(RATING_MAX),
        }
    }

    /// Resolve an answer to one of this question's registered options.
    ///
    /// Accepts the echoed option value (half- or full-width digits) or an
    /// exact option label.
    pub fn match_choice(&self, answer: &str) -> Option<&ChoiceOption> {
        let answer = answer.trim();
        let options = self.options();
        if let Some(value) = parse_number(answer) {
            if let Some(option) = options.iter().find(|o| o.value == value) {
                return Some(option);
            }
        }
        options.iter().find(|o| o.label == answer)
    }
}

/// Parse a non-negative integer written with ASCII or full-width digits.
fn parse_number(text: &str) -> Option<u32> {
    if text.is_empty() {
        return None;
    }
    let normalized: String = text
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            _ => c,
        })
        .collect();
    normalized.parse().ok()
}

fn total_max_score(choice: &[Question], free_text: &[Question]) -> u64 {
    choice
        .iter()
        .chain(free_text.iter())
        .map(Question::max_score)
        .sum()
}

/// Raw catalog as read from JSON, validated into a `QuestionCatalog`.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    choice: Vec<Question>,
    #[serde(default)]
    free_text: Vec<Question>,
}

/// Immutable ordered question lists.
#[derive(Debug, Clone)]
pub struct QuestionCatalog {
    choice: Vec<Question>,
    free_text: Vec<Question>,
    max_score: u32,
}

impl QuestionCatalog {
    /// Validate and build a catalog.
    pub fn new(choice: Vec<Question>, free_text: Vec<Question>) -> Result<Self, CatalogError> {
        if choice.is_empty() && free_text.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (index, question) in choice.iter().enumerate() {
            let QuestionKind::Choice { options } = &question.kind else {
                return Err(CatalogError::WrongKind { list: "choice", index });
            };
            if options.is_empty() {
                return Err(CatalogError::NoOptions { index });
            }
            for (i, option) in options.iter().enumerate() {
                if options[..i].iter().any(|o| o.value == option.value) {
                    return Err(CatalogError::DuplicateValue {
                        index,
                        value: option.value,
                    });
                }
            }
        }
        if let Some(index) = free_text
            .iter()
            .position(|q| q.kind != QuestionKind::FreeText)
        {
            return Err(CatalogError::WrongKind {
                list: "free_text",
                index,
            });
        }

        let total = total_max_score(&choice, &free_text);
        let max_score = u32::try_from(total)
            .ok()
            .filter(|max| *max <= MAX_TOTAL_SCORE)
            .ok_or(CatalogError::ScoreTooLarge {
                total,
                limit: MAX_TOTAL_SCORE,
            })?;
        Ok(Self {
            choice,
            free_text,
            max_score,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.choice, file.free_text)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn choice(&self) -> &[Question] {
        &self.choice
    }

    pub fn free_text(&self) -> &[Question] {
        &self.free_text
    }

    /// Highest achievable total score.
    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    /// Map a total score onto the 1–10 tier scale.
    ///
    /// Equivalent to `floor(total / (max_score / 10))`, computed in integers
    /// so the normalization always follows the battery's size and scale.
    pub fn tier(&self, total: u32) -> u32 {
        if self.max_score == 0 {
            return TIER_MIN;
        }
        let raw = u64::from(total) * u64::from(TIER_MAX) / u64::from(self.max_score);
        u32::try_from(raw)
            .unwrap_or(TIER_MAX)
            .clamp(TIER_MIN, TIER_MAX)
    }

    /// The default battery: ten five-point self-assessment statements
    /// followed by five open counselling questions.
    pub fn builtin() -> Self {
        const SCALE: [&str; 5] = [
            "Not at all",
            "Rarely",
            "Sometimes",
            "Often",
            "Always",
        ];
        const STATEMENTS: [&str; 10] = [
            "I can name what I am feeling while I am feeling it.",
            "I recover quickly after a setback.",
            "I can tell people close to me when something bothers me.",
            "I sleep well and wake up rested.",
            "I make time for things I enjoy.",
            "I can say no without feeling guilty.",
            "I feel that my efforts are recognised.",
            "I can ask for help when I need it.",
            "I look forward to the coming week.",
            "I treat myself kindly when I make a mistake.",
        ];
        const OPEN: [&str; 5] = [
            "Describe a recent situation that stressed you and how you handled it.",
            "What does a good day look like for you, from morning to night?",
            "Tell me about a relationship that supports you and why it matters.",
            "What is something you would like to change about how you spend your time?",
            "When you imagine yourself a year from now, what do you hope is different?",
        ];

        let options: Vec<ChoiceOption> = SCALE
            .iter()
            .zip(1..)
            .map(|(label, value)| ChoiceOption {
                label: (*label).to_string(),
                value,
            })
            .collect();

        let choice: Vec<Question> = STATEMENTS
            .iter()
            .map(|s| Question::choice(*s, options.clone()))
            .collect();
        let free_text: Vec<Question> = OPEN.iter().map(|s| Question::free_text(*s)).collect();

        Self::new(choice, free_text).expect("builtin catalog is valid")
    }
}
