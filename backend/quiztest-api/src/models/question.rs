use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a question, which decides how answers are graded and whether
/// its options are shuffled per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    MultipleAnswer,
    ManualInput,
    FillInBlank,
    PairOfWords,
    TermAndDefinition,
    Ordering,
    Essay,
    /// Any kind this engine does not grade.
    #[serde(other)]
    Unsupported,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::MultipleAnswer => "multiple_answer",
            QuestionKind::ManualInput => "manual_input",
            QuestionKind::FillInBlank => "fill_in_blank",
            QuestionKind::PairOfWords => "pair_of_words",
            QuestionKind::TermAndDefinition => "term_and_definition",
            QuestionKind::Ordering => "ordering",
            QuestionKind::Essay => "essay",
            QuestionKind::Unsupported => "unsupported",
        }
    }

    /// Kinds whose displayed option order comes from the option shuffler.
    pub fn shuffles_options(&self) -> bool {
        matches!(
            self,
            QuestionKind::MultipleChoice | QuestionKind::MultipleAnswer | QuestionKind::Ordering
        )
    }

    /// Kinds graded blank by blank against option texts.
    pub fn is_fill_in(&self) -> bool {
        matches!(
            self,
            QuestionKind::FillInBlank | QuestionKind::PairOfWords | QuestionKind::TermAndDefinition
        )
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answer option as authored.
///
/// For fill-in kinds, options sharing a `key` are accepted alternatives for
/// the same blank. For ordering questions `key` identifies the item and the
/// canonical option order is the correct order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOption {
    pub key: String,
    #[serde(default)]
    pub label: String,
    /// Plain-text projection of the option content.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub correctness: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_url: Option<String>,
}

/// A question as it lives in the canonical question set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub external_id: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub stem: String,
    #[serde(default)]
    pub options: Vec<QuizOption>,
    #[serde(default)]
    pub point: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Question {
    /// Blanks of a fill-in question: alternatives grouped by key, ordered by
    /// first appearance of the key.
    pub fn blanks(&self) -> Vec<Vec<&QuizOption>> {
        let mut keys: Vec<&str> = Vec::new();
        let mut blanks: Vec<Vec<&QuizOption>> = Vec::new();
        for option in &self.options {
            match keys.iter().position(|k| *k == option.key) {
                Some(i) => blanks[i].push(option),
                None => {
                    keys.push(&option.key);
                    blanks.push(vec![option]);
                }
            }
        }
        blanks
    }
}

/// Metadata shared by the questions of one group (e.g. a reading passage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionGroup {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Sum of the points of the group's questions.
    #[serde(default)]
    pub point: u32,
}
