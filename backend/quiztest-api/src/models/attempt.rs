use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::hierarchy::QuestionHierarchy;
use super::question::QuestionKind;

/// 64-bit shuffle seed. Persisted and exchanged as a decimal string so it
/// survives stores and clients without unsigned 64-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seed(pub u64);

impl Seed {
    pub fn random() -> Self {
        Seed(rand::random::<u64>())
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Seed {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Seed)
    }
}

impl Serialize for Seed {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A submitted answer, shaped by the kind of question it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "values", rename_all = "snake_case")]
pub enum Answer {
    /// 1-based positions in the displayed option order.
    SelectedIndex(Vec<u32>),
    FilledText(Vec<String>),
    SubmittedKey(Vec<String>),
    FreeText(String),
}

impl Answer {
    pub fn format(&self) -> &'static str {
        match self {
            Answer::SelectedIndex(_) => "selected_index",
            Answer::FilledText(_) => "filled_text",
            Answer::SubmittedKey(_) => "submitted_key",
            Answer::FreeText(_) => "free_text",
        }
    }

    /// An answer with no elements, or with an empty text element.
    pub fn is_blank(&self) -> bool {
        match self {
            Answer::SelectedIndex(values) => values.is_empty(),
            Answer::FilledText(values) | Answer::SubmittedKey(values) => {
                values.is_empty() || values.iter().any(|v| v.is_empty())
            }
            Answer::FreeText(text) => text.trim().is_empty(),
        }
    }
}

/// What was submitted alongside what would have been correct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum AnswerDetail {
    SelectedIndex {
        selected: Vec<u32>,
        /// Displayed positions of the correct options.
        correct: Vec<u32>,
    },
    FilledText {
        filled: Vec<String>,
        correct: Vec<String>,
    },
    SubmittedKey {
        submitted: Vec<String>,
        correct: Vec<String>,
    },
    FreeText {
        text: String,
    },
}

/// Graded outcome of the latest submission for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub kind: QuestionKind,
    pub detail: AnswerDetail,
    pub correctness: Vec<bool>,
    pub is_accepted: bool,
    pub points: u32,
    pub submitted_at: DateTime<Utc>,
}

/// A student's individualized instance of a canonical question set.
///
/// The flattened `question_ids` are derived from `question_hierarchy` once, at
/// construction, and never change afterwards. Stored attempts whose ordering
/// disagrees with their hierarchy are rejected on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredAttempt")]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub unit_id: String,
    /// Canonical set this attempt was drawn from.
    pub original_set_id: String,
    pub student_id: String,
    pub session_id: String,
    pub random_seed: Seed,
    question_hierarchy: QuestionHierarchy,
    question_ids: Vec<String>,
    /// Attempt this one retries, if any.
    pub original_shuffle_set_id: Option<String>,
    /// First attempt of the retry chain, if this one is a retry.
    pub root_shuffle_set_id: Option<String>,
    pub submission_history: BTreeMap<String, AnswerRecord>,
    pub total_correctness: u32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct StoredAttempt {
    #[serde(rename = "_id")]
    id: String,
    unit_id: String,
    original_set_id: String,
    student_id: String,
    session_id: String,
    random_seed: Seed,
    question_hierarchy: QuestionHierarchy,
    #[serde(default)]
    question_ids: Option<Vec<String>>,
    #[serde(default)]
    original_shuffle_set_id: Option<String>,
    #[serde(default)]
    root_shuffle_set_id: Option<String>,
    #[serde(default)]
    submission_history: BTreeMap<String, AnswerRecord>,
    #[serde(default)]
    total_correctness: u32,
    #[serde(default)]
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoredAttempt> for Attempt {
    type Error = String;

    fn try_from(stored: StoredAttempt) -> Result<Self, Self::Error> {
        let derived = stored.question_hierarchy.flatten();
        let question_ids = match stored.question_ids {
            Some(ids) if ids != derived => {
                return Err(format!(
                    "attempt {} stores an ordering that differs from its hierarchy",
                    stored.id
                ))
            }
            _ => derived,
        };
        Ok(Self {
            id: stored.id,
            unit_id: stored.unit_id,
            original_set_id: stored.original_set_id,
            student_id: stored.student_id,
            session_id: stored.session_id,
            random_seed: stored.random_seed,
            question_hierarchy: stored.question_hierarchy,
            question_ids,
            original_shuffle_set_id: stored.original_shuffle_set_id,
            root_shuffle_set_id: stored.root_shuffle_set_id,
            submission_history: stored.submission_history,
            total_correctness: stored.total_correctness,
            version: stored.version,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }
}

pub struct NewAttempt {
    pub unit_id: String,
    pub original_set_id: String,
    pub student_id: String,
    pub session_id: String,
    pub random_seed: Seed,
    pub question_hierarchy: QuestionHierarchy,
}

impl Attempt {
    pub fn new(new: NewAttempt) -> Self {
        let now = Utc::now();
        let question_ids = new.question_hierarchy.flatten();
        Self {
            id: Uuid::new_v4().to_string(),
            unit_id: new.unit_id,
            original_set_id: new.original_set_id,
            student_id: new.student_id,
            session_id: new.session_id,
            random_seed: new.random_seed,
            question_hierarchy: new.question_hierarchy,
            question_ids,
            original_shuffle_set_id: None,
            root_shuffle_set_id: None,
            submission_history: BTreeMap::new(),
            total_correctness: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks this attempt as the retry of `prior`.
    pub fn retrying(mut self, prior: &Attempt) -> Self {
        self.original_shuffle_set_id = Some(prior.id.clone());
        self.root_shuffle_set_id = Some(
            prior
                .root_shuffle_set_id
                .clone()
                .unwrap_or_else(|| prior.id.clone()),
        );
        self
    }

    pub fn question_hierarchy(&self) -> &QuestionHierarchy {
        &self.question_hierarchy
    }

    pub fn question_ids(&self) -> &[String] {
        &self.question_ids
    }

    pub fn is_retry(&self) -> bool {
        self.original_shuffle_set_id.is_some()
    }

    /// 1-based position of a question in this attempt's ordering.
    pub fn idx_of(&self, question_id: &str) -> Option<usize> {
        self.question_ids
            .iter()
            .position(|id| id == question_id)
            .map(|i| i + 1)
    }

    /// Ids answered with an accepted submission.
    pub fn correct_ids(&self) -> Vec<String> {
        self.submission_history
            .values()
            .filter(|record| record.is_accepted)
            .map(|record| record.question_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hierarchy::HierarchyNode;

    fn attempt() -> Attempt {
        Attempt::new(NewAttempt {
            unit_id: "unit-1".to_string(),
            original_set_id: "set-1".to_string(),
            student_id: "student-1".to_string(),
            session_id: "session-1".to_string(),
            random_seed: Seed(42),
            question_hierarchy: QuestionHierarchy::new(vec![
                HierarchyNode::group("g1", ["q2", "q3"]),
                HierarchyNode::question("q1"),
            ])
            .unwrap(),
        })
    }

    #[test]
    fn ordering_is_derived_from_hierarchy() {
        let attempt = attempt();
        assert_eq!(attempt.question_ids(), &["q2", "q3", "q1"]);
        assert_eq!(attempt.idx_of("q1"), Some(3));
        assert_eq!(attempt.idx_of("missing"), None);
    }

    #[test]
    fn retry_links_root_of_chain() {
        let first = attempt();
        let second = attempt().retrying(&first);
        let third = attempt().retrying(&second);

        assert_eq!(second.root_shuffle_set_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(third.original_shuffle_set_id.as_deref(), Some(second.id.as_str()));
        assert_eq!(third.root_shuffle_set_id.as_deref(), Some(first.id.as_str()));
    }

    #[test]
    fn seed_serializes_as_decimal_string() {
        let json = serde_json::to_string(&Seed(u64::MAX)).unwrap();
        assert_eq!(json, "\"18446744073709551615\"");
        let seed: Seed = serde_json::from_str(&json).unwrap();
        assert_eq!(seed, Seed(u64::MAX));
    }

    #[test]
    fn blank_answers_are_detected() {
        assert!(Answer::SelectedIndex(vec![]).is_blank());
        assert!(Answer::FilledText(vec!["a".into(), "".into()]).is_blank());
        assert!(Answer::FreeText("  ".into()).is_blank());
        assert!(!Answer::SubmittedKey(vec!["k".into()]).is_blank());
    }

    #[test]
    fn answer_wire_shape() {
        let answer: Answer =
            serde_json::from_str(r#"{"format":"selected_index","values":[1,3]}"#).unwrap();
        assert_eq!(answer, Answer::SelectedIndex(vec![1, 3]));
    }

    #[test]
    fn stored_ordering_must_match_hierarchy() {
        let attempt = attempt();
        let mut stored = serde_json::to_value(&attempt).unwrap();
        let restored: Attempt = serde_json::from_value(stored.clone()).unwrap();
        assert_eq!(restored, attempt);

        stored["question_ids"] = serde_json::json!(["q1", "q2", "q3"]);
        assert!(serde_json::from_value::<Attempt>(stored.clone()).is_err());

        stored.as_object_mut().unwrap().remove("question_ids");
        let rederived: Attempt = serde_json::from_value(stored).unwrap();
        assert_eq!(rederived.question_ids(), &["q2", "q3", "q1"]);
    }
}
