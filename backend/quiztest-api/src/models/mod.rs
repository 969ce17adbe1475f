use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod attempt;
pub mod canonical;
pub mod hierarchy;
pub mod question;

pub use attempt::{Answer, AnswerDetail, AnswerRecord, Attempt, NewAttempt, Seed};
pub use canonical::CanonicalSet;
pub use hierarchy::{HierarchyError, HierarchyNode, QuestionHierarchy};
pub use question::{Question, QuestionGroup, QuestionKind, QuizOption};

/// Offset/limit window over an attempt's ordering. `offset` is 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Paging {
    #[serde(default)]
    #[validate(range(min = 1, message = "offset must be a positive 1-based position"))]
    pub offset: i64,
    #[serde(default)]
    #[validate(range(min = 1, message = "limit must be positive"))]
    pub limit: i64,
}

impl Paging {
    pub fn next(&self) -> Paging {
        Paging {
            offset: self.offset.saturating_add(self.limit),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAttemptRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "student_id is required"))]
    pub student_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "session_id is required"))]
    pub session_id: String,
    /// Continue paging an existing attempt instead of creating one.
    #[serde(default)]
    #[validate(length(min = 1))]
    pub attempt_id: Option<String>,
    /// Replays an exact order instead of drawing a fresh seed.
    #[serde(default)]
    pub seed: Option<Seed>,
    #[serde(default)]
    pub keep_order: bool,
    #[serde(default)]
    #[validate(nested)]
    pub paging: Paging,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRetryAttemptRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "student_id is required"))]
    pub student_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "session_id is required"))]
    pub session_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "prior_attempt_id is required"))]
    pub prior_attempt_id: String,
    /// Continue paging an existing retry attempt.
    #[serde(default)]
    #[validate(length(min = 1))]
    pub retry_attempt_id: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub paging: Paging,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GradeAnswerRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "question_id is required"))]
    pub question_id: String,
    #[serde(default)]
    pub answer: Option<Answer>,
}

/// Option as shown to the student. Correctness is never exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayedOption {
    pub key: String,
    pub label: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayedQuestion {
    pub external_id: String,
    pub kind: QuestionKind,
    pub stem: String,
    pub point: u32,
    /// 1-based position in the attempt's ordering.
    pub idx: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub options: Vec<DisplayedOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blank_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptPage {
    pub attempt_id: String,
    pub unit_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_shuffle_set_id: Option<String>,
    pub total_questions: usize,
    pub items: Vec<DisplayedQuestion>,
    pub question_groups: Vec<QuestionGroup>,
    pub next_page: Paging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttemptResponse {
    /// Every question of the unit is already answered correctly across the
    /// retry chain; no attempt was created.
    pub fully_mastered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<AttemptPage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub correct: u32,
    pub total: u32,
    /// floor(correct / total * 100)
    pub percentage: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeAnswerResponse {
    pub attempt_id: String,
    pub question_id: String,
    pub correctness: Vec<bool>,
    pub is_accepted: bool,
    pub points_awarded: u32,
    pub detail: AnswerDetail,
    pub total_correctness: u32,
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreSummary>,
}

/// Per student and unit: score at first completion and best score so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCompleteness {
    pub unit_id: String,
    pub student_id: String,
    #[serde(default)]
    pub first_score: Option<f32>,
    #[serde(default)]
    pub highest_score: Option<f32>,
    pub updated_at: DateTime<Utc>,
}
