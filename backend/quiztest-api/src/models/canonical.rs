use serde::{Deserialize, Serialize};

use super::hierarchy::QuestionHierarchy;
use super::question::Question;

/// The authored, unshuffled question set of a learning unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSet {
    #[serde(rename = "_id")]
    pub id: String,
    pub unit_id: String,
    #[serde(default)]
    pub hierarchy: QuestionHierarchy,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl CanonicalSet {
    pub fn question(&self, external_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.external_id == external_id)
    }
}
