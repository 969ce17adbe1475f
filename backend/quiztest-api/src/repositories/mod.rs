use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    AnswerRecord, Attempt, CanonicalSet, QuestionGroup, QuestionHierarchy, Seed, UnitCompleteness,
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStores;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("attempt {0} was modified concurrently")]
    Conflict(String),
    /// A create lost to an existing attempt for the same session or prior attempt.
    #[error("{0} already exists")]
    Duplicate(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CanonicalSetStore: Send + Sync {
    async fn get_by_unit_id(&self, unit_id: &str) -> StoreResult<Option<CanonicalSet>>;
}

#[async_trait]
pub trait QuestionGroupStore: Send + Sync {
    /// Groups for the given ids, in the order of `ids`. Unknown ids are skipped.
    async fn get_by_ids(&self, ids: &[String]) -> StoreResult<Vec<QuestionGroup>>;
}

/// Window of an attempt's ordering.
#[derive(Debug, Clone)]
pub struct AttemptSlice {
    pub attempt_id: String,
    pub unit_id: String,
    pub seed: Seed,
    pub original_shuffle_set_id: Option<String>,
    pub total_questions: usize,
    /// 1-based position of the first id in `question_ids`.
    pub first_idx: usize,
    pub question_ids: Vec<String>,
    /// The attempt hierarchy restricted to `question_ids`.
    pub hierarchy: QuestionHierarchy,
}

/// State change produced by one history write.
#[derive(Debug, Clone)]
pub struct HistoryUpdate {
    pub was_finished: bool,
    pub attempt: Attempt,
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Inserts a new attempt. Fails with `Duplicate` when the id or the
    /// session is taken, or when the retried attempt already has a retry.
    async fn create(&self, attempt: &Attempt) -> StoreResult<()>;

    async fn find(&self, attempt_id: &str) -> StoreResult<Option<Attempt>>;

    async fn find_by_session(&self, session_id: &str) -> StoreResult<Option<Attempt>>;

    /// The retry spawned from `attempt_id`, if one exists.
    async fn find_retry_of(&self, attempt_id: &str) -> StoreResult<Option<Attempt>>;

    /// Writes `attempt` if the stored version still equals `expected_version`,
    /// bumping the stored version. Fails with `Conflict` otherwise.
    async fn compare_and_swap(&self, attempt: &Attempt, expected_version: i64)
        -> StoreResult<()>;

    async fn load(&self, attempt_id: &str) -> StoreResult<Attempt> {
        self.find(attempt_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("attempt {}", attempt_id)))
    }

    /// Ids at 1-based positions `offset ..= offset + limit - 1`.
    async fn get(&self, attempt_id: &str, offset: usize, limit: usize) -> StoreResult<AttemptSlice> {
        let attempt = self.load(attempt_id).await?;
        let ids = attempt.question_ids();
        let start = offset.saturating_sub(1).min(ids.len());
        let end = start.saturating_add(limit).min(ids.len());
        let question_ids = ids[start..end].to_vec();
        Ok(AttemptSlice {
            attempt_id: attempt.id.clone(),
            unit_id: attempt.unit_id.clone(),
            seed: attempt.random_seed,
            original_shuffle_set_id: attempt.original_shuffle_set_id.clone(),
            total_questions: ids.len(),
            first_idx: start + 1,
            hierarchy: attempt.question_hierarchy().retain(&question_ids),
            question_ids,
        })
    }

    /// Records `record` and re-derives the total correctness in one
    /// version-checked write.
    async fn update_history(
        &self,
        attempt_id: &str,
        record: AnswerRecord,
    ) -> StoreResult<HistoryUpdate> {
        let mut attempt = self.load(attempt_id).await?;
        let expected_version = attempt.version;
        let was_finished = attempt.is_finished();
        attempt.record_answer(record);
        self.compare_and_swap(&attempt, expected_version).await?;
        attempt.version = expected_version + 1;
        Ok(HistoryUpdate {
            was_finished,
            attempt,
        })
    }
}

#[async_trait]
pub trait CompletenessStore: Send + Sync {
    /// Records `score` as the first-completion score unless one exists.
    async fn upsert_first_score(&self, unit_id: &str, student_id: &str, score: f32)
        -> StoreResult<()>;

    /// Raises the highest score to `score` if it is higher.
    async fn upsert_highest_score(
        &self,
        unit_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()>;

    async fn get_completeness(
        &self,
        unit_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<UnitCompleteness>>;
}
