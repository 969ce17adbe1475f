use std::sync::Arc;
use validator::Validate;

use super::retry_service::load_chain;
use super::{require, AppState};
use crate::config::EngineConfig;
use crate::engine::checker;
use crate::engine::scorer::chain_score;
use crate::error::{EngineError, EngineResult};
use crate::metrics::{record_answer_graded, HISTORY_WRITE_CONFLICTS_TOTAL};
use crate::models::{AnswerRecord, Attempt, GradeAnswerRequest, GradeAnswerResponse, ScoreSummary};
use crate::repositories::{AttemptStore, CanonicalSetStore, CompletenessStore, StoreError};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

pub struct GradingService {
    canonical_sets: Arc<dyn CanonicalSetStore>,
    attempts: Arc<dyn AttemptStore>,
    completeness: Arc<dyn CompletenessStore>,
    engine: EngineConfig,
}

impl GradingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            canonical_sets: state.canonical_sets.clone(),
            attempts: state.attempts.clone(),
            completeness: state.completeness.clone(),
            engine: state.config.engine.clone(),
        }
    }

    /// Grades one answer, records it in the attempt history and, once every
    /// question has a submission, updates the unit completeness scores.
    pub async fn grade_answer(
        &self,
        attempt_id: &str,
        req: GradeAnswerRequest,
    ) -> EngineResult<GradeAnswerResponse> {
        require(attempt_id, "attempt_id")?;
        req.validate()?;
        let answer = req
            .answer
            .ok_or_else(|| EngineError::InvalidArgument("answer is required".to_string()))?;
        if answer.is_blank() {
            return Err(EngineError::InvalidArgument(
                "answer must not be empty".to_string(),
            ));
        }

        let attempt = self
            .attempts
            .load(attempt_id)
            .await
            .map_err(EngineError::store("attempt store"))?;
        let idx = attempt.idx_of(&req.question_id).ok_or_else(|| {
            EngineError::NotFound(format!(
                "question {} in attempt {}",
                req.question_id, attempt_id
            ))
        })?;

        let set = self
            .canonical_sets
            .get_by_unit_id(&attempt.unit_id)
            .await
            .map_err(EngineError::store("canonical set store"))?
            .ok_or_else(|| {
                EngineError::NotFound(format!("question set of unit {}", attempt.unit_id))
            })?;
        let question = set.question(&req.question_id).ok_or_else(|| {
            EngineError::NotFound(format!(
                "question {} in the question set of unit {}",
                req.question_id, attempt.unit_id
            ))
        })?;

        let graded = checker::check(question, &answer, attempt.random_seed, idx)?;
        record_answer_graded(question.kind.as_str(), graded.is_accepted);

        let record = AnswerRecord {
            question_id: req.question_id.clone(),
            kind: question.kind,
            detail: graded.detail,
            correctness: graded.correctness,
            is_accepted: graded.is_accepted,
            points: graded.points,
            submitted_at: chrono::Utc::now(),
        };

        let update = retry_async_with_config(
            RetryConfig::with_max_attempts(self.engine.history_write_retries),
            StoreError::is_conflict,
            || {
                let record = record.clone();
                async move {
                    let result = self.attempts.update_history(attempt_id, record).await;
                    if matches!(&result, Err(e) if e.is_conflict()) {
                        HISTORY_WRITE_CONFLICTS_TOTAL.inc();
                        tracing::warn!("History write of attempt {} lost a race", attempt_id);
                    }
                    result
                }
            },
        )
        .await
        .map_err(EngineError::store("attempt store"))?;

        let attempt = update.attempt;
        let finished = attempt.is_finished();
        let score = if finished {
            if !update.was_finished {
                tracing::info!(
                    "Attempt {} of student {} finished",
                    attempt.id,
                    attempt.student_id
                );
            }
            let score = self.score(&attempt).await?;
            self.record_completion(&attempt, &score).await?;
            Some(score)
        } else {
            None
        };

        tracing::info!(
            "Graded question {} of attempt {}: accepted={}, total_correctness={}, finished={}",
            record.question_id,
            attempt.id,
            record.is_accepted,
            attempt.total_correctness,
            finished
        );

        Ok(GradeAnswerResponse {
            attempt_id: attempt.id.clone(),
            question_id: record.question_id,
            correctness: record.correctness,
            is_accepted: record.is_accepted,
            points_awarded: record.points,
            detail: record.detail,
            total_correctness: attempt.total_correctness,
            finished,
            score,
        })
    }

    /// Own score for a first attempt; chain-cumulative score for a retry.
    async fn score(&self, attempt: &Attempt) -> EngineResult<ScoreSummary> {
        if !attempt.is_retry() {
            return Ok(attempt.score());
        }
        let chain = load_chain(self.attempts.as_ref(), attempt.clone()).await?;
        Ok(chain_score(&chain))
    }

    /// Runs on every finished grade. The store keeps only the first
    /// first-completion score, so a request retried after a failed write
    /// still records it.
    async fn record_completion(&self, attempt: &Attempt, score: &ScoreSummary) -> EngineResult<()> {
        self.completeness
            .upsert_first_score(&attempt.unit_id, &attempt.student_id, score.percentage)
            .await
            .map_err(EngineError::store("completeness store"))?;
        self.completeness
            .upsert_highest_score(&attempt.unit_id, &attempt.student_id, score.percentage)
            .await
            .map_err(EngineError::store("completeness store"))?;

        tracing::debug!(
            "Completeness of unit {} for student {} updated with {}",
            attempt.unit_id,
            attempt.student_id,
            score.percentage
        );
        Ok(())
    }
}
