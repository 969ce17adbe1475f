use std::collections::HashSet;
use std::sync::Arc;
use validator::Validate;

use super::attempt_service::AttemptService;
use super::{ensure_owned, require, AppState};
use crate::engine::retry::{mastered_ids, plan_retry, RetryPlan};
use crate::error::{EngineError, EngineResult};
use crate::metrics::{record_attempt_created, RETRIES_FULLY_MASTERED_TOTAL};
use crate::models::{
    Attempt, AttemptPage, CreateRetryAttemptRequest, NewAttempt, Paging, RetryAttemptResponse,
};
use crate::repositories::{AttemptStore, StoreError};

pub struct RetryService {
    attempts: Arc<dyn AttemptStore>,
    pages: AttemptService,
}

impl RetryService {
    pub fn new(state: &AppState) -> Self {
        Self {
            attempts: state.attempts.clone(),
            pages: AttemptService::new(state),
        }
    }

    /// Builds the retry of `prior_attempt_id` out of every question the
    /// student has not yet answered correctly anywhere in the chain.
    pub async fn create_retry_attempt(
        &self,
        unit_id: &str,
        req: CreateRetryAttemptRequest,
    ) -> EngineResult<RetryAttemptResponse> {
        require(unit_id, "unit_id")?;
        req.validate()?;

        if let Some(retry_attempt_id) = &req.retry_attempt_id {
            let attempt = self
                .attempts
                .load(retry_attempt_id)
                .await
                .map_err(EngineError::store("attempt store"))?;
            ensure_owned(&attempt, unit_id, &req.student_id)?;
            if !attempt.is_retry() {
                return Err(EngineError::FailedPrecondition(format!(
                    "attempt {} is not a retry attempt",
                    attempt.id
                )));
            }
            return self.page(&attempt.id, req.paging).await;
        }

        let prior = self
            .attempts
            .load(&req.prior_attempt_id)
            .await
            .map_err(EngineError::store("attempt store"))?;
        ensure_owned(&prior, unit_id, &req.student_id)?;

        if let Some(existing) = self.existing_retry(&prior, &req.session_id).await? {
            record_attempt_created("reused");
            return self.page(&existing.id, req.paging).await;
        }

        let chain = load_chain(self.attempts.as_ref(), prior.clone()).await?;
        let mastered = mastered_ids(&chain);
        let set = self.pages.canonical_set(unit_id).await?;

        let hierarchy = match plan_retry(&set.hierarchy, &mastered) {
            RetryPlan::FullyMastered => {
                RETRIES_FULLY_MASTERED_TOTAL.inc();
                tracing::info!(
                    "Student {} mastered every question of unit {}; no retry for attempt {}",
                    req.student_id,
                    unit_id,
                    prior.id
                );
                return Ok(RetryAttemptResponse {
                    fully_mastered: true,
                    attempt: None,
                });
            }
            RetryPlan::Retry(hierarchy) => hierarchy,
        };

        let draw = self.pages.layout(&set, &hierarchy, false, None);
        let attempt = Attempt::new(NewAttempt {
            unit_id: unit_id.to_string(),
            original_set_id: set.id.clone(),
            student_id: req.student_id.clone(),
            session_id: req.session_id.clone(),
            random_seed: draw.seed,
            question_hierarchy: draw.hierarchy,
        })
        .retrying(&prior);

        match self.attempts.create(&attempt).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => {
                // Lost the race to a concurrent retry of the same prior attempt
                // or session.
                let winner = self
                    .existing_retry(&prior, &req.session_id)
                    .await?
                    .ok_or_else(|| EngineError::store("attempt store")(e))?;
                record_attempt_created("reused");
                return self.page(&winner.id, req.paging).await;
            }
            Err(e) => return Err(EngineError::store("attempt store")(e)),
        }

        record_attempt_created("retry");
        tracing::info!(
            "Created retry attempt {} of {} with {} questions ({} mastered)",
            attempt.id,
            prior.id,
            attempt.question_ids().len(),
            mastered.len()
        );

        self.page(&attempt.id, req.paging).await
    }

    /// The attempt that already answers a retry of `prior`: the session's
    /// attempt, which must be that retry, or the retry `prior` already spawned.
    async fn existing_retry(
        &self,
        prior: &Attempt,
        session_id: &str,
    ) -> EngineResult<Option<Attempt>> {
        if let Some(existing) = self
            .attempts
            .find_by_session(session_id)
            .await
            .map_err(EngineError::store("attempt store"))?
        {
            if existing.original_shuffle_set_id.as_deref() != Some(prior.id.as_str()) {
                return Err(EngineError::FailedPrecondition(format!(
                    "session {} already holds attempt {}",
                    session_id, existing.id
                )));
            }
            return Ok(Some(existing));
        }

        let existing = self
            .attempts
            .find_retry_of(&prior.id)
            .await
            .map_err(EngineError::store("attempt store"))?;
        if let Some(existing) = &existing {
            tracing::info!("Attempt {} already has retry {}", prior.id, existing.id);
        }
        Ok(existing)
    }

    async fn page(&self, attempt_id: &str, paging: Paging) -> EngineResult<RetryAttemptResponse> {
        let page: AttemptPage = self.pages.page(attempt_id, paging).await?;
        Ok(RetryAttemptResponse {
            fully_mastered: false,
            attempt: Some(page),
        })
    }
}

/// `head` followed by every attempt it retries, back to the first attempt.
pub(crate) async fn load_chain(
    attempts: &dyn AttemptStore,
    head: Attempt,
) -> EngineResult<Vec<Attempt>> {
    let mut seen = HashSet::new();
    seen.insert(head.id.clone());
    let mut next = head.original_shuffle_set_id.clone();
    let mut chain = vec![head];

    while let Some(prior_id) = next {
        if !seen.insert(prior_id.clone()) {
            return Err(EngineError::Internal {
                collaborator: "attempt store",
                source: StoreError::Backend(anyhow::anyhow!(
                    "retry chain loops back to attempt {}",
                    prior_id
                )),
            });
        }
        let prior = attempts.load(&prior_id).await.map_err(|e| match e {
            StoreError::NotFound(what) => EngineError::Internal {
                collaborator: "attempt store",
                source: StoreError::Backend(anyhow::anyhow!("retry chain is broken: {}", what)),
            },
            other => EngineError::store("attempt store")(other),
        })?;
        next = prior.original_shuffle_set_id.clone();
        chain.push(prior);
    }

    Ok(chain)
}
