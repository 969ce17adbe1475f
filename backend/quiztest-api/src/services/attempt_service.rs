use std::sync::Arc;
use validator::Validate;

use super::{ensure_owned, require, AppState};
use crate::config::EngineConfig;
use crate::engine::shuffle::{self, SeedDraw};
use crate::error::{EngineError, EngineResult};
use crate::metrics::record_attempt_created;
use crate::models::{
    Attempt, AttemptPage, CanonicalSet, CreateAttemptRequest, DisplayedOption, DisplayedQuestion,
    NewAttempt, Paging, Question, QuestionHierarchy, Seed,
};
use crate::repositories::{AttemptStore, CanonicalSetStore, QuestionGroupStore};

pub struct AttemptService {
    canonical_sets: Arc<dyn CanonicalSetStore>,
    question_groups: Arc<dyn QuestionGroupStore>,
    attempts: Arc<dyn AttemptStore>,
    engine: EngineConfig,
}

impl AttemptService {
    pub fn new(state: &AppState) -> Self {
        Self {
            canonical_sets: state.canonical_sets.clone(),
            question_groups: state.question_groups.clone(),
            attempts: state.attempts.clone(),
            engine: state.config.engine.clone(),
        }
    }

    /// Hands out a page of an attempt: an existing one (by id or by session)
    /// or a freshly shuffled one.
    pub async fn create_attempt(
        &self,
        unit_id: &str,
        req: CreateAttemptRequest,
    ) -> EngineResult<AttemptPage> {
        require(unit_id, "unit_id")?;
        req.validate()?;

        if let Some(attempt_id) = &req.attempt_id {
            let attempt = self
                .attempts
                .load(attempt_id)
                .await
                .map_err(EngineError::store("attempt store"))?;
            ensure_owned(&attempt, unit_id, &req.student_id)?;
            return self.page(&attempt.id, req.paging).await;
        }

        if let Some(existing) = self
            .attempts
            .find_by_session(&req.session_id)
            .await
            .map_err(EngineError::store("attempt store"))?
        {
            ensure_owned(&existing, unit_id, &req.student_id)?;
            tracing::info!(
                "Reusing attempt {} for session {}",
                existing.id,
                req.session_id
            );
            record_attempt_created("reused");
            return self.page(&existing.id, req.paging).await;
        }

        let set = self.canonical_set(unit_id).await?;
        let draw = self.layout(&set, &set.hierarchy, req.keep_order, req.seed);

        let attempt = Attempt::new(NewAttempt {
            unit_id: unit_id.to_string(),
            original_set_id: set.id.clone(),
            student_id: req.student_id.clone(),
            session_id: req.session_id.clone(),
            random_seed: draw.seed,
            question_hierarchy: draw.hierarchy,
        });
        match self.attempts.create(&attempt).await {
            Ok(()) => {}
            Err(e) if e.is_duplicate() => {
                // A concurrent request for the same session got there first.
                let winner = self
                    .attempts
                    .find_by_session(&req.session_id)
                    .await
                    .map_err(EngineError::store("attempt store"))?
                    .ok_or_else(|| EngineError::store("attempt store")(e))?;
                ensure_owned(&winner, unit_id, &req.student_id)?;
                tracing::info!(
                    "Attempt {} won the race for session {}",
                    winner.id,
                    req.session_id
                );
                record_attempt_created("reused");
                return self.page(&winner.id, req.paging).await;
            }
            Err(e) => return Err(EngineError::store("attempt store")(e)),
        }

        record_attempt_created("initial");
        tracing::info!(
            "Created attempt {} for student={}, unit={}, questions={}",
            attempt.id,
            attempt.student_id,
            unit_id,
            attempt.question_ids().len()
        );

        self.page(&attempt.id, req.paging).await
    }

    /// Lays out `hierarchy` for a new attempt. A caller-supplied seed is used
    /// as is; otherwise seeds are drawn until ordering questions are scrambled.
    pub(crate) fn layout(
        &self,
        set: &CanonicalSet,
        hierarchy: &QuestionHierarchy,
        keep_order: bool,
        seed: Option<Seed>,
    ) -> SeedDraw {
        if let Some(seed) = seed {
            return SeedDraw {
                seed,
                hierarchy: shuffle::arrange(seed, hierarchy, keep_order),
                ordering_scrambled: true,
                draws: 0,
            };
        }

        let draw = shuffle::draw_seed(
            set,
            hierarchy,
            keep_order,
            self.engine.seed_redraw_attempts,
            Seed::random,
        );
        if !draw.ordering_scrambled {
            tracing::warn!(
                "No seed out of {} scrambles every ordering question of unit {}; keeping seed {}",
                draw.draws,
                set.unit_id,
                draw.seed
            );
        }
        draw
    }

    /// Page of an attempt, with options laid out for each position.
    pub async fn page(&self, attempt_id: &str, paging: Paging) -> EngineResult<AttemptPage> {
        paging.validate()?;
        let slice = self
            .attempts
            .get(attempt_id, paging.offset as usize, paging.limit as usize)
            .await
            .map_err(EngineError::store("attempt store"))?;

        let set = self.canonical_set(&slice.unit_id).await?;
        let items = slice
            .question_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                set.question(id)
                    .map(|question| display_question(question, slice.seed, slice.first_idx + i))
                    .ok_or_else(|| {
                        EngineError::NotFound(format!(
                            "question {} in the question set of unit {}",
                            id, slice.unit_id
                        ))
                    })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let question_groups = self
            .question_groups
            .get_by_ids(&slice.hierarchy.group_ids())
            .await
            .map_err(EngineError::store("question group store"))?;

        Ok(AttemptPage {
            attempt_id: slice.attempt_id,
            unit_id: slice.unit_id,
            original_shuffle_set_id: slice.original_shuffle_set_id,
            total_questions: slice.total_questions,
            items,
            question_groups,
            next_page: paging.next(),
        })
    }

    pub(crate) async fn canonical_set(&self, unit_id: &str) -> EngineResult<CanonicalSet> {
        self.canonical_sets
            .get_by_unit_id(unit_id)
            .await
            .map_err(EngineError::store("canonical set store"))?
            .ok_or_else(|| EngineError::NotFound(format!("question set of unit {}", unit_id)))
    }
}

/// Student-facing view of `question` at 1-based position `idx`.
pub fn display_question(question: &Question, seed: Seed, idx: usize) -> DisplayedQuestion {
    let kind = question.kind;
    let (options, blank_count) = if kind.is_fill_in() {
        (Vec::new(), Some(question.blanks().len()))
    } else if kind.shuffles_options() {
        (shuffle::shuffle_options(seed, idx, &question.options), None)
    } else {
        (question.options.clone(), None)
    };

    DisplayedQuestion {
        external_id: question.external_id.clone(),
        kind,
        stem: question.stem.clone(),
        point: question.point,
        idx,
        group_id: question.group_id.clone(),
        options: options
            .into_iter()
            .map(|option| DisplayedOption {
                key: option.key,
                label: option.label,
                text: option.text,
                rendered_url: option.rendered_url,
            })
            .collect(),
        blank_count,
    }
}
