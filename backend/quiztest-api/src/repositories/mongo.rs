use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson},
    error::{ErrorKind, WriteFailure},
    options::{FindOneOptions, IndexOptions},
    Collection, Database, IndexModel,
};

use super::{
    AttemptStore, CanonicalSetStore, CompletenessStore, QuestionGroupStore, StoreError,
    StoreResult,
};
use crate::metrics::track_db_operation;
use crate::models::{Attempt, CanonicalSet, QuestionGroup, UnitCompleteness};

const QUIZ_SETS: &str = "quiz_sets";
const QUESTION_GROUPS: &str = "question_groups";
const ATTEMPTS: &str = "shuffled_quiz_sets";
const COMPLETENESS: &str = "unit_completeness";

/// MongoDB-backed implementation of every store.
#[derive(Clone)]
pub struct MongoStores {
    mongo: Database,
}

impl MongoStores {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn quiz_sets(&self) -> Collection<CanonicalSet> {
        self.mongo.collection(QUIZ_SETS)
    }

    fn question_groups(&self) -> Collection<QuestionGroup> {
        self.mongo.collection(QUESTION_GROUPS)
    }

    fn attempts(&self) -> Collection<Attempt> {
        self.mongo.collection(ATTEMPTS)
    }

    fn completeness(&self) -> Collection<UnitCompleteness> {
        self.mongo.collection(COMPLETENESS)
    }

    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        self.quiz_sets()
            .create_index(IndexModel::builder().keys(doc! { "unit_id": 1 }).build())
            .await
            .context("Failed to create quiz_sets.unit_id index")?;

        // One attempt per session, and at most one retry per attempt.
        self.attempts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "session_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .with_context(|| format!("Failed to create {}.session_id index", ATTEMPTS))?;
        self.attempts()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "original_shuffle_set_id": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(
                                doc! { "original_shuffle_set_id": { "$type": "string" } },
                            )
                            .build(),
                    )
                    .build(),
            )
            .await
            .with_context(|| {
                format!("Failed to create {}.original_shuffle_set_id index", ATTEMPTS)
            })?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }

    async fn find_attempt_by(
        &self,
        filter: mongodb::bson::Document,
    ) -> StoreResult<Option<Attempt>> {
        let attempt = track_db_operation("find_one", ATTEMPTS, async {
            self.attempts()
                .find_one(filter)
                .with_options(
                    FindOneOptions::builder()
                        .sort(doc! { "created_at": 1 })
                        .build(),
                )
                .await
                .context("Failed to load attempt")
        })
        .await?;
        Ok(attempt)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == 11000
    )
}

fn completeness_id(unit_id: &str, student_id: &str) -> String {
    format!("{}:{}", unit_id, student_id)
}

#[async_trait]
impl CanonicalSetStore for MongoStores {
    async fn get_by_unit_id(&self, unit_id: &str) -> StoreResult<Option<CanonicalSet>> {
        let set = track_db_operation("find_one", QUIZ_SETS, async {
            self.quiz_sets()
                .find_one(doc! { "unit_id": unit_id })
                .await
                .context("Failed to load canonical quiz set")
        })
        .await?;
        Ok(set)
    }
}

#[async_trait]
impl QuestionGroupStore for MongoStores {
    async fn get_by_ids(&self, ids: &[String]) -> StoreResult<Vec<QuestionGroup>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut groups: Vec<QuestionGroup> = track_db_operation("find", QUESTION_GROUPS, async {
            let cursor = self
                .question_groups()
                .find(doc! { "_id": { "$in": ids.to_vec() } })
                .await
                .context("Failed to query question groups")?;
            cursor
                .try_collect()
                .await
                .context("Failed to collect question groups")
        })
        .await?;
        groups.sort_by_key(|group| ids.iter().position(|id| *id == group.id));
        Ok(groups)
    }
}

#[async_trait]
impl AttemptStore for MongoStores {
    async fn create(&self, attempt: &Attempt) -> StoreResult<()> {
        track_db_operation("insert_one", ATTEMPTS, async {
            self.attempts()
                .insert_one(attempt)
                .await
                .context("Failed to insert attempt")
        })
        .await
        .map(|_| ())
        .map_err(|e| {
            if e.downcast_ref::<mongodb::error::Error>()
                .is_some_and(is_duplicate_key)
            {
                StoreError::Duplicate(format!("attempt for session {}", attempt.session_id))
            } else {
                StoreError::Backend(e)
            }
        })
    }

    async fn find(&self, attempt_id: &str) -> StoreResult<Option<Attempt>> {
        self.find_attempt_by(doc! { "_id": attempt_id }).await
    }

    async fn find_by_session(&self, session_id: &str) -> StoreResult<Option<Attempt>> {
        self.find_attempt_by(doc! { "session_id": session_id }).await
    }

    async fn find_retry_of(&self, attempt_id: &str) -> StoreResult<Option<Attempt>> {
        self.find_attempt_by(doc! { "original_shuffle_set_id": attempt_id })
            .await
    }

    async fn compare_and_swap(&self, attempt: &Attempt, expected_version: i64) -> StoreResult<()> {
        let mut next = attempt.clone();
        next.version = expected_version + 1;

        let result = track_db_operation("replace_one", ATTEMPTS, async {
            self.attempts()
                .replace_one(
                    doc! { "_id": &attempt.id, "version": expected_version },
                    &next,
                )
                .await
                .context("Failed to replace attempt")
        })
        .await?;

        if result.matched_count == 0 {
            return match self.find(&attempt.id).await? {
                Some(_) => Err(StoreError::Conflict(attempt.id.clone())),
                None => Err(StoreError::NotFound(format!("attempt {}", attempt.id))),
            };
        }
        Ok(())
    }
}

#[async_trait]
impl CompletenessStore for MongoStores {
    async fn upsert_first_score(
        &self,
        unit_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()> {
        let id = completeness_id(unit_id, student_id);
        let now = to_bson(&Utc::now()).context("Failed to encode timestamp")?;
        let collection = self.completeness();

        track_db_operation("update_one", COMPLETENESS, async {
            collection
                .update_one(
                    doc! { "_id": &id },
                    doc! {
                        "$setOnInsert": {
                            "unit_id": unit_id,
                            "student_id": student_id,
                            "updated_at": now.clone(),
                        }
                    },
                )
                .upsert(true)
                .await
                .context("Failed to ensure completeness record")?;
            collection
                .update_one(
                    doc! { "_id": &id, "first_score": null },
                    doc! { "$set": { "first_score": score as f64, "updated_at": now.clone() } },
                )
                .await
                .context("Failed to record first completion score")
        })
        .await?;
        Ok(())
    }

    async fn upsert_highest_score(
        &self,
        unit_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()> {
        let id = completeness_id(unit_id, student_id);
        let now = to_bson(&Utc::now()).context("Failed to encode timestamp")?;

        track_db_operation("update_one", COMPLETENESS, async {
            self.completeness()
                .update_one(
                    doc! { "_id": &id },
                    doc! {
                        "$setOnInsert": { "unit_id": unit_id, "student_id": student_id },
                        "$max": { "highest_score": score as f64 },
                        "$set": { "updated_at": now },
                    },
                )
                .upsert(true)
                .await
                .context("Failed to record highest score")
        })
        .await?;
        Ok(())
    }

    async fn get_completeness(
        &self,
        unit_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<UnitCompleteness>> {
        let id = completeness_id(unit_id, student_id);
        let completeness = track_db_operation("find_one", COMPLETENESS, async {
            self.completeness()
                .find_one(doc! { "_id": &id })
                .await
                .context("Failed to load completeness")
        })
        .await?;
        Ok(completeness)
    }
}
