use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    AttemptStore, CanonicalSetStore, CompletenessStore, QuestionGroupStore, StoreError,
    StoreResult,
};
use crate::models::{Attempt, CanonicalSet, QuestionGroup, UnitCompleteness};

#[derive(Default)]
struct Inner {
    canonical_sets: HashMap<String, CanonicalSet>,
    question_groups: HashMap<String, QuestionGroup>,
    attempts: HashMap<String, Attempt>,
    completeness: HashMap<(String, String), UnitCompleteness>,
}

/// Process-local implementation of every store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

/// Seed data for the memory backend.
#[derive(Debug, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub canonical_sets: Vec<CanonicalSet>,
    #[serde(default)]
    pub question_groups: Vec<QuestionGroup>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_fixtures(fixtures: Fixtures) -> Self {
        let store = Self::new();
        for set in fixtures.canonical_sets {
            store.insert_canonical_set(set).await;
        }
        for group in fixtures.question_groups {
            store.insert_question_group(group).await;
        }
        store
    }

    pub async fn insert_canonical_set(&self, set: CanonicalSet) {
        let mut inner = self.inner.write().await;
        inner.canonical_sets.insert(set.unit_id.clone(), set);
    }

    pub async fn insert_question_group(&self, group: QuestionGroup) {
        let mut inner = self.inner.write().await;
        inner.question_groups.insert(group.id.clone(), group);
    }
}

#[async_trait]
impl CanonicalSetStore for MemoryStore {
    async fn get_by_unit_id(&self, unit_id: &str) -> StoreResult<Option<CanonicalSet>> {
        Ok(self.inner.read().await.canonical_sets.get(unit_id).cloned())
    }
}

#[async_trait]
impl QuestionGroupStore for MemoryStore {
    async fn get_by_ids(&self, ids: &[String]) -> StoreResult<Vec<QuestionGroup>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.question_groups.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn create(&self, attempt: &Attempt) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.attempts.contains_key(&attempt.id) {
            return Err(StoreError::Duplicate(format!("attempt {}", attempt.id)));
        }
        for existing in inner.attempts.values() {
            if existing.session_id == attempt.session_id {
                return Err(StoreError::Duplicate(format!(
                    "attempt for session {}",
                    attempt.session_id
                )));
            }
            if let Some(prior) = &attempt.original_shuffle_set_id {
                if existing.original_shuffle_set_id.as_ref() == Some(prior) {
                    return Err(StoreError::Duplicate(format!("retry of attempt {}", prior)));
                }
            }
        }
        inner.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn find(&self, attempt_id: &str) -> StoreResult<Option<Attempt>> {
        Ok(self.inner.read().await.attempts.get(attempt_id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> StoreResult<Option<Attempt>> {
        let inner = self.inner.read().await;
        Ok(inner
            .attempts
            .values()
            .filter(|a| a.session_id == session_id)
            .min_by_key(|a| a.created_at)
            .cloned())
    }

    async fn find_retry_of(&self, attempt_id: &str) -> StoreResult<Option<Attempt>> {
        let inner = self.inner.read().await;
        Ok(inner
            .attempts
            .values()
            .filter(|a| a.original_shuffle_set_id.as_deref() == Some(attempt_id))
            .min_by_key(|a| a.created_at)
            .cloned())
    }

    async fn compare_and_swap(&self, attempt: &Attempt, expected_version: i64) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .attempts
            .get_mut(&attempt.id)
            .ok_or_else(|| StoreError::NotFound(format!("attempt {}", attempt.id)))?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict(attempt.id.clone()));
        }
        let mut next = attempt.clone();
        next.version = expected_version + 1;
        *stored = next;
        Ok(())
    }
}

#[async_trait]
impl CompletenessStore for MemoryStore {
    async fn upsert_first_score(
        &self,
        unit_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .completeness
            .entry((unit_id.to_string(), student_id.to_string()))
            .or_insert_with(|| empty_completeness(unit_id, student_id));
        if entry.first_score.is_none() {
            entry.first_score = Some(score);
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn upsert_highest_score(
        &self,
        unit_id: &str,
        student_id: &str,
        score: f32,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .completeness
            .entry((unit_id.to_string(), student_id.to_string()))
            .or_insert_with(|| empty_completeness(unit_id, student_id));
        if entry.highest_score.map_or(true, |highest| score > highest) {
            entry.highest_score = Some(score);
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_completeness(
        &self,
        unit_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<UnitCompleteness>> {
        let inner = self.inner.read().await;
        Ok(inner
            .completeness
            .get(&(unit_id.to_string(), student_id.to_string()))
            .cloned())
    }
}

fn empty_completeness(unit_id: &str, student_id: &str) -> UnitCompleteness {
    UnitCompleteness {
        unit_id: unit_id.to_string(),
        student_id: student_id.to_string(),
        first_score: None,
        highest_score: None,
        updated_at: Utc::now(),
    }
}
