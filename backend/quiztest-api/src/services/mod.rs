use mongodb::Client as MongoClient;
use std::sync::Arc;

use crate::config::Config;
use crate::error::EngineError;
use crate::models::Attempt;
use crate::repositories::{
    AttemptStore, CanonicalSetStore, CompletenessStore, MemoryStore, MongoStores,
    QuestionGroupStore,
};

pub mod attempt_service;
pub mod grading_service;
pub mod retry_service;

pub struct AppState {
    pub config: Config,
    pub canonical_sets: Arc<dyn CanonicalSetStore>,
    pub question_groups: Arc<dyn QuestionGroupStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub completeness: Arc<dyn CompletenessStore>,
    /// Set when running against MongoDB; used by the health check.
    pub mongo: Option<MongoStores>,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let stores = MongoStores::new(mongo_client.database(&config.mongo_database));

        tracing::info!("Ensuring MongoDB indexes...");
        stores.ensure_indexes().await?;

        Ok(Self {
            config,
            canonical_sets: Arc::new(stores.clone()),
            question_groups: Arc::new(stores.clone()),
            attempts: Arc::new(stores.clone()),
            completeness: Arc::new(stores.clone()),
            mongo: Some(stores),
        })
    }

    pub fn in_memory(config: Config, store: MemoryStore) -> Self {
        Self {
            config,
            canonical_sets: Arc::new(store.clone()),
            question_groups: Arc::new(store.clone()),
            attempts: Arc::new(store.clone()),
            completeness: Arc::new(store),
            mongo: None,
        }
    }
}

/// Rejects attempts that belong to another unit or student.
pub(crate) fn ensure_owned(
    attempt: &Attempt,
    unit_id: &str,
    student_id: &str,
) -> Result<(), EngineError> {
    if attempt.unit_id != unit_id {
        return Err(EngineError::FailedPrecondition(format!(
            "attempt {} belongs to unit {}",
            attempt.id, attempt.unit_id
        )));
    }
    if attempt.student_id != student_id {
        return Err(EngineError::FailedPrecondition(format!(
            "attempt {} belongs to another student",
            attempt.id
        )));
    }
    Ok(())
}

pub(crate) fn require(value: &str, field: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidArgument(format!("{} is required", field)));
    }
    Ok(())
}
