use std::collections::BTreeSet;

use crate::models::{Attempt, QuestionHierarchy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPlan {
    /// Canonical hierarchy minus every mastered question, canonical order kept.
    Retry(QuestionHierarchy),
    /// Nothing left to retry.
    FullyMastered,
}

/// Ids accepted in any attempt of the chain.
pub fn mastered_ids<'a, I>(chain: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Attempt>,
{
    chain
        .into_iter()
        .flat_map(|attempt| attempt.correct_ids())
        .collect()
}

pub fn plan_retry(canonical: &QuestionHierarchy, mastered: &BTreeSet<String>) -> RetryPlan {
    let mastered: Vec<&String> = mastered.iter().collect();
    let remaining = canonical.exclude(&mastered);
    if remaining.is_empty() {
        RetryPlan::FullyMastered
    } else {
        RetryPlan::Retry(remaining)
    }
}
