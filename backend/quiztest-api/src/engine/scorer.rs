use std::collections::HashSet;

use crate::models::{AnswerRecord, Attempt, ScoreSummary};

/// floor(correct / total * 100). An empty attempt scores zero.
pub fn percentage(correct: u32, total: u32) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (correct as u64 * 100 / total as u64) as f32
}

impl Attempt {
    /// Stores `record` as the latest submission for its question and
    /// re-derives the total. A previous record for the same question is
    /// replaced.
    pub fn record_answer(&mut self, record: AnswerRecord) {
        self.submission_history
            .insert(record.question_id.clone(), record);
        self.recompute_total_correctness();
        self.updated_at = chrono::Utc::now();
    }

    /// Re-derives `total_correctness` from the submission history.
    pub fn recompute_total_correctness(&mut self) -> u32 {
        self.total_correctness = self
            .submission_history
            .values()
            .filter(|record| record.is_accepted)
            .count() as u32;
        self.total_correctness
    }

    /// Every question of the ordering has at least one submission.
    pub fn is_finished(&self) -> bool {
        self.question_ids()
            .iter()
            .all(|id| self.submission_history.contains_key(id))
    }

    pub fn score(&self) -> ScoreSummary {
        let total = self.question_ids().len() as u32;
        ScoreSummary {
            correct: self.total_correctness,
            total,
            percentage: percentage(self.total_correctness, total),
        }
    }
}

/// Score of a retry chain: distinct ids accepted anywhere in the chain over
/// distinct question ids across every attempt in the chain.
pub fn chain_score<'a, I>(chain: I) -> ScoreSummary
where
    I: IntoIterator<Item = &'a Attempt>,
{
    let mut questions: HashSet<&str> = HashSet::new();
    let mut correct: HashSet<String> = HashSet::new();
    for attempt in chain {
        questions.extend(attempt.question_ids().iter().map(String::as_str));
        correct.extend(attempt.correct_ids());
    }
    let total = questions.len() as u32;
    let correct = correct.len() as u32;
    ScoreSummary {
        correct,
        total,
        percentage: percentage(correct, total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerDetail, NewAttempt, QuestionHierarchy, QuestionKind, Seed};
    use chrono::Utc;
    use proptest::prelude::*;

    fn attempt(ids: &[&str]) -> Attempt {
        Attempt::new(NewAttempt {
            unit_id: "unit".to_string(),
            original_set_id: "set".to_string(),
            student_id: "student".to_string(),
            session_id: "session".to_string(),
            random_seed: Seed(1),
            question_hierarchy: QuestionHierarchy::from_question_ids(ids.iter().copied()).unwrap(),
        })
    }

    fn record(id: &str, accepted: bool) -> AnswerRecord {
        AnswerRecord {
            question_id: id.to_string(),
            kind: QuestionKind::MultipleChoice,
            detail: AnswerDetail::SelectedIndex {
                selected: vec![1],
                correct: vec![1],
            },
            correctness: vec![accepted],
            is_accepted: accepted,
            points: if accepted { 1 } else { 0 },
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn percentage_is_floored() {
        assert_eq!(percentage(1, 3), 33.0);
        assert_eq!(percentage(2, 3), 66.0);
        assert_eq!(percentage(3, 3), 100.0);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn resubmission_overwrites_and_total_follows_latest() {
        let mut attempt = attempt(&["q1", "q2"]);
        attempt.record_answer(record("q1", true));
        assert_eq!(attempt.total_correctness, 1);

        attempt.record_answer(record("q1", false));
        assert_eq!(attempt.total_correctness, 0);
        assert_eq!(attempt.submission_history.len(), 1);

        attempt.record_answer(record("q1", true));
        attempt.record_answer(record("q2", true));
        assert_eq!(attempt.total_correctness, 2);
    }

    #[test]
    fn finished_once_every_question_has_a_record() {
        let mut attempt = attempt(&["q1", "q2", "q3"]);
        attempt.record_answer(record("q1", true));
        attempt.record_answer(record("q2", false));
        assert!(!attempt.is_finished());

        attempt.record_answer(record("q3", true));
        assert!(attempt.is_finished());
        assert_eq!(attempt.score().percentage, 66.0);
    }

    #[test]
    fn empty_attempt_is_finished_with_zero_score() {
        let attempt = attempt(&[]);
        assert!(attempt.is_finished());
        assert_eq!(attempt.score().percentage, 0.0);
    }

    #[test]
    fn chain_score_unions_the_chain() {
        let mut first = attempt(&["q1", "q2", "q3", "q4"]);
        first.record_answer(record("q1", true));
        first.record_answer(record("q2", true));
        first.record_answer(record("q3", false));
        first.record_answer(record("q4", false));

        let mut retry = attempt(&["q3", "q4"]).retrying(&first);
        retry.record_answer(record("q3", true));
        retry.record_answer(record("q4", false));

        let score = chain_score([&first, &retry]);
        assert_eq!(score.correct, 3);
        assert_eq!(score.total, 4);
        assert_eq!(score.percentage, 75.0);
    }

    proptest! {
        #[test]
        fn total_matches_accepted_latest_records(
            submissions in proptest::collection::vec((0usize..6, any::<bool>()), 0..40)
        ) {
            let ids = ["q0", "q1", "q2", "q3", "q4", "q5"];
            let mut attempt = attempt(&ids);
            let mut latest = std::collections::HashMap::new();
            for (i, accepted) in submissions {
                attempt.record_answer(record(ids[i], accepted));
                latest.insert(i, accepted);
            }
            let expected = latest.values().filter(|a| **a).count() as u32;
            prop_assert_eq!(attempt.total_correctness, expected);
            prop_assert!(attempt.total_correctness as usize <= ids.len());
        }
    }
}
