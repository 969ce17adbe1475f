use std::collections::HashSet;
use thiserror::Error;

use super::shuffle::shuffle_options;
use crate::models::{Answer, AnswerDetail, Question, QuestionKind, QuizOption, Seed};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("{kind} question cannot be answered with {format}")]
    FormatMismatch {
        kind: QuestionKind,
        format: &'static str,
    },
    #[error("selected index {index} out of range 1..={len}")]
    IndexOutOfRange { index: u32, len: usize },
    #[error("selected index {0} submitted more than once")]
    DuplicateIndex(u32),
    #[error("{submitted} selections for {available} options")]
    TooManySelections { submitted: usize, available: usize },
    #[error("question has no options to grade against")]
    NoOptions,
    #[error("submitted key {0} is not an item of this question")]
    UnknownKey(String),
    #[error("submitted key {0} appears more than once")]
    DuplicateKey(String),
    #[error("expected {expected} ordering keys, got {submitted}")]
    KeyCountMismatch { expected: usize, submitted: usize },
    #[error("{0} questions are not graded by this engine")]
    UnsupportedKind(QuestionKind),
}

/// Verdict for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Graded {
    pub correctness: Vec<bool>,
    pub is_accepted: bool,
    pub points: u32,
    pub detail: AnswerDetail,
}

/// Grades `answer` for `question` displayed at 1-based position `idx` of an
/// attempt shuffled with `seed`.
pub fn check(
    question: &Question,
    answer: &Answer,
    seed: Seed,
    idx: usize,
) -> Result<Graded, CheckError> {
    let (correctness, is_accepted, detail) = match question.kind {
        QuestionKind::MultipleChoice | QuestionKind::MultipleAnswer => {
            let displayed = shuffle_options(seed, idx, &question.options);
            check_choice(question, &displayed, answer)?
        }
        QuestionKind::ManualInput => check_choice(question, &question.options, answer)?,
        QuestionKind::FillInBlank | QuestionKind::PairOfWords | QuestionKind::TermAndDefinition => {
            check_fill_in(question, answer)?
        }
        QuestionKind::Ordering => check_ordering(question, answer)?,
        QuestionKind::Essay => match answer {
            Answer::FreeText(text) => (
                Vec::new(),
                false,
                AnswerDetail::FreeText { text: text.clone() },
            ),
            other => return Err(mismatch(question, other)),
        },
        QuestionKind::Unsupported => return Err(CheckError::UnsupportedKind(question.kind)),
    };

    Ok(Graded {
        points: if is_accepted { question.point } else { 0 },
        correctness,
        is_accepted,
        detail,
    })
}

type Verdict = (Vec<bool>, bool, AnswerDetail);

fn mismatch(question: &Question, answer: &Answer) -> CheckError {
    CheckError::FormatMismatch {
        kind: question.kind,
        format: answer.format(),
    }
}

/// Accepted iff every selection is correct and the number of selections
/// equals the number of correct options.
fn check_choice(
    question: &Question,
    displayed: &[QuizOption],
    answer: &Answer,
) -> Result<Verdict, CheckError> {
    let selected = match answer {
        Answer::SelectedIndex(selected) => selected,
        other => return Err(mismatch(question, other)),
    };
    if displayed.is_empty() {
        return Err(CheckError::NoOptions);
    }
    if selected.len() > displayed.len() {
        return Err(CheckError::TooManySelections {
            submitted: selected.len(),
            available: displayed.len(),
        });
    }

    let mut seen = HashSet::new();
    let mut correctness = Vec::with_capacity(selected.len());
    for &index in selected {
        if index == 0 || index as usize > displayed.len() {
            return Err(CheckError::IndexOutOfRange {
                index,
                len: displayed.len(),
            });
        }
        if !seen.insert(index) {
            return Err(CheckError::DuplicateIndex(index));
        }
        correctness.push(displayed[index as usize - 1].correctness);
    }

    let correct: Vec<u32> = displayed
        .iter()
        .enumerate()
        .filter(|(_, option)| option.correctness)
        .map(|(d, _)| d as u32 + 1)
        .collect();
    let is_accepted = correctness.iter().all(|c| *c) && selected.len() == correct.len();

    Ok((
        correctness,
        is_accepted,
        AnswerDetail::SelectedIndex {
            selected: selected.clone(),
            correct,
        },
    ))
}

/// Blank `i` is correct iff its text equals any alternative for that blank.
/// Texts beyond the blank count are ignored.
fn check_fill_in(question: &Question, answer: &Answer) -> Result<Verdict, CheckError> {
    let filled = match answer {
        Answer::FilledText(filled) => filled,
        other => return Err(mismatch(question, other)),
    };
    let blanks = question.blanks();
    if blanks.is_empty() {
        return Err(CheckError::NoOptions);
    }

    let filled: Vec<String> = filled.iter().take(blanks.len()).cloned().collect();
    let correctness: Vec<bool> = filled
        .iter()
        .zip(&blanks)
        .map(|(text, alternatives)| alternatives.iter().any(|alt| alt.text == *text))
        .collect();
    let is_accepted = correctness.iter().all(|c| *c) && filled.len() == blanks.len();
    let correct = blanks.iter().map(|alternatives| alternatives[0].text.clone()).collect();

    Ok((
        correctness,
        is_accepted,
        AnswerDetail::FilledText { filled, correct },
    ))
}

/// The submission must be a permutation of the canonical keys; each
/// position is compared with the canonical order.
fn check_ordering(question: &Question, answer: &Answer) -> Result<Verdict, CheckError> {
    let submitted = match answer {
        Answer::SubmittedKey(submitted) => submitted,
        other => return Err(mismatch(question, other)),
    };
    if question.options.is_empty() {
        return Err(CheckError::NoOptions);
    }

    let canonical: Vec<String> = question.options.iter().map(|o| o.key.clone()).collect();
    let known: HashSet<&str> = canonical.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    for key in submitted {
        if !known.contains(key.as_str()) {
            return Err(CheckError::UnknownKey(key.clone()));
        }
        if !seen.insert(key.as_str()) {
            return Err(CheckError::DuplicateKey(key.clone()));
        }
    }
    if submitted.len() != canonical.len() {
        return Err(CheckError::KeyCountMismatch {
            expected: canonical.len(),
            submitted: submitted.len(),
        });
    }

    let correctness: Vec<bool> = submitted.iter().zip(&canonical).map(|(s, c)| s == c).collect();
    let is_accepted = correctness.iter().all(|c| *c);

    Ok((
        correctness,
        is_accepted,
        AnswerDetail::SubmittedKey {
            submitted: submitted.clone(),
            correct: canonical,
        },
    ))
}
