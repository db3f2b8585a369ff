use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::libujian::auth::Session;
use crate::libujian::question::{Answer, CorrectAnswer, Question, QuestionType};

/// One row per question, in question-set order, correct or not. A detail with
/// `kind == Essay` is the reviewer's cue for manual marking rather than a
/// wrong answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDetail {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(rename = "userAnswer")]
    pub user_answer: Option<Answer>,
    #[serde(rename = "correctAnswer")]
    pub correct_answer: Option<CorrectAnswer>,
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
}

/// Immutable record of one completed attempt. Appended to the results
/// collection, never updated; a user submitting twice produces two of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    #[serde(rename = "userEmail")]
    pub user_email: String,
    pub name: String,
    #[serde(rename = "examId")]
    pub exam_id: String,
    pub score: u32,
    pub date: DateTime<Utc>,
    pub details: Vec<QuestionDetail>,
}

fn is_correct(question: &Question, answer: Option<&Answer>) -> bool {
    match question.kind {
        QuestionType::Single => matches!(
            (answer, &question.correct),
            (Some(Answer::Single(got)), Some(CorrectAnswer::Single(want))) if got == want
        ),
        QuestionType::Multiple => {
            let submitted: BTreeSet<usize> = match answer {
                Some(Answer::Multiple(indices)) => indices.iter().copied().collect(),
                // absent compares as the empty set
                _ => BTreeSet::new(),
            };
            let wanted = question
                .correct
                .as_ref()
                .map(CorrectAnswer::index_set)
                .unwrap_or_default();
            submitted == wanted
        }
        // essays always need manual review
        QuestionType::Essay => false,
    }
}

/// Deterministic grading: no I/O, no failure path. The caller owns the single
/// side effect of appending the result to the results collection.
pub fn grade(
    questions: &[Question],
    answers: &HashMap<String, Answer>,
    session: &Session,
    exam_id: &str,
) -> AttemptResult {
    let mut correct_count = 0usize;
    let mut details = Vec::with_capacity(questions.len());

    for question in questions {
        let answer = answers.get(&question.id);
        let correct = is_correct(question, answer);
        if correct {
            correct_count += 1;
        }
        details.push(QuestionDetail {
            id: question.id.clone(),
            kind: question.kind,
            user_answer: answer.cloned(),
            correct_answer: question.correct.clone(),
            is_correct: correct,
        });
    }

    // round half away from zero, as the original's Math.round does
    let score = (correct_count as f64 / questions.len() as f64 * 100.0).round() as u32;
    debug!(
        "[Grade] {}/{} correct -> {}",
        correct_count,
        questions.len(),
        score
    );

    AttemptResult {
        user_email: session.email.clone(),
        name: session.name.clone(),
        exam_id: exam_id.to_string(),
        score,
        date: Utc::now(),
        details,
    }
}
