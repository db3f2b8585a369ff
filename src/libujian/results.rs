use log::info;

use crate::libujian::error::Error;
use crate::libujian::grading::AttemptResult;
use crate::libujian::store::Store;

pub const RESULTS_FILE: &str = "examResults";

/// Appends one attempt to the collection. No dedup: resubmission produces a
/// second entry, by design.
pub fn append(store: &Store, result: &AttemptResult) -> Result<(), Error> {
    let mut results = all(store)?;
    results.push(result.clone());
    store.write_as(RESULTS_FILE, &results)?;
    info!(
        "[Results] Recorded attempt by '{}' on '{}': {}",
        result.user_email, result.exam_id, result.score
    );
    Ok(())
}

pub fn all(store: &Store) -> Result<Vec<AttemptResult>, Error> {
    Ok(store.read_as(RESULTS_FILE)?.unwrap_or_default())
}

/// Top `n` by score, best first. The stored collection is left untouched;
/// sorting and truncation happen on the reader's copy.
pub fn leaderboard(results: &[AttemptResult], n: usize) -> Vec<AttemptResult> {
    let mut sorted = results.to_vec();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));
    sorted.truncate(n);
    sorted
}

/// Most recent attempts first, for the activity view.
pub fn activity(results: &[AttemptResult]) -> Vec<AttemptResult> {
    let mut sorted = results.to_vec();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));
    sorted
}

pub fn reset(store: &Store) -> Result<(), Error> {
    store.remove(RESULTS_FILE)?;
    info!("[Results] Collection reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libujian::auth::{Role, Session};
    use crate::libujian::grading::grade;
    use crate::libujian::question::{CorrectAnswer, Question, QuestionType};
    use std::collections::HashMap;

    fn attempt(email: &str, score_hits: usize) -> AttemptResult {
        let session = Session {
            role: Role::Student,
            email: email.into(),
            name: email.into(),
        };
        let questions: Vec<Question> = (0..4)
            .map(|i| Question {
                id: format!("q{}", i),
                kind: QuestionType::Single,
                text: "soal".into(),
                media: None,
                choices: vec!["a".into(), "b".into()],
                correct: Some(CorrectAnswer::Single(0)),
                explanation: None,
            })
            .collect();
        let answers: HashMap<_, _> = (0..score_hits)
            .map(|i| {
                (
                    format!("q{}", i),
                    crate::libujian::question::Answer::Single(0),
                )
            })
            .collect();
        grade(&questions, &answers, &session, "exam1")
    }

    #[test]
    fn append_is_append_only_and_keeps_duplicates() {
        let store = Store::open_in_memory().unwrap();
        let result = attempt("budi@mail.com", 4);
        append(&store, &result).unwrap();
        append(&store, &result).unwrap();
        let stored = all(&store).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].score, 100);
        assert_eq!(stored[1].score, 100);
    }

    #[test]
    fn leaderboard_sorts_by_score_and_truncates() {
        let results = vec![
            attempt("a@m.com", 1),
            attempt("b@m.com", 4),
            attempt("c@m.com", 2),
        ];
        let top = leaderboard(&results, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user_email, "b@m.com");
        assert_eq!(top[1].user_email, "c@m.com");
        // the input stays unsorted
        assert_eq!(results[0].user_email, "a@m.com");
    }

    #[test]
    fn activity_is_most_recent_first() {
        let mut older = attempt("a@m.com", 1);
        older.date -= chrono::Duration::minutes(5);
        let newer = attempt("b@m.com", 2);
        let view = activity(&[older, newer]);
        assert_eq!(view[0].user_email, "b@m.com");
    }

    #[test]
    fn reset_empties_the_collection() {
        let store = Store::open_in_memory().unwrap();
        append(&store, &attempt("a@m.com", 1)).unwrap();
        reset(&store).unwrap();
        assert!(all(&store).unwrap().is_empty());
    }
}
