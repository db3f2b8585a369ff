use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

use crate::libujian::auth::Session;
use crate::libujian::error::Error;
use crate::libujian::grading::{grade, AttemptResult};
use crate::libujian::question::{Answer, Question, QuestionType};
use crate::libujian::results;
use crate::libujian::store::Store;

pub const CONFIG_FILE: &str = "exam-config.json";
pub const QUESTIONS_FILE: &str = "questions.json";

/// Admin-owned publication gate. Only the current value matters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamConfig {
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamEntry {
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// The whole question bank: exam id -> its question set.
pub type QuestionBank = HashMap<String, ExamEntry>;

/// Current-question pointer over a fixed-size question set. Pure state;
/// deliberately not persisted, so every load starts back at question 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    current: usize,
    total: usize,
}

impl Navigator {
    pub fn new(total: usize) -> Navigator {
        Navigator { current: 0, total }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// No-op at the last question.
    pub fn next(&mut self) -> usize {
        if self.current + 1 < self.total {
            self.current += 1;
        }
        self.current
    }

    /// No-op at question 0.
    pub fn prev(&mut self) -> usize {
        if self.current > 0 {
            self.current -= 1;
        }
        self.current
    }

    /// Question-index picker jump; out-of-range indices are refused.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index < self.total {
            self.current = index;
            true
        } else {
            false
        }
    }
}

/// One exam attempt for one student: the loaded question set, the autosaved
/// answer map, and the navigation pointer. Constructed per attempt and
/// consumed by `submit`.
pub struct ExamSession<'a> {
    store: &'a Store,
    session: Session,
    exam_id: String,
    questions: Vec<Question>,
    answers: HashMap<String, Answer>,
    pub navigator: Navigator,
    bank_digest: String,
}

fn fingerprint(questions: &[Question]) -> Result<String, Error> {
    let canonical = serde_json::to_vec(questions)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

fn load_question_set(store: &Store, exam_id: &str) -> Result<Vec<Question>, Error> {
    let bank: QuestionBank = store.read_as(QUESTIONS_FILE)?.unwrap_or_default();
    match bank.get(exam_id) {
        Some(entry) if !entry.questions.is_empty() => Ok(entry.questions.clone()),
        _ => Err(Error::EmptyBank(exam_id.to_string())),
    }
}

impl<'a> ExamSession<'a> {
    fn answers_key(exam_id: &str) -> String {
        format!("answers_{}", exam_id)
    }

    /// Gate on publication, load the question set, restore any saved answers.
    /// Saved state that fails to parse is discarded, not fatal.
    pub fn load(store: &'a Store, session: &Session, exam_id: &str) -> Result<ExamSession<'a>, Error> {
        let config: ExamConfig = store.read_as(CONFIG_FILE)?.unwrap_or_default();
        if !config.published {
            return Err(Error::NotPublished);
        }

        let questions = load_question_set(store, exam_id)?;
        let bank_digest = fingerprint(&questions)?;

        let answers = match store.read_user(&session.email, &Self::answers_key(exam_id)) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(map) => map,
                Err(err) => {
                    warn!("[Exam] Discarding malformed saved answers: {}", err);
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(err) => {
                warn!("[Exam] Cannot restore saved answers: {}", err);
                HashMap::new()
            }
        };
        info!(
            "[Exam] Loaded '{}' for '{}': {} questions, {} answers restored",
            exam_id,
            session.email,
            questions.len(),
            answers.len()
        );

        let total = questions.len();
        Ok(ExamSession {
            store,
            session: session.clone(),
            exam_id: exam_id.to_string(),
            questions,
            answers,
            navigator: Navigator::new(total),
            bank_digest,
        })
    }

    pub fn exam_id(&self) -> &str {
        &self.exam_id
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.navigator.current()]
    }

    pub fn answer(&self, question_id: &str) -> Option<&Answer> {
        self.answers.get(question_id)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    /// Accepts a type-conforming answer, updates the in-memory map, then
    /// write-through persists the whole map (autosave). On a persistence
    /// failure the in-memory value is kept and the error is surfaced so the
    /// caller can warn that autosave is failing.
    pub fn set_answer(&mut self, question_id: &str, value: Answer) -> Result<(), Error> {
        let question = self
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| Error::UnknownQuestion(question_id.to_string()))?;

        let accepted = match (question.kind, value) {
            (QuestionType::Single, Answer::Single(index)) if index < question.choices.len() => {
                Answer::Single(index)
            }
            (QuestionType::Multiple, Answer::Multiple(indices)) => {
                let distinct: BTreeSet<usize> = indices.iter().copied().collect();
                if distinct.len() != indices.len()
                    || indices.iter().any(|i| *i >= question.choices.len())
                {
                    return Err(Error::InvalidAnswerShape {
                        question: question.id.clone(),
                    });
                }
                Answer::Multiple(indices)
            }
            (QuestionType::Essay, Answer::Essay(text)) => Answer::Essay(text.trim().to_string()),
            _ => {
                // contract violation: the prior value stays untouched
                return Err(Error::InvalidAnswerShape {
                    question: question.id.clone(),
                });
            }
        };

        self.answers.insert(question_id.to_string(), accepted);
        debug!("[Exam] Autosaving answer for '{}'", question_id);
        self.persist()
    }

    fn persist(&self) -> Result<(), Error> {
        let value: Value = serde_json::to_value(&self.answers)?;
        self.store
            .write_user(&self.session.email, &Self::answers_key(&self.exam_id), &value)
    }

    /// Grades the final answer map and appends the attempt to the results
    /// collection. Fails without grading if the bank changed mid-attempt.
    pub fn submit(self) -> Result<AttemptResult, Error> {
        let current = load_question_set(self.store, &self.exam_id)?;
        if fingerprint(&current)? != self.bank_digest {
            warn!("[Exam] Question bank changed under attempt '{}'", self.exam_id);
            return Err(Error::StaleQuestionSet);
        }

        let result = grade(&self.questions, &self.answers, &self.session, &self.exam_id);
        results::append(self.store, &result)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libujian::auth::Role;
    use crate::libujian::question::CorrectAnswer;
    use serde_json::json;

    fn student() -> Session {
        Session {
            role: Role::Student,
            email: "budi@mail.com".into(),
            name: "Budi".into(),
        }
    }

    fn sample_questions() -> Vec<Question> {
        vec![
            Question {
                id: "q1".into(),
                kind: QuestionType::Single,
                text: "satu".into(),
                media: None,
                choices: vec!["a".into(), "b".into(), "c".into()],
                correct: Some(CorrectAnswer::Single(1)),
                explanation: None,
            },
            Question {
                id: "q2".into(),
                kind: QuestionType::Multiple,
                text: "dua".into(),
                media: None,
                choices: vec!["a".into(), "b".into(), "c".into()],
                correct: Some(CorrectAnswer::Multiple(vec![0, 2])),
                explanation: None,
            },
            Question {
                id: "q3".into(),
                kind: QuestionType::Essay,
                text: "tiga".into(),
                media: None,
                choices: vec![],
                correct: None,
                explanation: None,
            },
        ]
    }

    fn published_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .write_as(CONFIG_FILE, &ExamConfig { published: true })
            .unwrap();
        let bank: QuestionBank = HashMap::from([(
            "exam1".to_string(),
            ExamEntry {
                questions: sample_questions(),
            },
        )]);
        store.write_as(QUESTIONS_FILE, &bank).unwrap();
        store
    }

    #[test]
    fn unpublished_exam_is_rejected_before_any_state_exists() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_as(CONFIG_FILE, &ExamConfig { published: false })
            .unwrap();
        assert!(matches!(
            ExamSession::load(&store, &student(), "exam1"),
            Err(Error::NotPublished)
        ));
        // missing config counts as unpublished too
        let bare = Store::open_in_memory().unwrap();
        assert!(matches!(
            ExamSession::load(&bare, &student(), "exam1"),
            Err(Error::NotPublished)
        ));
        // no answer map was created either way
        assert!(store
            .read_user("budi@mail.com", "answers_exam1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_or_empty_bank_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_as(CONFIG_FILE, &ExamConfig { published: true })
            .unwrap();
        assert!(matches!(
            ExamSession::load(&store, &student(), "exam1"),
            Err(Error::EmptyBank(_))
        ));

        let bank: QuestionBank =
            HashMap::from([("exam1".to_string(), ExamEntry { questions: vec![] })]);
        store.write_as(QUESTIONS_FILE, &bank).unwrap();
        assert!(matches!(
            ExamSession::load(&store, &student(), "exam1"),
            Err(Error::EmptyBank(_))
        ));
    }

    #[test]
    fn navigator_clamps_at_both_ends_and_jumps_exactly() {
        let mut nav = Navigator::new(3);
        assert_eq!(nav.current(), 0);
        assert_eq!(nav.prev(), 0);
        assert_eq!(nav.next(), 1);
        assert_eq!(nav.next(), 2);
        assert_eq!(nav.next(), 2);
        assert!(nav.jump_to(0));
        assert_eq!(nav.current(), 0);
        assert!(!nav.jump_to(3));
        assert_eq!(nav.current(), 0);
    }

    #[test]
    fn set_answer_validates_shape_and_keeps_prior_value() {
        let store = published_store();
        let mut exam = ExamSession::load(&store, &student(), "exam1").unwrap();

        exam.set_answer("q1", Answer::Single(2)).unwrap();
        // a multiple-shaped value on a single question is a contract violation
        assert!(matches!(
            exam.set_answer("q1", Answer::Multiple(vec![0, 1])),
            Err(Error::InvalidAnswerShape { .. })
        ));
        assert_eq!(exam.answer("q1"), Some(&Answer::Single(2)));

        // out of range
        assert!(exam.set_answer("q1", Answer::Single(3)).is_err());
        // duplicate indices
        assert!(exam
            .set_answer("q2", Answer::Multiple(vec![0, 0]))
            .is_err());
        // empty set is a valid answer
        exam.set_answer("q2", Answer::Multiple(vec![])).unwrap();
        // essay text is trimmed
        exam.set_answer("q3", Answer::Essay("  jawaban  ".into()))
            .unwrap();
        assert_eq!(exam.answer("q3"), Some(&Answer::Essay("jawaban".into())));

        assert!(matches!(
            exam.set_answer("q9", Answer::Single(0)),
            Err(Error::UnknownQuestion(_))
        ));
    }

    #[test]
    fn autosave_is_write_through_and_idempotent() {
        let store = published_store();
        let mut exam = ExamSession::load(&store, &student(), "exam1").unwrap();
        exam.set_answer("q1", Answer::Single(1)).unwrap();
        let first = store.read_user("budi@mail.com", "answers_exam1").unwrap();
        exam.set_answer("q1", Answer::Single(1)).unwrap();
        let second = store.read_user("budi@mail.com", "answers_exam1").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Some(json!({"q1": 1})));
    }

    #[test]
    fn failed_autosave_keeps_the_in_memory_answer() {
        let path = std::env::temp_dir().join(format!(
            "{}.db",
            crate::libujian::util::generate_id("ujianonline-test")
        ));
        let store = Store::create_or_open(&path).unwrap();
        store
            .write_as(CONFIG_FILE, &ExamConfig { published: true })
            .unwrap();
        let bank: QuestionBank = HashMap::from([(
            "exam1".to_string(),
            ExamEntry {
                questions: sample_questions(),
            },
        )]);
        store.write_as(QUESTIONS_FILE, &bank).unwrap();

        let mut exam = ExamSession::load(&store, &student(), "exam1").unwrap();

        // break the store underneath the running session
        let saboteur = rusqlite::Connection::open(&path).unwrap();
        saboteur.execute("DROP TABLE Entry", ()).unwrap();

        assert!(matches!(
            exam.set_answer("q1", Answer::Single(1)),
            Err(Error::Persistence(_))
        ));
        // the in-memory map stays the source of truth
        assert_eq!(exam.answer("q1"), Some(&Answer::Single(1)));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn answers_survive_a_reload_and_navigator_does_not() {
        let store = published_store();
        let mut exam = ExamSession::load(&store, &student(), "exam1").unwrap();
        exam.set_answer("q1", Answer::Single(1)).unwrap();
        exam.set_answer("q2", Answer::Multiple(vec![2, 0])).unwrap();
        exam.set_answer("q3", Answer::Essay("jawaban".into())).unwrap();
        exam.navigator.jump_to(2);

        let reloaded = ExamSession::load(&store, &student(), "exam1").unwrap();
        assert_eq!(reloaded.answer("q1"), Some(&Answer::Single(1)));
        assert_eq!(reloaded.answer("q2"), Some(&Answer::Multiple(vec![2, 0])));
        assert_eq!(reloaded.answer("q3"), Some(&Answer::Essay("jawaban".into())));
        assert_eq!(reloaded.navigator.current(), 0);
    }

    #[test]
    fn malformed_saved_state_degrades_to_an_empty_map() {
        let store = published_store();
        store
            .write_user("budi@mail.com", "answers_exam1", &json!({"q1": {"bad": true}}))
            .unwrap();
        let exam = ExamSession::load(&store, &student(), "exam1").unwrap();
        assert_eq!(exam.answered_count(), 0);
    }

    #[test]
    fn submit_grades_appends_and_reports_the_scenario_score() {
        let store = published_store();
        let mut exam = ExamSession::load(&store, &student(), "exam1").unwrap();
        exam.set_answer("q1", Answer::Single(1)).unwrap();
        exam.set_answer("q2", Answer::Multiple(vec![2, 0])).unwrap();
        exam.set_answer("q3", Answer::Essay("answer text".into())).unwrap();

        let result = exam.submit().unwrap();
        assert_eq!(result.score, 67);

        let stored = results::all(&store).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].score, 67);

        // answers were superseded, not deleted
        assert!(store
            .read_user("budi@mail.com", "answers_exam1")
            .unwrap()
            .is_some());
    }

    #[test]
    fn submit_detects_a_bank_edited_mid_attempt() {
        let store = published_store();
        let mut exam = ExamSession::load(&store, &student(), "exam1").unwrap();
        exam.set_answer("q1", Answer::Single(1)).unwrap();

        let mut questions = sample_questions();
        questions[0].text = "edited mid-attempt".into();
        let bank: QuestionBank =
            HashMap::from([("exam1".to_string(), ExamEntry { questions })]);
        store.write_as(QUESTIONS_FILE, &bank).unwrap();

        assert!(matches!(exam.submit(), Err(Error::StaleQuestionSet)));
        assert!(results::all(&store).unwrap().is_empty());
    }
}
