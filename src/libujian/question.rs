use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::libujian::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Single,
    Multiple,
    Essay,
}

/// Declared correct answer: a bare index for single-choice, an index list for
/// multiple-choice (JSON: number vs. array). Essays carry none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Single(usize),
    Multiple(Vec<usize>),
}

impl CorrectAnswer {
    pub fn index_set(&self) -> BTreeSet<usize> {
        match self {
            CorrectAnswer::Single(i) => BTreeSet::from([*i]),
            CorrectAnswer::Multiple(v) => v.iter().copied().collect(),
        }
    }
}

/// A stored answer value. The JSON shape follows the question type: a number
/// for single, an index array for multiple, free text for essay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Single(usize),
    Multiple(Vec<usize>),
    Essay(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub correct: String,
    pub incorrect: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<CorrectAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

impl Question {
    /// Shape check owned by the editor surface: the type determines what
    /// `correct` must look like. The grading engine assumes this has passed.
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidQuestion("missing id".into()));
        }
        if self.text.trim().is_empty() {
            return Err(Error::InvalidQuestion(format!(
                "question '{}' has no text",
                self.id
            )));
        }
        match self.kind {
            QuestionType::Single => {
                if self.choices.is_empty() {
                    return Err(Error::InvalidQuestion(format!(
                        "single-choice question '{}' has no choices",
                        self.id
                    )));
                }
                match &self.correct {
                    Some(CorrectAnswer::Single(i)) if *i < self.choices.len() => Ok(()),
                    Some(CorrectAnswer::Single(_)) => Err(Error::InvalidQuestion(format!(
                        "question '{}' points at a choice that does not exist",
                        self.id
                    ))),
                    _ => Err(Error::InvalidQuestion(format!(
                        "single-choice question '{}' needs one correct index",
                        self.id
                    ))),
                }
            }
            QuestionType::Multiple => {
                if self.choices.is_empty() {
                    return Err(Error::InvalidQuestion(format!(
                        "multiple-choice question '{}' has no choices",
                        self.id
                    )));
                }
                match &self.correct {
                    Some(CorrectAnswer::Multiple(indices)) => {
                        let distinct: BTreeSet<usize> = indices.iter().copied().collect();
                        if distinct.len() != indices.len() {
                            return Err(Error::InvalidQuestion(format!(
                                "question '{}' repeats a correct index",
                                self.id
                            )));
                        }
                        if indices.iter().any(|i| *i >= self.choices.len()) {
                            return Err(Error::InvalidQuestion(format!(
                                "question '{}' points at a choice that does not exist",
                                self.id
                            )));
                        }
                        Ok(())
                    }
                    _ => Err(Error::InvalidQuestion(format!(
                        "multiple-choice question '{}' needs a correct index list",
                        self.id
                    ))),
                }
            }
            QuestionType::Essay => match self.correct {
                None => Ok(()),
                Some(_) => Err(Error::InvalidQuestion(format!(
                    "essay question '{}' must not declare a correct answer",
                    self.id
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(id: &str, correct: usize) -> Question {
        Question {
            id: id.into(),
            kind: QuestionType::Single,
            text: "pick one".into(),
            media: None,
            choices: vec!["a".into(), "b".into(), "c".into()],
            correct: Some(CorrectAnswer::Single(correct)),
            explanation: None,
        }
    }

    #[test]
    fn question_json_shape_matches_the_stored_records() {
        let q: Question = serde_json::from_value(json!({
            "id": "q1",
            "type": "single",
            "text": "Ibukota Indonesia?",
            "choices": ["Jakarta", "Bandung"],
            "correct": 0,
            "explanation": {"correct": "ya", "incorrect": "bukan"}
        }))
        .unwrap();
        assert_eq!(q.kind, QuestionType::Single);
        assert_eq!(q.correct, Some(CorrectAnswer::Single(0)));

        let q: Question = serde_json::from_value(json!({
            "id": "q2",
            "type": "multiple",
            "text": "which ones?",
            "choices": ["a", "b", "c"],
            "correct": [0, 2]
        }))
        .unwrap();
        assert_eq!(q.correct, Some(CorrectAnswer::Multiple(vec![0, 2])));

        let q: Question = serde_json::from_value(json!({
            "id": "q3",
            "type": "essay",
            "text": "explain"
        }))
        .unwrap();
        assert_eq!(q.kind, QuestionType::Essay);
        assert_eq!(q.correct, None);
    }

    #[test]
    fn answer_json_is_number_array_or_string() {
        assert_eq!(
            serde_json::from_value::<Answer>(json!(1)).unwrap(),
            Answer::Single(1)
        );
        assert_eq!(
            serde_json::from_value::<Answer>(json!([2, 0])).unwrap(),
            Answer::Multiple(vec![2, 0])
        );
        assert_eq!(
            serde_json::from_value::<Answer>(json!("jawaban")).unwrap(),
            Answer::Essay("jawaban".into())
        );
        assert_eq!(serde_json::to_value(Answer::Single(1)).unwrap(), json!(1));
    }

    #[test]
    fn validate_accepts_well_formed_questions() {
        assert!(single("q1", 2).validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_and_mismatched_correct() {
        assert!(single("q1", 3).validate().is_err());

        let mut q = single("q1", 0);
        q.correct = Some(CorrectAnswer::Multiple(vec![0]));
        assert!(q.validate().is_err());

        let mut q = single("q2", 0);
        q.kind = QuestionType::Essay;
        assert!(q.validate().is_err());

        let mut q = single("q3", 0);
        q.kind = QuestionType::Multiple;
        q.correct = Some(CorrectAnswer::Multiple(vec![0, 0]));
        assert!(q.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_id_or_text() {
        let mut q = single("", 0);
        assert!(q.validate().is_err());
        q.id = "q1".into();
        q.text = "  ".into();
        assert!(q.validate().is_err());
    }

    #[test]
    fn correct_index_set_is_order_independent() {
        assert_eq!(
            CorrectAnswer::Multiple(vec![2, 0]).index_set(),
            CorrectAnswer::Multiple(vec![0, 2]).index_set()
        );
        assert_eq!(CorrectAnswer::Single(1).index_set(), BTreeSet::from([1]));
    }
}
