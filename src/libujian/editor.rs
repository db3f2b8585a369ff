use chrono::Local;
use log::info;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::libujian::auth::USERS_FILE;
use crate::libujian::error::Error;
use crate::libujian::exam::{ExamConfig, ExamEntry, QuestionBank, CONFIG_FILE, QUESTIONS_FILE};
use crate::libujian::question::Question;
use crate::libujian::results::RESULTS_FILE;
use crate::libujian::store::{export_json, Store};

pub fn load_bank(store: &Store) -> Result<QuestionBank, Error> {
    Ok(store.read_as(QUESTIONS_FILE)?.unwrap_or_default())
}

pub fn save_bank(store: &Store, bank: &QuestionBank) -> Result<(), Error> {
    store.write_as(QUESTIONS_FILE, bank)
}

pub fn publish(store: &Store) -> Result<(), Error> {
    store.write_as(CONFIG_FILE, &ExamConfig { published: true })?;
    info!("[Editor] Exam published");
    Ok(())
}

pub fn unpublish(store: &Store) -> Result<(), Error> {
    store.write_as(CONFIG_FILE, &ExamConfig { published: false })?;
    info!("[Editor] Exam unpublished");
    Ok(())
}

pub fn add_question(store: &Store, exam_id: &str, question: Question) -> Result<(), Error> {
    question.validate()?;
    let mut bank = load_bank(store)?;
    bank.entry(exam_id.to_string())
        .or_insert_with(ExamEntry::default)
        .questions
        .push(question);
    save_bank(store, &bank)
}

pub fn edit_question_text(
    store: &Store,
    exam_id: &str,
    question_id: &str,
    new_text: &str,
) -> Result<(), Error> {
    if new_text.trim().is_empty() {
        return Err(Error::InvalidQuestion("question text cannot be empty".into()));
    }
    let mut bank = load_bank(store)?;
    let entry = bank
        .get_mut(exam_id)
        .ok_or_else(|| Error::EmptyBank(exam_id.to_string()))?;
    let question = entry
        .questions
        .iter_mut()
        .find(|q| q.id == question_id)
        .ok_or_else(|| Error::UnknownQuestion(question_id.to_string()))?;
    question.text = new_text.to_string();
    save_bank(store, &bank)
}

/// Deletes one question. Existing results referencing it are kept, as the
/// original warns its admin.
pub fn delete_question(store: &Store, exam_id: &str, question_id: &str) -> Result<bool, Error> {
    let mut bank = load_bank(store)?;
    let Some(entry) = bank.get_mut(exam_id) else {
        return Ok(false);
    };
    let before = entry.questions.len();
    entry.questions.retain(|q| q.id != question_id);
    let removed = entry.questions.len() < before;
    if removed {
        save_bank(store, &bank)?;
        info!("[Editor] Deleted question '{}'", question_id);
    }
    Ok(removed)
}

/// Replaces the exam's question set with a validated batch. Any malformed
/// record rejects the whole upload.
pub fn batch_upload(
    store: &Store,
    exam_id: &str,
    questions: Vec<Question>,
) -> Result<usize, Error> {
    for question in &questions {
        question.validate()?;
    }
    let count = questions.len();
    let mut bank = load_bank(store)?;
    bank.insert(exam_id.to_string(), ExamEntry { questions });
    save_bank(store, &bank)?;
    info!("[Editor] Uploaded {} questions for '{}'", count, exam_id);
    Ok(count)
}

fn today() -> String {
    Local::now().format("%Y%m%d").to_string()
}

pub fn export_questions(store: &Store, dir: &Path) -> Result<PathBuf, Error> {
    let bank = load_bank(store)?;
    let path = dir.join(format!("questions-backup-{}.json", today()));
    export_json(&path, &serde_json::to_value(&bank)?)?;
    Ok(path)
}

/// Full backup: users, question bank, and the results collection.
pub fn export_all(store: &Store, dir: &Path) -> Result<PathBuf, Error> {
    let backup = json!({
        "users": store.read(USERS_FILE)?.unwrap_or_else(|| json!([])),
        "questions": store.read(QUESTIONS_FILE)?.unwrap_or_else(|| json!({})),
        "examResults": store.read(RESULTS_FILE)?.unwrap_or_else(|| json!([])),
    });
    let path = dir.join(format!("backup-{}.json", today()));
    export_json(&path, &backup)?;
    Ok(path)
}
