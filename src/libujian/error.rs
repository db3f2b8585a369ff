use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("exam has not been published by the admin")]
    NotPublished,
    #[error("question bank for exam '{0}' is missing or empty")]
    EmptyBank(String),
    #[error("the question bank changed while the attempt was in progress")]
    StaleQuestionSet,
    #[error("answer shape does not match the type of question '{question}'")]
    InvalidAnswerShape { question: String },
    #[error("no question with id '{0}' in this exam")]
    UnknownQuestion(String),
    #[error("invalid question: {0}")]
    InvalidQuestion(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("email is already registered")]
    EmailTaken,
    #[error("use a valid .com email address")]
    InvalidEmail,
    #[error("password must be at least 6 characters")]
    WeakPassword,
    #[error("wrong email or password")]
    BadCredentials,
    #[error("no account registered for '{0}'")]
    UnknownUser(String),
    #[error("not logged in")]
    NotLoggedIn,
    #[error("access denied: {required} role required")]
    AccessDenied { required: &'static str },
    #[error("storage failure: {0}")]
    Persistence(#[from] rusqlite::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read or write file: {0}")]
    Io(#[from] std::io::Error),
}
