pub mod account;
pub mod auth;
pub mod editor;
pub mod error;
pub mod exam;
pub mod grading;
pub mod question;
pub mod results;
pub mod store;
pub mod util;
