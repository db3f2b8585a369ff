use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

use crate::libujian::error::Error;
use crate::libujian::store::Store;

pub const USERS_FILE: &str = "users.json";
pub const ADMIN_FILE: &str = "admin-config.json";
pub const SESSION_KEY: &str = "currentSession";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub email: String,
    #[serde(rename = "passwordHash")]
    pub password_hash: String,
}

/// The single admin account, provisioned via the seeded `admin-config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    #[serde(rename = "passwordHash")]
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub role: Role,
    pub email: String,
    pub name: String,
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.com$").expect("hardcoded pattern"))
}

fn load_users(store: &Store) -> Result<Vec<User>, Error> {
    Ok(store.read_as(USERS_FILE)?.unwrap_or_default())
}

pub fn register(store: &Store, name: &str, email: &str, password: &str) -> Result<(), Error> {
    let email = email.trim();
    if !email_pattern().is_match(email) {
        return Err(Error::InvalidEmail);
    }
    if password.len() < 6 {
        return Err(Error::WeakPassword);
    }

    let mut users = load_users(store)?;
    if users.iter().any(|u| u.email == email) {
        return Err(Error::EmailTaken);
    }

    users.push(User {
        name: name.trim().to_string(),
        email: email.to_string(),
        password_hash: sha256_hex(password),
    });
    store.write_as(USERS_FILE, &users)?;
    info!("[Auth] Registered '{}'", email);
    Ok(())
}

/// The admin account is checked before the student list, so an admin whose
/// username collides with a student e-mail always logs in as admin.
pub fn login(store: &Store, email: &str, password: &str) -> Result<Session, Error> {
    let email = email.trim();
    let hash = sha256_hex(password);

    if let Some(admin) = store.read_as::<AdminConfig>(ADMIN_FILE)? {
        if admin.username == email && admin.password_hash == hash {
            let session = Session {
                role: Role::Admin,
                email: email.to_string(),
                name: "Administrator".to_string(),
            };
            store.write_as(SESSION_KEY, &session)?;
            info!("[Auth] Admin login for '{}'", email);
            return Ok(session);
        }
    }

    let users = load_users(store)?;
    match users
        .iter()
        .find(|u| u.email == email && u.password_hash == hash)
    {
        Some(user) => {
            let session = Session {
                role: Role::Student,
                email: user.email.clone(),
                name: user.name.clone(),
            };
            store.write_as(SESSION_KEY, &session)?;
            info!("[Auth] Login for '{}'", email);
            Ok(session)
        }
        None => {
            warn!("[Auth] Failed login attempt for '{}'", email);
            Err(Error::BadCredentials)
        }
    }
}

pub fn logout(store: &Store) -> Result<(), Error> {
    store.remove(SESSION_KEY)
}

pub fn current_session(store: &Store) -> Result<Option<Session>, Error> {
    match store.read(SESSION_KEY)? {
        Some(value) => match serde_json::from_value(value) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!("[Auth] Discarding malformed session record: {}", err);
                store.remove(SESSION_KEY)?;
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Role guard: the caller gets a session or a reason to bounce to login.
pub fn require_role(store: &Store, role: Role) -> Result<Session, Error> {
    let session = current_session(store)?.ok_or(Error::NotLoggedIn)?;
    if session.role != role {
        debug!(
            "[Auth] '{}' is {}, needs {}",
            session.email, session.role, role
        );
        return Err(Error::AccessDenied {
            required: role.as_str(),
        });
    }
    Ok(session)
}
