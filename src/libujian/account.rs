use log::info;

use crate::libujian::auth::{current_session, sha256_hex, Session, User, SESSION_KEY, USERS_FILE};
use crate::libujian::error::Error;
use crate::libujian::store::Store;

/// Updates the logged-in user's profile. Either field may be left as-is by
/// passing `None`; a new password is re-hashed.
pub fn update(
    store: &Store,
    session: &Session,
    name: Option<&str>,
    password: Option<&str>,
) -> Result<Session, Error> {
    let mut users: Vec<User> = store.read_as(USERS_FILE)?.unwrap_or_default();
    let user = users
        .iter_mut()
        .find(|u| u.email == session.email)
        .ok_or_else(|| Error::UnknownUser(session.email.clone()))?;

    if let Some(name) = name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("name cannot be empty".into()));
        }
        user.name = name.to_string();
    }
    if let Some(password) = password {
        if password.len() < 6 {
            return Err(Error::WeakPassword);
        }
        user.password_hash = sha256_hex(password);
    }

    let updated = Session {
        role: session.role,
        email: session.email.clone(),
        name: user.name.clone(),
    };
    store.write_as(USERS_FILE, &users)?;
    store.write_as(SESSION_KEY, &updated)?;
    info!("[Account] Updated profile for '{}'", session.email);
    Ok(updated)
}

/// Removes the account, every record namespaced to it (saved answer maps),
/// and the active session if it belongs to this user. Past attempt results
/// stay in the collection.
pub fn delete(store: &Store, email: &str) -> Result<(), Error> {
    let mut users: Vec<User> = store.read_as(USERS_FILE)?.unwrap_or_default();
    let before = users.len();
    users.retain(|u| u.email != email);
    if users.len() == before {
        return Err(Error::UnknownUser(email.to_string()));
    }
    store.write_as(USERS_FILE, &users)?;
    store.purge_user(email)?;

    if let Some(session) = current_session(store)? {
        if session.email == email {
            store.remove(SESSION_KEY)?;
        }
    }
    info!("[Account] Deleted account '{}'", email);
    Ok(())
}
