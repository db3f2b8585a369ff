use log::{debug, error, info, warn};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::libujian::error::Error;

/// Every row in the store carries this prefix, so unrelated rows in a shared
/// database file are left alone by `clear_all`.
pub const STORAGE_PREFIX: &str = "ujianonline_";

/// Key/value persistence facade: string keys, JSON values, one SQLite table.
///
/// Records that exist as files in the seed directory (`questions.json`,
/// `exam-config.json`, ...) are pulled in transparently the first time they
/// are read and cached from then on.
pub struct Store {
    conn: Connection,
    seed_dir: Option<PathBuf>,
}

impl Store {
    pub fn create_or_open(src: &Path) -> Result<Store, Error> {
        let conn = if src.exists() {
            info!("[Store] Opening existing database");
            open_db(src)?
        } else {
            info!("[Store] Creating new database");
            create_db(src)?
        };
        Ok(Store {
            conn,
            seed_dir: None,
        })
    }

    pub fn open_in_memory() -> Result<Store, Error> {
        let conn = init_db(Connection::open_in_memory()?)?;
        Ok(Store {
            conn,
            seed_dir: None,
        })
    }

    /// Directory holding the static seed JSON files.
    pub fn with_seed_dir(mut self, dir: PathBuf) -> Store {
        self.seed_dir = Some(dir);
        self
    }

    pub fn close(self) -> Result<(), Error> {
        Ok(close_db(self.conn)?)
    }

    /// Full key for a per-user record, e.g. `ujianonline_a@b.com_answers_exam1`.
    pub fn user_key(email: &str, suffix: &str) -> String {
        format!("{}{}_{}", STORAGE_PREFIX, email, suffix)
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, Error> {
        let mut statement = self
            .conn
            .prepare("SELECT value FROM Entry WHERE key = :key LIMIT 1")?;
        let row: Option<String> = statement
            .query_row(&[(":key", key)], |row| row.get(0))
            .optional()?;
        match row {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn set_raw(&self, key: &str, value: &Value) -> Result<(), Error> {
        let text = serde_json::to_string(value)?;
        match self.conn.execute(
            "INSERT INTO Entry(key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, text],
        ) {
            Ok(_) => {
                debug!("[Store] Wrote '{}' ({} bytes)", key, text.len());
                Ok(())
            }
            Err(err) => {
                error!("[Store] Error while writing '{}': {:?}", key, err);
                Err(err.into())
            }
        }
    }

    fn remove_raw(&self, key: &str) -> Result<(), Error> {
        self.conn
            .execute("DELETE FROM Entry WHERE key = ?1", params![key])?;
        debug!("[Store] Removed '{}'", key);
        Ok(())
    }

    /// Cached value for a shared record, falling back to the seed file on the
    /// first read. A record that exists nowhere is `Ok(None)`, not an error.
    pub fn read(&self, name: &str) -> Result<Option<Value>, Error> {
        let key = format!("{}{}", STORAGE_PREFIX, name);
        if let Some(value) = self.get_raw(&key)? {
            return Ok(Some(value));
        }
        if let Some(dir) = &self.seed_dir {
            let path = dir.join(name);
            if path.exists() {
                info!("[Store] Seeding '{}' from {:?}", name, path);
                let text = fs::read_to_string(&path)?;
                let value: Value = serde_json::from_str(&text)?;
                self.set_raw(&key, &value)?;
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    pub fn write(&self, name: &str, value: &Value) -> Result<(), Error> {
        self.set_raw(&format!("{}{}", STORAGE_PREFIX, name), value)
    }

    pub fn remove(&self, name: &str) -> Result<(), Error> {
        self.remove_raw(&format!("{}{}", STORAGE_PREFIX, name))
    }

    pub fn read_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, Error> {
        match self.read(name)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn write_as<T: Serialize>(&self, name: &str, value: &T) -> Result<(), Error> {
        self.write(name, &serde_json::to_value(value)?)
    }

    /// Per-user records never seed from files; absence means "no saved state".
    pub fn read_user(&self, email: &str, suffix: &str) -> Result<Option<Value>, Error> {
        self.get_raw(&Self::user_key(email, suffix))
    }

    pub fn write_user(&self, email: &str, suffix: &str, value: &Value) -> Result<(), Error> {
        self.set_raw(&Self::user_key(email, suffix), value)
    }

    pub fn delete_user(&self, email: &str, suffix: &str) -> Result<(), Error> {
        self.remove_raw(&Self::user_key(email, suffix))
    }

    /// Drops every record belonging to one user (their answer maps and the
    /// like), used when an account is deleted.
    pub fn purge_user(&self, email: &str) -> Result<usize, Error> {
        let pattern = format!("{}{}_%", STORAGE_PREFIX, email);
        let removed = self
            .conn
            .execute("DELETE FROM Entry WHERE key LIKE ?1", params![pattern])?;
        info!("[Store] Purged {} records for '{}'", removed, email);
        Ok(removed)
    }

    /// Removes every prefixed record. Meant for testing/QA resets.
    pub fn clear_all(&self) -> Result<usize, Error> {
        let pattern = format!("{}%", STORAGE_PREFIX);
        let removed = self
            .conn
            .execute("DELETE FROM Entry WHERE key LIKE ?1", params![pattern])?;
        info!("[Store] Cleared {} records", removed);
        Ok(removed)
    }
}

/// Pretty-printed JSON backup file, the replacement for the browser's
/// download-a-blob export.
pub fn export_json(path: &Path, value: &Value) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    info!("[Store] Exported {:?}", path);
    Ok(())
}

fn create_db(dest: &Path) -> rusqlite::Result<Connection> {
    let now = Instant::now();
    let db = init_db(Connection::open_in_memory()?)?;
    match db.backup(DatabaseName::Main, dest, None) {
        Ok(_) => {
            debug!(
                "[Store] Creating and saving took {} ms.",
                now.elapsed().as_millis()
            );
            close_db(db)?;
            open_db(dest)
        }
        Err(err) => {
            warn!("Failed to create database file: {}", err);
            close_db(db)?;
            Err(err)
        }
    }
}

fn open_db(src: &Path) -> rusqlite::Result<Connection> {
    let now = Instant::now();
    let db = Connection::open(src)?;
    debug!("[Store] Opening took {} ms.", now.elapsed().as_millis());
    Ok(db)
}

fn close_db(connection: Connection) -> rusqlite::Result<()> {
    info!("[Store] Closing database");
    match connection.close() {
        Ok(_) => Ok(()),
        Err((conn, _)) => {
            error!("[Store] Cannot close connection. Retrying 1/2...");
            match conn.close() {
                Ok(_) => Ok(()),
                Err((conn2, _)) => {
                    error!("[Store] Cannot close connection. Retrying 2/2...");
                    conn2.close().map_err(|(_, err)| err)
                }
            }
        }
    }
}

fn init_db(conn: Connection) -> rusqlite::Result<Connection> {
    info!("[Store INIT] Creating tables");
    conn.execute(
        "CREATE TABLE IF NOT EXISTS Entry (
              key TEXT NOT NULL PRIMARY KEY,
              value TEXT NOT NULL
            )",
        (),
    )?;
    info!("[Store INIT] Created table Entry");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libujian::util::generate_id;
    use serde_json::json;

    #[test]
    fn write_then_read_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let value = json!({"published": true});
        store.write("exam-config.json", &value).unwrap();
        assert_eq!(store.read("exam-config.json").unwrap(), Some(value));
    }

    #[test]
    fn missing_record_is_none_not_error() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.read("nothing-here.json").unwrap(), None);
    }

    #[test]
    fn rewrite_replaces_the_whole_value() {
        let store = Store::open_in_memory().unwrap();
        store.write("users.json", &json!([1, 2, 3])).unwrap();
        store.write("users.json", &json!([4])).unwrap();
        assert_eq!(store.read("users.json").unwrap(), Some(json!([4])));
    }

    #[test]
    fn user_keys_are_namespaced_per_user() {
        let store = Store::open_in_memory().unwrap();
        store
            .write_user("a@b.com", "answers_exam1", &json!({"q1": 1}))
            .unwrap();
        assert_eq!(
            store.read_user("a@b.com", "answers_exam1").unwrap(),
            Some(json!({"q1": 1}))
        );
        assert_eq!(store.read_user("c@d.com", "answers_exam1").unwrap(), None);
        assert_eq!(
            Store::user_key("a@b.com", "answers_exam1"),
            "ujianonline_a@b.com_answers_exam1"
        );
    }

    #[test]
    fn purge_user_leaves_other_users_alone() {
        let store = Store::open_in_memory().unwrap();
        store.write_user("a@b.com", "answers_exam1", &json!(1)).unwrap();
        store.write_user("a@b.com", "answers_exam2", &json!(2)).unwrap();
        store.write_user("c@d.com", "answers_exam1", &json!(3)).unwrap();
        assert_eq!(store.purge_user("a@b.com").unwrap(), 2);
        assert_eq!(store.read_user("a@b.com", "answers_exam1").unwrap(), None);
        assert_eq!(
            store.read_user("c@d.com", "answers_exam1").unwrap(),
            Some(json!(3))
        );
    }

    #[test]
    fn clear_all_empties_the_namespace() {
        let store = Store::open_in_memory().unwrap();
        store.write("users.json", &json!([])).unwrap();
        store.write_user("a@b.com", "answers_exam1", &json!(1)).unwrap();
        assert_eq!(store.clear_all().unwrap(), 2);
        assert_eq!(store.read("users.json").unwrap(), None);
    }

    #[test]
    fn first_read_seeds_from_file_and_caches() {
        let dir = std::env::temp_dir().join(generate_id("ujianonline-test"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("exam-config.json"), r#"{"published": true}"#).unwrap();

        let store = Store::open_in_memory().unwrap().with_seed_dir(dir.clone());
        assert_eq!(
            store.read("exam-config.json").unwrap(),
            Some(json!({"published": true}))
        );

        // cached copy wins over a later change to the seed file
        fs::write(dir.join("exam-config.json"), r#"{"published": false}"#).unwrap();
        assert_eq!(
            store.read("exam-config.json").unwrap(),
            Some(json!({"published": true}))
        );

        fs::remove_dir_all(&dir).ok();
    }
}
