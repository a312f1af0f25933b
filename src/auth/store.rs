//! SQLite-backed credential store.
//!
//! Tables:
//! - `users`: id, username (unique), password_hash, salt, created_at
//!
//! The connection sits behind a single mutex. Registration and login both
//! hold it for their whole hash/verify + query sequence, see [`StoreGuard`].

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use super::hasher::Salt;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    salt BLOB NOT NULL,
    created_at INTEGER NOT NULL
);";

const INSERT_USER: &str =
    "INSERT INTO users (username, password_hash, salt, created_at) VALUES (?1, ?2, ?3, ?4)";

const SELECT_USER: &str =
    "SELECT id, username, password_hash, salt, created_at FROM users WHERE username = ?1";

/// A stored account row.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub salt: Salt,
    pub created_at: i64,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("username has been taken")]
    DuplicateUsername,

    #[error("account not found")]
    NotFound,

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("stored salt for '{0}' is corrupt")]
    CorruptSalt(String),
}

#[derive(Debug)]
pub struct CredentialStore {
    conn: Mutex<Connection>,
}

impl CredentialStore {
    /// Open (or create) the credential database at `db_path`.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the store lock. Held across hashing by the registrar and
    /// across verification by the authenticator.
    pub fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            conn: self.conn.lock(),
        }
    }

    pub fn account_count(&self) -> Result<u64, AccountError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Exclusive access to the credential connection.
pub struct StoreGuard<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl StoreGuard<'_> {
    /// Insert a new account inside a transaction. Returns the row id.
    pub fn create_account(
        &mut self,
        username: &str,
        password_hash: &str,
        salt: &Salt,
    ) -> Result<i64, AccountError> {
        let tx = self.conn.transaction()?;
        let inserted = {
            let mut stmt = tx.prepare_cached(INSERT_USER)?;
            stmt.execute(params![username, password_hash, &salt[..], epoch_secs()])
        };

        match inserted {
            Ok(_) => {
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(id)
            }
            // Dropping `tx` rolls back.
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(AccountError::DuplicateUsername)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Exact-match lookup by username.
    pub fn find_account(&self, username: &str) -> Result<Account, AccountError> {
        let mut stmt = self.conn.prepare_cached(SELECT_USER)?;
        let row = stmt
            .query_row(params![username], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .optional()?;

        let (id, username, password_hash, salt, created_at) = row.ok_or(AccountError::NotFound)?;
        let salt: Salt = salt
            .try_into()
            .map_err(|_| AccountError::CorruptSalt(username.clone()))?;

        Ok(Account {
            id,
            username,
            password_hash,
            salt,
            created_at,
        })
    }
}

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hasher::SALT_BYTES;
    use tempfile::TempDir;

    fn salt(n: u8) -> Salt {
        [n; SALT_BYTES]
    }

    #[test]
    fn create_then_find() {
        let store = CredentialStore::open_in_memory().unwrap();
        let id = store.lock().create_account("alice_smith", "$2b$04$hash", &salt(7)).unwrap();

        let account = store.lock().find_account("alice_smith").unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.username, "alice_smith");
        assert_eq!(account.password_hash, "$2b$04$hash");
        assert_eq!(account.salt, salt(7));
        assert!(account.created_at > 0);
    }

    #[test]
    fn duplicate_username_is_rejected_and_original_row_kept() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.lock().create_account("alice_smith", "first", &salt(1)).unwrap();

        let err = store
            .lock()
            .create_account("alice_smith", "second", &salt(2))
            .unwrap_err();
        assert!(matches!(err, AccountError::DuplicateUsername));
        assert_eq!(err.to_string(), "username has been taken");

        let account = store.lock().find_account("alice_smith").unwrap();
        assert_eq!(account.password_hash, "first");
        assert_eq!(store.account_count().unwrap(), 1);
    }

    #[test]
    fn missing_account_is_not_found() {
        let store = CredentialStore::open_in_memory().unwrap();
        assert!(matches!(
            store.lock().find_account("nobody_here"),
            Err(AccountError::NotFound)
        ));
    }

    #[test]
    fn lookup_is_parameterized() {
        let store = CredentialStore::open_in_memory().unwrap();
        store.lock().create_account("alice_smith", "h", &salt(1)).unwrap();

        assert!(matches!(
            store.lock().find_account("' OR '1'='1"),
            Err(AccountError::NotFound)
        ));
        // The hostile name is stored verbatim, not interpreted.
        store.lock().create_account("x'); DROP TABLE users;--", "h", &salt(2)).unwrap();
        assert_eq!(store.account_count().unwrap(), 2);
    }

    #[test]
    fn ids_are_assigned_increasing() {
        let store = CredentialStore::open_in_memory().unwrap();
        let a = store.lock().create_account("first_user", "h", &salt(1)).unwrap();
        let b = store.lock().create_account("second_user", "h", &salt(2)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("phi.db");
        {
            let store = CredentialStore::open(&path).unwrap();
            store.lock().create_account("persistent", "h", &salt(3)).unwrap();
        }
        let store = CredentialStore::open(&path).unwrap();
        assert_eq!(store.lock().find_account("persistent").unwrap().salt, salt(3));
    }
}
