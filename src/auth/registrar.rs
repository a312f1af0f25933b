//! Account registration.

use std::sync::Arc;
use thiserror::Error;

use super::hasher::{HashError, PasswordHasher};
use super::store::{AccountError, CredentialStore};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("username has been taken")]
    DuplicateUsername,

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(#[source] AccountError),

    #[error("could not hash password: {0}")]
    Hashing(#[from] HashError),
}

impl From<AccountError> for RegistrationError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::DuplicateUsername => Self::DuplicateUsername,
            other => Self::StoreUnavailable(other),
        }
    }
}

pub struct AccountRegistrar {
    store: Arc<CredentialStore>,
    hasher: Arc<PasswordHasher>,
}

impl AccountRegistrar {
    pub fn new(store: Arc<CredentialStore>, hasher: Arc<PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    /// Create an account. Returns the new account id.
    ///
    /// The store lock is taken before hashing, so concurrent registrations
    /// for one name are fully serialized. The table's `UNIQUE` constraint
    /// still has the final word.
    pub fn register(&self, username: &str, password: &str) -> Result<i64, RegistrationError> {
        if username.is_empty() {
            return Err(RegistrationError::InvalidInput("username cannot be empty"));
        }
        if password.is_empty() {
            return Err(RegistrationError::InvalidInput("password cannot be empty"));
        }

        let mut guard = self.store.lock();
        let (hash, salt) = self.hasher.hash(password)?;
        let id = guard.create_account(username, &hash, &salt)?;
        drop(guard);

        tracing::info!(username, account_id = id, "Account registered");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn registrar() -> (Arc<CredentialStore>, Arc<AccountRegistrar>) {
        let store = Arc::new(CredentialStore::open_in_memory().unwrap());
        let hasher = Arc::new(PasswordHasher::new(4));
        let registrar = Arc::new(AccountRegistrar::new(Arc::clone(&store), hasher));
        (store, registrar)
    }

    #[test]
    fn register_stores_hashed_password() {
        let (store, registrar) = registrar();
        registrar.register("photo_owner", "hunter2hunter2").unwrap();

        let account = store.lock().find_account("photo_owner").unwrap();
        assert_ne!(account.password_hash, "hunter2hunter2");
        assert!(PasswordHasher::new(4)
            .verify("hunter2hunter2", &account.salt, &account.password_hash)
            .unwrap());
    }

    #[test]
    fn second_registration_is_duplicate() {
        let (store, registrar) = registrar();
        let first = registrar.register("photo_owner", "first_password").unwrap();

        let err = registrar
            .register("photo_owner", "second_password")
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateUsername));
        assert_eq!(err.to_string(), "username has been taken");

        let account = store.lock().find_account("photo_owner").unwrap();
        assert_eq!(account.id, first);
        assert!(PasswordHasher::new(4)
            .verify("first_password", &account.salt, &account.password_hash)
            .unwrap());
    }

    #[test]
    fn empty_fields_are_rejected() {
        let (store, registrar) = registrar();
        assert!(matches!(
            registrar.register("", "password123"),
            Err(RegistrationError::InvalidInput(_))
        ));
        assert!(matches!(
            registrar.register("photo_owner", ""),
            Err(RegistrationError::InvalidInput(_))
        ));
        assert_eq!(store.account_count().unwrap(), 0);
    }

    #[test]
    fn concurrent_distinct_usernames_all_succeed() {
        let (store, registrar) = registrar();
        let handles: Vec<_> = ["first_parallel", "second_parallel"]
            .into_iter()
            .map(|name| {
                let registrar = Arc::clone(&registrar);
                thread::spawn(move || registrar.register(name, "parallel-password"))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert!(store.lock().find_account("first_parallel").is_ok());
        assert!(store.lock().find_account("second_parallel").is_ok());
    }

    #[test]
    fn concurrent_same_username_yields_one_winner() {
        let (store, registrar) = registrar();
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let registrar = Arc::clone(&registrar);
                thread::spawn(move || registrar.register("contested_name", "parallel-password"))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(RegistrationError::DuplicateUsername)))
            .count();
        assert_eq!((ok, dup), (1, 1));
        assert_eq!(store.account_count().unwrap(), 1);
    }
}
