//! Login and bearer-token sessions.
//!
//! Sessions live only in memory and are lost on restart. The map is keyed
//! by the SHA-256 digest of the token, so the plaintext token is handed to
//! the client once and never retained. The map has its own lock, separate
//! from the credential store lock, so upload lookups are never queued
//! behind a slow bcrypt verification.

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::hasher::{fill_random, HashError, PasswordHasher};
use super::store::{AccountError, CredentialStore};

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Deliberately says nothing about which field was wrong.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(#[source] AccountError),

    #[error("could not verify password: {0}")]
    Hashing(#[source] HashError),

    #[error("could not generate session token: {0}")]
    Entropy(#[source] HashError),
}

/// An issued session.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub issued_at: Instant,
}

pub struct SessionAuthenticator {
    store: Arc<CredentialStore>,
    hasher: Arc<PasswordHasher>,
    /// token digest (hex) -> session
    sessions: RwLock<HashMap<String, Session>>,
    /// `None` means sessions never expire.
    ttl: Option<Duration>,
}

impl SessionAuthenticator {
    pub fn new(
        store: Arc<CredentialStore>,
        hasher: Arc<PasswordHasher>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            store,
            hasher,
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Verify credentials and issue a fresh token.
    pub fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let account = {
            let guard = self.store.lock();
            let account = match guard.find_account(username) {
                Ok(account) => account,
                Err(AccountError::NotFound) => {
                    self.hasher.burn(password);
                    return Err(AuthError::InvalidCredentials);
                }
                Err(e) => return Err(AuthError::StoreUnavailable(e)),
            };

            let matches = self
                .hasher
                .verify(password, &account.salt, &account.password_hash)
                .map_err(AuthError::Hashing)?;
            if !matches {
                return Err(AuthError::InvalidCredentials);
            }
            account
        };

        let mut raw = [0u8; TOKEN_BYTES];
        fill_random(&mut raw).map_err(AuthError::Entropy)?;
        let token = hex::encode(raw);

        self.sessions.write().insert(
            digest(&token),
            Session {
                username: username.to_string(),
                issued_at: Instant::now(),
            },
        );

        tracing::info!(
            username,
            account_id = account.id,
            registered_at = account.created_at,
            "Session issued"
        );
        Ok(token)
    }

    /// Resolve a token to its username. Unknown, malformed or expired
    /// tokens yield `None`.
    pub fn authenticate(&self, token: &str) -> Option<String> {
        if !is_well_formed(token) {
            return None;
        }
        let sessions = self.sessions.read();
        let session = sessions.get(&digest(token))?;
        if self.is_expired(session, Instant::now()) {
            return None;
        }
        Some(session.username.clone())
    }

    /// Revoke a single token. Returns whether it existed.
    pub fn logout(&self, token: &str) -> bool {
        if !is_well_formed(token) {
            return false;
        }
        let removed = self.sessions.write().remove(&digest(token));
        if let Some(ref session) = removed {
            tracing::info!(username = session.username.as_str(), "Session revoked");
        }
        removed.is_some()
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        before - sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(session.issued_at) >= ttl)
    }
}

fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Hash a session token (SHA-256, single pass; tokens are already high-entropy).
fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.to_ascii_lowercase().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountRegistrar;
    use std::thread;

    struct Fixture {
        registrar: AccountRegistrar,
        auth: SessionAuthenticator,
    }

    fn fixture(ttl: Option<Duration>) -> Fixture {
        let store = Arc::new(CredentialStore::open_in_memory().unwrap());
        let hasher = Arc::new(PasswordHasher::new(4));
        Fixture {
            registrar: AccountRegistrar::new(Arc::clone(&store), Arc::clone(&hasher)),
            auth: SessionAuthenticator::new(store, hasher, ttl),
        }
    }

    #[test]
    fn authenticate_does_not_wait_for_the_store_lock() {
        let store = Arc::new(CredentialStore::open_in_memory().unwrap());
        let hasher = Arc::new(PasswordHasher::new(4));
        AccountRegistrar::new(Arc::clone(&store), Arc::clone(&hasher))
            .register("camera_roll", "summer-2023")
            .unwrap();
        let auth = Arc::new(SessionAuthenticator::new(Arc::clone(&store), hasher, None));
        let token = auth.login("camera_roll", "summer-2023").unwrap();

        let _guard = store.lock();
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = Arc::clone(&auth);
        thread::spawn(move || {
            let _ = tx.send(worker.authenticate(&token));
        });

        let resolved = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("authenticate blocked on the credential store lock");
        assert_eq!(resolved.as_deref(), Some("camera_roll"));
    }

    #[test]
    fn register_login_authenticate() {
        let f = fixture(None);
        f.registrar.register("camera_roll", "summer-2023").unwrap();

        let token = f.auth.login("camera_roll", "summer-2023").unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(f.auth.authenticate(&token).as_deref(), Some("camera_roll"));
    }

    #[test]
    fn wrong_password_and_unknown_user_are_indistinguishable() {
        let f = fixture(None);
        f.registrar.register("camera_roll", "summer-2023").unwrap();

        let wrong = f.auth.login("camera_roll", "winter-2023").unwrap_err();
        let missing = f.auth.login("nobody_at_all", "summer-2023").unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(missing, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), missing.to_string());
    }

    #[test]
    fn each_login_issues_a_distinct_token() {
        let f = fixture(None);
        f.registrar.register("camera_roll", "summer-2023").unwrap();

        let a = f.auth.login("camera_roll", "summer-2023").unwrap();
        let b = f.auth.login("camera_roll", "summer-2023").unwrap();
        assert_ne!(a, b);
        assert_eq!(f.auth.authenticate(&a).as_deref(), Some("camera_roll"));
        assert_eq!(f.auth.authenticate(&b).as_deref(), Some("camera_roll"));
        assert_eq!(f.auth.session_count(), 2);
    }

    #[test]
    fn unknown_and_malformed_tokens_resolve_to_nothing() {
        let f = fixture(None);
        assert!(f.auth.authenticate("").is_none());
        assert!(f.auth.authenticate("not-hex-at-all").is_none());
        assert!(f.auth.authenticate(&"z".repeat(64)).is_none());
        assert!(f.auth.authenticate(&"ab".repeat(32)).is_none());
        assert!(f.auth.authenticate("ünïcödé").is_none());
    }

    #[test]
    fn token_lookup_ignores_hex_case() {
        let f = fixture(None);
        f.registrar.register("camera_roll", "summer-2023").unwrap();
        let token = f.auth.login("camera_roll", "summer-2023").unwrap();
        assert_eq!(
            f.auth.authenticate(&token.to_ascii_uppercase()).as_deref(),
            Some("camera_roll")
        );
    }

    #[test]
    fn logout_revokes_only_that_token() {
        let f = fixture(None);
        f.registrar.register("camera_roll", "summer-2023").unwrap();
        let a = f.auth.login("camera_roll", "summer-2023").unwrap();
        let b = f.auth.login("camera_roll", "summer-2023").unwrap();

        assert!(f.auth.logout(&a));
        assert!(!f.auth.logout(&a));
        assert!(f.auth.authenticate(&a).is_none());
        assert!(f.auth.authenticate(&b).is_some());
    }

    #[test]
    fn expired_tokens_are_hidden_then_swept() {
        let f = fixture(Some(Duration::from_millis(20)));
        f.registrar.register("camera_roll", "summer-2023").unwrap();
        let token = f.auth.login("camera_roll", "summer-2023").unwrap();
        assert!(f.auth.authenticate(&token).is_some());

        thread::sleep(Duration::from_millis(40));
        assert!(f.auth.authenticate(&token).is_none());
        assert_eq!(f.auth.session_count(), 1);
        assert_eq!(f.auth.sweep_expired(), 1);
        assert_eq!(f.auth.session_count(), 0);
    }

    #[test]
    fn sweep_without_ttl_keeps_everything() {
        let f = fixture(None);
        f.registrar.register("camera_roll", "summer-2023").unwrap();
        f.auth.login("camera_roll", "summer-2023").unwrap();
        assert_eq!(f.auth.sweep_expired(), 0);
        assert_eq!(f.auth.session_count(), 1);
    }

    #[test]
    fn token_is_not_stored_in_plaintext() {
        let f = fixture(None);
        f.registrar.register("camera_roll", "summer-2023").unwrap();
        let token = f.auth.login("camera_roll", "summer-2023").unwrap();
        assert!(!f.auth.sessions.read().contains_key(&token));
    }

    #[test]
    fn authenticate_is_safe_from_many_readers() {
        let f = Arc::new(fixture(None));
        f.registrar.register("camera_roll", "summer-2023").unwrap();
        let token = f.auth.login("camera_roll", "summer-2023").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let f = Arc::clone(&f);
                let token = token.clone();
                thread::spawn(move || f.auth.authenticate(&token))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_deref(), Some("camera_roll"));
        }
    }
}
