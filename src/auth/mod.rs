//! User authentication.
//!
//! Provides:
//! - Password hashing: 8-byte random salt prepended to the password, then bcrypt
//! - Credential storage in SQLite (`users` table, unique usernames)
//! - Registration serialized through the credential store lock
//! - In-memory bearer-token sessions (opaque hex tokens, SHA-256 keyed)
//!
//! ## Locking
//! Registration and login share the credential store mutex. The session map
//! sits behind its own `RwLock`, so token lookups never wait on bcrypt.

pub mod hasher;
pub mod registrar;
pub mod session;
pub mod store;

pub use hasher::{HashError, PasswordHasher};
pub use registrar::{AccountRegistrar, RegistrationError};
pub use session::{AuthError, Session, SessionAuthenticator};
pub use store::{Account, AccountError, CredentialStore};
