//! Request-shape validation, kept free of I/O so it can be tested alone.

use thiserror::Error;

use crate::auth::hasher::MAX_PASSWORD_BYTES;
use crate::config::AuthConfig;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_CHARS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("username must be at least {0} characters")]
    UsernameTooShort(usize),

    #[error("username must be at most {max} characters", max = MAX_USERNAME_CHARS)]
    UsernameTooLong,

    #[error("username must not contain control characters")]
    UsernameControlChars,

    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("password must be at most {max} bytes", max = MAX_PASSWORD_BYTES)]
    PasswordTooLong,
}

/// Length rules applied to registration input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialRules {
    pub min_username_len: usize,
    pub min_password_len: usize,
}

impl Default for CredentialRules {
    fn default() -> Self {
        Self {
            min_username_len: 8,
            min_password_len: 8,
        }
    }
}

impl From<&AuthConfig> for CredentialRules {
    fn from(config: &AuthConfig) -> Self {
        Self {
            min_username_len: config.min_username_len,
            min_password_len: config.min_password_len,
        }
    }
}

impl CredentialRules {
    /// Check registration input. Returns the trimmed username.
    pub fn check<'a>(&self, username: &'a str, password: &str) -> Result<&'a str, ValidationError> {
        let username = username.trim();
        let chars = username.chars().count();
        if chars < self.min_username_len {
            return Err(ValidationError::UsernameTooShort(self.min_username_len));
        }
        if chars > MAX_USERNAME_CHARS {
            return Err(ValidationError::UsernameTooLong);
        }
        if username.chars().any(char::is_control) {
            return Err(ValidationError::UsernameControlChars);
        }
        if password.chars().count() < self.min_password_len {
            return Err(ValidationError::PasswordTooShort(self.min_password_len));
        }
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(ValidationError::PasswordTooLong);
        }
        Ok(username)
    }
}
