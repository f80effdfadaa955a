use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::{Session, User};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session has expired")]
    Expired,

    #[error("Password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}

/// Authenticated caller, resolved from the bearer token of each request and
/// handed to handlers explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
    pub user_id: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionContext {
    /// Build a context from a stored session, rejecting it once expired
    pub fn from_session(session: &Session, now: DateTime<Utc>) -> Result<Self, SessionError> {
        if session.expires_at <= now {
            return Err(SessionError::Expired);
        }
        Ok(Self {
            user_id: session.user_id.clone(),
            email: session.email.clone(),
            expires_at: session.expires_at,
        })
    }

    pub fn owns(&self, owner_id: &str) -> bool {
        self.user_id == owner_id
    }
}

/// Generate a login token: 32 random bytes, hex encoded
pub fn generate_session_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

/// SHA-256 of `pepper || token`, hex encoded. Only this hash is stored.
pub fn hash_session_token(token: &str, pepper: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pepper.as_bytes());
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare two strings without short-circuiting on the first differing byte
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() != b_bytes.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a_bytes.iter().zip(b_bytes.iter()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}

/// New session record for `user`, valid for `ttl_hours`
pub fn new_session(user: &User, token_hash: String, now: DateTime<Utc>, ttl_hours: i64) -> Session {
    Session {
        token_hash,
        user_id: user.user_id.clone(),
        email: user.email.clone(),
        created_at: now,
        expires_at: now + Duration::hours(ttl_hours.max(1)),
    }
}

pub fn hash_password(password: &str) -> Result<String, SessionError> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// Check a password against a stored bcrypt hash. A malformed hash never verifies.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user() -> User {
        User {
            user_id: "user_1".to_string(),
            email: "asha@example.com".to_string(),
            display_name: "Asha".to_string(),
            password_hash: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_generate_session_token_format() {
        let token = generate_session_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_session_token());
    }

    #[test]
    fn test_hash_session_token_depends_on_pepper() {
        let token = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";
        let a = hash_session_token(token, "pepper-one");
        let b = hash_session_token(token, "pepper-two");

        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_session_token(token, "pepper-one"));
        assert_ne!(a, b);
        assert_ne!(a, hash_session_token("other", "pepper-one"));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret", "secret"));
        assert!(!constant_time_compare("secret", "secreT"));
        assert!(!constant_time_compare("secret", "secret-longer"));
        assert!(constant_time_compare("", ""));
    }

    #[test]
    fn test_session_context_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let session = new_session(&user(), "hash".to_string(), now, 24);
        assert_eq!(session.expires_at, now + Duration::hours(24));

        let ctx = SessionContext::from_session(&session, now + Duration::hours(23)).unwrap();
        assert_eq!(ctx.user_id, "user_1");
        assert!(ctx.owns("user_1"));
        assert!(!ctx.owns("user_2"));

        assert!(matches!(
            SessionContext::from_session(&session, now + Duration::hours(24)),
            Err(SessionError::Expired)
        ));
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-bcrypt-hash"));
    }
}
