use anyhow::anyhow;
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::Database;
use crate::errors::{TrackerError, TrackerResult};
use crate::models::User;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";
const MIN_PASSWORD_LEN: usize = 8;

// --- Password hashing ---

/// Hashes a password into an argon2id PHC string.
pub fn hash_password(password: &str) -> TrackerResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TrackerError::Internal(anyhow!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// --- Registration ---

pub fn register(db: &Database, email: &str, password: &str) -> TrackerResult<User> {
    let email = email.trim().to_lowercase();
    let re = Regex::new(EMAIL_PATTERN).map_err(|e| TrackerError::Internal(e.into()))?;
    if !re.is_match(&email) {
        return Err(TrackerError::Validation(format!(
            "'{}' is not a valid email address",
            email
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(TrackerError::Validation(format!(
            "password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }

    let user = db.create_user(&email, &hash_password(password)?)?;
    info!(user_id = user.id, "registered user");
    Ok(user)
}

// --- Tokens ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // email
    pub uid: i64,
    pub iat: i64,
    pub exp: i64,
}

pub struct Authenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_minutes: i64,
}

impl Authenticator {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_minutes,
        }
    }

    /// Checks credentials and issues a signed access token. Unknown email
    /// and wrong password fail the same way.
    pub fn login(&self, db: &Database, email: &str, password: &str) -> TrackerResult<String> {
        let email = email.trim().to_lowercase();
        let user = match db.get_user_by_email(&email)? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                warn!("failed login attempt");
                return Err(TrackerError::Unauthorized);
            }
        };
        self.issue_token(&user)
    }

    pub fn issue_token(&self, user: &User) -> TrackerResult<String> {
        let now = Utc::now();
        let expires = Duration::try_minutes(self.ttl_minutes)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                TrackerError::Internal(anyhow!(
                    "token lifetime of {} minutes is out of range",
                    self.ttl_minutes
                ))
            })?;
        let claims = Claims {
            sub: user.email.clone(),
            uid: user.id,
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TrackerError::Internal(e.into()))
    }

    /// Resolves a token back to its user.
    pub fn authenticate(&self, db: &Database, token: &str) -> TrackerResult<User> {
        let claims = decode::<Claims>(token.trim(), &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| TrackerError::Unauthorized)?;

        match db.get_user(claims.uid)? {
            Some(user) if user.email == claims.sub => Ok(user),
            _ => Err(TrackerError::Unauthorized),
        }
    }
}
