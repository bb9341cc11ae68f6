//! Password login and cookie sessions.
//!
//! A session token has the shape `<selector>_<secret>`. Only the selector and
//! a SHA-256 hash of the secret are stored; lookups go by selector and the
//! secret hash is compared in constant time.

use std::{sync::Arc, time::Duration};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::{AuthorSummary, UserRecord};

const SELECTOR_LEN: usize = 16;
const MIN_SECRET_LEN: usize = 32;
const MAX_USERNAME_CHARS: usize = 150;

/// The authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
}

impl CurrentUser {
    pub fn summary(&self) -> AuthorSummary {
        AuthorSummary {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl From<&UserRecord> for CurrentUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub async fn register(
        &self,
        username: &str,
        display_name: Option<&str>,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        let username = validate_username(username)?;
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".into()));
        }

        let params = CreateUserParams {
            username: username.to_string(),
            display_name: display_name.map(str::trim).unwrap_or_default().to_string(),
            password_hash: hash_password(password)?,
        };

        match self.users.create_user(params).await {
            Ok(user) => Ok(user),
            Err(RepoError::Duplicate { .. }) => Err(AuthError::UsernameTaken(username.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    /// Verify credentials and open a new session for the user.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        now: OffsetDateTime,
    ) -> Result<(CurrentUser, IssuedSession), AuthError> {
        let user = self
            .users
            .find_by_username(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&user.password_hash, password) {
            return Err(AuthError::InvalidCredentials);
        }

        let selector = Uuid::new_v4().simple().to_string()[..SELECTOR_LEN].to_string();
        let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let expires_at = now + self.session_ttl;

        self.sessions
            .create_session(CreateSessionParams {
                selector: selector.clone(),
                secret_hash: hash_secret(&secret),
                user_id: user.id,
                expires_at,
            })
            .await?;

        debug!(
            target = "yatube::application::auth",
            user_id = user.id,
            "session issued"
        );

        Ok((
            CurrentUser::from(&user),
            IssuedSession {
                token: format!("{selector}_{secret}"),
                expires_at,
            },
        ))
    }

    /// Resolve a session token; malformed, unknown or expired tokens are anonymous.
    pub async fn authenticate(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<CurrentUser>, AuthError> {
        let Some((selector, secret)) = parse_token(token) else {
            return Ok(None);
        };

        let Some(session) = self.sessions.find_session(selector).await? else {
            return Ok(None);
        };

        if session.secret_hash.ct_eq(&hash_secret(secret)).unwrap_u8() == 0 {
            warn!(
                target = "yatube::application::auth",
                "session secret mismatch"
            );
            return Ok(None);
        }

        if session.is_expired(now) {
            self.sessions.delete_session(selector).await?;
            return Ok(None);
        }

        let user = self.users.find_by_id(session.user_id).await?;
        Ok(user.as_ref().map(CurrentUser::from))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if let Some((selector, _)) = parse_token(token) {
            self.sessions.delete_session(selector).await?;
        }
        Ok(())
    }

    pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, AuthError> {
        Ok(self.sessions.purge_expired(now).await?)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|err| AuthError::Hashing(err.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!(
                target = "yatube::application::auth",
                error = %err,
                "stored password hash is malformed"
            );
            false
        }
    }
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

/// Usernames hold letters, digits and `@.+-_` only, at most 150 of them.
fn validate_username(raw: &str) -> Result<&str, AuthError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(AuthError::InvalidInput("username must not be empty".into()));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(AuthError::InvalidInput(format!(
            "username must be at most {MAX_USERNAME_CHARS} characters"
        )));
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-');
    if !username.chars().all(allowed) {
        return Err(AuthError::InvalidInput(
            "username may contain only letters, digits and @/./+/-/_".into(),
        ));
    }
    Ok(username)
}

fn parse_token(token: &str) -> Option<(&str, &str)> {
    let (selector, secret) = token.split_once('_')?;
    if selector.len() != SELECTOR_LEN || secret.len() < MIN_SECRET_LEN {
        return None;
    }
    Some((selector, secret))
}
