//! Auth provider: accounts and bearer-token sessions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::model::{Identity, SessionEvent, SessionNotice};
use crate::clock::Clock;
use crate::error::{AuthError, DatabaseError};
use crate::store::Database;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// PBKDF2-HMAC-SHA256 rounds for newly stored passwords.
pub const DEFAULT_HASH_ITERATIONS: u32 = 200_000;

const HASH_SCHEME: &str = "pbkdf2";

/// The identity source the rest of the service depends on.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve a bearer token to its identity. Unknown, expired, or
    /// unreadable sessions all resolve to `None`.
    async fn current_user(&self, token: &str) -> Option<Identity>;

    /// Register a new account.
    async fn sign_up(&self, email: &str, password: &SecretString) -> Result<Identity, AuthError>;

    /// Start a session. Returns the identity and a new bearer token.
    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<(Identity, String), AuthError>;

    /// End a session. Signing out an unknown token is not an error.
    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    /// Key that addresses notices to the session behind `token`.
    fn session_key(&self, token: &str) -> String;

    /// Subscribe to per-session notifications.
    fn subscribe(&self) -> broadcast::Receiver<SessionNotice>;
}

/// Auth provider backed by the service's own database.
pub struct LocalAuth {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
    hash_iterations: u32,
    events: broadcast::Sender<SessionNotice>,
}

impl LocalAuth {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>, session_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            db,
            clock,
            session_ttl,
            hash_iterations: DEFAULT_HASH_ITERATIONS,
            events,
        }
    }

    /// Override the PBKDF2 round count used for new password hashes.
    /// Existing hashes keep the count they were stored with.
    pub fn with_hash_iterations(mut self, iterations: u32) -> Self {
        self.hash_iterations = iterations.max(1);
        self
    }

    /// Remove expired sessions. Returns how many were deleted.
    pub async fn prune_expired(&self) -> Result<usize, AuthError> {
        let removed = self.db.prune_sessions(self.clock.now()).await?;
        if removed > 0 {
            info!(removed, "Pruned expired sessions");
        }
        Ok(removed)
    }

    fn publish(&self, notice: SessionNotice) {
        // No subscribers is fine.
        let _ = self.events.send(notice);
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// Hash a password as `pbkdf2$<iterations>$<salt hex>$<key hex>`.
fn hash_password(password: &str, iterations: u32) -> String {
    let salt = random_bytes(16);
    let key = derive_key(password, &salt, iterations);
    format!(
        "{HASH_SCHEME}${iterations}${}${}",
        hex::encode(&salt),
        hex::encode(key)
    )
}

fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(HASH_SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iterations.parse::<u32>(),
        hex::decode(salt),
        hex::decode(expected),
    ) else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    constant_time_eq(&derive_key(password, &salt, iterations), &expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Sessions are stored by token hash so a leaked table cannot be replayed.
fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn current_user(&self, token: &str) -> Option<Identity> {
        if token.is_empty() {
            return None;
        }
        match self
            .db
            .get_session_identity(&token_hash(token), self.clock.now())
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Session lookup failed");
                None
            }
        }
    }

    async fn sign_up(&self, email: &str, password: &SecretString) -> Result<Identity, AuthError> {
        let email = normalize_email(email);
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(AuthError::InvalidEmail(email));
        }
        let password = password.expose_secret();
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }

        let user = self
            .db
            .insert_user(&email, &hash_password(password, self.hash_iterations))
            .await
            .map_err(|e| match e {
                DatabaseError::Constraint(_) => AuthError::EmailTaken(email.clone()),
                other => AuthError::Store(other),
            })?;

        info!(user_id = %user.id, "Account created");
        Ok(user.identity())
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<(Identity, String), AuthError> {
        let email = normalize_email(email);
        let user = self
            .db
            .get_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password.expose_secret(), &user.password_hash) {
            debug!(user_id = %user.id, "Rejected sign-in: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let expires_at = chrono::Duration::from_std(self.session_ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or(AuthError::SessionTtlOutOfRange)?;

        let token = hex::encode(random_bytes(32));
        self.db
            .insert_session(&token_hash(&token), user.id, expires_at)
            .await?;

        let identity = user.identity();
        info!(user_id = %identity.id, "Signed in");
        Ok((identity, token))
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let key = token_hash(token);
        if let Some(user_id) = self.db.delete_session(&key).await? {
            info!(user_id = %user_id, "Signed out");
            self.publish(SessionNotice {
                session_key: key,
                event: SessionEvent::SignedOut { user_id },
            });
        }
        Ok(())
    }

    fn session_key(&self, token: &str) -> String {
        token_hash(token)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.events.subscribe()
    }
}
