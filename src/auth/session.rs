use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use super::AuthService;
use crate::db::{timestamp, Session, User};
use crate::Result;

/// Generate a random opaque token (64 hex characters)
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage; raw tokens are never persisted
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

impl AuthService {
    /// Start a session for the user and return the token for the cookie
    pub async fn create_session(&self, user_id: i64, now: DateTime<Utc>) -> Result<String> {
        let token = generate_token();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            token_hash: hash_token(&token),
            expires_at: timestamp(now + self.session_ttl),
            created_at: timestamp(now),
        };
        Session::insert(&self.db, &session).await?;

        tracing::debug!(user_id, session_id = %session.id, "Session created");
        Ok(token)
    }

    /// Resolve a session token to its user.
    ///
    /// `None` when the token is empty, unknown, expired, or belongs to an
    /// account that is no longer active.
    pub async fn get_user_by_session(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        if token.is_empty() {
            return Ok(None);
        }

        let user = Session::active_user(&self.db, &hash_token(token), &timestamp(now)).await?;
        Ok(user)
    }

    /// Revoke one session; unknown tokens are ignored
    pub async fn delete_session(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Ok(());
        }

        let removed = Session::delete_by_token_hash(&self.db, &hash_token(token)).await?;
        if removed > 0 {
            tracing::debug!("Session revoked");
        }
        Ok(())
    }

    /// Delete sessions whose expiry has passed. Safe to run repeatedly.
    pub async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = Session::delete_expired(&self.db, &timestamp(now)).await?;
        if removed > 0 {
            tracing::info!(removed, "Removed expired sessions");
        }
        Ok(removed)
    }
}
