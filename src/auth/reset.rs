use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};

use super::{hash_password, hash_token, AuthService};
use crate::db::{timestamp, PasswordResetToken, User, UserStatus};
use crate::validation::{self, check};
use crate::{Error, Result};

pub const RESET_TOKEN_LEN: usize = 32;

/// A freshly issued reset token, ready for delivery to the account holder
#[derive(Debug)]
pub struct ResetRequest {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

fn invalid_token() -> Error {
    Error::validation("token", "Reset link is invalid or has expired")
}

impl AuthService {
    /// Issue a reset token for the account matching a username or email.
    ///
    /// Previous tokens of the user are removed. Unknown or inactive accounts
    /// yield `None` so callers can answer identically either way.
    pub async fn request_password_reset(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ResetRequest>> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }

        let user = match User::find_by_login(&self.db, identifier).await? {
            Some(user) if user.status == UserStatus::Active => user,
            Some(user) => {
                tracing::info!(user_id = user.id, "Password reset requested for inactive account");
                return Ok(None);
            }
            None => {
                tracing::debug!("Password reset requested for unknown account");
                return Ok(None);
            }
        };

        let token = Alphanumeric.sample_string(&mut rand::rng(), RESET_TOKEN_LEN);
        let expires_at = now + self.reset_ttl;
        PasswordResetToken::replace_for_user(
            &self.db,
            user.id,
            &hash_token(&token),
            &timestamp(expires_at),
            &timestamp(now),
        )
        .await?;

        tracing::info!(user_id = user.id, "Password reset token issued");
        Ok(Some(ResetRequest {
            user,
            token,
            expires_at,
        }))
    }

    /// Redeem a reset token: set the new password and revoke all sessions.
    /// A token works once, and only before it expires.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        if new_password != confirm_password {
            return Err(Error::validation("confirm_password", "Passwords do not match"));
        }
        check(
            "password",
            validation::validate_password(new_password, self.min_password_length),
        )?;

        let token = token.trim();
        if token.len() != RESET_TOKEN_LEN {
            return Err(invalid_token());
        }

        let record = PasswordResetToken::find_by_hash(&self.db, &hash_token(token))
            .await?
            .ok_or_else(invalid_token)?;
        let now_ts = timestamp(now);
        if record.used || record.expires_at <= now_ts {
            return Err(invalid_token());
        }

        let password_hash = hash_password(new_password)?;

        let mut tx = self.db.begin().await?;

        let claimed = sqlx::query(
            "UPDATE password_reset_tokens SET used = 1 WHERE id = ? AND used = 0 AND expires_at > ?",
        )
        .bind(record.id)
        .bind(&now_ts)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if claimed == 0 {
            return Err(invalid_token());
        }

        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(record.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(record.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(user_id = record.user_id, "Password reset completed");
        self.get_user(record.user_id).await
    }

    /// Purge expired and used reset tokens. Safe to run repeatedly.
    pub async fn cleanup_expired_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = PasswordResetToken::delete_expired(&self.db, &timestamp(now)).await?;
        if removed > 0 {
            tracing::info!(removed, "Removed expired password reset tokens");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::db::Role;
    use chrono::Duration;

    #[tokio::test]
    async fn test_reset_token_shape_and_replacement() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let alice = user_with_role(&db, "alice", Role::Member).await;
        let now = at("2026-04-01T08:00:00Z");

        let first = auth.request_password_reset("alice", now).await.unwrap().unwrap();
        assert_eq!(first.token.len(), RESET_TOKEN_LEN);
        assert!(first.token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(first.expires_at, now + Duration::hours(1));

        // Lookup by email works too, and replaces the earlier token
        let second = auth
            .request_password_reset("ALICE@example.org", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.user.id, alice.id);
        assert_eq!(PasswordResetToken::count_for_user(&db, alice.id).await.unwrap(), 1);

        let stale = auth
            .reset_password(&first.token, "brand-new-pass", "brand-new-pass", now)
            .await
            .unwrap_err();
        assert!(matches!(stale, Error::Validation { field: "token", .. }));
    }

    #[tokio::test]
    async fn test_unknown_account_gets_no_token() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let now = at("2026-04-01T08:00:00Z");

        assert!(auth.request_password_reset("ghost", now).await.unwrap().is_none());
        assert!(auth.request_password_reset("  ", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_token_is_one_shot_and_revokes_sessions() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let alice = user_with_role(&db, "alice", Role::Member).await;
        let now = at("2026-04-01T08:00:00Z");

        let session = auth.create_session(alice.id, now).await.unwrap();
        let issued = auth.request_password_reset("alice", now).await.unwrap().unwrap();

        let later = now + Duration::minutes(10);
        auth.reset_password(&issued.token, "brand-new-pass", "brand-new-pass", later)
            .await
            .unwrap();

        assert!(auth.get_user_by_session(&session, later).await.unwrap().is_none());
        assert!(auth
            .authenticate_user("alice", "alice-password", later)
            .await
            .is_err());
        assert!(auth
            .authenticate_user("alice", "brand-new-pass", later)
            .await
            .is_ok());

        let again = auth
            .reset_password(&issued.token, "another-pass", "another-pass", later)
            .await
            .unwrap_err();
        assert!(matches!(again, Error::Validation { field: "token", .. }));
    }

    #[tokio::test]
    async fn test_expired_token_rejected_and_purged() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let alice = user_with_role(&db, "alice", Role::Member).await;
        let now = at("2026-04-01T08:00:00Z");

        let issued = auth.request_password_reset("alice", now).await.unwrap().unwrap();
        let late = now + Duration::minutes(61);
        let err = auth
            .reset_password(&issued.token, "brand-new-pass", "brand-new-pass", late)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "token", .. }));

        assert_eq!(auth.cleanup_expired_reset_tokens(late).await.unwrap(), 1);
        assert_eq!(auth.cleanup_expired_reset_tokens(late).await.unwrap(), 0);
        assert_eq!(PasswordResetToken::count_for_user(&db, alice.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_validates_new_password() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let now = at("2026-04-01T08:00:00Z");

        let mismatch = auth
            .reset_password("x", "brand-new-pass", "brand-new-pasS", now)
            .await
            .unwrap_err();
        assert!(matches!(mismatch, Error::Validation { field: "confirm_password", .. }));

        let short = auth.reset_password("x", "short", "short", now).await.unwrap_err();
        assert!(matches!(short, Error::Validation { field: "password", .. }));
    }
}
