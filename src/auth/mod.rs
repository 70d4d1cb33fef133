//! Auth core: password hashing, login, sessions, password reset, account
//! management and the role/permission model.
//!
//! Every time-dependent operation takes the current instant as an argument so
//! expiry rules can be exercised at exact boundaries.

mod password;
mod permissions;
mod reset;
mod session;
mod users;

pub use password::{hash_password, verify_password};
pub use reset::ResetRequest;
pub use session::{generate_token, hash_token};

use chrono::{DateTime, Duration, Utc};

use crate::config::AuthConfig;
use crate::db::{timestamp, DbPool, User, UserStatus};
use crate::{Error, Result};

#[derive(Clone)]
pub struct AuthService {
    db: DbPool,
    session_ttl: Duration,
    reset_ttl: Duration,
    min_password_length: usize,
}

impl AuthService {
    pub fn new(db: DbPool, config: &AuthConfig) -> Self {
        Self {
            db,
            session_ttl: Duration::hours(config.session_ttl_hours),
            reset_ttl: Duration::minutes(config.reset_token_ttl_minutes),
            min_password_length: config.min_password_length,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Verify credentials of an active account.
    ///
    /// Unknown usernames, inactive accounts and wrong passwords all yield the
    /// same `Error::Unauthorized`; the actual reason is only logged.
    pub async fn authenticate_user(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let username = username.trim();
        let credentials = match User::credentials(&self.db, username).await? {
            Some(c) => c,
            None => {
                password::burn_verification(password);
                tracing::debug!(username = %username, "Login failed: unknown username");
                return Err(Error::Unauthorized);
            }
        };

        if !verify_password(password, &credentials.password_hash) {
            tracing::warn!(user_id = credentials.id, "Login failed: wrong password");
            return Err(Error::Unauthorized);
        }

        if credentials.status != UserStatus::Active {
            tracing::warn!(
                user_id = credentials.id,
                status = credentials.status.as_str(),
                "Login failed: account is not active"
            );
            return Err(Error::Unauthorized);
        }

        User::touch_last_login(&self.db, credentials.id, &timestamp(now)).await?;

        let user = User::get_by_id(&self.db, credentials.id)
            .await?
            .ok_or(Error::Unauthorized)?;

        tracing::info!(user_id = user.id, username = %user.username, "User logged in");
        Ok(user)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::{RegisterRequest, Role};

    pub fn service(db: &DbPool) -> AuthService {
        AuthService::new(db.clone(), &AuthConfig::default())
    }

    pub fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Register a member and promote it to `role` directly in the store
    pub async fn user_with_role(db: &DbPool, username: &str, role: Role) -> User {
        let auth = service(db);
        let user = auth
            .register_member(
                RegisterRequest {
                    username: username.to_string(),
                    password: format!("{}-password", username),
                    confirm_password: format!("{}-password", username),
                    email: Some(format!("{}@example.org", username)),
                    full_name: None,
                },
                at("2026-01-01T00:00:00Z"),
            )
            .await
            .unwrap();

        if role != Role::Member {
            User::update_role(db, user.id, Role::Member, role).await.unwrap();
        }
        User::get_by_id(db, user.id).await.unwrap().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::Role;

    #[tokio::test]
    async fn test_authenticate_success_updates_last_login() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let alice = user_with_role(&db, "alice", Role::Member).await;
        assert!(alice.last_login.is_none());

        let now = at("2026-02-01T09:30:00Z");
        let user = auth
            .authenticate_user("alice", "alice-password", now)
            .await
            .unwrap();
        assert_eq!(user.id, alice.id);
        assert_eq!(user.last_login.as_deref(), Some(timestamp(now).as_str()));
    }

    #[tokio::test]
    async fn test_authenticate_failures_are_indistinguishable() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let bob = user_with_role(&db, "bob", Role::Member).await;
        User::set_status(&db, bob.id, UserStatus::Inactive).await.unwrap();
        user_with_role(&db, "carol", Role::Member).await;

        let now = at("2026-02-01T09:30:00Z");
        let unknown = auth.authenticate_user("nobody", "whatever", now).await;
        let inactive = auth.authenticate_user("bob", "bob-password", now).await;
        let wrong = auth.authenticate_user("carol", "not-carols", now).await;

        for result in [unknown, inactive, wrong] {
            let err = result.unwrap_err();
            assert!(matches!(err, Error::Unauthorized));
            assert_eq!(err.to_string(), "Authentication required");
        }
    }
}
