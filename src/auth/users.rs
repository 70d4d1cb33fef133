use chrono::{DateTime, Utc};

use super::{hash_password, AuthService};
use crate::db::{
    timestamp, CreateUserRequest, NewUser, RegisterRequest, Role, Session, User, UserStats,
    UserStatus,
};
use crate::validation::{self, check, non_blank};
use crate::{Error, Result};

struct AccountFields<'a> {
    username: &'a str,
    password: &'a str,
    email: Option<&'a str>,
    full_name: Option<&'a str>,
}

impl AuthService {
    fn validate_account(&self, fields: &AccountFields<'_>) -> Result<()> {
        check("username", validation::validate_username(fields.username))?;
        check(
            "password",
            validation::validate_password(fields.password, self.min_password_length),
        )?;
        if let Some(email) = fields.email {
            check("email", validation::validate_email(email))?;
        }
        if let Some(full_name) = fields.full_name {
            check(
                "full_name",
                validation::validate_text("Full name", full_name, validation::MAX_NAME_LEN),
            )?;
        }
        Ok(())
    }

    async fn insert_account(
        &self,
        fields: AccountFields<'_>,
        role: Role,
        created_by: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.validate_account(&fields)?;

        let password_hash = hash_password(fields.password)?;
        let new = NewUser {
            username: fields.username,
            password_hash: &password_hash,
            email: fields.email,
            full_name: fields.full_name,
            role,
            created_by,
        };

        let id = User::insert(&self.db, &new, &timestamp(now))
            .await
            .map_err(|e| Error::from_insert(e, "Username"))?;

        User::get_by_id(&self.db, id)
            .await?
            .ok_or(Error::NotFound("User"))
    }

    /// Self-registration. The role is always `member`.
    pub async fn register_member(&self, form: RegisterRequest, now: DateTime<Utc>) -> Result<User> {
        if form.password != form.confirm_password {
            return Err(Error::validation("confirm_password", "Passwords do not match"));
        }

        let user = self
            .insert_account(
                AccountFields {
                    username: form.username.trim(),
                    password: &form.password,
                    email: non_blank(form.email.as_deref()),
                    full_name: non_blank(form.full_name.as_deref()),
                },
                Role::Member,
                None,
                now,
            )
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "Member registered");
        Ok(user)
    }

    /// Provision an account with any role on behalf of `creator`
    pub async fn create_user(
        &self,
        form: CreateUserRequest,
        creator: &User,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let role: Role = form
            .role
            .parse()
            .map_err(|e: String| Error::validation("role", e))?;

        let user = self
            .insert_account(
                AccountFields {
                    username: form.username.trim(),
                    password: &form.password,
                    email: non_blank(form.email.as_deref()),
                    full_name: non_blank(form.full_name.as_deref()),
                },
                role,
                Some(creator.id),
                now,
            )
            .await?;

        tracing::info!(
            user_id = user.id,
            role = %role,
            created_by = creator.id,
            "User account created"
        );
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        User::get_by_id(&self.db, id)
            .await?
            .ok_or(Error::NotFound("User"))
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let users = User::list(&self.db, limit.clamp(1, 500), offset.max(0)).await?;
        Ok(users)
    }

    pub async fn user_stats(&self) -> Result<UserStats> {
        Ok(User::stats(&self.db).await?)
    }

    /// Change another user's role. The update only applies if the role is
    /// still the one read here; a concurrent change yields `Conflict`.
    pub async fn change_role(&self, actor: &User, target_id: i64, role: Role) -> Result<User> {
        if actor.id == target_id {
            return Err(Error::validation("role", "You cannot change your own role"));
        }

        let target = self.get_user(target_id).await?;
        if target.role == role {
            return Ok(target);
        }

        let changed = User::update_role(&self.db, target_id, target.role, role).await?;
        if changed == 0 {
            return Err(Error::Conflict(
                "User role was changed by someone else".to_string(),
            ));
        }

        tracing::info!(
            user_id = target_id,
            from = %target.role,
            to = %role,
            changed_by = actor.id,
            "User role changed"
        );
        self.get_user(target_id).await
    }

    /// Activate, deactivate or suspend another user. Leaving `active` revokes
    /// every session of the target.
    pub async fn set_status(
        &self,
        actor: &User,
        target_id: i64,
        status: UserStatus,
    ) -> Result<User> {
        if actor.id == target_id && status != UserStatus::Active {
            return Err(Error::validation(
                "status",
                "You cannot deactivate your own account",
            ));
        }

        let changed = User::set_status(&self.db, target_id, status).await?;
        if changed == 0 {
            return Err(Error::NotFound("User"));
        }

        if status != UserStatus::Active {
            let revoked = Session::delete_for_user(&self.db, target_id).await?;
            tracing::info!(user_id = target_id, revoked, "Revoked sessions of deactivated user");
        }

        tracing::info!(
            user_id = target_id,
            status = status.as_str(),
            changed_by = actor.id,
            "User status changed"
        );
        self.get_user(target_id).await
    }

    /// Create the configured super-admin when the store has no active one.
    /// Returns whether an account was created.
    pub async fn ensure_super_admin(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if User::count_with_role(&self.db, Role::SuperAdmin).await? > 0 {
            return Ok(false);
        }

        if User::get_by_username(&self.db, username.trim()).await?.is_some() {
            tracing::warn!(
                username = %username,
                "No active super-admin, but the bootstrap username is already taken"
            );
            return Ok(false);
        }

        let user = self.provision_super_admin(username, password, now).await?;
        tracing::info!(user_id = user.id, username = %user.username, "Bootstrap super-admin created");
        Ok(true)
    }

    /// Create a super-admin with no creator, for bootstrap and the CLI
    pub async fn provision_super_admin(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.insert_account(
            AccountFields {
                username: username.trim(),
                password,
                email: None,
                full_name: None,
            },
            Role::SuperAdmin,
            None,
            now,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn registration(username: &str, password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
            email: None,
            full_name: None,
        }
    }

    #[tokio::test]
    async fn test_register_forces_member_role() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let now = at("2026-01-05T10:00:00Z");

        let user = auth
            .register_member(registration("alice", "long-enough", "long-enough"), now)
            .await
            .unwrap();
        assert_eq!(user.role, Role::Member);
        assert_eq!(user.status, UserStatus::Active);
        assert!(user.created_by.is_none());
    }

    #[tokio::test]
    async fn test_register_validation() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let now = at("2026-01-05T10:00:00Z");

        let mismatch = auth
            .register_member(registration("alice", "long-enough", "different!"), now)
            .await
            .unwrap_err();
        assert!(matches!(mismatch, Error::Validation { field: "confirm_password", .. }));

        let short = auth
            .register_member(registration("alice", "short", "short"), now)
            .await
            .unwrap_err();
        assert!(matches!(short, Error::Validation { field: "password", .. }));

        let bad_name = auth
            .register_member(registration("a b", "long-enough", "long-enough"), now)
            .await
            .unwrap_err();
        assert!(matches!(bad_name, Error::Validation { field: "username", .. }));
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let now = at("2026-01-05T10:00:00Z");

        auth.register_member(registration("alice", "long-enough", "long-enough"), now)
            .await
            .unwrap();
        let err = auth
            .register_member(registration("alice", "other-password", "other-password"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_user_records_creator_and_role() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let root = user_with_role(&db, "root", Role::SuperAdmin).await;

        let form = CreateUserRequest {
            username: "mod".to_string(),
            password: "moderator-pass".to_string(),
            email: Some("mod@example.org".to_string()),
            full_name: Some("Mo Derator".to_string()),
            role: "moderator".to_string(),
        };
        let user = auth
            .create_user(form, &root, at("2026-01-06T00:00:00Z"))
            .await
            .unwrap();
        assert_eq!(user.role, Role::Moderator);
        assert_eq!(user.created_by, Some(root.id));

        let bad_role = CreateUserRequest {
            username: "other".to_string(),
            password: "other-password".to_string(),
            email: None,
            full_name: None,
            role: "owner".to_string(),
        };
        let err = auth
            .create_user(bad_role, &root, at("2026-01-06T00:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "role", .. }));
    }

    #[tokio::test]
    async fn test_change_role() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let root = user_with_role(&db, "root", Role::SuperAdmin).await;
        let bob = user_with_role(&db, "bob", Role::Member).await;

        let promoted = auth.change_role(&root, bob.id, Role::Admin).await.unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert!(promoted.is_admin());

        let own = auth.change_role(&root, root.id, Role::Member).await.unwrap_err();
        assert!(matches!(own, Error::Validation { .. }));

        let missing = auth.change_role(&root, 9999, Role::Admin).await.unwrap_err();
        assert!(matches!(missing, Error::NotFound("User")));
    }

    #[tokio::test]
    async fn test_deactivation_revokes_sessions() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let root = user_with_role(&db, "root", Role::SuperAdmin).await;
        let bob = user_with_role(&db, "bob", Role::Member).await;
        let now = at("2026-01-07T00:00:00Z");

        let token = auth.create_session(bob.id, now).await.unwrap();
        let updated = auth
            .set_status(&root, bob.id, UserStatus::Inactive)
            .await
            .unwrap();
        assert_eq!(updated.status, UserStatus::Inactive);

        let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE user_id = ?")
            .bind(bob.id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(sessions, 0);
        assert!(auth.get_user_by_session(&token, now).await.unwrap().is_none());

        // Reactivating restores login but not the revoked session
        auth.set_status(&root, bob.id, UserStatus::Active).await.unwrap();
        assert!(auth.authenticate_user("bob", "bob-password", now).await.is_ok());

        let own = auth
            .set_status(&root, root.id, UserStatus::Inactive)
            .await
            .unwrap_err();
        assert!(matches!(own, Error::Validation { field: "status", .. }));
    }

    #[tokio::test]
    async fn test_user_stats_counts_active_by_role() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        user_with_role(&db, "root", Role::SuperAdmin).await;
        user_with_role(&db, "alice", Role::Member).await;
        let bob = user_with_role(&db, "bob", Role::Member).await;
        User::set_status(&db, bob.id, UserStatus::Inactive).await.unwrap();

        let stats = auth.user_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        let members = stats.by_role.iter().find(|r| r.role == Role::Member).unwrap();
        assert_eq!(members.count, 1);
    }

    #[tokio::test]
    async fn test_ensure_super_admin_runs_once() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let now = at("2026-01-01T00:00:00Z");

        assert!(auth.ensure_super_admin("root", "bootstrap-pass", now).await.unwrap());
        assert!(!auth.ensure_super_admin("root2", "bootstrap-pass", now).await.unwrap());

        let root = auth.authenticate_user("root", "bootstrap-pass", now).await.unwrap();
        assert!(root.is_super_admin());
    }
}
