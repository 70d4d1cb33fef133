//! User accounts, roles and account status.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Account roles, ordered from most to least privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Everything an admin can do, plus user and role management
    SuperAdmin,
    /// Admin panel: moderation, imports, exports, prayer management
    Admin,
    /// Moderates suggested updates
    Moderator,
    /// Creates prayer requests and suggests updates
    Member,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Moderator, Role::Member];

    /// Permission tier (higher = more permissions)
    pub fn level(&self) -> u8 {
        match self {
            Role::SuperAdmin => 4,
            Role::Admin => 3,
            Role::Moderator => 2,
            Role::Member => 1,
        }
    }

    /// Check if this role is at or above the given tier
    pub fn has_at_least(&self, required: Role) -> bool {
        self.level() >= required.level()
    }

    pub fn is_admin(&self) -> bool {
        self.has_at_least(Role::Admin)
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// Roles whose grants this role inherits, including itself
    pub fn inherited(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(move |r| self.has_at_least(*r))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::Member => "member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "member" => Ok(Role::Member),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            "suspended" => Ok(UserStatus::Suspended),
            _ => Err(format!("Unknown user status: {}", s)),
        }
    }
}

/// A user without credentials; the only shape that leaves the store layer
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub created_by: Option<i64>,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_super_admin(&self) -> bool {
        self.role.is_super_admin()
    }
}

/// Login lookup row. Never serialized.
#[derive(FromRow)]
pub struct UserCredentials {
    pub id: i64,
    pub password_hash: String,
    pub status: UserStatus,
}

const USER_COLUMNS: &str =
    "id, username, email, full_name, role, status, created_by, last_login, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub is_admin: bool,
    pub created_by: Option<i64>,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            is_admin: user.is_admin(),
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            status: user.status,
            created_by: user.created_by,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Self-registration form; the role is always `member`
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Account provisioned by a super-admin
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Fields for a new account row, already validated and hashed
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub email: Option<&'a str>,
    pub full_name: Option<&'a str>,
    pub role: Role,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RoleCount {
    pub role: Role,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub total: i64,
    pub by_role: Vec<RoleCount>,
}

impl User {
    pub async fn get_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn get_by_username(
        db: &SqlitePool,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(db)
        .await
    }

    /// Find an account by username or (case-insensitive) email
    pub async fn find_by_login(
        db: &SqlitePool,
        identifier: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ? OR lower(email) = lower(?) ORDER BY id LIMIT 1",
            USER_COLUMNS
        ))
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(db)
        .await
    }

    pub async fn credentials(
        db: &SqlitePool,
        username: &str,
    ) -> Result<Option<UserCredentials>, sqlx::Error> {
        sqlx::query_as("SELECT id, password_hash, status FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(db)
            .await
    }

    pub async fn list(db: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
    }

    pub async fn insert(
        db: &SqlitePool,
        new: &NewUser<'_>,
        created_at: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, email, full_name, role, status, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(new.username)
        .bind(new.password_hash)
        .bind(new.email)
        .bind(new.full_name)
        .bind(new.role)
        .bind(new.created_by)
        .bind(created_at)
        .execute(db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn touch_last_login(db: &SqlitePool, id: i64, at: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Change a role only if it still holds the value the caller read
    pub async fn update_role(
        db: &SqlitePool,
        id: i64,
        from: Role,
        to: Role,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ? AND role = ?")
            .bind(to)
            .bind(id)
            .bind(from)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Setting the status a user already has is a successful no-op
    pub async fn set_status(
        db: &SqlitePool,
        id: i64,
        status: UserStatus,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_with_role(db: &SqlitePool, role: Role) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ? AND status = 'active'")
            .bind(role)
            .fetch_one(db)
            .await
    }

    pub async fn stats(db: &SqlitePool) -> Result<UserStats, sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE status = 'active'")
            .fetch_one(db)
            .await?;

        let by_role: Vec<RoleCount> = sqlx::query_as(
            r#"
            SELECT role, COUNT(*) as count
            FROM users
            WHERE status = 'active'
            GROUP BY role
            ORDER BY count DESC, role
            "#,
        )
        .fetch_all(db)
        .await?;

        Ok(UserStats { total, by_role })
    }
}
