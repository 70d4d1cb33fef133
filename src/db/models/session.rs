//! Login sessions and password reset tokens.

use sqlx::{FromRow, SqlitePool};

use super::user::User;

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

impl Session {
    pub async fn insert(db: &SqlitePool, session: &Session) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(&session.expires_at)
        .bind(&session.created_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Resolve a session to its user, requiring an unexpired session and an active account
    pub async fn active_user(
        db: &SqlitePool,
        token_hash: &str,
        now: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT u.id, u.username, u.email, u.full_name, u.role, u.status,
                   u.created_by, u.last_login, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ? AND s.expires_at > ? AND u.status = 'active'
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(db)
        .await
    }

    pub async fn delete_by_token_hash(db: &SqlitePool, token_hash: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_for_user(db: &SqlitePool, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_expired(db: &SqlitePool, now: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: String,
    pub used: bool,
    pub created_at: String,
}

impl PasswordResetToken {
    /// Replace every outstanding token of the user with a fresh one
    pub async fn replace_for_user(
        db: &SqlitePool,
        user_id: i64,
        token_hash: &str,
        expires_at: &str,
        created_at: &str,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = db.begin().await?;

        sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "INSERT INTO password_reset_tokens (user_id, token_hash, expires_at, used, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_hash(
        db: &SqlitePool,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, user_id, token_hash, expires_at, used, created_at FROM password_reset_tokens WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(db)
        .await
    }

    pub async fn count_for_user(db: &SqlitePool, user_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM password_reset_tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(db)
            .await
    }

    pub async fn delete_expired(db: &SqlitePool, now: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= ? OR used = 1")
            .bind(now)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }
}
