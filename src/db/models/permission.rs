//! Named permissions and their role grants.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use super::user::Role;

/// Permission names used by the route guards
pub mod names {
    pub const APPROVE_UPDATES: &str = "approve_updates";
    pub const VIEW_REPORTS: &str = "view_reports";
    pub const MANAGE_PRAYERS: &str = "manage_prayers";
    pub const IMPORT_PRAYERS: &str = "import_prayers";
    pub const EXPORT_PRAYERS: &str = "export_prayers";
    pub const MANAGE_USERS: &str = "manage_users";
    pub const VIEW_AUDIT_LOG: &str = "view_audit_log";
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: String,
}

impl Permission {
    pub async fn list_all(db: &SqlitePool) -> Result<Vec<Permission>, sqlx::Error> {
        sqlx::query_as("SELECT id, name, description, created_at FROM permissions ORDER BY name")
            .fetch_all(db)
            .await
    }

    /// Roles that were granted the permission directly
    pub async fn granted_roles(db: &SqlitePool, name: &str) -> Result<Vec<Role>, sqlx::Error> {
        sqlx::query_scalar("SELECT role FROM role_permissions WHERE permission_name = ?")
            .bind(name)
            .fetch_all(db)
            .await
    }

    /// Permissions granted to any of the given roles
    pub async fn for_roles(
        db: &SqlitePool,
        roles: impl IntoIterator<Item = Role>,
    ) -> Result<Vec<Permission>, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT DISTINCT p.id, p.name, p.description, p.created_at
            FROM permissions p
            JOIN role_permissions rp ON p.name = rp.permission_name
            WHERE rp.role IN (
            "#,
        );
        let mut separated = query.separated(", ");
        let mut any = false;
        for role in roles {
            separated.push_bind(role);
            any = true;
        }
        if !any {
            return Ok(Vec::new());
        }
        separated.push_unseparated(") ORDER BY p.name");

        query.build_query_as().fetch_all(db).await
    }
}
