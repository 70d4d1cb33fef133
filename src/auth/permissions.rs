use super::AuthService;
use crate::db::{Permission, Role};
use crate::Result;

impl AuthService {
    /// Whether `role` holds the named permission.
    ///
    /// The grant table only lists direct grants; a role also holds every
    /// permission granted to a role below it.
    pub async fn user_has_permission(&self, role: Role, name: &str) -> Result<bool> {
        let granted = Permission::granted_roles(&self.db, name).await?;
        Ok(granted.into_iter().any(|g| role.has_at_least(g)))
    }

    /// Effective permission set of a role, including inherited grants
    pub async fn role_permissions(&self, role: Role) -> Result<Vec<Permission>> {
        Ok(Permission::for_roles(&self.db, role.inherited()).await?)
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        Ok(Permission::list_all(&self.db).await?)
    }
}
