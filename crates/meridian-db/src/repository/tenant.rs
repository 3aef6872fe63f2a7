//! # Tenant Repository
//!
//! Database operations for tenants, users, memberships and the shared role
//! catalog. Role permission JSON is decoded exactly once, here, at the row
//! boundary; the rest of the system only ever sees `Role`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::rbac::{Role, OWNER_SLUG};
use meridian_core::{Membership, Tenant, User};

/// Raw role row: permissions still JSON-encoded.
#[derive(sqlx::FromRow)]
struct RoleRow {
    id: String,
    name: String,
    slug: String,
    level: i64,
    permissions: String,
}

impl RoleRow {
    fn decode(self) -> DbResult<Role> {
        let permissions: Vec<String> = serde_json::from_str(&self.permissions).map_err(|e| {
            DbError::Internal(format!("corrupt permissions JSON for role {}: {e}", self.id))
        })?;
        Ok(Role {
            id: self.id,
            name: self.name,
            slug: self.slug,
            level: self.level,
            permissions,
        })
    }
}

/// Repository for tenancy-related database operations.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    pool: SqlitePool,
}

impl TenantRepository {
    /// Creates a new TenantRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TenantRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Tenants
    // -------------------------------------------------------------------------

    /// Inserts a tenant.
    pub async fn insert_tenant(&self, tenant: &Tenant) -> DbResult<()> {
        debug!(id = %tenant.id, slug = %tenant.slug, "Inserting tenant");

        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, name, slug, is_active, subscription_expires_at,
                created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.is_active)
        .bind(tenant.subscription_expires_at)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .bind(tenant.deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a tenant by ID. Soft-deleted tenants are invisible.
    pub async fn get_tenant(&self, id: &str) -> DbResult<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    /// Gets a tenant by slug.
    pub async fn get_tenant_by_slug(&self, slug: &str) -> DbResult<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE slug = ?1 AND deleted_at IS NULL",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    /// Soft-deletes a tenant: deactivated and stamped, never removed.
    pub async fn deactivate_tenant(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE tenants SET is_active = 0, deleted_at = ?2, updated_at = ?2
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Tenant", id));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// Inserts a user.
    pub async fn insert_user(&self, user: &User) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, display_name, current_tenant_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.current_tenant_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a user by ID.
    pub async fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Gets a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Writes back the user's sticky tenant context.
    pub async fn set_current_tenant(&self, user_id: &str, tenant_id: Option<&str>) -> DbResult<()> {
        let now = Utc::now();

        let result =
            sqlx::query("UPDATE users SET current_tenant_id = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(user_id)
                .bind(tenant_id)
                .bind(now)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", user_id));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Memberships
    // -------------------------------------------------------------------------

    /// Inserts a membership. The (tenant_id, user_id) UNIQUE constraint
    /// rejects a second membership for the same pair.
    pub async fn insert_membership(&self, membership: &Membership) -> DbResult<()> {
        debug!(
            tenant_id = %membership.tenant_id,
            user_id = %membership.user_id,
            role_id = %membership.role_id,
            "Inserting membership"
        );

        sqlx::query(
            r#"
            INSERT INTO memberships (
                id, tenant_id, user_id, role_id, is_active, invited_at, joined_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&membership.id)
        .bind(&membership.tenant_id)
        .bind(&membership.user_id)
        .bind(&membership.role_id)
        .bind(membership.is_active)
        .bind(membership.invited_at)
        .bind(membership.joined_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the active membership of a user in a tenant, if any.
    pub async fn membership(&self, tenant_id: &str, user_id: &str) -> DbResult<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT * FROM memberships
            WHERE tenant_id = ?1 AND user_id = ?2 AND is_active = 1
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    /// All active memberships of a user, earliest joined first. Order
    /// matters: the tenant resolver falls back to the first one.
    pub async fn memberships_for_user(&self, user_id: &str) -> DbResult<Vec<Membership>> {
        let memberships = sqlx::query_as::<_, Membership>(
            r#"
            SELECT m.* FROM memberships m
            JOIN tenants t ON t.id = m.tenant_id
            WHERE m.user_id = ?1 AND m.is_active = 1
              AND t.is_active = 1 AND t.deleted_at IS NULL
            ORDER BY m.joined_at, m.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(memberships)
    }

    /// Changes the role on a membership.
    pub async fn update_membership_role(&self, membership_id: &str, role_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE memberships SET role_id = ?2 WHERE id = ?1")
            .bind(membership_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Membership", membership_id));
        }

        Ok(())
    }

    /// Deactivates a membership (removal is a soft operation).
    pub async fn deactivate_membership(&self, membership_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE memberships SET is_active = 0 WHERE id = ?1")
            .bind(membership_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Membership", membership_id));
        }

        Ok(())
    }

    /// Counts active owner memberships in a tenant. Input to the
    /// last-owner guard.
    pub async fn count_active_owners(&self, tenant_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM memberships m
            JOIN roles r ON r.id = m.role_id
            WHERE m.tenant_id = ?1 AND m.is_active = 1 AND r.slug = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(OWNER_SLUG)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Roles
    // -------------------------------------------------------------------------

    /// Gets a role by ID, permissions decoded.
    pub async fn role_by_id(&self, id: &str) -> DbResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>("SELECT * FROM roles WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(RoleRow::decode).transpose()
    }

    /// Gets a role by slug.
    pub async fn role_by_slug(&self, slug: &str) -> DbResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>("SELECT * FROM roles WHERE slug = ?1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.map(RoleRow::decode).transpose()
    }

    /// All roles, highest authority first.
    pub async fn all_roles(&self) -> DbResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>("SELECT * FROM roles ORDER BY level DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RoleRow::decode).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use meridian_core::rbac::seeded_roles;

    #[tokio::test]
    async fn test_seeded_roles_match_code_catalog() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stored = db.tenants().all_roles().await.unwrap();

        let mut expected = seeded_roles();
        expected.sort_by(|a, b| b.level.cmp(&a.level));

        assert_eq!(stored.len(), expected.len());
        for (s, e) in stored.iter().zip(expected.iter()) {
            assert_eq!(s.id, e.id);
            assert_eq!(s.slug, e.slug);
            assert_eq!(s.level, e.level);
            assert_eq!(s.permissions, e.permissions, "role {}", s.slug);
        }
    }

    #[tokio::test]
    async fn test_membership_uniqueness() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.tenants();
        let now = Utc::now();

        let tenant = Tenant {
            id: "t-1".into(),
            name: "Main Store".into(),
            slug: "main-store".into(),
            is_active: true,
            subscription_expires_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        repo.insert_tenant(&tenant).await.unwrap();

        let user = User {
            id: "u-1".into(),
            email: "owner@example.com".into(),
            display_name: "Owner".into(),
            current_tenant_id: None,
            created_at: now,
            updated_at: now,
        };
        repo.insert_user(&user).await.unwrap();

        let membership = Membership {
            id: "m-1".into(),
            tenant_id: "t-1".into(),
            user_id: "u-1".into(),
            role_id: "role-owner".into(),
            is_active: true,
            invited_at: None,
            joined_at: now,
        };
        repo.insert_membership(&membership).await.unwrap();

        // Same (tenant, user) pair again must hit the UNIQUE constraint
        let dup = Membership {
            id: "m-2".into(),
            role_id: "role-cashier".into(),
            ..membership
        };
        let err = repo.insert_membership(&dup).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        assert_eq!(repo.count_active_owners("t-1").await.unwrap(), 1);
    }
}
