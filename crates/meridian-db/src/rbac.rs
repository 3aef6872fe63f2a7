//! # Role & Permission Service
//!
//! Resolves a request context to its role and gates every engine operation
//! on a permission key. Membership management (invite, role change,
//! removal) lives here too, because those operations are themselves gated
//! and carry the last-owner safety rule.
//!
//! ## Evaluation Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  has_permission(ctx, key)                                               │
//! │                                                                         │
//! │  no active membership in ctx.tenant_id ──────────────► false            │
//! │  membership found, key not in role's set ────────────► false            │
//! │  membership found, key in role's set ────────────────► true             │
//! │                                                                         │
//! │  Absence of a grant is ALWAYS false, never an error. require() turns   │
//! │  false into CoreError::PermissionDenied and logs the denial.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::events::DomainEvent;
use crate::pool::Database;
use crate::repository::new_id;
use meridian_core::rbac::{ensure_member_removal, ensure_role_change, perm, Role};
use meridian_core::{CoreError, Membership, RequestContext};

/// Permission checks and membership management.
#[derive(Debug, Clone)]
pub struct RbacService {
    db: Database,
}

impl RbacService {
    pub fn new(db: Database) -> Self {
        RbacService { db }
    }

    /// The role the context's principal holds in the context's tenant.
    ///
    /// Errors with [`CoreError::NotMember`] when there is no active
    /// membership; a resolved context should always have one, so this
    /// signals a stale context (e.g. membership revoked mid-session).
    pub async fn role_for(&self, ctx: &RequestContext) -> EngineResult<Role> {
        let repo = self.db.tenants();

        let membership = repo
            .membership(&ctx.tenant_id, &ctx.principal_id)
            .await?
            .ok_or_else(|| CoreError::NotMember {
                user_id: ctx.principal_id.clone(),
                tenant_id: ctx.tenant_id.clone(),
            })?;

        let role = repo.role_by_id(&membership.role_id).await?.ok_or_else(|| {
            // A membership referencing a missing role is a data defect
            crate::error::DbError::not_found("Role", &membership.role_id)
        })?;

        Ok(role)
    }

    /// Whether the principal holds `permission` in the context's tenant.
    /// No membership means `false`, never an error.
    pub async fn has_permission(&self, ctx: &RequestContext, permission: &str) -> EngineResult<bool> {
        match self.role_for(ctx).await {
            Ok(role) => Ok(role.has_permission(permission)),
            Err(EngineError::Core(CoreError::NotMember { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Gate for engine operations: error (and log the denial) unless the
    /// permission is held.
    pub async fn require(&self, ctx: &RequestContext, permission: &str) -> EngineResult<()> {
        if self.has_permission(ctx, permission).await? {
            debug!(
                user_id = %ctx.principal_id,
                tenant_id = %ctx.tenant_id,
                permission = %permission,
                "Permission granted"
            );
            return Ok(());
        }

        self.db.event_sink().publish(&DomainEvent::PermissionDenied {
            tenant_id: ctx.tenant_id.clone(),
            user_id: ctx.principal_id.clone(),
            permission: permission.to_string(),
        });

        Err(CoreError::PermissionDenied {
            permission: permission.to_string(),
        }
        .into())
    }

    // -------------------------------------------------------------------------
    // Membership Management
    // -------------------------------------------------------------------------

    /// Invites a user into the context's tenant with the given role.
    ///
    /// Requires `users.invite`, and the requester must outrank the role
    /// being granted. Duplicate membership surfaces as a UniqueViolation.
    pub async fn invite_member(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        role_slug: &str,
    ) -> EngineResult<Membership> {
        self.require(ctx, perm::USERS_INVITE).await?;

        let repo = self.db.tenants();
        let requester_role = self.role_for(ctx).await?;
        let new_role = repo
            .role_by_slug(role_slug)
            .await?
            .ok_or_else(|| crate::error::DbError::not_found("Role", role_slug))?;

        if !requester_role.can_manage(&new_role) {
            return Err(CoreError::PermissionDenied {
                permission: perm::ROLES_ASSIGN.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let membership = Membership {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            user_id: user_id.to_string(),
            role_id: new_role.id.clone(),
            is_active: true,
            invited_at: Some(now),
            joined_at: now,
        };
        repo.insert_membership(&membership).await?;

        info!(
            tenant_id = %ctx.tenant_id,
            user_id = %user_id,
            role = %role_slug,
            "Member invited"
        );
        self.db.event_sink().publish(&DomainEvent::MemberInvited {
            tenant_id: ctx.tenant_id.clone(),
            user_id: user_id.to_string(),
            role_slug: role_slug.to_string(),
        });

        Ok(membership)
    }

    /// Changes a member's role.
    ///
    /// Requires `roles.assign`; the requester must outrank both the
    /// current and the new role, and the sole owner cannot demote themself.
    pub async fn change_role(
        &self,
        ctx: &RequestContext,
        target_user_id: &str,
        new_role_slug: &str,
    ) -> EngineResult<()> {
        self.require(ctx, perm::ROLES_ASSIGN).await?;

        let repo = self.db.tenants();
        let requester_role = self.role_for(ctx).await?;

        let target = repo
            .membership(&ctx.tenant_id, target_user_id)
            .await?
            .ok_or_else(|| CoreError::NotMember {
                user_id: target_user_id.to_string(),
                tenant_id: ctx.tenant_id.clone(),
            })?;
        let target_role = repo.role_by_id(&target.role_id).await?.ok_or_else(|| {
            crate::error::DbError::not_found("Role", &target.role_id)
        })?;
        let new_role = repo
            .role_by_slug(new_role_slug)
            .await?
            .ok_or_else(|| crate::error::DbError::not_found("Role", new_role_slug))?;

        let owner_count = repo.count_active_owners(&ctx.tenant_id).await?;
        ensure_role_change(
            &ctx.tenant_id,
            &requester_role,
            &target_role,
            &new_role,
            target_user_id == ctx.principal_id,
            owner_count,
        )?;

        repo.update_membership_role(&target.id, &new_role.id).await?;

        info!(
            tenant_id = %ctx.tenant_id,
            user_id = %target_user_id,
            role = %new_role_slug,
            "Member role changed"
        );
        self.db.event_sink().publish(&DomainEvent::MemberRoleChanged {
            tenant_id: ctx.tenant_id.clone(),
            user_id: target_user_id.to_string(),
            role_slug: new_role_slug.to_string(),
        });

        Ok(())
    }

    /// Removes a member from the context's tenant.
    ///
    /// Anyone may leave voluntarily (except the sole owner); removing
    /// someone else requires `users.remove` plus management authority.
    /// If the removed user's sticky context pointed at this tenant, it is
    /// cleared so their next request re-resolves.
    pub async fn remove_member(&self, ctx: &RequestContext, target_user_id: &str) -> EngineResult<()> {
        let is_self = target_user_id == ctx.principal_id;
        if !is_self {
            self.require(ctx, perm::USERS_REMOVE).await?;
        }

        let repo = self.db.tenants();
        let requester_role = self.role_for(ctx).await?;

        let target = repo
            .membership(&ctx.tenant_id, target_user_id)
            .await?
            .ok_or_else(|| CoreError::NotMember {
                user_id: target_user_id.to_string(),
                tenant_id: ctx.tenant_id.clone(),
            })?;
        let target_role = repo.role_by_id(&target.role_id).await?.ok_or_else(|| {
            crate::error::DbError::not_found("Role", &target.role_id)
        })?;

        let owner_count = repo.count_active_owners(&ctx.tenant_id).await?;
        ensure_member_removal(
            &ctx.tenant_id,
            &requester_role,
            &target_role,
            is_self,
            owner_count,
        )?;

        repo.deactivate_membership(&target.id).await?;

        // Stale sticky context would fail resolution anyway; clearing it
        // keeps the next request on the fast path.
        if let Some(user) = repo.get_user(target_user_id).await? {
            if user.current_tenant_id.as_deref() == Some(ctx.tenant_id.as_str()) {
                repo.set_current_tenant(target_user_id, None).await?;
            }
        }

        info!(
            tenant_id = %ctx.tenant_id,
            user_id = %target_user_id,
            "Member removed"
        );
        self.db.event_sink().publish(&DomainEvent::MemberRemoved {
            tenant_id: ctx.tenant_id.clone(),
            user_id: target_user_id.to_string(),
        });

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::testutil;

    #[tokio::test]
    async fn test_non_member_has_no_permissions() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;

        // A user who exists but was never invited
        let stranger = testutil::seed_user(&db, "stranger@example.com").await;
        let stranger_ctx = RequestContext::new(stranger, ctx.tenant_id.clone());

        let rbac = db.rbac();
        // Absence is false, not an error
        assert!(!rbac
            .has_permission(&stranger_ctx, perm::SALES_CREATE)
            .await
            .unwrap());

        let err = rbac.require(&stranger_ctx, perm::SALES_CREATE).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_invite_and_exact_match_permissions() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (owner_ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let rbac = db.rbac();

        let cashier = testutil::seed_user(&db, "cashier@example.com").await;
        rbac.invite_member(&owner_ctx, &cashier, "cashier").await.unwrap();

        let cashier_ctx = RequestContext::new(cashier, owner_ctx.tenant_id.clone());
        assert!(rbac
            .has_permission(&cashier_ctx, perm::SALES_CREATE)
            .await
            .unwrap());
        // Flat keys: sales.create does not imply returns.create
        assert!(!rbac
            .has_permission(&cashier_ctx, perm::RETURNS_CREATE)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cannot_invite_above_own_rank() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (owner_ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let rbac = db.rbac();

        let admin = testutil::seed_user(&db, "admin@example.com").await;
        rbac.invite_member(&owner_ctx, &admin, "admin").await.unwrap();
        let admin_ctx = RequestContext::new(admin, owner_ctx.tenant_id.clone());

        // Admin (80) cannot grant owner (100)
        let target = testutil::seed_user(&db, "target@example.com").await;
        let err = rbac.invite_member(&admin_ctx, &target, "owner").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_last_owner_cannot_demote_or_leave() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (owner_ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let rbac = db.rbac();

        let err = rbac
            .change_role(&owner_ctx, &owner_ctx.principal_id, "viewer")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::LastOwner { .. })));

        let err = rbac
            .remove_member(&owner_ctx, &owner_ctx.principal_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::LastOwner { .. })));

        // With a second owner the same operations succeed
        let co_owner = testutil::seed_user(&db, "co-owner@example.com").await;
        rbac.invite_member(&owner_ctx, &co_owner, "owner").await.unwrap();
        rbac.change_role(&owner_ctx, &owner_ctx.principal_id, "viewer")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_removal_clears_sticky_context() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (owner_ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let rbac = db.rbac();

        let cashier = testutil::seed_user(&db, "cashier@example.com").await;
        rbac.invite_member(&owner_ctx, &cashier, "cashier").await.unwrap();
        db.tenants()
            .set_current_tenant(&cashier, Some(&owner_ctx.tenant_id))
            .await
            .unwrap();

        rbac.remove_member(&owner_ctx, &cashier).await.unwrap();

        let user = db.tenants().get_user(&cashier).await.unwrap().unwrap();
        assert_eq!(user.current_tenant_id, None);
    }
}
