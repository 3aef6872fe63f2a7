//! # Tenancy Service
//!
//! Tenant provisioning and per-request context resolution.
//!
//! ## Context Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resolve_context(user_id)                                               │
//! │                                                                         │
//! │  user.current_tenant_id set?                                            │
//! │    ├── yes ─► membership active AND tenant active?                      │
//! │    │            ├── yes ─► RequestContext (fast path)                   │
//! │    │            └── no ──► fall through to fallback                     │
//! │    └── no ──► fallback:                                                 │
//! │                 earliest-joined active membership in an active tenant   │
//! │                   ├── found ─► write back current_tenant_id, context    │
//! │                   └── none ──► clear stale sticky value, Ok(None)       │
//! │                                                                         │
//! │  The sticky value is a CACHE of a valid choice, never an authority:    │
//! │  membership is re-verified on every resolution.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{DbError, EngineResult};
use crate::events::DomainEvent;
use crate::pool::Database;
use crate::repository::new_id;
use meridian_core::rbac::{perm, OWNER_SLUG};
use meridian_core::validation::{slugify, validate_name, validate_slug};
use meridian_core::{CoreError, Membership, RequestContext, Tenant, ValidationError};

/// Tenant provisioning and context resolution.
#[derive(Debug, Clone)]
pub struct TenancyService {
    db: Database,
}

impl TenancyService {
    pub fn new(db: Database) -> Self {
        TenancyService { db }
    }

    /// Creates a tenant and makes `owner_user_id` its owner.
    ///
    /// The slug is derived from the name unless supplied. If the owner has
    /// no sticky tenant yet, the new tenant becomes it.
    pub async fn create_tenant(
        &self,
        name: &str,
        slug: Option<&str>,
        owner_user_id: &str,
    ) -> EngineResult<Tenant> {
        validate_name("name", name).map_err(CoreError::from)?;

        let slug = match slug {
            Some(s) => {
                validate_slug(s).map_err(CoreError::from)?;
                s.to_string()
            }
            None => {
                let derived = slugify(name);
                if derived.is_empty() {
                    return Err(CoreError::from(ValidationError::InvalidFormat {
                        field: "name".to_string(),
                        reason: "yields an empty slug".to_string(),
                    })
                    .into());
                }
                derived
            }
        };

        let repo = self.db.tenants();

        let owner = repo
            .get_user(owner_user_id)
            .await?
            .ok_or_else(|| DbError::not_found("User", owner_user_id))?;
        let owner_role = repo
            .role_by_slug(OWNER_SLUG)
            .await?
            .ok_or_else(|| DbError::not_found("Role", OWNER_SLUG))?;

        let now = Utc::now();
        let tenant = Tenant {
            id: new_id(),
            name: name.to_string(),
            slug: slug.clone(),
            is_active: true,
            subscription_expires_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        repo.insert_tenant(&tenant).await?;

        let membership = Membership {
            id: new_id(),
            tenant_id: tenant.id.clone(),
            user_id: owner_user_id.to_string(),
            role_id: owner_role.id,
            is_active: true,
            invited_at: None,
            joined_at: now,
        };
        repo.insert_membership(&membership).await?;

        if owner.current_tenant_id.is_none() {
            repo.set_current_tenant(owner_user_id, Some(&tenant.id)).await?;
        }

        info!(tenant_id = %tenant.id, slug = %slug, "Tenant created");
        self.db.event_sink().publish(&DomainEvent::TenantCreated {
            tenant_id: tenant.id.clone(),
            slug,
        });

        Ok(tenant)
    }

    /// Resolves the tenant context for a request, re-verifying membership.
    ///
    /// `Ok(None)` means the user has no usable tenant at all; the calling
    /// layer should route them to onboarding rather than error.
    pub async fn resolve_context(&self, user_id: &str) -> EngineResult<Option<RequestContext>> {
        let repo = self.db.tenants();

        let user = repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| DbError::not_found("User", user_id))?;

        // Fast path: the sticky tenant, re-verified.
        if let Some(current) = &user.current_tenant_id {
            let tenant_ok = repo
                .get_tenant(current)
                .await?
                .map(|t| t.is_active)
                .unwrap_or(false);
            if tenant_ok && repo.membership(current, user_id).await?.is_some() {
                debug!(user_id = %user_id, tenant_id = %current, "Resolved sticky tenant");
                return Ok(Some(RequestContext::new(user_id, current.clone())));
            }
        }

        // Fallback: earliest-joined membership still standing.
        let memberships = repo.memberships_for_user(user_id).await?;
        match memberships.first() {
            Some(m) => {
                repo.set_current_tenant(user_id, Some(&m.tenant_id)).await?;
                debug!(user_id = %user_id, tenant_id = %m.tenant_id, "Resolved fallback tenant");
                Ok(Some(RequestContext::new(user_id, m.tenant_id.clone())))
            }
            None => {
                if user.current_tenant_id.is_some() {
                    repo.set_current_tenant(user_id, None).await?;
                }
                Ok(None)
            }
        }
    }

    /// Resolves the full tenant record for a user, with the same sticky and
    /// fallback rules as [`resolve_context`](Self::resolve_context).
    pub async fn resolve_tenant(&self, user_id: &str) -> EngineResult<Option<Tenant>> {
        match self.resolve_context(user_id).await? {
            Some(ctx) => Ok(self.db.tenants().get_tenant(&ctx.tenant_id).await?),
            None => Ok(None),
        }
    }

    /// Switches a user's active tenant. Membership is verified BEFORE the
    /// sticky value is written; a failed switch changes nothing.
    pub async fn switch_tenant(&self, user_id: &str, tenant_id: &str) -> EngineResult<RequestContext> {
        let repo = self.db.tenants();

        let tenant = repo
            .get_tenant(tenant_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.to_string()))?;

        repo.membership(&tenant.id, user_id)
            .await?
            .ok_or_else(|| CoreError::NotMember {
                user_id: user_id.to_string(),
                tenant_id: tenant_id.to_string(),
            })?;

        repo.set_current_tenant(user_id, Some(tenant_id)).await?;

        info!(user_id = %user_id, tenant_id = %tenant_id, "Switched tenant");
        self.db.event_sink().publish(&DomainEvent::TenantSwitched {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
        });

        Ok(RequestContext::new(user_id, tenant_id))
    }

    /// Soft-deletes the context's tenant. Requires `tenant.delete`, which
    /// only owners hold.
    pub async fn deactivate_tenant(&self, ctx: &RequestContext) -> EngineResult<()> {
        self.db.rbac().require(ctx, perm::TENANT_DELETE).await?;
        self.db.tenants().deactivate_tenant(&ctx.tenant_id).await?;

        info!(tenant_id = %ctx.tenant_id, "Tenant deactivated");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::pool::{Database, DbConfig};
    use crate::testutil;

    #[tokio::test]
    async fn test_create_tenant_slugifies_name() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let owner = testutil::seed_user(&db, "owner@example.com").await;

        let tenant = db
            .tenancy()
            .create_tenant("Main Street Store", None, &owner)
            .await
            .unwrap();
        assert_eq!(tenant.slug, "main-street-store");

        // Owner membership exists and sticky context points at the tenant
        let user = db.tenants().get_user(&owner).await.unwrap().unwrap();
        assert_eq!(user.current_tenant_id.as_deref(), Some(tenant.id.as_str()));
        assert_eq!(db.tenants().count_active_owners(&tenant.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resolve_uses_sticky_then_falls_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenancy = db.tenancy();
        let owner = testutil::seed_user(&db, "owner@example.com").await;

        let t1 = tenancy.create_tenant("First Store", None, &owner).await.unwrap();
        let t2 = tenancy.create_tenant("Second Store", None, &owner).await.unwrap();

        // Sticky was set to t1 by the first create and is honored
        let ctx = tenancy.resolve_context(&owner).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id, t1.id);

        // Sticky tenant deactivated: resolution falls back to the earliest
        // remaining membership and writes it back
        db.tenants().deactivate_tenant(&t1.id).await.unwrap();
        let ctx = tenancy.resolve_context(&owner).await.unwrap().unwrap();
        assert_eq!(ctx.tenant_id, t2.id);

        let user = db.tenants().get_user(&owner).await.unwrap().unwrap();
        assert_eq!(user.current_tenant_id.as_deref(), Some(t2.id.as_str()));
    }

    #[tokio::test]
    async fn test_resolve_none_when_no_memberships() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = testutil::seed_user(&db, "nobody@example.com").await;

        let ctx = db.tenancy().resolve_context(&user).await.unwrap();
        assert!(ctx.is_none());
    }

    #[tokio::test]
    async fn test_switch_requires_membership() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenancy = db.tenancy();

        let owner = testutil::seed_user(&db, "owner@example.com").await;
        let outsider = testutil::seed_user(&db, "outsider@example.com").await;
        let tenant = tenancy.create_tenant("Main Store", None, &owner).await.unwrap();

        let err = tenancy.switch_tenant(&outsider, &tenant.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::NotMember { .. })));

        // Failed switch must not have written the sticky value
        let user = db.tenants().get_user(&outsider).await.unwrap().unwrap();
        assert_eq!(user.current_tenant_id, None);

        // Nonexistent tenant is its own error
        let err = tenancy.switch_tenant(&owner, "no-such-tenant").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::TenantNotFound(_))
        ));
    }
}
