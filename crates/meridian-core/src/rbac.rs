//! # Role & Permission Engine
//!
//! Pure permission evaluation: a (tenant, principal) pair maps to one role
//! (via a membership row, resolved by meridian-db), and a role maps to a
//! flat permission set evaluated here.
//!
//! ## Authority Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Six Seeded Role Tiers                                │
//! │                                                                         │
//! │  owner      level 100   manages EVERYONE (unconditional)               │
//! │  admin      level  80   ─┐                                             │
//! │  manager    level  60    │  a manages b  ⇔  a.level > b.level          │
//! │  supervisor level  40    │  (strictly greater: equals cannot           │
//! │  cashier    level  20    │   manage each other)                        │
//! │  viewer     level  10   ─┘                                             │
//! │                                                                         │
//! │  Seeded once at provisioning, shared across all tenants.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Flat Permissions, Deliberately No Hierarchy
//! Permission keys are exact strings: holding `products.update` does NOT
//! imply `products.view`, and there are no wildcards. This mirrors the
//! platform's observable authorization behavior and must not be "improved"
//! into an implication lattice.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The unconditionally privileged role slug.
pub const OWNER_SLUG: &str = "owner";

// =============================================================================
// Permission Keys
// =============================================================================

/// The full permission catalog. Keys are flat strings with a
/// `<resource>.<action>` convention; the dot is naming, not hierarchy.
pub mod perm {
    pub const TENANT_VIEW: &str = "tenant.view";
    pub const TENANT_UPDATE: &str = "tenant.update";
    pub const TENANT_DELETE: &str = "tenant.delete";

    pub const USERS_VIEW: &str = "users.view";
    pub const USERS_INVITE: &str = "users.invite";
    pub const USERS_REMOVE: &str = "users.remove";
    pub const ROLES_ASSIGN: &str = "roles.assign";

    pub const PRODUCTS_VIEW: &str = "products.view";
    pub const PRODUCTS_CREATE: &str = "products.create";
    pub const PRODUCTS_UPDATE: &str = "products.update";
    pub const PRODUCTS_DELETE: &str = "products.delete";
    pub const STOCK_ADJUST: &str = "stock.adjust";

    pub const SALES_CREATE: &str = "sales.create";
    pub const SALES_VIEW: &str = "sales.view";
    pub const RETURNS_CREATE: &str = "returns.create";
    pub const RETURNS_VIEW: &str = "returns.view";

    pub const SHIFTS_OPEN: &str = "shifts.open";
    pub const SHIFTS_CLOSE: &str = "shifts.close";
    pub const SHIFTS_CASH_MOVEMENT: &str = "shifts.cash_movement";

    pub const REPORTS_VIEW: &str = "reports.view";

    /// Every key, in catalog order.
    pub const ALL: &[&str] = &[
        TENANT_VIEW,
        TENANT_UPDATE,
        TENANT_DELETE,
        USERS_VIEW,
        USERS_INVITE,
        USERS_REMOVE,
        ROLES_ASSIGN,
        PRODUCTS_VIEW,
        PRODUCTS_CREATE,
        PRODUCTS_UPDATE,
        PRODUCTS_DELETE,
        STOCK_ADJUST,
        SALES_CREATE,
        SALES_VIEW,
        RETURNS_CREATE,
        RETURNS_VIEW,
        SHIFTS_OPEN,
        SHIFTS_CLOSE,
        SHIFTS_CASH_MOVEMENT,
        REPORTS_VIEW,
    ];
}

// =============================================================================
// Role
// =============================================================================

/// A shared role: name, slug, authority level, and a flat permission set.
///
/// The permission set has set semantics: duplicates are harmless and
/// order is irrelevant. It is decoded once from its JSON column at the row
/// boundary (see meridian-db), never re-parsed ad hoc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub slug: String,
    /// Integer total order of authority. Higher outranks lower.
    pub level: i64,
    pub permissions: Vec<String>,
}

impl Role {
    /// Exact string membership check. No wildcards, no implication.
    pub fn has_permission(&self, key: &str) -> bool {
        self.permissions.iter().any(|p| p == key)
    }

    pub fn is_owner(&self) -> bool {
        self.slug == OWNER_SLUG
    }

    /// Whether this role may assign/revoke `other`.
    ///
    /// `owner` manages everyone, including other owners. Otherwise strict
    /// level comparison: equals cannot manage each other.
    pub fn can_manage(&self, other: &Role) -> bool {
        self.is_owner() || self.level > other.level
    }
}

// =============================================================================
// Seeded Role Catalog
// =============================================================================

/// The six fixed tiers, as provisioning seeds them. Stable ids so that
/// memberships can reference roles across environments.
pub fn seeded_roles() -> Vec<Role> {
    use perm::*;

    let role = |id: &str, name: &str, slug: &str, level: i64, perms: &[&str]| Role {
        id: id.to_string(),
        name: name.to_string(),
        slug: slug.to_string(),
        level,
        permissions: perms.iter().map(|p| p.to_string()).collect(),
    };

    vec![
        role("role-owner", "Owner", OWNER_SLUG, 100, ALL),
        role(
            "role-admin",
            "Administrator",
            "admin",
            80,
            &[
                TENANT_VIEW,
                TENANT_UPDATE,
                USERS_VIEW,
                USERS_INVITE,
                USERS_REMOVE,
                ROLES_ASSIGN,
                PRODUCTS_VIEW,
                PRODUCTS_CREATE,
                PRODUCTS_UPDATE,
                PRODUCTS_DELETE,
                STOCK_ADJUST,
                SALES_CREATE,
                SALES_VIEW,
                RETURNS_CREATE,
                RETURNS_VIEW,
                SHIFTS_OPEN,
                SHIFTS_CLOSE,
                SHIFTS_CASH_MOVEMENT,
                REPORTS_VIEW,
            ],
        ),
        role(
            "role-manager",
            "Manager",
            "manager",
            60,
            &[
                TENANT_VIEW,
                USERS_VIEW,
                PRODUCTS_VIEW,
                PRODUCTS_CREATE,
                PRODUCTS_UPDATE,
                STOCK_ADJUST,
                SALES_CREATE,
                SALES_VIEW,
                RETURNS_CREATE,
                RETURNS_VIEW,
                SHIFTS_OPEN,
                SHIFTS_CLOSE,
                SHIFTS_CASH_MOVEMENT,
                REPORTS_VIEW,
            ],
        ),
        role(
            "role-supervisor",
            "Supervisor",
            "supervisor",
            40,
            &[
                TENANT_VIEW,
                PRODUCTS_VIEW,
                SALES_CREATE,
                SALES_VIEW,
                RETURNS_CREATE,
                RETURNS_VIEW,
                SHIFTS_OPEN,
                SHIFTS_CLOSE,
                SHIFTS_CASH_MOVEMENT,
                REPORTS_VIEW,
            ],
        ),
        role(
            "role-cashier",
            "Cashier",
            "cashier",
            20,
            &[
                TENANT_VIEW,
                PRODUCTS_VIEW,
                SALES_CREATE,
                SALES_VIEW,
                SHIFTS_OPEN,
                SHIFTS_CLOSE,
            ],
        ),
        role(
            "role-viewer",
            "Viewer",
            "viewer",
            10,
            &[TENANT_VIEW, PRODUCTS_VIEW, SALES_VIEW, RETURNS_VIEW, REPORTS_VIEW],
        ),
    ]
}

// =============================================================================
// Management Guards
// =============================================================================

/// Validates a role change before it executes.
///
/// The requester must be able to manage BOTH the target's current role and
/// the new role. If the requester is changing their own membership, they
/// hold the tenant's only owner membership, and the new role is not
/// `owner`, the change is rejected with [`CoreError::LastOwner`].
pub fn ensure_role_change(
    tenant_id: &str,
    requester_role: &Role,
    target_current_role: &Role,
    new_role: &Role,
    target_is_requester: bool,
    owner_count: i64,
) -> CoreResult<()> {
    if !requester_role.can_manage(target_current_role) || !requester_role.can_manage(new_role) {
        return Err(CoreError::PermissionDenied {
            permission: perm::ROLES_ASSIGN.to_string(),
        });
    }

    if target_is_requester
        && target_current_role.is_owner()
        && !new_role.is_owner()
        && owner_count <= 1
    {
        return Err(CoreError::LastOwner {
            tenant_id: tenant_id.to_string(),
        });
    }

    Ok(())
}

/// Validates a member removal before it executes. Same last-owner rule as
/// [`ensure_role_change`]: the sole owner cannot remove themself.
pub fn ensure_member_removal(
    tenant_id: &str,
    requester_role: &Role,
    target_role: &Role,
    target_is_requester: bool,
    owner_count: i64,
) -> CoreResult<()> {
    // Leaving a tenant voluntarily is always allowed (except for the last
    // owner); removing someone ELSE requires management authority.
    if !target_is_requester && !requester_role.can_manage(target_role) {
        return Err(CoreError::PermissionDenied {
            permission: perm::USERS_REMOVE.to_string(),
        });
    }

    if target_is_requester && target_role.is_owner() && owner_count <= 1 {
        return Err(CoreError::LastOwner {
            tenant_id: tenant_id.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn role_by_slug(slug: &str) -> Role {
        seeded_roles()
            .into_iter()
            .find(|r| r.slug == slug)
            .expect("seeded role")
    }

    #[test]
    fn test_six_tiers_seeded() {
        let roles = seeded_roles();
        assert_eq!(roles.len(), 6);
        assert_eq!(roles[0].slug, "owner");
        assert_eq!(roles[0].level, 100);
        assert_eq!(roles[5].slug, "viewer");
        assert_eq!(roles[5].level, 10);
    }

    #[test]
    fn test_flat_permissions_no_implication() {
        let manager = role_by_slug("manager");
        assert!(manager.has_permission(perm::PRODUCTS_UPDATE));
        // Exact match only: updating does not imply deleting, and a
        // made-up broader key matches nothing.
        assert!(!manager.has_permission(perm::PRODUCTS_DELETE));
        assert!(!manager.has_permission("products.*"));
        assert!(!manager.has_permission("products"));
    }

    #[test]
    fn test_can_manage_matrix() {
        let owner = role_by_slug("owner");
        let admin = role_by_slug("admin");
        let cashier = role_by_slug("cashier");

        // Owner manages everyone, including other owners
        assert!(owner.can_manage(&owner));
        assert!(owner.can_manage(&admin));

        // Strict level comparison otherwise
        assert!(admin.can_manage(&cashier));
        assert!(!cashier.can_manage(&admin));
        assert!(!admin.can_manage(&admin));
        assert!(!admin.can_manage(&owner));
    }

    #[test]
    fn test_sole_owner_cannot_demote_self() {
        let owner = role_by_slug("owner");
        let cashier = role_by_slug("cashier");

        let err = ensure_role_change("t-1", &owner, &owner, &cashier, true, 1).unwrap_err();
        assert!(matches!(err, CoreError::LastOwner { .. }));
    }

    #[test]
    fn test_co_owner_may_demote_self() {
        let owner = role_by_slug("owner");
        let cashier = role_by_slug("cashier");

        // Two owners: stepping down is fine
        assert!(ensure_role_change("t-1", &owner, &owner, &cashier, true, 2).is_ok());
        // Owner-to-owner self "change" with one owner is also fine
        assert!(ensure_role_change("t-1", &owner, &owner, &owner, true, 1).is_ok());
    }

    #[test]
    fn test_role_change_requires_authority_over_both_roles() {
        let manager = role_by_slug("manager");
        let cashier = role_by_slug("cashier");
        let admin = role_by_slug("admin");

        // Manager can move a cashier to supervisor
        let supervisor = role_by_slug("supervisor");
        assert!(ensure_role_change("t-1", &manager, &cashier, &supervisor, false, 1).is_ok());

        // ...but cannot promote anyone to admin (cannot manage the NEW role)
        let err =
            ensure_role_change("t-1", &manager, &cashier, &admin, false, 1).unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));
    }

    #[test]
    fn test_sole_owner_cannot_remove_self() {
        let owner = role_by_slug("owner");
        let err = ensure_member_removal("t-1", &owner, &owner, true, 1).unwrap_err();
        assert!(matches!(err, CoreError::LastOwner { .. }));

        // With a second owner, leaving is allowed
        assert!(ensure_member_removal("t-1", &owner, &owner, true, 2).is_ok());
    }

    #[test]
    fn test_member_may_leave_voluntarily() {
        let cashier = role_by_slug("cashier");
        // A cashier cannot manage anyone, but can still remove themself
        assert!(ensure_member_removal("t-1", &cashier, &cashier, true, 1).is_ok());
        // ...and cannot remove someone else
        let viewer = role_by_slug("viewer");
        assert!(ensure_member_removal("t-1", &viewer, &cashier, false, 1).is_err());
    }
}
