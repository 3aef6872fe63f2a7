//! # Query Scope
//!
//! Every read against tenant-owned tables carries a [`Scope`]. The default
//! scope is a single tenant taken from a verified
//! [`meridian_core::RequestContext`]; the cross-tenant scope exists only
//! for platform administration and has to be constructed explicitly by
//! name, so it can't be reached from request data.
//!
//! ## The Isolation Rule
//! A lookup of an id that exists but belongs to another tenant behaves
//! exactly like a lookup of an id that doesn't exist at all: `None` (or
//! NotFound), never a permission error. Leaking "exists elsewhere" would
//! let one tenant probe another's data.

use meridian_core::RequestContext;

/// The tenant partition a query is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Rows of exactly one tenant. The normal case.
    Tenant(String),
    /// All rows. Platform administration and migrations only.
    CrossTenant,
}

impl Scope {
    /// Scope for a resolved request: its tenant, nothing else.
    pub fn for_context(ctx: &RequestContext) -> Self {
        Scope::Tenant(ctx.tenant_id.clone())
    }

    /// The explicit escape hatch. The long name is the point: this should
    /// look alarming at a call site.
    pub fn cross_tenant_admin() -> Self {
        Scope::CrossTenant
    }

    /// The tenant filter to apply, if any.
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Scope::Tenant(id) => Some(id),
            Scope::CrossTenant => None,
        }
    }

    /// Whether a row owned by `tenant_id` is visible under this scope.
    pub fn permits(&self, tenant_id: &str) -> bool {
        match self {
            Scope::Tenant(id) => id == tenant_id,
            Scope::CrossTenant => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_scope_permits_only_its_tenant() {
        let ctx = RequestContext::new("u-1", "t-1");
        let scope = Scope::for_context(&ctx);

        assert_eq!(scope.tenant_id(), Some("t-1"));
        assert!(scope.permits("t-1"));
        assert!(!scope.permits("t-2"));
    }

    #[test]
    fn test_cross_tenant_scope_permits_everything() {
        let scope = Scope::cross_tenant_admin();
        assert_eq!(scope.tenant_id(), None);
        assert!(scope.permits("t-1"));
        assert!(scope.permits("t-2"));
    }
}
