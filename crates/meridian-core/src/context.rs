//! # Request Context
//!
//! The explicit per-request context passed into every engine call.
//!
//! The platform this core serves historically relied on ambient state: a
//! framework-global "current user" and a session-stored tenant id. Here
//! that state is a plain value constructed once per request (by the tenant
//! resolver) and threaded through explicitly, which keeps every engine
//! testable without a web framework and makes cross-tenant access
//! impossible to reach by accident.

use serde::{Deserialize, Serialize};

/// The (principal, tenant) pair a request acts as.
///
/// Constructed by `meridian_db::tenancy::TenancyService::resolve_context`
/// after membership verification; never from raw request input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// The authenticated principal.
    pub principal_id: String,
    /// The active tenant, verified to contain a membership for the
    /// principal at resolution time.
    pub tenant_id: String,
}

impl RequestContext {
    pub fn new(principal_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        RequestContext {
            principal_id: principal_id.into(),
            tenant_id: tenant_id.into(),
        }
    }
}
