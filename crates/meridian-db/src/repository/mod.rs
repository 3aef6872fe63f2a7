//! # Repository Layer
//!
//! Plain reads and writes against single tables. Anything that needs a
//! transaction across tables lives in an engine (`tenancy`, `stock`,
//! `sales`, `register`, `returns`), not here.
//!
//! Every query against a tenant-owned table filters by tenant id; a row
//! that belongs to another tenant is indistinguishable from a row that
//! doesn't exist.

pub mod product;
pub mod sale;
pub mod tenant;

use uuid::Uuid;

/// Generates a fresh UUID v4 entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
