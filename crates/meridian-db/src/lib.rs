//! # meridian-db: Database and Engine Layer for Meridian
//!
//! This crate provides database access and the transactional engines for
//! the Meridian multi-tenant retail platform. It uses SQLite for local
//! storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Meridian Data Flow                                │
//! │                                                                         │
//! │  Caller (API handler, CLI, seed binary)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    meridian-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌────────────────┐   ┌──────────────────┐ │   │
//! │  │   │   Database   │   │    Engines     │   │   Repositories   │ │   │
//! │  │   │   (pool.rs)  │   │                │   │                  │ │   │
//! │  │   │              │   │ TenancyService │   │ TenantRepository │ │   │
//! │  │   │ SqlitePool   │◄──│ RbacService    │◄──│ ProductRepository│ │   │
//! │  │   │ EventSink    │   │ StockEngine    │   │ SaleRepository   │ │   │
//! │  │   │              │   │ SalesEngine    │   │                  │ │   │
//! │  │   │              │   │ RegisterEngine │   │   ┌────────────┐ │ │   │
//! │  │   │              │   │ ReturnsEngine  │   │   │ Migrations │ │ │   │
//! │  │   └──────────────┘   └────────────────┘   │   │ (embedded) │ │ │   │
//! │  │                                           │   └────────────┘ │ │   │
//! │  │                                           └──────────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  meridian-core (pure rules: money, totals, rbac, numbering)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, event sink wiring, engine accessors
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and engine error types
//! - [`scope`] - Tenant scoping for repository reads
//! - [`events`] - Domain events published after commit
//! - [`repository`] - Repository implementations (tenant, product, sale)
//! - [`tenancy`] - Tenant provisioning and context resolution
//! - [`rbac`] - Permission checks and membership management
//! - [`stock`] - Stock ledger adjustments
//! - [`sales`] - Sale creation and draft lifecycle
//! - [`register`] - Shifts and cash reconciliation
//! - [`returns`] - Returns and refunds
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/db.sqlite")).await?;
//!
//! let tenant = db.tenancy().create_tenant("Main Store", None, &user_id).await?;
//! let ctx = db.tenancy().resolve_context(&user_id).await?.unwrap();
//! let sale = db.sales().create_sale(&ctx, input).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod events;
pub mod migrations;
pub mod pool;
pub mod rbac;
pub mod register;
pub mod repository;
pub mod returns;
pub mod sales;
pub mod scope;
pub mod stock;
pub mod tenancy;

#[cfg(test)]
pub(crate) mod testutil;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, EngineError, EngineResult};
pub use events::{DomainEvent, EventSink, TracingEventSink};
pub use pool::{Database, DbConfig};
pub use scope::Scope;

// Repository re-exports for convenience
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::tenant::TenantRepository;

// Engine re-exports with their input types
pub use rbac::RbacService;
pub use register::{RegisterEngine, ShiftTotals};
pub use returns::{CreateReturn, ReturnLineInput, ReturnsEngine};
pub use sales::{CreateSale, SaleLineInput, SalesEngine};
pub use stock::StockEngine;
pub use tenancy::TenancyService;
