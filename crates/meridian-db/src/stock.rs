//! # Stock Engine
//!
//! The stock ledger: every change to a product's stock happens here, as a
//! guarded in-place update plus an append-only movement row, inside one
//! transaction.
//!
//! ## The Guarded Update
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE products                                                        │
//! │     SET current_stock = current_stock + :delta                          │
//! │   WHERE id = :id AND tenant_id = :tenant                                │
//! │     AND track_stock = 1                                                 │
//! │     AND (allow_backorder = 1 OR current_stock + :delta >= 0)            │
//! │                                                                         │
//! │  rows_affected == 0  ⇒  InsufficientStock, transaction rolls back      │
//! │                                                                         │
//! │  The floor check rides INSIDE the UPDATE's WHERE clause, so two        │
//! │  concurrent sales can never both pass a read-then-write check.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Products with `track_stock = false` are a documented no-op: `Ok(None)`,
//! no movement row, no stock change.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::EngineResult;
use crate::events::DomainEvent;
use crate::pool::Database;
use crate::repository::new_id;
use meridian_core::rbac::perm;
use meridian_core::{
    CoreError, LedgerRef, MovementType, RequestContext, StockMovement, ValidationError,
};

/// The fields the adjustment needs before it writes.
#[derive(sqlx::FromRow)]
struct StockRow {
    sku: String,
    track_stock: bool,
    current_stock: i64,
}

/// Stock ledger adjustments.
#[derive(Debug, Clone)]
pub struct StockEngine {
    db: Database,
}

impl StockEngine {
    pub fn new(db: Database) -> Self {
        StockEngine { db }
    }

    /// Manually adjusts a product's stock by `delta` (positive or
    /// negative). Requires `stock.adjust`.
    ///
    /// Returns the ledger entry, or `None` for untracked products.
    pub async fn adjust_stock(
        &self,
        ctx: &RequestContext,
        product_id: &str,
        delta: i64,
    ) -> EngineResult<Option<StockMovement>> {
        self.db.rbac().require(ctx, perm::STOCK_ADJUST).await?;

        if delta == 0 {
            return Err(CoreError::from(ValidationError::InvalidFormat {
                field: "quantity".to_string(),
                reason: "zero adjustment".to_string(),
            })
            .into());
        }

        let mut tx = self.db.pool().begin().await?;
        let movement = apply_adjustment(
            &mut *tx,
            &ctx.tenant_id,
            product_id,
            delta,
            MovementType::Adjustment,
            &LedgerRef::Manual,
            Some(&ctx.principal_id),
        )
        .await?;
        tx.commit().await?;

        if let Some(m) = &movement {
            info!(
                tenant_id = %ctx.tenant_id,
                product_id = %product_id,
                delta = delta,
                new_stock = m.new_stock,
                "Stock adjusted"
            );
            self.db.event_sink().publish(&DomainEvent::StockAdjusted {
                tenant_id: ctx.tenant_id.clone(),
                product_id: product_id.to_string(),
                quantity: delta,
                new_stock: m.new_stock,
            });
        }

        Ok(movement)
    }

    /// Ledger history for a product. Requires `products.view`.
    pub async fn movements(
        &self,
        ctx: &RequestContext,
        product_id: &str,
    ) -> EngineResult<Vec<StockMovement>> {
        self.db.rbac().require(ctx, perm::PRODUCTS_VIEW).await?;
        Ok(self.db.products().movements(&ctx.tenant_id, product_id).await?)
    }
}

/// Applies one stock adjustment inside an open transaction.
///
/// Shared with the sales engine (stock-out per line) and the returns
/// engine (stock-in per returned line); their whole operation rolls back
/// when any line fails here.
pub(crate) async fn apply_adjustment(
    tx: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
    delta: i64,
    movement_type: MovementType,
    ledger_ref: &LedgerRef,
    actor_id: Option<&str>,
) -> EngineResult<Option<StockMovement>> {
    let row = sqlx::query_as::<_, StockRow>(
        r#"
        SELECT sku, track_stock, current_stock FROM products
        WHERE id = ?1 AND tenant_id = ?2 AND is_active = 1
        "#,
    )
    .bind(product_id)
    .bind(tenant_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

    if !row.track_stock {
        debug!(product_id = %product_id, "Untracked product, skipping stock adjustment");
        return Ok(None);
    }

    let now = Utc::now();

    // The floor check lives in the WHERE clause: under SQLite's single
    // writer this is the only stock check that counts.
    let result = sqlx::query(
        r#"
        UPDATE products SET current_stock = current_stock + ?3, updated_at = ?4
        WHERE id = ?1 AND tenant_id = ?2 AND track_stock = 1
          AND (allow_backorder = 1 OR current_stock + ?3 >= 0)
        "#,
    )
    .bind(product_id)
    .bind(tenant_id)
    .bind(delta)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::InsufficientStock {
            sku: row.sku,
            available: row.current_stock,
            requested: -delta,
        }
        .into());
    }

    let movement = StockMovement {
        id: new_id(),
        tenant_id: tenant_id.to_string(),
        product_id: product_id.to_string(),
        movement_type,
        quantity: delta,
        previous_stock: row.current_stock,
        new_stock: row.current_stock + delta,
        reference_type: ledger_ref.kind().to_string(),
        reference_id: ledger_ref.id().map(str::to_string),
        actor_id: actor_id.map(str::to_string),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, tenant_id, product_id, movement_type,
            quantity, previous_stock, new_stock,
            reference_type, reference_id, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.tenant_id)
    .bind(&movement.product_id)
    .bind(movement.movement_type)
    .bind(movement.quantity)
    .bind(movement.previous_stock)
    .bind(movement.new_stock)
    .bind(&movement.reference_type)
    .bind(&movement.reference_id)
    .bind(&movement.actor_id)
    .bind(movement.created_at)
    .execute(&mut *tx)
    .await?;

    Ok(Some(movement))
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
    async fn test_adjustment_writes_ledger_and_cache_together() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let product = testutil::seed_product(&db, &ctx.tenant_id, "COKE-330", 10).await;

        let m = db
            .stock()
            .adjust_stock(&ctx, &product.id, 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.previous_stock, 10);
        assert_eq!(m.new_stock, 15);

        let p = testutil::get_product(&db, &ctx, &product.id).await;
        assert_eq!(p.current_stock, 15);

        // current_stock is the running sum of the ledger, opening row included
        let movements = db.stock().movements(&ctx, &product.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        let sum: i64 = movements.iter().map(|m| m.quantity).sum();
        assert_eq!(p.current_stock, sum);
    }

    #[tokio::test]
    async fn test_floor_is_enforced_without_backorder() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let product = testutil::seed_product(&db, &ctx.tenant_id, "COKE-330", 3).await;

        let err = db.stock().adjust_stock(&ctx, &product.id, -5).await.unwrap_err();
        match err {
            EngineError::Core(CoreError::InsufficientStock {
                sku,
                available,
                requested,
            }) => {
                assert_eq!(sku, "COKE-330");
                assert_eq!(available, 3);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // Nothing changed: only the opening row remains in the ledger
        let p = testutil::get_product(&db, &ctx, &product.id).await;
        assert_eq!(p.current_stock, 3);
        assert_eq!(db.stock().movements(&ctx, &product.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backorder_allows_negative_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let mut product = testutil::product(&ctx.tenant_id, "BACK-1", 100, 50, 2);
        product.allow_backorder = true;
        db.products().insert(&product).await.unwrap();

        let m = db
            .stock()
            .adjust_stock(&ctx, &product.id, -5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.new_stock, -3);
    }

    #[tokio::test]
    async fn test_untracked_product_is_a_noop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let mut product = testutil::product(&ctx.tenant_id, "SVC-1", 5000, 0, 0);
        product.track_stock = false;
        db.products().insert(&product).await.unwrap();

        let m = db.stock().adjust_stock(&ctx, &product.id, -100).await.unwrap();
        assert!(m.is_none());

        let p = testutil::get_product(&db, &ctx, &product.id).await;
        assert_eq!(p.current_stock, 0);
        assert!(db.stock().movements(&ctx, &product.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requires_permission() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (owner_ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let product = testutil::seed_product(&db, &owner_ctx.tenant_id, "COKE-330", 10).await;

        // Cashiers don't hold stock.adjust
        let cashier = testutil::seed_member(&db, &owner_ctx, "cashier@example.com", "cashier").await;
        let err = db.stock().adjust_stock(&cashier, &product.id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::PermissionDenied { .. })
        ));
    }
}
