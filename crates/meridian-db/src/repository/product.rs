//! # Product Repository
//!
//! Database operations for products and reads over the stock ledger.
//! After creation, stock WRITES go through `StockEngine`, never through
//! here: the ledger row and the cached `current_stock` must move together
//! in one transaction. `insert` itself opens the ledger with an initial
//! row when a tracked product starts with stock on hand.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::new_id;
use crate::scope::Scope;
use meridian_core::{LedgerRef, MovementType, Product, StockMovement};

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product. The (tenant_id, sku) UNIQUE constraint rejects
    /// duplicate SKUs within a tenant.
    ///
    /// A tracked product created with nonzero stock gets an opening ledger
    /// row in the same transaction, so `current_stock` is the ledger sum
    /// from the first moment the product exists.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, sku, barcode, name, description,
                price_cents, cost_cents, tax_rate_bps,
                track_stock, allow_backorder, current_stock, min_stock, max_stock,
                is_active, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17
            )
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.tax_rate_bps)
        .bind(product.track_stock)
        .bind(product.allow_backorder)
        .bind(product.current_stock)
        .bind(product.min_stock)
        .bind(product.max_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        if product.track_stock && product.current_stock != 0 {
            let movement = StockMovement {
                id: new_id(),
                tenant_id: product.tenant_id.clone(),
                product_id: product.id.clone(),
                movement_type: MovementType::In,
                quantity: product.current_stock,
                previous_stock: 0,
                new_stock: product.current_stock,
                reference_type: LedgerRef::Manual.kind().to_string(),
                reference_id: None,
                actor_id: None,
                created_at: product.created_at,
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
        }

        tx.commit().await?;

        Ok(())
    }

    /// Gets a product by ID under a scope. Another tenant's product is
    /// `None`, same as a nonexistent one.
    pub async fn get_by_id(&self, scope: &Scope, id: &str) -> DbResult<Option<Product>> {
        let product = match scope.tenant_id() {
            Some(tenant_id) => {
                sqlx::query_as::<_, Product>(
                    "SELECT * FROM products WHERE id = ?1 AND tenant_id = ?2",
                )
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        Ok(product)
    }

    /// Gets an active product by SKU within a tenant.
    pub async fn get_by_sku(&self, tenant_id: &str, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE tenant_id = ?1 AND sku = ?2 AND is_active = 1",
        )
        .bind(tenant_id)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists active products of a tenant, name order.
    pub async fn list(&self, tenant_id: &str, limit: i64) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE tenant_id = ?1 AND is_active = 1
            ORDER BY name
            LIMIT ?2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Products at or below their minimum stock level.
    pub async fn low_stock(&self, tenant_id: &str) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE tenant_id = ?1 AND is_active = 1
              AND track_stock = 1 AND current_stock <= min_stock
            ORDER BY current_stock - min_stock
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Updates the editable fields of a product. Stock fields are NOT
    /// touched here; those belong to the stock engine.
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku = ?3, barcode = ?4, name = ?5, description = ?6,
                price_cents = ?7, cost_cents = ?8, tax_rate_bps = ?9,
                track_stock = ?10, allow_backorder = ?11,
                min_stock = ?12, max_stock = ?13,
                updated_at = ?14
            WHERE id = ?1 AND tenant_id = ?2
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.tax_rate_bps)
        .bind(product.track_stock)
        .bind(product.allow_backorder)
        .bind(product.min_stock)
        .bind(product.max_stock)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Soft-deletes a product. Sold products stay referenced by sale item
    /// snapshots, so rows are never removed.
    pub async fn soft_delete(&self, tenant_id: &str, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?3 WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Ledger history for a product, oldest first.
    pub async fn movements(&self, tenant_id: &str, product_id: &str) -> DbResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT * FROM stock_movements
            WHERE tenant_id = ?1 AND product_id = ?2
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
