//! # Sale Repository
//!
//! Read-side database operations for sales, sale items and returns.
//!
//! Writes are deliberately absent: a sale is created, completed or
//! returned only inside `SalesEngine`/`ReturnsEngine` transactions, where
//! stock deductions, number allocation and totals move together.

use sqlx::SqlitePool;

use crate::error::DbResult;
use crate::scope::Scope;
use meridian_core::{Sale, SaleItem, SaleReturn, SaleReturnItem};

/// Repository for sale read operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID under a scope.
    pub async fn get_by_id(&self, scope: &Scope, id: &str) -> DbResult<Option<Sale>> {
        let sale = match scope.tenant_id() {
            Some(tenant_id) => {
                sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1 AND tenant_id = ?2")
                    .bind(id)
                    .bind(tenant_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        Ok(sale)
    }

    /// Gets a sale by its human-facing number within a tenant.
    pub async fn get_by_number(&self, tenant_id: &str, sale_number: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE tenant_id = ?1 AND sale_number = ?2",
        )
        .bind(tenant_id)
        .bind(sale_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets all items for a sale, insertion order.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, id",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Most recent sales of a tenant.
    pub async fn list_recent(&self, tenant_id: &str, limit: i64) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT * FROM sales
            WHERE tenant_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Sales attributed to a shift.
    pub async fn list_for_shift(&self, shift_id: &str) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE shift_id = ?1 ORDER BY created_at",
        )
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Returns issued against a sale, oldest first.
    pub async fn returns_for_sale(&self, sale_id: &str) -> DbResult<Vec<SaleReturn>> {
        let returns = sqlx::query_as::<_, SaleReturn>(
            "SELECT * FROM sale_returns WHERE sale_id = ?1 ORDER BY created_at, id",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(returns)
    }

    /// Lines of one return.
    pub async fn return_items(&self, return_id: &str) -> DbResult<Vec<SaleReturnItem>> {
        let items = sqlx::query_as::<_, SaleReturnItem>(
            "SELECT * FROM sale_return_items WHERE return_id = ?1 ORDER BY created_at, id",
        )
        .bind(return_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Total quantity already returned against one sale item, across all
    /// prior returns. Input to the over-return check.
    pub async fn returned_quantity(&self, sale_item_id: &str) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(quantity) FROM sale_return_items WHERE sale_item_id = ?1",
        )
        .bind(sale_item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }
}
