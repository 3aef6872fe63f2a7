//! # Sales Engine
//!
//! Sale creation and lifecycle. A completed sale is one atomic unit:
//! number allocation, item snapshots, totals and stock deductions either
//! all commit or none do.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  ONE-SHOT (the POS hot path)                                            │
//! │     └── create_sale() ──► Completed sale, stock deducted, one tx        │
//! │                                                                         │
//! │  DRAFT FLOW (held carts)                                                │
//! │     └── create_draft()   ──► Sale { status: Draft }, number allocated   │
//! │     └── add_item() × N   ──► items snapshotted, totals recomputed       │
//! │         (stock is NOT touched while drafting)                           │
//! │     └── complete_sale()  ──► stock deducted per line, status Completed  │
//! │                                                                         │
//! │  Any stock failure on any line rolls back the entire sale.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Number Allocation
//! `SALE-<year>-NNNNNN`, per tenant per year. MAX(sale_number) under the
//! year prefix, +1, insert; a concurrent writer taking the same number
//! trips the UNIQUE constraint and the whole attempt retries, up to
//! [`MAX_SEQUENCE_RETRIES`] times.

use chrono::{Datelike, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{DbError, EngineError, EngineResult};
use crate::events::DomainEvent;
use crate::pool::Database;
use crate::repository::new_id;
use crate::scope::Scope;
use crate::stock::apply_adjustment;
use meridian_core::rbac::perm;
use meridian_core::totals::{compute_line, compute_totals, LineInput};
use meridian_core::validation::{validate_discount_cents, validate_quantity};
use meridian_core::{
    numbering, CoreError, LedgerRef, Money, MovementType, PaymentMethod, RequestContext, Sale,
    SaleItem, SaleStatus, TaxRate, ValidationError, MAX_SALE_ITEMS, MAX_SEQUENCE_RETRIES,
};

/// One requested sale line.
#[derive(Debug, Clone)]
pub struct SaleLineInput {
    pub product_id: String,
    pub quantity: i64,
    /// Absolute discount on the whole line, in cents. Applied before tax.
    pub discount_cents: i64,
}

/// Input for a one-shot completed sale.
#[derive(Debug, Clone)]
pub struct CreateSale {
    pub items: Vec<SaleLineInput>,
    pub payment_method: PaymentMethod,
    /// Sale-level discount in cents, applied after tax.
    pub discount_cents: i64,
    /// Register session to attribute the sale to, if any.
    pub shift_id: Option<String>,
    pub notes: Option<String>,
}

/// The product fields a sale line snapshots.
#[derive(sqlx::FromRow)]
struct ProductSnap {
    id: String,
    sku: String,
    name: String,
    price_cents: i64,
    cost_cents: i64,
    tax_rate_bps: u32,
}

/// Sale creation and lifecycle.
#[derive(Debug, Clone)]
pub struct SalesEngine {
    db: Database,
}

impl SalesEngine {
    pub fn new(db: Database) -> Self {
        SalesEngine { db }
    }

    // -------------------------------------------------------------------------
    // One-shot sale
    // -------------------------------------------------------------------------

    /// Creates a completed sale in one transaction: allocates the number,
    /// snapshots every line, deducts stock and persists totals.
    /// Requires `sales.create`.
    pub async fn create_sale(&self, ctx: &RequestContext, input: CreateSale) -> EngineResult<Sale> {
        self.db.rbac().require(ctx, perm::SALES_CREATE).await?;
        validate_items(&input.items)?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_create_sale(ctx, &input).await {
                Ok(sale) => {
                    info!(
                        tenant_id = %ctx.tenant_id,
                        sale_id = %sale.id,
                        sale_number = %sale.sale_number,
                        total_cents = sale.total_cents,
                        "Sale completed"
                    );
                    self.db.event_sink().publish(&DomainEvent::SaleCompleted {
                        tenant_id: ctx.tenant_id.clone(),
                        sale_id: sale.id.clone(),
                        sale_number: sale.sale_number.clone(),
                        total_cents: sale.total_cents,
                    });
                    return Ok(sale);
                }
                Err(EngineError::Db(e))
                    if e.is_unique_violation_on("sale_number") && attempts < MAX_SEQUENCE_RETRIES =>
                {
                    debug!(attempt = attempts, "Sale number collision, retrying");
                }
                Err(EngineError::Db(e)) if e.is_unique_violation_on("sale_number") => {
                    return Err(CoreError::SequenceConflict {
                        prefix: numbering::sale_prefix(Utc::now().year()),
                        attempts,
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_create_sale(&self, ctx: &RequestContext, input: &CreateSale) -> EngineResult<Sale> {
        let mut tx = self.db.pool().begin().await?;
        let now = Utc::now();

        if let Some(shift_id) = &input.shift_id {
            ensure_shift_open(&mut tx, &ctx.tenant_id, shift_id).await?;
        }

        let sale_number = allocate_sale_number(&mut tx, &ctx.tenant_id).await?;
        let sale_id = new_id();

        // Snapshot and price every line before writing anything.
        let mut items = Vec::with_capacity(input.items.len());
        let mut lines = Vec::with_capacity(input.items.len());
        for line in &input.items {
            let (item, amounts) =
                build_item(&mut tx, &ctx.tenant_id, &sale_id, line, now).await?;
            items.push(item);
            lines.push(amounts);
        }

        let subtotal_so_far: i64 = items.iter().map(|i| i.line_total_cents).sum();
        validate_discount_cents("discount_cents", input.discount_cents, subtotal_so_far)
            .map_err(CoreError::from)?;
        let totals = compute_totals(&lines, Money::from_cents(input.discount_cents));

        let sale = Sale {
            id: sale_id,
            tenant_id: ctx.tenant_id.clone(),
            sale_number,
            status: SaleStatus::Completed,
            payment_method: input.payment_method,
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax_amount.cents(),
            discount_cents: totals.discount_amount.cents(),
            total_cents: totals.total.cents(),
            total_cost_cents: totals.total_cost.cents(),
            total_profit_cents: totals.profit.cents(),
            profit_margin_bps: totals.profit_margin_bps,
            shift_id: input.shift_id.clone(),
            cashier_id: ctx.principal_id.clone(),
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
        };
        insert_sale(&mut tx, &sale).await?;

        for item in &items {
            insert_item(&mut tx, item).await?;
            apply_adjustment(
                &mut tx,
                &ctx.tenant_id,
                &item.product_id,
                -item.quantity,
                MovementType::Out,
                &LedgerRef::Sale(sale.id.clone()),
                Some(&ctx.principal_id),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(sale)
    }

    // -------------------------------------------------------------------------
    // Draft flow
    // -------------------------------------------------------------------------

    /// Creates an empty draft sale (a held cart). The number is allocated
    /// up front so receipts can reference it. Requires `sales.create`.
    pub async fn create_draft(
        &self,
        ctx: &RequestContext,
        payment_method: PaymentMethod,
        shift_id: Option<String>,
    ) -> EngineResult<Sale> {
        self.db.rbac().require(ctx, perm::SALES_CREATE).await?;

        let mut attempts = 0;
        loop {
            attempts += 1;

            let mut tx = self.db.pool().begin().await?;
            let now = Utc::now();
            if let Some(sid) = &shift_id {
                ensure_shift_open(&mut tx, &ctx.tenant_id, sid).await?;
            }
            let sale_number = allocate_sale_number(&mut tx, &ctx.tenant_id).await?;

            let sale = Sale {
                id: new_id(),
                tenant_id: ctx.tenant_id.clone(),
                sale_number,
                status: SaleStatus::Draft,
                payment_method,
                subtotal_cents: 0,
                tax_cents: 0,
                discount_cents: 0,
                total_cents: 0,
                total_cost_cents: 0,
                total_profit_cents: 0,
                profit_margin_bps: 0,
                shift_id: shift_id.clone(),
                cashier_id: ctx.principal_id.clone(),
                notes: None,
                created_at: now,
                updated_at: now,
                completed_at: None,
            };

            match insert_sale(&mut tx, &sale).await {
                Ok(()) => {
                    tx.commit().await?;
                    debug!(sale_id = %sale.id, sale_number = %sale.sale_number, "Draft created");
                    return Ok(sale);
                }
                Err(EngineError::Db(e))
                    if e.is_unique_violation_on("sale_number") && attempts < MAX_SEQUENCE_RETRIES => {}
                Err(EngineError::Db(e)) if e.is_unique_violation_on("sale_number") => {
                    return Err(CoreError::SequenceConflict {
                        prefix: numbering::sale_prefix(Utc::now().year()),
                        attempts,
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Adds a line to a draft sale and recomputes its totals. Stock is not
    /// touched until completion. Requires `sales.create`.
    pub async fn add_item(
        &self,
        ctx: &RequestContext,
        sale_id: &str,
        line: SaleLineInput,
    ) -> EngineResult<SaleItem> {
        self.db.rbac().require(ctx, perm::SALES_CREATE).await?;

        let mut tx = self.db.pool().begin().await?;
        let now = Utc::now();

        let sale = fetch_sale(&mut tx, &ctx.tenant_id, sale_id).await?;
        if sale.status != SaleStatus::Draft {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale_id.to_string(),
                current_status: sale.status.as_str().to_string(),
            }
            .into());
        }

        let item_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sale_items WHERE sale_id = ?1")
                .bind(sale_id)
                .fetch_one(&mut *tx)
                .await?;
        if item_count as usize >= MAX_SALE_ITEMS {
            return Err(CoreError::from(ValidationError::OutOfRange {
                field: "items".to_string(),
                min: 1,
                max: MAX_SALE_ITEMS as i64,
            })
            .into());
        }

        let (item, _) = build_item(&mut tx, &ctx.tenant_id, sale_id, &line, now).await?;
        insert_item(&mut tx, &item).await?;
        recompute_draft_totals(&mut tx, &sale).await?;

        tx.commit().await?;
        Ok(item)
    }

    /// Completes a draft: deducts stock per line and freezes the sale.
    /// Requires `sales.create`.
    pub async fn complete_sale(&self, ctx: &RequestContext, sale_id: &str) -> EngineResult<Sale> {
        self.db.rbac().require(ctx, perm::SALES_CREATE).await?;

        let mut tx = self.db.pool().begin().await?;
        let now = Utc::now();

        let sale = fetch_sale(&mut tx, &ctx.tenant_id, sale_id).await?;
        if sale.status != SaleStatus::Draft {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale_id.to_string(),
                current_status: sale.status.as_str().to_string(),
            }
            .into());
        }
        if let Some(shift_id) = &sale.shift_id {
            ensure_shift_open(&mut tx, &ctx.tenant_id, shift_id).await?;
        }

        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, id",
        )
        .bind(sale_id)
        .fetch_all(&mut *tx)
        .await?;

        for item in &items {
            apply_adjustment(
                &mut tx,
                &ctx.tenant_id,
                &item.product_id,
                -item.quantity,
                MovementType::Out,
                &LedgerRef::Sale(sale.id.clone()),
                Some(&ctx.principal_id),
            )
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE sales SET status = 'completed', completed_at = ?2, updated_at = ?2
            WHERE id = ?1 AND status = 'draft'
            "#,
        )
        .bind(sale_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let completed = self
            .db
            .sales_repo()
            .get_by_id(&Scope::for_context(ctx), sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

        info!(
            tenant_id = %ctx.tenant_id,
            sale_id = %sale_id,
            sale_number = %completed.sale_number,
            "Sale completed"
        );
        self.db.event_sink().publish(&DomainEvent::SaleCompleted {
            tenant_id: ctx.tenant_id.clone(),
            sale_id: completed.id.clone(),
            sale_number: completed.sale_number.clone(),
            total_cents: completed.total_cents,
        });

        Ok(completed)
    }

    /// Gets a sale and its items. Requires `sales.view`.
    pub async fn get_sale(
        &self,
        ctx: &RequestContext,
        sale_id: &str,
    ) -> EngineResult<Option<(Sale, Vec<SaleItem>)>> {
        self.db.rbac().require(ctx, perm::SALES_VIEW).await?;

        let repo = self.db.sales_repo();
        match repo.get_by_id(&Scope::for_context(ctx), sale_id).await? {
            Some(sale) => {
                let items = repo.get_items(&sale.id).await?;
                Ok(Some((sale, items)))
            }
            None => Ok(None),
        }
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

fn validate_items(items: &[SaleLineInput]) -> EngineResult<()> {
    if items.is_empty() {
        return Err(CoreError::from(ValidationError::Required {
            field: "items".to_string(),
        })
        .into());
    }
    if items.len() > MAX_SALE_ITEMS {
        return Err(CoreError::from(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_ITEMS as i64,
        })
        .into());
    }
    Ok(())
}

/// Allocates the next sale number for the tenant's current year.
async fn allocate_sale_number(tx: &mut SqliteConnection, tenant_id: &str) -> EngineResult<String> {
    let now = Utc::now();
    let prefix = numbering::sale_prefix(now.year());

    // Zero-padded tails make the lexicographic MAX the numeric MAX.
    let current_max: Option<String> = sqlx::query_scalar(
        "SELECT MAX(sale_number) FROM sales WHERE tenant_id = ?1 AND sale_number LIKE ?2",
    )
    .bind(tenant_id)
    .bind(format!("{prefix}%"))
    .fetch_one(&mut *tx)
    .await?;

    let seq = numbering::next_sequence(current_max.as_deref());
    Ok(numbering::sale_number(now.year(), seq))
}

/// Errors unless the shift exists in this tenant and is open.
pub(crate) async fn ensure_shift_open(
    tx: &mut SqliteConnection,
    tenant_id: &str,
    shift_id: &str,
) -> EngineResult<()> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM shifts WHERE id = ?1 AND tenant_id = ?2")
            .bind(shift_id)
            .bind(tenant_id)
            .fetch_optional(&mut *tx)
            .await?;

    match status.as_deref() {
        Some("open") => Ok(()),
        Some(_) => Err(CoreError::ShiftClosed {
            shift_id: shift_id.to_string(),
        }
        .into()),
        None => Err(CoreError::ShiftNotFound(shift_id.to_string()).into()),
    }
}

/// Snapshots the product and prices one line.
async fn build_item(
    tx: &mut SqliteConnection,
    tenant_id: &str,
    sale_id: &str,
    line: &SaleLineInput,
    now: chrono::DateTime<Utc>,
) -> EngineResult<(SaleItem, meridian_core::totals::LineAmounts)> {
    validate_quantity(line.quantity).map_err(CoreError::from)?;

    let product = sqlx::query_as::<_, ProductSnap>(
        r#"
        SELECT id, sku, name, price_cents, cost_cents, tax_rate_bps FROM products
        WHERE id = ?1 AND tenant_id = ?2 AND is_active = 1
        "#,
    )
    .bind(&line.product_id)
    .bind(tenant_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;

    let gross = product.price_cents * line.quantity;
    validate_discount_cents("discount_cents", line.discount_cents, gross)
        .map_err(CoreError::from)?;

    let amounts = compute_line(&LineInput {
        unit_price: Money::from_cents(product.price_cents),
        unit_cost: Money::from_cents(product.cost_cents),
        quantity: line.quantity,
        discount: Money::from_cents(line.discount_cents),
        tax_rate: TaxRate::from_bps(product.tax_rate_bps),
    });

    let item = SaleItem {
        id: new_id(),
        sale_id: sale_id.to_string(),
        product_id: product.id,
        sku_snapshot: product.sku,
        name_snapshot: product.name,
        quantity: line.quantity,
        unit_price_cents: product.price_cents,
        unit_cost_cents: product.cost_cents,
        discount_cents: line.discount_cents,
        tax_rate_bps: product.tax_rate_bps,
        line_total_cents: amounts.line_total.cents(),
        line_cost_cents: amounts.line_cost.cents(),
        line_profit_cents: (amounts.line_total - amounts.line_cost).cents(),
        tax_cents: amounts.tax.cents(),
        created_at: now,
    };

    Ok((item, amounts))
}

async fn insert_sale(tx: &mut SqliteConnection, sale: &Sale) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sales (
            id, tenant_id, sale_number, status, payment_method,
            subtotal_cents, tax_cents, discount_cents, total_cents,
            total_cost_cents, total_profit_cents, profit_margin_bps,
            shift_id, cashier_id, notes,
            created_at, updated_at, completed_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9,
            ?10, ?11, ?12,
            ?13, ?14, ?15,
            ?16, ?17, ?18
        )
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.tenant_id)
    .bind(&sale.sale_number)
    .bind(sale.status)
    .bind(sale.payment_method)
    .bind(sale.subtotal_cents)
    .bind(sale.tax_cents)
    .bind(sale.discount_cents)
    .bind(sale.total_cents)
    .bind(sale.total_cost_cents)
    .bind(sale.total_profit_cents)
    .bind(sale.profit_margin_bps)
    .bind(&sale.shift_id)
    .bind(&sale.cashier_id)
    .bind(&sale.notes)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .bind(sale.completed_at)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

async fn insert_item(tx: &mut SqliteConnection, item: &SaleItem) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, product_id, sku_snapshot, name_snapshot,
            quantity, unit_price_cents, unit_cost_cents, discount_cents, tax_rate_bps,
            line_total_cents, line_cost_cents, line_profit_cents, tax_cents,
            created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14,
            ?15
        )
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(&item.sku_snapshot)
    .bind(&item.name_snapshot)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.unit_cost_cents)
    .bind(item.discount_cents)
    .bind(item.tax_rate_bps)
    .bind(item.line_total_cents)
    .bind(item.line_cost_cents)
    .bind(item.line_profit_cents)
    .bind(item.tax_cents)
    .bind(item.created_at)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

async fn fetch_sale(tx: &mut SqliteConnection, tenant_id: &str, sale_id: &str) -> EngineResult<Sale> {
    sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1 AND tenant_id = ?2")
        .bind(sale_id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()).into())
}

/// Re-derives a draft's totals from its item rows.
async fn recompute_draft_totals(tx: &mut SqliteConnection, sale: &Sale) -> EngineResult<()> {
    #[derive(sqlx::FromRow)]
    struct Sums {
        subtotal: Option<i64>,
        tax: Option<i64>,
        cost: Option<i64>,
    }

    let sums = sqlx::query_as::<_, Sums>(
        r#"
        SELECT SUM(line_total_cents) AS subtotal,
               SUM(tax_cents) AS tax,
               SUM(line_cost_cents) AS cost
        FROM sale_items WHERE sale_id = ?1
        "#,
    )
    .bind(&sale.id)
    .fetch_one(&mut *tx)
    .await?;

    let subtotal = Money::from_cents(sums.subtotal.unwrap_or(0));
    let total = subtotal - Money::from_cents(sale.discount_cents);
    let cost = Money::from_cents(sums.cost.unwrap_or(0));
    let profit = total - cost;
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE sales SET
            subtotal_cents = ?2, tax_cents = ?3, total_cents = ?4,
            total_cost_cents = ?5, total_profit_cents = ?6, profit_margin_bps = ?7,
            updated_at = ?8
        WHERE id = ?1 AND status = 'draft'
        "#,
    )
    .bind(&sale.id)
    .bind(subtotal.cents())
    .bind(sums.tax.unwrap_or(0))
    .bind(total.cents())
    .bind(cost.cents())
    .bind(profit.cents())
    .bind(profit.ratio_bps(total))
    .bind(now)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::testutil;

    fn line(product_id: &str, quantity: i64, discount_cents: i64) -> SaleLineInput {
        SaleLineInput {
            product_id: product_id.to_string(),
            quantity,
            discount_cents,
        }
    }

    #[tokio::test]
    async fn test_two_line_sale_totals_and_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;

        // 16% taxed item and an untaxed one
        let mut taxed = testutil::product(&ctx.tenant_id, "TAXED-1", 10_000, 6_000, 10);
        taxed.tax_rate_bps = 1600;
        db.products().insert(&taxed).await.unwrap();
        let plain = testutil::seed_product_priced(&db, &ctx.tenant_id, "PLAIN-1", 5_000, 3_000, 10).await;

        let sale = db
            .sales()
            .create_sale(
                &ctx,
                CreateSale {
                    items: vec![line(&taxed.id, 2, 0), line(&plain.id, 1, 500)],
                    payment_method: PaymentMethod::Cash,
                    discount_cents: 0,
                    shift_id: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(sale.subtotal_cents, 27_700);
        assert_eq!(sale.tax_cents, 3_200);
        assert_eq!(sale.total_cents, 27_700);
        assert_eq!(sale.total_cost_cents, 15_000);
        assert_eq!(sale.total_profit_cents, 12_700);
        assert_eq!(sale.profit_margin_bps, 4585);
        assert_eq!(sale.status, SaleStatus::Completed);

        // Stock moved and the ledger recorded it
        assert_eq!(testutil::get_product(&db, &ctx, &taxed.id).await.current_stock, 8);
        assert_eq!(testutil::get_product(&db, &ctx, &plain.id).await.current_stock, 9);

        let items = db.sales_repo().get_items(&sale.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sku_snapshot, "TAXED-1");
        assert_eq!(items[0].line_total_cents, 23_200);
        assert_eq!(items[1].line_total_cents, 4_500);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_whole_sale() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;

        let plenty = testutil::seed_product(&db, &ctx.tenant_id, "PLENTY-1", 100).await;
        let scarce = testutil::seed_product(&db, &ctx.tenant_id, "SCARCE-1", 1).await;

        let err = db
            .sales()
            .create_sale(
                &ctx,
                CreateSale {
                    items: vec![line(&plenty.id, 5, 0), line(&scarce.id, 2, 0)],
                    payment_method: PaymentMethod::Cash,
                    discount_cents: 0,
                    shift_id: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock { .. })
        ));

        // No orphans: no sale, no items, first line's stock restored and
        // its ledger holds only the opening row
        assert!(db.sales_repo().list_recent(&ctx.tenant_id, 10).await.unwrap().is_empty());
        assert_eq!(testutil::get_product(&db, &ctx, &plenty.id).await.current_stock, 100);
        assert_eq!(
            db.products()
                .movements(&ctx.tenant_id, &plenty.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_sale_numbers_are_sequential_per_tenant() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx_a, _) = testutil::seed_tenant(&db, "store-a").await;
        let (ctx_b, _) = testutil::seed_tenant(&db, "store-b").await;

        let pa = testutil::seed_product(&db, &ctx_a.tenant_id, "A-1", 100).await;
        let pb = testutil::seed_product(&db, &ctx_b.tenant_id, "B-1", 100).await;

        let input = |pid: &str| CreateSale {
            items: vec![line(pid, 1, 0)],
            payment_method: PaymentMethod::Cash,
            discount_cents: 0,
            shift_id: None,
            notes: None,
        };

        let year = Utc::now().year();
        let s1 = db.sales().create_sale(&ctx_a, input(&pa.id)).await.unwrap();
        let s2 = db.sales().create_sale(&ctx_a, input(&pa.id)).await.unwrap();
        assert_eq!(s1.sale_number, numbering::sale_number(year, 1));
        assert_eq!(s2.sale_number, numbering::sale_number(year, 2));

        // Sequences are per tenant: the other store starts at 1
        let s3 = db.sales().create_sale(&ctx_b, input(&pb.id)).await.unwrap();
        assert_eq!(s3.sale_number, numbering::sale_number(year, 1));
    }

    #[tokio::test]
    async fn test_draft_flow_defers_stock_until_completion() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let product = testutil::seed_product(&db, &ctx.tenant_id, "COKE-330", 10).await;
        let sales = db.sales();

        let draft = sales.create_draft(&ctx, PaymentMethod::Card, None).await.unwrap();
        assert_eq!(draft.status, SaleStatus::Draft);

        sales
            .add_item(&ctx, &draft.id, line(&product.id, 3, 0))
            .await
            .unwrap();

        // Drafting does not move stock
        assert_eq!(testutil::get_product(&db, &ctx, &product.id).await.current_stock, 10);

        let completed = sales.complete_sale(&ctx, &draft.id).await.unwrap();
        assert_eq!(completed.status, SaleStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert_eq!(testutil::get_product(&db, &ctx, &product.id).await.current_stock, 7);

        // Completed sales are frozen
        let err = sales
            .add_item(&ctx, &draft.id, line(&product.id, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InvalidSaleStatus { .. })
        ));
        let err = sales.complete_sale(&ctx, &draft.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InvalidSaleStatus { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_sale_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;

        let err = db
            .sales()
            .create_sale(
                &ctx,
                CreateSale {
                    items: vec![],
                    payment_method: PaymentMethod::Cash,
                    discount_cents: 0,
                    shift_id: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cross_tenant_product_in_sale_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx_a, _) = testutil::seed_tenant(&db, "store-a").await;
        let (ctx_b, _) = testutil::seed_tenant(&db, "store-b").await;
        let foreign = testutil::seed_product(&db, &ctx_b.tenant_id, "FOREIGN-1", 10).await;

        let err = db
            .sales()
            .create_sale(
                &ctx_a,
                CreateSale {
                    items: vec![line(&foreign.id, 1, 0)],
                    payment_method: PaymentMethod::Cash,
                    discount_cents: 0,
                    shift_id: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        // Not-found, never a permission leak
        assert!(matches!(
            err,
            EngineError::Core(CoreError::ProductNotFound(_))
        ));
    }
}
