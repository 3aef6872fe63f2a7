//! # Returns Engine
//!
//! Full or partial reversal of completed sales. One transaction covers the
//! return document, its lines, the stock-in movements and the refund
//! cash-out; failure on any line rolls the whole return back.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  * Only completed (or already returned) sales can be returned           │
//! │  * Cumulative returned quantity per line NEVER exceeds quantity sold;   │
//! │    a request past the cap fails whole, it is not clamped                │
//! │  * Refund per line = line_total × qty / sold_qty, floor division:       │
//! │    remainder cents stay with the merchant                               │
//! │  * Cash and card refunds write a cash-out movement referencing the      │
//! │    return; credit notes write none (no money leaves)                    │
//! │  * The parent sale is marked Returned                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::events::DomainEvent;
use crate::pool::Database;
use crate::register::insert_cash_movement;
use crate::repository::new_id;
use crate::stock::apply_adjustment;
use meridian_core::rbac::perm;
use meridian_core::{
    numbering, CashMovement, CashMovementType, CoreError, LedgerRef, Money, MovementType,
    RefundMethod, RequestContext, SaleItem, SaleReturn, SaleReturnItem, SaleStatus,
    ValidationError, MAX_SEQUENCE_RETRIES,
};

/// One requested return line.
#[derive(Debug, Clone)]
pub struct ReturnLineInput {
    pub sale_item_id: String,
    pub quantity: i64,
}

/// Input for a return against a prior sale.
#[derive(Debug, Clone)]
pub struct CreateReturn {
    pub sale_id: String,
    pub items: Vec<ReturnLineInput>,
    pub refund_method: RefundMethod,
    pub reason: Option<String>,
}

/// Returns and refunds.
#[derive(Debug, Clone)]
pub struct ReturnsEngine {
    db: Database,
}

impl ReturnsEngine {
    pub fn new(db: Database) -> Self {
        ReturnsEngine { db }
    }

    /// Creates a return: restocks the lines, refunds pro-rated amounts and
    /// marks the parent sale Returned. Requires `returns.create`.
    pub async fn create_return(
        &self,
        ctx: &RequestContext,
        input: CreateReturn,
    ) -> EngineResult<SaleReturn> {
        self.db.rbac().require(ctx, perm::RETURNS_CREATE).await?;

        if input.items.is_empty() {
            return Err(CoreError::from(ValidationError::Required {
                field: "items".to_string(),
            })
            .into());
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_create_return(ctx, &input).await {
                Ok(ret) => {
                    info!(
                        tenant_id = %ctx.tenant_id,
                        return_id = %ret.id,
                        return_number = %ret.return_number,
                        amount_cents = ret.amount_cents,
                        "Return created"
                    );
                    self.db.event_sink().publish(&DomainEvent::ReturnCreated {
                        tenant_id: ctx.tenant_id.clone(),
                        return_id: ret.id.clone(),
                        return_number: ret.return_number.clone(),
                        amount_cents: ret.amount_cents,
                    });
                    return Ok(ret);
                }
                Err(EngineError::Db(e))
                    if e.is_unique_violation_on("return_number")
                        && attempts < MAX_SEQUENCE_RETRIES =>
                {
                    debug!(attempt = attempts, "Return number collision, retrying");
                }
                Err(EngineError::Db(e)) if e.is_unique_violation_on("return_number") => {
                    return Err(CoreError::SequenceConflict {
                        prefix: numbering::return_prefix(Utc::now().date_naive()),
                        attempts,
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_create_return(
        &self,
        ctx: &RequestContext,
        input: &CreateReturn,
    ) -> EngineResult<SaleReturn> {
        let mut tx = self.db.pool().begin().await?;
        let now = Utc::now();

        let sale = sqlx::query_as::<_, meridian_core::Sale>(
            "SELECT * FROM sales WHERE id = ?1 AND tenant_id = ?2",
        )
        .bind(&input.sale_id)
        .bind(&ctx.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::SaleNotFound(input.sale_id.clone()))?;

        if sale.status == SaleStatus::Draft {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id.clone(),
                current_status: sale.status.as_str().to_string(),
            }
            .into());
        }

        let return_id = new_id();
        let return_number = allocate_return_number(&mut tx, &ctx.tenant_id).await?;

        let mut amount = Money::zero();
        let mut return_items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            if line.quantity <= 0 {
                return Err(CoreError::from(ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                })
                .into());
            }

            let item = sqlx::query_as::<_, SaleItem>(
                "SELECT * FROM sale_items WHERE id = ?1 AND sale_id = ?2",
            )
            .bind(&line.sale_item_id)
            .bind(&sale.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| crate::error::DbError::not_found("Sale item", &line.sale_item_id))?;

            let already_returned: Option<i64> = sqlx::query_scalar(
                "SELECT SUM(quantity) FROM sale_return_items WHERE sale_item_id = ?1",
            )
            .bind(&item.id)
            .fetch_one(&mut *tx)
            .await?;
            let already_returned = already_returned.unwrap_or(0);

            if already_returned + line.quantity > item.quantity {
                return Err(CoreError::OverReturn {
                    sku: item.sku_snapshot.clone(),
                    sold: item.quantity,
                    already_returned,
                    requested: line.quantity,
                }
                .into());
            }

            let refund =
                Money::from_cents(item.line_total_cents).pro_rate(line.quantity, item.quantity);
            amount += refund;

            apply_adjustment(
                &mut tx,
                &ctx.tenant_id,
                &item.product_id,
                line.quantity,
                MovementType::In,
                &LedgerRef::SaleReturn(return_id.clone()),
                Some(&ctx.principal_id),
            )
            .await?;

            return_items.push(SaleReturnItem {
                id: new_id(),
                return_id: return_id.clone(),
                sale_item_id: item.id,
                product_id: item.product_id,
                quantity: line.quantity,
                refund_cents: refund.cents(),
                created_at: now,
            });
        }

        let ret = SaleReturn {
            id: return_id,
            tenant_id: ctx.tenant_id.clone(),
            sale_id: sale.id.clone(),
            return_number,
            amount_cents: amount.cents(),
            refund_method: input.refund_method,
            reason: input.reason.clone(),
            actor_id: Some(ctx.principal_id.clone()),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO sale_returns (
                id, tenant_id, sale_id, return_number, amount_cents,
                refund_method, reason, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&ret.id)
        .bind(&ret.tenant_id)
        .bind(&ret.sale_id)
        .bind(&ret.return_number)
        .bind(ret.amount_cents)
        .bind(ret.refund_method)
        .bind(&ret.reason)
        .bind(&ret.actor_id)
        .bind(ret.created_at)
        .execute(&mut *tx)
        .await?;

        for item in &return_items {
            sqlx::query(
                r#"
                INSERT INTO sale_return_items (
                    id, return_id, sale_item_id, product_id, quantity, refund_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.id)
            .bind(&item.return_id)
            .bind(&item.sale_item_id)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(item.refund_cents)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        // Money leaves the drawer for cash/card refunds; a credit note is
        // an obligation, not a payout.
        if ret.refund_method != RefundMethod::CreditNote && ret.amount_cents > 0 {
            let shift_id: Option<String> = sqlx::query_scalar(
                r#"
                SELECT id FROM shifts
                WHERE tenant_id = ?1 AND cashier_id = ?2 AND status = 'open'
                "#,
            )
            .bind(&ctx.tenant_id)
            .bind(&ctx.principal_id)
            .fetch_optional(&mut *tx)
            .await?;

            let movement = CashMovement {
                id: new_id(),
                tenant_id: ctx.tenant_id.clone(),
                shift_id,
                movement_type: CashMovementType::CashOut,
                amount_cents: ret.amount_cents,
                reason: ret.reason.clone(),
                reference_type: "sale_return".to_string(),
                reference_id: Some(ret.id.clone()),
                actor_id: Some(ctx.principal_id.clone()),
                created_at: now,
            };
            insert_cash_movement(&mut tx, &movement).await?;
        }

        sqlx::query("UPDATE sales SET status = 'returned', updated_at = ?2 WHERE id = ?1")
            .bind(&sale.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ret)
    }
}

/// Allocates the next return number for the tenant's current day.
async fn allocate_return_number(tx: &mut SqliteConnection, tenant_id: &str) -> EngineResult<String> {
    let today = Utc::now().date_naive();
    let prefix = numbering::return_prefix(today);

    let current_max: Option<String> = sqlx::query_scalar(
        "SELECT MAX(return_number) FROM sale_returns WHERE tenant_id = ?1 AND return_number LIKE ?2",
    )
    .bind(tenant_id)
    .bind(format!("{prefix}%"))
    .fetch_one(&mut *tx)
    .await?;

    let seq = numbering::next_sequence(current_max.as_deref());
    Ok(numbering::return_number(today, seq))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::sales::{CreateSale, SaleLineInput};
    use crate::testutil;
    use meridian_core::PaymentMethod;

    async fn seed_sale(
        db: &Database,
        ctx: &RequestContext,
        product_id: &str,
        quantity: i64,
    ) -> (meridian_core::Sale, Vec<SaleItem>) {
        let sale = db
            .sales()
            .create_sale(
                ctx,
                CreateSale {
                    items: vec![SaleLineInput {
                        product_id: product_id.to_string(),
                        quantity,
                        discount_cents: 0,
                    }],
                    payment_method: PaymentMethod::Cash,
                    discount_cents: 0,
                    shift_id: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let items = db.sales_repo().get_items(&sale.id).await.unwrap();
        (sale, items)
    }

    #[tokio::test]
    async fn test_full_return_restocks_and_refunds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let product = testutil::seed_product_priced(&db, &ctx.tenant_id, "COKE-330", 250, 150, 10).await;
        let (sale, items) = seed_sale(&db, &ctx, &product.id, 4).await;
        assert_eq!(testutil::get_product(&db, &ctx, &product.id).await.current_stock, 6);

        let ret = db
            .returns()
            .create_return(
                &ctx,
                CreateReturn {
                    sale_id: sale.id.clone(),
                    items: vec![ReturnLineInput {
                        sale_item_id: items[0].id.clone(),
                        quantity: 4,
                    }],
                    refund_method: RefundMethod::Cash,
                    reason: Some("damaged".into()),
                },
            )
            .await
            .unwrap();

        // Full refund of the line total, stock restored, sale flagged
        assert_eq!(ret.amount_cents, items[0].line_total_cents);
        assert_eq!(testutil::get_product(&db, &ctx, &product.id).await.current_stock, 10);
        let sale = db
            .sales_repo()
            .get_by_id(&crate::scope::Scope::for_context(&ctx), &sale.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sale.status, SaleStatus::Returned);

        // Cash refund produced a cash-out referencing the return
        let ref_id: Option<String> = sqlx::query_scalar(
            "SELECT reference_id FROM cash_movements WHERE movement_type = 'cash_out'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(ref_id.as_deref(), Some(ret.id.as_str()));
    }

    #[tokio::test]
    async fn test_partial_return_pro_rates_with_floor() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let product = testutil::seed_product_priced(&db, &ctx.tenant_id, "ODD-3", 100, 50, 10).await;

        // 3 units at 100 with a 1 cent line discount: line total 299,
        // indivisible by 3
        let sale = db
            .sales()
            .create_sale(
                &ctx,
                CreateSale {
                    items: vec![SaleLineInput {
                        product_id: product.id.clone(),
                        quantity: 3,
                        discount_cents: 1,
                    }],
                    payment_method: PaymentMethod::Cash,
                    discount_cents: 0,
                    shift_id: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        let items = db.sales_repo().get_items(&sale.id).await.unwrap();
        assert_eq!(items[0].line_total_cents, 299);

        let request = |qty| CreateReturn {
            sale_id: sale.id.clone(),
            items: vec![ReturnLineInput {
                sale_item_id: items[0].id.clone(),
                quantity: qty,
            }],
            refund_method: RefundMethod::Cash,
            reason: None,
        };

        // floor(299 / 3) = 99, floor(299 * 2 / 3) = 199: the odd cent
        // stays with the merchant
        let ret1 = db.returns().create_return(&ctx, request(1)).await.unwrap();
        assert_eq!(ret1.amount_cents, 99);

        let ret2 = db.returns().create_return(&ctx, request(2)).await.unwrap();
        assert_eq!(ret2.amount_cents, 199);
        assert!(ret1.amount_cents + ret2.amount_cents < 299);
    }

    #[tokio::test]
    async fn test_over_return_rejected_whole() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let product = testutil::seed_product_priced(&db, &ctx.tenant_id, "COKE-330", 250, 150, 10).await;
        let (sale, items) = seed_sale(&db, &ctx, &product.id, 2).await;

        let request = |qty| CreateReturn {
            sale_id: sale.id.clone(),
            items: vec![ReturnLineInput {
                sale_item_id: items[0].id.clone(),
                quantity: qty,
            }],
            refund_method: RefundMethod::Cash,
            reason: None,
        };

        db.returns().create_return(&ctx, request(1)).await.unwrap();

        // 1 already returned of 2 sold: 2 more exceeds the cap, fails whole
        let err = db.returns().create_return(&ctx, request(2)).await.unwrap_err();
        match err {
            EngineError::Core(CoreError::OverReturn {
                sold,
                already_returned,
                requested,
                ..
            }) => {
                assert_eq!(sold, 2);
                assert_eq!(already_returned, 1);
                assert_eq!(requested, 2);
            }
            other => panic!("expected OverReturn, got {other:?}"),
        }

        // The rejected return restocked nothing
        assert_eq!(testutil::get_product(&db, &ctx, &product.id).await.current_stock, 9);
    }

    #[tokio::test]
    async fn test_credit_note_writes_no_cash_movement() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let product = testutil::seed_product_priced(&db, &ctx.tenant_id, "COKE-330", 250, 150, 10).await;
        let (sale, items) = seed_sale(&db, &ctx, &product.id, 2).await;

        db.returns()
            .create_return(
                &ctx,
                CreateReturn {
                    sale_id: sale.id,
                    items: vec![ReturnLineInput {
                        sale_item_id: items[0].id.clone(),
                        quantity: 2,
                    }],
                    refund_method: RefundMethod::CreditNote,
                    reason: None,
                },
            )
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cash_movements")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
        // Stock is still restored
        assert_eq!(testutil::get_product(&db, &ctx, &product.id).await.current_stock, 10);
    }

    #[tokio::test]
    async fn test_draft_sale_cannot_be_returned() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (ctx, _) = testutil::seed_tenant(&db, "store-a").await;
        let draft = db
            .sales()
            .create_draft(&ctx, PaymentMethod::Cash, None)
            .await
            .unwrap();

        let err = db
            .returns()
            .create_return(
                &ctx,
                CreateReturn {
                    sale_id: draft.id,
                    items: vec![ReturnLineInput {
                        sale_item_id: "irrelevant".into(),
                        quantity: 1,
                    }],
                    refund_method: RefundMethod::Cash,
                    reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InvalidSaleStatus { .. })
        ));
    }
}
