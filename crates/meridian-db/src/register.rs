//! # Register Engine
//!
//! Register shifts and the cash ledger: a shift brackets a cashier's
//! drawer between an opening float and a counted close, and every cash
//! event in between is an append-only movement row.
//!
//! ## Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open_shift(opening_cash)            one open shift per cashier         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sales attributed via sale.shift_id                                     │
//! │  record_cash_movement() × N          cash_in / cash_out rows            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  close_shift(counted_cash)                                              │
//! │    expected = opening + cash_sales + cash_in − cash_out                 │
//! │    variance = counted − expected     (negative = drawer short)          │
//! │    aggregates FROZEN onto the row; Closed is terminal                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::events::DomainEvent;
use crate::pool::Database;
use crate::repository::new_id;
use crate::sales::ensure_shift_open;
use meridian_core::rbac::perm;
use meridian_core::validation::validate_price_cents;
use meridian_core::{
    numbering, CashMovement, CashMovementType, CoreError, RequestContext, Shift, ShiftStatus,
    ValidationError, MAX_SEQUENCE_RETRIES,
};

/// The live aggregates of a shift. Recomputing for an open shift is
/// idempotent; closing freezes one final computation onto the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftTotals {
    pub cash_sales_cents: i64,
    pub card_sales_cents: i64,
    pub mobile_sales_cents: i64,
    pub cash_in_cents: i64,
    pub cash_out_cents: i64,
    /// `opening + cash_sales + cash_in − cash_out`.
    pub expected_cash_cents: i64,
}

/// Register shifts and the cash ledger.
#[derive(Debug, Clone)]
pub struct RegisterEngine {
    db: Database,
}

impl RegisterEngine {
    pub fn new(db: Database) -> Self {
        RegisterEngine { db }
    }

    /// Opens a shift for the calling cashier. Requires `shifts.open`; a
    /// cashier can hold at most one open shift per tenant.
    pub async fn open_shift(
        &self,
        ctx: &RequestContext,
        opening_cash_cents: i64,
        notes: Option<String>,
    ) -> EngineResult<Shift> {
        self.db.rbac().require(ctx, perm::SHIFTS_OPEN).await?;
        validate_price_cents("opening_cash_cents", opening_cash_cents).map_err(CoreError::from)?;

        let mut attempts = 0;
        loop {
            attempts += 1;

            let mut tx = self.db.pool().begin().await?;

            let existing: Option<String> = sqlx::query_scalar(
                r#"
                SELECT id FROM shifts
                WHERE tenant_id = ?1 AND cashier_id = ?2 AND status = 'open'
                "#,
            )
            .bind(&ctx.tenant_id)
            .bind(&ctx.principal_id)
            .fetch_optional(&mut *tx)
            .await?;
            if existing.is_some() {
                return Err(CoreError::ShiftAlreadyOpen {
                    cashier_id: ctx.principal_id.clone(),
                }
                .into());
            }

            let current_max: Option<String> = sqlx::query_scalar(
                "SELECT MAX(shift_number) FROM shifts WHERE tenant_id = ?1",
            )
            .bind(&ctx.tenant_id)
            .fetch_one(&mut *tx)
            .await?;
            let shift_number = numbering::shift_number(numbering::next_sequence(
                current_max.as_deref(),
            ));

            let shift = Shift {
                id: new_id(),
                tenant_id: ctx.tenant_id.clone(),
                shift_number,
                cashier_id: ctx.principal_id.clone(),
                status: ShiftStatus::Open,
                opening_cash_cents,
                cash_sales_cents: None,
                card_sales_cents: None,
                mobile_sales_cents: None,
                cash_in_cents: None,
                cash_out_cents: None,
                expected_cash_cents: None,
                counted_cash_cents: None,
                variance_cents: None,
                notes: notes.clone(),
                opened_at: Utc::now(),
                closed_at: None,
            };

            let inserted = sqlx::query(
                r#"
                INSERT INTO shifts (
                    id, tenant_id, shift_number, cashier_id, status,
                    opening_cash_cents, notes, opened_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&shift.id)
            .bind(&shift.tenant_id)
            .bind(&shift.shift_number)
            .bind(&shift.cashier_id)
            .bind(shift.status)
            .bind(shift.opening_cash_cents)
            .bind(&shift.notes)
            .bind(shift.opened_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {
                    tx.commit().await?;
                    info!(
                        tenant_id = %ctx.tenant_id,
                        shift_id = %shift.id,
                        shift_number = %shift.shift_number,
                        "Shift opened"
                    );
                    self.db.event_sink().publish(&DomainEvent::ShiftOpened {
                        tenant_id: ctx.tenant_id.clone(),
                        shift_id: shift.id.clone(),
                        shift_number: shift.shift_number.clone(),
                        cashier_id: ctx.principal_id.clone(),
                    });
                    return Ok(shift);
                }
                Err(e) => {
                    let db_err = crate::error::DbError::from(e);
                    if db_err.is_unique_violation_on("shift_number")
                        && attempts < MAX_SEQUENCE_RETRIES
                    {
                        debug!(attempt = attempts, "Shift number collision, retrying");
                        continue;
                    }
                    if db_err.is_unique_violation_on("shift_number") {
                        return Err(CoreError::SequenceConflict {
                            prefix: numbering::SHIFT_PREFIX.to_string(),
                            attempts,
                        }
                        .into());
                    }
                    return Err(db_err.into());
                }
            }
        }
    }

    /// Records a manual cash-in or cash-out against an open shift.
    /// Requires `shifts.cash_movement`; closed shifts reject all writes.
    pub async fn record_cash_movement(
        &self,
        ctx: &RequestContext,
        shift_id: &str,
        movement_type: CashMovementType,
        amount_cents: i64,
        reason: Option<String>,
    ) -> EngineResult<CashMovement> {
        self.db.rbac().require(ctx, perm::SHIFTS_CASH_MOVEMENT).await?;

        if amount_cents <= 0 {
            return Err(CoreError::from(ValidationError::MustBePositive {
                field: "amount_cents".to_string(),
            })
            .into());
        }

        let mut tx = self.db.pool().begin().await?;
        ensure_shift_open(&mut tx, &ctx.tenant_id, shift_id).await?;

        let movement = CashMovement {
            id: new_id(),
            tenant_id: ctx.tenant_id.clone(),
            shift_id: Some(shift_id.to_string()),
            movement_type,
            amount_cents,
            reason,
            reference_type: "manual".to_string(),
            reference_id: None,
            actor_id: Some(ctx.principal_id.clone()),
            created_at: Utc::now(),
        };
        insert_cash_movement(&mut tx, &movement).await?;
        tx.commit().await?;

        self.db.event_sink().publish(&DomainEvent::CashMovementRecorded {
            tenant_id: ctx.tenant_id.clone(),
            shift_id: shift_id.to_string(),
            amount_cents,
        });

        Ok(movement)
    }

    /// Computes the live totals of a shift. Pure read: calling it twice
    /// (or closing afterwards) gives the same numbers for the same data.
    /// Requires `sales.view`.
    pub async fn shift_totals(&self, ctx: &RequestContext, shift_id: &str) -> EngineResult<ShiftTotals> {
        self.db.rbac().require(ctx, perm::SALES_VIEW).await?;

        let mut conn = self.db.pool().acquire().await?;
        let shift = fetch_shift(&mut conn, &ctx.tenant_id, shift_id).await?;
        compute_totals(&mut conn, &shift).await
    }

    /// Closes a shift against a counted drawer. Requires `shifts.close`.
    ///
    /// Totals are computed and frozen onto the row in the same transaction
    /// that flips the status; Closed is terminal.
    pub async fn close_shift(
        &self,
        ctx: &RequestContext,
        shift_id: &str,
        counted_cash_cents: i64,
        notes: Option<String>,
    ) -> EngineResult<Shift> {
        self.db.rbac().require(ctx, perm::SHIFTS_CLOSE).await?;
        validate_price_cents("counted_cash_cents", counted_cash_cents).map_err(CoreError::from)?;

        let mut tx = self.db.pool().begin().await?;

        let shift = fetch_shift(&mut tx, &ctx.tenant_id, shift_id).await?;
        if shift.status == ShiftStatus::Closed {
            return Err(CoreError::ShiftClosed {
                shift_id: shift_id.to_string(),
            }
            .into());
        }

        let totals = compute_totals(&mut tx, &shift).await?;
        let variance = counted_cash_cents - totals.expected_cash_cents;
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE shifts SET
                status = 'closed',
                cash_sales_cents = ?2, card_sales_cents = ?3, mobile_sales_cents = ?4,
                cash_in_cents = ?5, cash_out_cents = ?6,
                expected_cash_cents = ?7, counted_cash_cents = ?8, variance_cents = ?9,
                notes = COALESCE(?10, notes),
                closed_at = ?11
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(shift_id)
        .bind(totals.cash_sales_cents)
        .bind(totals.card_sales_cents)
        .bind(totals.mobile_sales_cents)
        .bind(totals.cash_in_cents)
        .bind(totals.cash_out_cents)
        .bind(totals.expected_cash_cents)
        .bind(counted_cash_cents)
        .bind(variance)
        .bind(&notes)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let closed = fetch_shift(&mut tx, &ctx.tenant_id, shift_id).await?;
        tx.commit().await?;

        info!(
            tenant_id = %ctx.tenant_id,
            shift_id = %shift_id,
            expected_cents = totals.expected_cash_cents,
            counted_cents = counted_cash_cents,
            variance_cents = variance,
            "Shift closed"
        );
        self.db.event_sink().publish(&DomainEvent::ShiftClosed {
            tenant_id: ctx.tenant_id.clone(),
            shift_id: shift_id.to_string(),
            variance_cents: variance,
        });

        Ok(closed)
    }

    /// The calling cashier's open shift in this tenant, if any.
    pub async fn current_shift(&self, ctx: &RequestContext) -> EngineResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            SELECT * FROM shifts
            WHERE tenant_id = ?1 AND cashier_id = ?2 AND status = 'open'
            "#,
        )
        .bind(&ctx.tenant_id)
        .bind(&ctx.principal_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(EngineError::from)?;

        Ok(shift)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn fetch_shift(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    shift_id: &str,
) -> EngineResult<Shift> {
    sqlx::query_as::<_, Shift>("SELECT * FROM shifts WHERE id = ?1 AND tenant_id = ?2")
        .bind(shift_id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::ShiftNotFound(shift_id.to_string()).into())
}

/// Sums the shift's attributed sales by payment method plus its cash
/// movements. Draft sales are excluded; returned sales stay counted (the
/// refund shows up as a cash-out movement instead).
async fn compute_totals(conn: &mut SqliteConnection, shift: &Shift) -> EngineResult<ShiftTotals> {
    #[derive(sqlx::FromRow)]
    struct MethodSum {
        payment_method: String,
        total: i64,
    }

    let sums = sqlx::query_as::<_, MethodSum>(
        r#"
        SELECT payment_method, SUM(total_cents) AS total
        FROM sales
        WHERE shift_id = ?1 AND status != 'draft'
        GROUP BY payment_method
        "#,
    )
    .bind(&shift.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut cash_sales = 0;
    let mut card_sales = 0;
    let mut mobile_sales = 0;
    for s in sums {
        match s.payment_method.as_str() {
            "cash" => cash_sales = s.total,
            "card" => card_sales = s.total,
            "mobile" => mobile_sales = s.total,
            _ => {}
        }
    }

    #[derive(sqlx::FromRow)]
    struct MovementSum {
        movement_type: String,
        total: i64,
    }

    let moves = sqlx::query_as::<_, MovementSum>(
        r#"
        SELECT movement_type, SUM(amount_cents) AS total
        FROM cash_movements
        WHERE shift_id = ?1
        GROUP BY movement_type
        "#,
    )
    .bind(&shift.id)
    .fetch_all(&mut *conn)
    .await?;

    let mut cash_in = 0;
    let mut cash_out = 0;
    for m in moves {
        match m.movement_type.as_str() {
            "cash_in" => cash_in = m.total,
            "cash_out" => cash_out = m.total,
            _ => {}
        }
    }

    Ok(ShiftTotals {
        cash_sales_cents: cash_sales,
        card_sales_cents: card_sales,
        mobile_sales_cents: mobile_sales,
        cash_in_cents: cash_in,
        cash_out_cents: cash_out,
        expected_cash_cents: shift.opening_cash_cents + cash_sales + cash_in - cash_out,
    })
}

/// Appends a cash ledger row inside an open transaction. Shared with the
/// returns engine for refund cash-outs.
pub(crate) async fn insert_cash_movement(
    tx: &mut SqliteConnection,
    movement: &CashMovement,
) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO cash_movements (
            id, tenant_id, shift_id, movement_type, amount_cents,
            reason, reference_type, reference_id, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.tenant_id)
    .bind(&movement.shift_id)
    .bind(movement.movement_type)
    .bind(movement.amount_cents)
    .bind(&movement.reason)
    .bind(&movement.reference_type)
    .bind(&movement.reference_id)
    .bind(&movement.actor_id)
    .bind(movement.created_at)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
