//! # Domain Events
//!
//! Engines publish a [`DomainEvent`] after every committed state change
//! (and on every permission denial). The default sink writes structured
//! `tracing` records; a calling layer can install its own sink to fan
//! events out to a UI or an audit store.
//!
//! Events are published AFTER commit. A rolled-back operation publishes
//! nothing.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

/// Everything notable that happens in the system, as one flat enum.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    TenantCreated {
        tenant_id: String,
        slug: String,
    },
    TenantSwitched {
        user_id: String,
        tenant_id: String,
    },
    MemberInvited {
        tenant_id: String,
        user_id: String,
        role_slug: String,
    },
    MemberRoleChanged {
        tenant_id: String,
        user_id: String,
        role_slug: String,
    },
    MemberRemoved {
        tenant_id: String,
        user_id: String,
    },
    PermissionDenied {
        tenant_id: String,
        user_id: String,
        permission: String,
    },
    StockAdjusted {
        tenant_id: String,
        product_id: String,
        quantity: i64,
        new_stock: i64,
    },
    SaleCompleted {
        tenant_id: String,
        sale_id: String,
        sale_number: String,
        total_cents: i64,
    },
    ReturnCreated {
        tenant_id: String,
        return_id: String,
        return_number: String,
        amount_cents: i64,
    },
    ShiftOpened {
        tenant_id: String,
        shift_id: String,
        shift_number: String,
        cashier_id: String,
    },
    ShiftClosed {
        tenant_id: String,
        shift_id: String,
        variance_cents: i64,
    },
    CashMovementRecorded {
        tenant_id: String,
        shift_id: String,
        amount_cents: i64,
    },
}

/// Where published events go. Implementations must be cheap and must not
/// fail: publishing happens after commit, so there is nothing to roll back.
pub trait EventSink: Send + Sync + fmt::Debug {
    fn publish(&self, event: &DomainEvent);
}

/// The default sink: structured log records.
///
/// Denials go to `warn` so they stand out in an audit trail; everything
/// else is `info`.
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: &DomainEvent) {
        let payload = serde_json::to_string(event).unwrap_or_else(|_| "<unserializable>".into());
        match event {
            DomainEvent::PermissionDenied {
                tenant_id,
                user_id,
                permission,
            } => {
                warn!(
                    tenant_id = %tenant_id,
                    user_id = %user_id,
                    permission = %permission,
                    "Permission denied"
                );
            }
            _ => info!(event = %payload, "Domain event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::SaleCompleted {
            tenant_id: "t-1".into(),
            sale_id: "s-1".into(),
            sale_number: "SALE-2026-000001".into(),
            total_cents: 27_700,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"sale_completed\""));
        assert!(json.contains("SALE-2026-000001"));
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        let sink = TracingEventSink;
        sink.publish(&DomainEvent::TenantSwitched {
            user_id: "u-1".into(),
            tenant_id: "t-1".into(),
        });
    }
}
