//! Shared test fixtures: seeded tenants, members and products against an
//! in-memory database.

use chrono::Utc;

use crate::pool::Database;
use crate::repository::new_id;
use crate::scope::Scope;
use meridian_core::{Product, RequestContext, Tenant, User};

/// Inserts a user and returns its id.
pub async fn seed_user(db: &Database, email: &str) -> String {
    let now = Utc::now();
    let user = User {
        id: new_id(),
        email: email.to_string(),
        display_name: email.split('@').next().unwrap_or(email).to_string(),
        current_tenant_id: None,
        created_at: now,
        updated_at: now,
    };
    db.tenants().insert_user(&user).await.unwrap();
    user.id
}

/// Creates a tenant with a fresh owner and returns the owner's context.
pub async fn seed_tenant(db: &Database, slug: &str) -> (RequestContext, Tenant) {
    let owner = seed_user(db, &format!("owner@{slug}.example.com")).await;
    let tenant = db
        .tenancy()
        .create_tenant(&format!("{slug} (test)"), Some(slug), &owner)
        .await
        .unwrap();
    (RequestContext::new(owner, tenant.id.clone()), tenant)
}

/// Invites a new user into the owner's tenant under `role_slug` and
/// returns their context.
pub async fn seed_member(
    db: &Database,
    owner_ctx: &RequestContext,
    email: &str,
    role_slug: &str,
) -> RequestContext {
    let user_id = seed_user(db, email).await;
    db.rbac()
        .invite_member(owner_ctx, &user_id, role_slug)
        .await
        .unwrap();
    RequestContext::new(user_id, owner_ctx.tenant_id.clone())
}

/// Builds a tracked, untaxed product without inserting it.
pub fn product(tenant_id: &str, sku: &str, price_cents: i64, cost_cents: i64, stock: i64) -> Product {
    let now = Utc::now();
    Product {
        id: new_id(),
        tenant_id: tenant_id.to_string(),
        sku: sku.to_string(),
        barcode: None,
        name: format!("Test {sku}"),
        description: None,
        price_cents,
        cost_cents,
        tax_rate_bps: 0,
        track_stock: true,
        allow_backorder: false,
        current_stock: stock,
        min_stock: 0,
        max_stock: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Inserts a product at a nominal price.
pub async fn seed_product(db: &Database, tenant_id: &str, sku: &str, stock: i64) -> Product {
    seed_product_priced(db, tenant_id, sku, 100, 50, stock).await
}

/// Inserts a product with explicit price and cost.
pub async fn seed_product_priced(
    db: &Database,
    tenant_id: &str,
    sku: &str,
    price_cents: i64,
    cost_cents: i64,
    stock: i64,
) -> Product {
    let p = product(tenant_id, sku, price_cents, cost_cents, stock);
    db.products().insert(&p).await.unwrap();
    p
}

/// Fetches a product within the context's tenant, panicking if missing.
pub async fn get_product(db: &Database, ctx: &RequestContext, product_id: &str) -> Product {
    db.products()
        .get_by_id(&Scope::for_context(ctx), product_id)
        .await
        .unwrap()
        .expect("product should exist")
}
