//! # Seed Data Generator
//!
//! Populates a development database with a demo tenant, staff, products
//! and a day of register activity.
//!
//! ## Usage
//! ```bash
//! # Seed into the default path
//! cargo run -p meridian-db --bin seed
//!
//! # Specify database path
//! cargo run -p meridian-db --bin seed -- --db ./data/meridian.db
//! ```
//!
//! ## Generated Data
//! - One tenant ("Demo Mart") with an owner and a cashier
//! - Products across a few categories with varied tax rates
//! - An open-then-closed shift with cash sales, a card sale, a cash drop
//!   and a partial return, so reports have something to show

use chrono::Utc;
use std::env;

use meridian_core::{CashMovementType, PaymentMethod, Product, RefundMethod};
use meridian_db::repository::new_id;
use meridian_db::{CreateReturn, CreateSale, Database, DbConfig, ReturnLineInput, SaleLineInput};

/// (sku, name, price_cents, cost_cents, tax_rate_bps, stock)
const PRODUCTS: &[(&str, &str, i64, i64, u32, i64)] = &[
    ("BEV-COLA-330", "Cola 330ml", 250, 150, 1600, 120),
    ("BEV-WATER-500", "Water 500ml", 150, 60, 0, 200),
    ("SNK-CHIPS-REG", "Potato Chips Regular", 350, 200, 1600, 80),
    ("SNK-CHOC-BAR", "Chocolate Bar", 300, 180, 1600, 60),
    ("GRO-BREAD-WHT", "White Bread Loaf", 450, 280, 0, 30),
    ("GRO-RICE-1KG", "Rice 1kg", 900, 600, 0, 45),
    ("DRY-MILK-1L", "Milk 1L", 550, 380, 0, 50),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./meridian_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Meridian Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./meridian_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Meridian Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Staff
    let tenants = db.tenants();
    if tenants.get_user_by_email("owner@demomart.test").await?.is_some() {
        println!("⚠ Database already seeded, nothing to do.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let owner_id = insert_user(&db, "owner@demomart.test", "Dana Owner").await?;
    let cashier_id = insert_user(&db, "cashier@demomart.test", "Casey Cashier").await?;

    // Tenant with the owner at the helm
    let tenant = db
        .tenancy()
        .create_tenant("Demo Mart", Some("demo-mart"), &owner_id)
        .await?;
    println!("✓ Tenant '{}' ({})", tenant.name, tenant.slug);

    let owner_ctx = db
        .tenancy()
        .resolve_context(&owner_id)
        .await?
        .ok_or("owner did not resolve into the new tenant")?;
    db.rbac().invite_member(&owner_ctx, &cashier_id, "cashier").await?;
    println!("✓ Staff: 1 owner, 1 cashier");

    // Catalog
    let now = Utc::now();
    let mut first_two = Vec::new();
    for (sku, name, price, cost, tax_bps, stock) in PRODUCTS {
        let product = Product {
            id: new_id(),
            tenant_id: tenant.id.clone(),
            sku: sku.to_string(),
            barcode: None,
            name: name.to_string(),
            description: None,
            price_cents: *price,
            cost_cents: *cost,
            tax_rate_bps: *tax_bps,
            track_stock: true,
            allow_backorder: false,
            current_stock: *stock,
            min_stock: 5,
            max_stock: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await?;
        if first_two.len() < 2 {
            first_two.push(product.id.clone());
        }
    }
    println!("✓ {} products", PRODUCTS.len());

    // A day at the register, rung up by the cashier
    let cashier_ctx = db
        .tenancy()
        .switch_tenant(&cashier_id, &tenant.id)
        .await?;

    let shift = db
        .register()
        .open_shift(&cashier_ctx, 10_000, Some("Morning shift".to_string()))
        .await?;
    println!("✓ Shift {} opened with $100.00 float", shift.shift_number);

    let cash_sale = db
        .sales()
        .create_sale(
            &cashier_ctx,
            CreateSale {
                items: vec![
                    SaleLineInput {
                        product_id: first_two[0].clone(),
                        quantity: 3,
                        discount_cents: 0,
                    },
                    SaleLineInput {
                        product_id: first_two[1].clone(),
                        quantity: 2,
                        discount_cents: 0,
                    },
                ],
                payment_method: PaymentMethod::Cash,
                discount_cents: 0,
                shift_id: Some(shift.id.clone()),
                notes: None,
            },
        )
        .await?;
    println!("✓ Sale {} (cash, {} cents)", cash_sale.sale_number, cash_sale.total_cents);

    let card_sale = db
        .sales()
        .create_sale(
            &cashier_ctx,
            CreateSale {
                items: vec![SaleLineInput {
                    product_id: first_two[0].clone(),
                    quantity: 1,
                    discount_cents: 0,
                }],
                payment_method: PaymentMethod::Card,
                discount_cents: 0,
                shift_id: Some(shift.id.clone()),
                notes: None,
            },
        )
        .await?;
    println!("✓ Sale {} (card, {} cents)", card_sale.sale_number, card_sale.total_cents);

    // Cash drops and returns need permissions the cashier tier lacks
    db.register()
        .record_cash_movement(
            &owner_ctx,
            &shift.id,
            CashMovementType::CashOut,
            2_000,
            Some("Safe drop".to_string()),
        )
        .await?;
    println!("✓ Cash drop recorded");

    // One unit of the cash sale comes back
    let items = db.sales_repo().get_items(&cash_sale.id).await?;
    let ret = db
        .returns()
        .create_return(
            &owner_ctx,
            CreateReturn {
                sale_id: cash_sale.id.clone(),
                items: vec![ReturnLineInput {
                    sale_item_id: items[0].id.clone(),
                    quantity: 1,
                }],
                refund_method: RefundMethod::Cash,
                reason: Some("Customer changed mind".to_string()),
            },
        )
        .await?;
    println!("✓ Return {} ({} cents refunded)", ret.return_number, ret.amount_cents);

    let totals = db.register().shift_totals(&cashier_ctx, &shift.id).await?;
    let closed = db
        .register()
        .close_shift(&cashier_ctx, &shift.id, totals.expected_cash_cents, None)
        .await?;
    println!(
        "✓ Shift closed, expected {} cents, variance {} cents",
        totals.expected_cash_cents,
        closed.variance_cents.unwrap_or(0)
    );

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

async fn insert_user(
    db: &Database,
    email: &str,
    display_name: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let now = Utc::now();
    let user = meridian_core::User {
        id: new_id(),
        email: email.to_string(),
        display_name: display_name.to_string(),
        current_tenant_id: None,
        created_at: now,
        updated_at: now,
    };
    db.tenants().insert_user(&user).await?;
    Ok(user.id)
}
