//! # Seed Data Generator
//!
//! Populates a database with products, purchase batches and sales so the
//! ledger has realistic history to inspect during development.
//!
//! ## Usage
//! ```bash
//! # 50 products into $STOCKROOM_DB_PATH (default ./stockroom.db)
//! cargo run -p stockroom-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p stockroom-db --bin seed -- --count 200 --db ./data/dev.db
//! ```
//!
//! ## Generated History (per product)
//! - Opening stock on every third product (untracked, becomes legacy stock)
//! - Two or three purchase batches a day apart, costs drifting upward
//! - A handful of sales; every fifth product has one sale reversed
//!
//! Every product's ledger is checked for balance at the end.

use std::env;

use chrono::{Duration, Utc};
use stockroom_core::BatchReference;
use stockroom_db::{Database, DbConfig, DbResult, NewProduct, StockReceipt};
use tracing_subscriber::EnvFilter;

const DEFAULT_COUNT: usize = 50;

/// Product families for readable SKUs.
const FAMILIES: &[(&str, &str)] = &[
    ("BEAN", "Coffee Beans"),
    ("TEA", "Loose Leaf Tea"),
    ("OIL", "Olive Oil"),
    ("FLR", "Bread Flour"),
    ("RCE", "Basmati Rice"),
    ("SGR", "Cane Sugar"),
    ("SLT", "Sea Salt"),
    ("PST", "Dried Pasta"),
];

/// Pack sizes; the second value scales unit cost.
const SIZES: &[(&str, f64)] = &[("250g", 0.5), ("500g", 1.0), ("1kg", 1.8), ("5kg", 8.0)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut count = DEFAULT_COUNT;
    let mut db_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(DEFAULT_COUNT);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockroom Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: {DEFAULT_COUNT})");
                println!("  -d, --db <PATH>    Database file path (default: $STOCKROOM_DB_PATH or ./stockroom.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = match db_path {
        Some(path) => DbConfig::new(path),
        None => DbConfig::from_env()?,
    };

    println!("🌱 Stockroom Seed Data Generator");
    println!("================================");
    println!("Database: {}", config.database_path.display());
    println!("Products: {count}");
    println!();

    let db = Database::new(config).await?;
    let (total, applied) = db.migration_status().await?;
    println!("✓ Connected to database ({applied}/{total} migrations applied)");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {existing} products");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating ledger history...");

    let start = std::time::Instant::now();
    let mut product_ids = Vec::with_capacity(count);
    let mut sales = 0usize;

    for seed in 0..count {
        match seed_product(&db, seed).await {
            Ok((product_id, sold)) => {
                product_ids.push(product_id);
                sales += sold;
            }
            Err(e) => eprintln!("Failed to seed product #{seed}: {e}"),
        }

        if (seed + 1) % 25 == 0 {
            println!("  Seeded {} products...", seed + 1);
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!(
        "✓ Seeded {} products and {sales} sales in {elapsed:?}",
        product_ids.len()
    );

    println!();
    println!("Verifying ledger balance...");
    let mut unbalanced = 0;
    for product_id in &product_ids {
        let status = db.ledger().ledger_status(product_id).await?;
        if !status.is_balanced() {
            unbalanced += 1;
            eprintln!("  ✗ {}", serde_json::to_string(&status)?);
        }
    }

    if let Some(first) = product_ids.first() {
        let status = db.ledger().ledger_status(first).await?;
        println!("  Sample: {}", serde_json::to_string_pretty(&status)?);
    }

    println!();
    if unbalanced == 0 {
        println!("✓ Seed complete! All ledgers balanced.");
    } else {
        println!("⚠ Seed complete with {unbalanced} unbalanced ledgers.");
    }

    Ok(())
}

/// Creates one product with receipts and sales. Returns its id and the
/// number of sales left standing.
async fn seed_product(db: &Database, seed: usize) -> DbResult<(String, usize)> {
    let (family_code, family_name) = FAMILIES[seed % FAMILIES.len()];
    let (size_name, size_factor) = SIZES[(seed / FAMILIES.len()) % SIZES.len()];

    let base_cost = (2.0 + ((seed * 37) % 900) as f64 / 100.0) * size_factor;
    let opening = if seed % 3 == 0 {
        ((seed % 7) + 2) as f64
    } else {
        0.0
    };

    let product = db
        .products()
        .create(
            NewProduct::new(
                format!("{family_code}-{size_name}-{seed:04}").to_uppercase(),
                format!("{family_name} {size_name}"),
            )
            .opening_stock(opening, round_cents(base_cost)),
        )
        .await?;

    let ledger = db.ledger();
    let first_receipt = Utc::now() - Duration::days(30);
    let batches = 2 + seed % 2;

    for n in 0..batches {
        let quantity = (10 + (seed * 13 + n * 7) % 40) as f64;
        let unit_cost = round_cents(base_cost * (1.0 + 0.05 * n as f64));
        let receipt = StockReceipt::new(
            &product.id,
            quantity,
            unit_cost,
            BatchReference::restock(format!("PO-{seed:04}-{n}")),
        )
        .received_by("seed")
        .received_at(first_receipt + Duration::days(n as i64));

        ledger.receive(&receipt).await?;
    }

    let mut sold = 0;
    for n in 0..(1 + seed % 4) {
        let quantity = (1 + (seed + n * 5) % 9) as f64;
        let reference = BatchReference::transaction(format!("TXN-{seed:04}-{n}"));

        match ledger.sell(&product.id, quantity, &reference, "seed").await {
            Ok(_) => sold += 1,
            Err(e) if e.is_insufficient_inventory() => break,
            Err(e) => return Err(e),
        }
    }

    if seed % 5 == 0 && sold > 0 {
        let reference = BatchReference::transaction(format!("TXN-{seed:04}-0"));
        let quantity = (1 + seed % 9) as f64;
        ledger.reverse(&product.id, quantity, &reference, "seed").await?;
        sold -= 1;
    }

    Ok((product.id, sold))
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default `info,stockroom=debug,sqlx=warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockroom=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
