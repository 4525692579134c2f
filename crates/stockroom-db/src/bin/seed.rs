//! # Seed Data Generator
//!
//! Populates a database with a demo catalog for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p stockroom-db --bin seed
//! cargo run -p stockroom-db --bin seed -- --db ./data/stockroom.db
//! ```
//!
//! Every product gets a code `{CATEGORY}-{INDEX}`, a price between $0.50
//! and $15.00 and a stock level between 0 and 40, derived deterministically
//! from its position so repeated runs produce the same catalog.

use std::env;
use stockroom_core::NewProduct;
use stockroom_db::{Database, DbConfig, LedgerConfig, SaleLedger};

/// Categories with their code prefix and products.
const CATALOG: &[(&str, &str, &[&str])] = &[
    (
        "Bebidas",
        "BEB",
        &["Coca-Cola 1.5L", "Sprite 1.5L", "Agua mineral 500ml", "Jugo de naranja 1L", "Té helado"],
    ),
    (
        "Panadería",
        "PAN",
        &["Pan amasado", "Marraqueta", "Hallulla", "Pan integral", "Queque de vainilla"],
    ),
    (
        "Lácteos",
        "LAC",
        &["Leche entera 1L", "Yogurt natural", "Queso gauda 250g", "Mantequilla 250g"],
    ),
    (
        "Abarrotes",
        "ABA",
        &["Arroz 1kg", "Fideos spaghetti", "Aceite maravilla 1L", "Azúcar 1kg", "Sal de mar"],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./stockroom_dev.db");

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
                println!("Stockroom Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./stockroom_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Stockroom Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let ledger = SaleLedger::new(db.clone(), LedgerConfig::default());
    let mut generated = 0;

    for (category_idx, (category_name, prefix, products)) in CATALOG.iter().enumerate() {
        let category = db.categories().create(category_name).await?;

        for (product_idx, name) in products.iter().enumerate() {
            let seed = category_idx * 31 + product_idx * 7;
            let product = NewProduct {
                name: name.to_string(),
                code: format!("{}-{:03}", prefix, product_idx + 1),
                quantity: (seed * 13 % 41) as i64,
                price_cents: 50 + (seed * 97 % 1451) as i64,
                category_id: Some(category.id),
                description: None,
            };

            if let Err(e) = ledger.create_product(product).await {
                eprintln!("Failed to insert {}: {}", name, e);
                continue;
            }
            generated += 1;
        }
    }

    println!("✓ Generated {} products in {} categories", generated, CATALOG.len());
    db.close().await;
    Ok(())
}
