//! # Seed Data Generator
//!
//! Populates the database with sample books and discounts for development.
//!
//! ## Usage
//! ```bash
//! # Generate 200 books (default)
//! cargo run -p storefront-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p storefront-db --bin seed -- --count 1000
//!
//! # Specify database path
//! cargo run -p storefront-db --bin seed -- --db ./data/storefront.db
//! ```
//!
//! ## Generated Data
//! - Titles built from a subject and an edition: `"{subject}, Vol. {n}"`
//! - Price: $4.99 - $49.99, cost 55-75% of price
//! - Stock: 0 - 50
//! - Every seventh book gets a running discount (10%, 15%, 20% or 25%)

use chrono::{Duration, Utc};
use std::env;
use storefront_core::NewBook;
use storefront_db::{Database, DbConfig};

/// Subjects for realistic titles
const SUBJECTS: &[&str] = &[
    "A History of the Baltic",
    "Practical Gardening",
    "The Lighthouse Keeper",
    "Rivers of the North",
    "Introductory Statistics",
    "The Glass Orchard",
    "Cooking with Grains",
    "Letters from Lisbon",
    "Modern Typography",
    "The Quiet Harbour",
    "Field Guide to Mosses",
    "Winter at Ashgrove",
    "Elements of Structure",
    "The Clockmaker's Daughter",
    "Sailing Small Boats",
    "Birds of the Marshes",
    "Mountain Railways",
    "The Salt Road",
    "Patterns in Number",
    "A Year of Bread",
];

/// Discount rates in basis points
const DISCOUNT_RATES: &[u32] = &[1000, 1500, 2000, 2500];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./storefront_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storefront Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of books to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./storefront_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Storefront Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!("Books:    {}", count);
    println!();

    // Connect to database
    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing books
    let existing = db.books().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} books", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating books...");

    let start = std::time::Instant::now();
    let discount_start = Utc::now() - Duration::days(1);
    let mut generated = 0;
    let mut discounted = 0;

    for seed in 0..count {
        let book = generate_book(seed);

        let inserted = match db.books().insert(&book).await {
            Ok(inserted) => inserted,
            Err(e) => {
                eprintln!("Failed to insert {}: {}", book.title, e);
                continue;
            }
        };
        generated += 1;

        if seed % 7 == 0 {
            let rate_bps = DISCOUNT_RATES[seed % DISCOUNT_RATES.len()];
            let name = format!("Seasonal {}%", rate_bps / 100);
            db.discounts()
                .replace_active(&[inserted.id], &name, rate_bps, discount_start, None)
                .await?;
            discounted += 1;
        }

        if generated % 100 == 0 {
            println!("  Generated {} books...", generated);
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} books ({} discounted) in {:?}", generated, discounted, elapsed);
    println!(
        "  Rate: {:.0} books/second",
        generated as f64 / elapsed.as_secs_f64()
    );

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates a single book with realistic data.
fn generate_book(seed: usize) -> NewBook {
    let subject = SUBJECTS[seed % SUBJECTS.len()];
    let volume = seed / SUBJECTS.len() + 1;

    // $4.99 - $49.99
    let price_cents = 499 + ((seed * 37) % 4501) as i64;

    // 55-75% of price
    let cost_pct = 55 + (seed % 21) as i64;
    let cost_cents = price_cents * cost_pct / 100;

    NewBook {
        title: format!("{}, Vol. {}", subject, volume),
        price_cents,
        cost_cents,
        available_quantity: (seed % 51) as i64,
    }
}
