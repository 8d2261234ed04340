//! # Seed Data Generator
//!
//! Loads a demo restaurant and walks one table through its whole lifecycle.
//!
//! ## Usage
//! ```bash
//! # Seed ./comanda_dev.db
//! cargo run -p comanda-db --bin seed
//!
//! # Specify database path and engine config
//! cargo run -p comanda-db --bin seed -- --db ./data/comanda.db --config ./comanda.toml
//!
//! # More detail
//! RUST_LOG=comanda_db=debug cargo run -p comanda-db --bin seed
//! ```
//!
//! ## What It Creates
//! - Two sectors with six tables between them
//! - Waiters, customers, a short menu and payment methods
//! - One reservation that is attended, ordered on, billed and paid in two
//!   tenders (card + cash)

use chrono::{Duration, Utc};
use comanda_core::{Money, NewItem, NewPayment, NewReservation};
use comanda_db::{Database, EngineConfig};
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Sector name and the (number, capacity) of its tables.
const LAYOUT: &[(&str, &[(i64, i64)])] = &[
    ("Salon", &[(1, 2), (2, 4), (3, 4), (4, 6)]),
    ("Terraza", &[(10, 4), (11, 8)]),
];

/// Menu: name and price in cents.
const MENU: &[(&str, i64)] = &[
    ("Milanesa napolitana", 10000),
    ("Bife de chorizo", 20000),
    ("Empanada de carne", 1800),
    ("Provoleta", 6500),
    ("Flan con dulce de leche", 4500),
    ("Agua mineral", 1500),
];

const STAFF: &[&str] = &["Luis", "Carla"];
const CUSTOMERS: &[(&str, &str)] = &[("Ana Gomez", "555-0101"), ("Mario Ruiz", "555-0102")];
const PAYMENT_METHODS: &[&str] = &["Efectivo", "Tarjeta"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("comanda_db=info")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Comanda Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./comanda_dev.db)");
                println!("  -c, --config <PATH>  Engine config TOML (COMANDA_* env vars apply)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = EngineConfig::load(config_path.as_deref())?;
    config.database.path = db_path.unwrap_or_else(|| PathBuf::from("./comanda_dev.db"));

    println!("Comanda Seed Data Generator");
    println!("===========================");
    println!("Database: {}", config.database.path.display());
    println!();

    let db = Database::from_engine_config(config).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if !db.tables().list_active().await?.is_empty() {
        println!("⚠ Database already has tables");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // -------------------------------------------------------------------------
    // Reference data
    // -------------------------------------------------------------------------

    let catalog = db.catalog();

    let mut tables = Vec::new();
    for (sector_name, layout) in LAYOUT {
        let sector = catalog.insert_sector(sector_name).await?;
        for (number, capacity) in layout.iter() {
            tables.push(db.tables().register(*number, *capacity, &sector.id).await?);
        }
    }
    println!("✓ {} tables in {} sectors", tables.len(), LAYOUT.len());

    let mut staff = Vec::new();
    for name in STAFF {
        staff.push(catalog.insert_staff(name).await?);
    }

    let mut customers = Vec::new();
    for (name, phone) in CUSTOMERS {
        customers.push(catalog.insert_customer(name, Some(*phone)).await?);
    }

    let mut menu = Vec::new();
    for (name, cents) in MENU {
        menu.push(catalog.insert_product(name, Money::from_cents(*cents)).await?);
    }

    let mut methods = Vec::new();
    for name in PAYMENT_METHODS {
        methods.push(catalog.insert_payment_method(name).await?);
    }
    println!(
        "✓ {} staff, {} customers, {} products, {} payment methods",
        staff.len(),
        customers.len(),
        menu.len(),
        methods.len()
    );

    // -------------------------------------------------------------------------
    // One table, start to finish
    // -------------------------------------------------------------------------

    println!();
    println!("Running demo service...");

    let (table, waiter, guest) = (&tables[2], &staff[0], &customers[0]);

    let reservation = db
        .reservations()
        .create(NewReservation {
            number: 1,
            scheduled_at: Utc::now() + Duration::hours(1),
            party_size: 4,
            customer_id: guest.id.clone(),
            table_id: table.id.clone(),
        })
        .await?;
    println!("  Reservation #{} for table {}", reservation.number, table.number);

    db.reservations().mark_attended(&reservation.id).await?;

    let order = db
        .orders()
        .open_from_reservation(
            &reservation.id,
            &waiter.id,
            vec![NewItem::new(&menu[0].id, 2), NewItem::new(&menu[1].id, 1)],
            Some("una sin sal"),
        )
        .await?;
    db.orders().add_item(&order.id, &menu[5].id, 2).await?;

    for item in db.orders().items(&order.id).await? {
        db.orders().mark_delivered(&item.id).await?;
    }
    println!("  Order {} served", order.id);

    let invoice = db.invoices().generate_from_order(&order.id, &guest.id).await?;
    println!("  Invoice {} total {}", invoice.code, invoice.total());

    let card = invoice.total_cents / 2;
    db.payments()
        .record(NewPayment {
            invoice_id: invoice.id.clone(),
            payment_method_id: methods[1].id.clone(),
            amount_cents: card,
            paid_at: None,
        })
        .await?;
    db.payments()
        .record(NewPayment {
            invoice_id: invoice.id.clone(),
            payment_method_id: methods[0].id.clone(),
            amount_cents: invoice.total_cents - card,
            paid_at: None,
        })
        .await?;

    let balance = db.payments().balance(&invoice.id).await?;
    info!(code = %invoice.code, settled = balance.is_settled, "Demo service finished");

    println!();
    println!("Final balance:");
    println!("{}", serde_json::to_string_pretty(&balance)?);

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
