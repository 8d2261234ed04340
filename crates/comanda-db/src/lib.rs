//! # comanda-db: Database Layer for Comanda
//!
//! Persistence and transactions for the table & order lifecycle engine.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Comanda Data Flow                                │
//! │                                                                         │
//! │  HTTP handler (POST /orders/{id}/close)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    comanda-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ TableRepo      │   │              │   │   │
//! │  │   │ SqlitePool    │◄───│ ReservationRepo│   │ 001_initial_ │   │   │
//! │  │   │ Clock         │    │ OrderRepo      │   │ schema.sql   │   │   │
//! │  │   │ EngineConfig  │    │ InvoiceRepo    │   │              │   │   │
//! │  │   │               │    │ PaymentRepo    │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  │                               │                                 │   │
//! │  │                               ▼                                 │   │
//! │  │                  comanda-core (rules, no I/O)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`config`] - Engine configuration file and environment overrides
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per lifecycle component
//!
//! ## Usage
//!
//! ```rust,ignore
//! use comanda_db::{Database, EngineConfig};
//!
//! let config = EngineConfig::load(Some(Path::new("comanda.toml")))?;
//! let db = Database::from_engine_config(config).await?;
//!
//! let order = db.orders().open_from_table(open_order).await?;
//! let invoice = db.invoices().generate_from_order(&order.id, &customer_id).await?;
//! db.payments().record(payment).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{BillingSettings, DatabaseSettings, EngineConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::{CatalogRepository, ReferenceKind};
pub use repository::invoice::InvoiceRepository;
pub use repository::order::OrderRepository;
pub use repository::payment::PaymentRepository;
pub use repository::reservation::ReservationRepository;
pub use repository::table::TableRepository;
