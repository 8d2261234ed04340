//! # Repository Module
//!
//! Transactional repositories for Comanda.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Operation = One Transaction                      │
//! │                                                                         │
//! │  db.orders().close(order_id)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN IMMEDIATE            ← write lock taken before the first read   │
//! │       │                                                                 │
//! │       ├── load order + items          (authoritative, no cache)        │
//! │       ├── lifecycle::ensure_can_close (pure rule from comanda-core)    │
//! │       ├── UPDATE orders               (status = closed)                │
//! │       ├── table::release              (occupancy = free)               │
//! │       └── reservation follow-up       (in_progress → completed)        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT    (any `?` before this drops the transaction = ROLLBACK)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TableRepository`](table::TableRepository) - Table Registry
//! - [`ReservationRepository`](reservation::ReservationRepository) - Reservation Manager
//! - [`OrderRepository`](order::OrderRepository) - Order (Comanda) Manager
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Billing Engine
//! - [`PaymentRepository`](payment::PaymentRepository) - Payment Reconciler
//! - [`CatalogRepository`](catalog::CatalogRepository) - Reference data reads/inserts

pub mod catalog;
pub mod invoice;
pub mod order;
pub mod payment;
pub mod reservation;
pub mod table;

use comanda_core::CoreError;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Opens a write transaction.
///
/// `BEGIN IMMEDIATE` takes SQLite's RESERVED lock up front, so two
/// connections running the same check-then-act sequence are serialized
/// instead of both passing the check. A waiting writer blocks for the
/// configured busy timeout.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Generates a new entity ID.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Maps a UNIQUE violation on a known index back to the domain error the
/// application check would have produced.
///
/// `translate` receives the column list from the SQLite message (for
/// example `orders.table_id` or `reservations.table_id, reservations.scheduled_at`).
pub(crate) fn translate_unique(
    err: DbError,
    translate: impl FnOnce(&str) -> Option<CoreError>,
) -> DbError {
    if let DbError::UniqueViolation { field, .. } = &err {
        if let Some(core) = translate(field) {
            warn!(constraint = %field, error = %core, "Storage constraint rejected a concurrent write");
            return DbError::Domain(core);
        }
    }
    err
}
