//! # Invoice Repository
//!
//! The Billing Engine: turns an open order into an immutable invoice.
//!
//! ## Generation (one transaction)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  generate_from_order(order, customer)                                  │
//! │                                                                         │
//! │  1. BEGIN IMMEDIATE                                                    │
//! │  2. load order, customer, items, existing invoice                      │
//! │  3. billing::ensure_billable                                           │
//! │  4. invoice_sequences[YYYYMMDD] += 1  ──► FACT-YYYYMMDD-NNNNN          │
//! │  5. INSERT invoice + one invoice_line per item (price snapshot)        │
//! │  6. order::finish  ──► order closed, table free,                       │
//! │                        reservation in_progress → completed             │
//! │  7. COMMIT                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invoicing does not require every item to be delivered; that rule only
//! guards a plain close.

use comanda_core::billing::{
    ensure_billable, ensure_can_void, format_invoice_code, invoice_day, invoice_total,
    snapshot_lines,
};
use comanda_core::{
    Clock, CoreError, Customer, Invoice, InvoiceLine, InvoiceStatus, OrderStatus, ValidationError,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use super::catalog::{self, ReferenceKind};
use super::{begin_write, new_id, order, translate_unique};
use crate::error::{DbError, DbResult};

/// Loads an invoice inside an open transaction.
pub(crate) async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Invoice> {
    sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Invoice", id))
}

/// Allocates the next sequence number for a day.
async fn next_sequence(conn: &mut SqliteConnection, day: &str) -> DbResult<i64> {
    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoice_sequences (day, last_seq) VALUES (?1, 1)
        ON CONFLICT(day) DO UPDATE SET last_seq = last_seq + 1
        RETURNING last_seq
        "#,
    )
    .bind(day)
    .fetch_one(conn)
    .await?;
    Ok(seq)
}

/// Repository for invoices.
#[derive(Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    prefix: String,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository issuing codes with `prefix`.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, prefix: String) -> Self {
        InvoiceRepository { pool, clock, prefix }
    }

    /// Bills an open order.
    ///
    /// ## Errors
    /// - `NotFound`: order or customer missing
    /// - `Validation`: customer inactive, or the total does not fit in `Money`
    /// - `Conflict`: order already invoiced, not open, or has no items
    pub async fn generate_from_order(&self, order_id: &str, customer_id: &str) -> DbResult<Invoice> {
        let mut tx = begin_write(&self.pool).await?;

        let order = order::load(&mut tx, order_id).await?;

        let customer: Customer = catalog::load(&mut tx, ReferenceKind::Customer, customer_id).await?;
        if !customer.is_active {
            return Err(ValidationError::InactiveReference {
                field: "customer_id".to_string(),
                id: customer.id,
            }
            .into());
        }

        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM invoices WHERE order_id = ?1")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;

        let items = order::load_items(&mut tx, order_id).await?;
        ensure_billable(&order, &items, existing.is_some())?;

        let lines = snapshot_lines(&items)?;
        let total = invoice_total(&lines)?;

        let now = self.clock.utc();
        let sequence = next_sequence(&mut tx, &invoice_day(now)).await?;

        let invoice = Invoice {
            id: new_id(),
            code: format_invoice_code(&self.prefix, now, sequence),
            issued_at: now,
            customer_id: customer.id,
            order_id: Some(order.id.clone()),
            total_cents: total.cents(),
            status: InvoiceStatus::Issued,
            voided_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, code, issued_at, customer_id, order_id, total_cents, status, voided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.code)
        .bind(invoice.issued_at)
        .bind(&invoice.customer_id)
        .bind(&invoice.order_id)
        .bind(invoice.total_cents)
        .bind(invoice.status)
        .bind(invoice.voided_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            translate_unique(e.into(), |field| {
                (field == "invoices.order_id").then(|| CoreError::AlreadyInvoiced {
                    order_id: order.id.clone(),
                })
            })
        })?;

        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO invoice_lines (
                    id, invoice_id, order_item_id, product_id, quantity,
                    unit_price_cents, subtotal_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(new_id())
            .bind(&invoice.id)
            .bind(&line.order_item_id)
            .bind(&line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price.cents())
            .bind(line.subtotal.cents())
            .execute(&mut *tx)
            .await?;
        }

        order::finish(&mut tx, &order, OrderStatus::Closed, now).await?;

        tx.commit().await?;

        info!(
            code = %invoice.code,
            order_id = %order_id,
            lines = lines.len(),
            total = %total,
            "Generated invoice"
        );
        Ok(invoice)
    }

    /// Voids an invoice.
    ///
    /// Payments stay recorded and the order stays closed.
    pub async fn void(&self, invoice_id: &str) -> DbResult<Invoice> {
        let mut tx = begin_write(&self.pool).await?;

        let invoice = load(&mut tx, invoice_id).await?;
        ensure_can_void(&invoice)?;

        let invoice = sqlx::query_as::<_, Invoice>(
            "UPDATE invoices SET status = 'voided', voided_at = ?2 WHERE id = ?1 RETURNING *",
        )
        .bind(invoice_id)
        .bind(self.clock.utc())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(code = %invoice.code, "Voided invoice");
        Ok(invoice)
    }

    /// Gets an invoice by ID.
    pub async fn get(&self, invoice_id: &str) -> DbResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = ?1")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    /// Lists an invoice's lines.
    pub async fn lines(&self, invoice_id: &str) -> DbResult<Vec<InvoiceLine>> {
        let lines = sqlx::query_as::<_, InvoiceLine>(
            "SELECT * FROM invoice_lines WHERE invoice_id = ?1 ORDER BY rowid",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    /// Finds an invoice by its `FACT-YYYYMMDD-NNNNN` code.
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Invoice>> {
        debug!(code = %code, "Looking up invoice by code");
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE code = ?1")
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    /// The invoice billed from an order, if any.
    pub async fn for_order(&self, order_id: &str) -> DbResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE order_id = ?1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
