//! # Order Repository
//!
//! The Order (Comanda) Manager: open → closed / cancelled, line items, and
//! the side effects each transition has on the table and its reservation.
//!
//! ## Transitions and Side Effects
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  open_from_table ───────┐                                              │
//! │                         ├──► OPEN ──► table occupied                   │
//! │  open_from_reservation ─┘     │       reservation attended → in_progress│
//! │                               │                                         │
//! │          ┌────────────────────┼────────────────────┐                   │
//! │          ▼                    ▼                    ▼                   │
//! │  close (all delivered)   invoice (billing)     cancel (not invoiced)   │
//! │          │                    │                    │                   │
//! │          ▼                    ▼                    ▼                   │
//! │       CLOSED               CLOSED              CANCELLED               │
//! │  table free             table free           table free                │
//! │  reservation completed  reservation completed reservation attended     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Items capture the product's price when they are added. Later price
//! changes never touch existing items.

use chrono::{DateTime, Utc};
use comanda_core::lifecycle::{
    ensure_can_cancel_order, ensure_can_close, ensure_can_open_order, ensure_order_open,
    ensure_table_active, reservation_after_order_cancelled, reservation_after_order_closed,
};
use comanda_core::validation::{validate_notes, validate_quantity};
use comanda_core::{
    Clock, CoreError, Customer, NewItem, OpenOrder, Order, OrderItem, OrderStatus, Product,
    ReservationStatus, StaffMember,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use super::catalog::{self, ReferenceKind};
use super::{begin_write, new_id, reservation, table, translate_unique};
use crate::error::{DbError, DbResult};

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Loads an order inside an open transaction.
pub(crate) async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Order> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Order", id))
}

/// Loads an order's items in insertion order.
pub(crate) async fn load_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ?1 ORDER BY created_at, rowid",
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

async fn load_item(conn: &mut SqliteConnection, item_id: &str) -> DbResult<OrderItem> {
    sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE id = ?1")
        .bind(item_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("OrderItem", item_id))
}

/// Loads the item and its order, failing unless the order is open.
async fn load_open_item(
    conn: &mut SqliteConnection,
    item_id: &str,
    operation: &str,
) -> DbResult<OrderItem> {
    let item = load_item(&mut *conn, item_id).await?;
    let order = load(&mut *conn, &item.order_id).await?;
    ensure_order_open(&order, operation)?;
    Ok(item)
}

async fn has_invoice(conn: &mut SqliteConnection, order_id: &str) -> DbResult<bool> {
    let invoice: Option<String> = sqlx::query_scalar("SELECT id FROM invoices WHERE order_id = ?1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(invoice.is_some())
}

async fn active_product(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Product> {
    let product: Product = catalog::load(conn, ReferenceKind::Product, product_id).await?;
    if !product.is_active {
        return Err(CoreError::inactive("Product", &product.id).into());
    }
    Ok(product)
}

async fn ensure_active_staff(conn: &mut SqliteConnection, staff_id: &str) -> DbResult<()> {
    let staff: StaffMember = catalog::load(conn, ReferenceKind::Staff, staff_id).await?;
    if !staff.is_active {
        return Err(CoreError::inactive("Staff", &staff.id).into());
    }
    Ok(())
}

async fn ensure_active_customer(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<()> {
    let customer: Customer = catalog::load(conn, ReferenceKind::Customer, customer_id).await?;
    if !customer.is_active {
        return Err(CoreError::inactive("Customer", &customer.id).into());
    }
    Ok(())
}

/// Inserts an item at the product's current price.
async fn insert_item(
    conn: &mut SqliteConnection,
    order_id: &str,
    item: &NewItem,
    now: DateTime<Utc>,
) -> DbResult<OrderItem> {
    let product = active_product(&mut *conn, &item.product_id).await?;

    let item = OrderItem {
        id: new_id(),
        order_id: order_id.to_string(),
        product_id: product.id,
        quantity: item.quantity,
        unit_price_cents: product.price_cents,
        delivered: false,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO order_items (
            id, order_id, product_id, quantity, unit_price_cents, delivered, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&item.id)
    .bind(&item.order_id)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.delivered)
    .bind(item.created_at)
    .execute(conn)
    .await?;

    debug!(
        order_id = %order_id,
        product_id = %item.product_id,
        quantity = item.quantity,
        unit_price = %item.unit_price(),
        "Added order item"
    );
    Ok(item)
}

/// Persists a new open order with its items and occupies the table.
async fn insert_open_order(
    conn: &mut SqliteConnection,
    order: &Order,
    items: &[NewItem],
) -> DbResult<()> {
    let busy: Option<String> =
        sqlx::query_scalar("SELECT id FROM orders WHERE table_id = ?1 AND status = 'open'")
            .bind(&order.table_id)
            .fetch_optional(&mut *conn)
            .await?;

    if busy.is_some() {
        return Err(CoreError::TableBusy {
            table_id: order.table_id.clone(),
        }
        .into());
    }

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, table_id, staff_id, reservation_id, customer_id, notes, status,
            opened_at, closed_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&order.id)
    .bind(&order.table_id)
    .bind(&order.staff_id)
    .bind(&order.reservation_id)
    .bind(&order.customer_id)
    .bind(&order.notes)
    .bind(order.status)
    .bind(order.opened_at)
    .bind(order.closed_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        translate_unique(e.into(), |field| match field {
            "orders.table_id" => Some(CoreError::TableBusy {
                table_id: order.table_id.clone(),
            }),
            "orders.reservation_id" => order
                .reservation_id
                .as_ref()
                .map(|id| CoreError::ReservationHasOrder {
                    reservation_id: id.clone(),
                }),
            _ => None,
        })
    })?;

    for item in items {
        insert_item(&mut *conn, &order.id, item, order.opened_at).await?;
    }

    table::occupy(conn, &order.table_id, order.opened_at).await
}

/// Ends an open order: stamps the status, frees the table and moves an
/// originating reservation along.
///
/// Shared by `close`, `cancel` and invoice generation so the three paths
/// leave the table and reservation in the same shape.
pub(crate) async fn finish(
    conn: &mut SqliteConnection,
    order: &Order,
    status: OrderStatus,
    now: DateTime<Utc>,
) -> DbResult<Order> {
    let closed_at = (status == OrderStatus::Closed).then_some(now);

    let finished = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders SET status = ?2, closed_at = ?3, updated_at = ?4
        WHERE id = ?1 AND status = 'open'
        RETURNING *
        "#,
    )
    .bind(&order.id)
    .bind(status)
    .bind(closed_at)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        DbError::Domain(CoreError::invalid_transition(
            "Order",
            &order.id,
            order.status,
            status.as_str(),
        ))
    })?;

    table::release(&mut *conn, &order.table_id, now).await?;

    if let Some(reservation_id) = &order.reservation_id {
        let reservation = reservation::load(&mut *conn, reservation_id).await?;
        let next = match status {
            OrderStatus::Cancelled => reservation_after_order_cancelled(reservation.status),
            _ => reservation_after_order_closed(reservation.status),
        };
        if let Some(next) = next {
            reservation::set_status(conn, reservation_id, next, now).await?;
        }
    }

    Ok(finished)
}

fn validate_items(items: &[NewItem]) -> DbResult<()> {
    for item in items {
        validate_quantity(item.quantity)?;
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for orders and their line items.
#[derive(Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        OrderRepository { pool, clock }
    }

    /// Opens a walk-in order on a table.
    ///
    /// ## Errors
    /// - `Validation`: quantity out of range, notes too long
    /// - `NotFound`: table, staff, customer or product missing
    /// - `Conflict`: table retired, staff / customer / product inactive, or
    ///   the table already has an open order
    pub async fn open_from_table(&self, input: OpenOrder) -> DbResult<Order> {
        let notes = validate_notes(input.notes.as_deref())?;
        validate_items(&input.items)?;

        let mut tx = begin_write(&self.pool).await?;

        let dining_table = table::load(&mut tx, &input.table_id).await?;
        ensure_table_active(&dining_table)?;
        ensure_active_staff(&mut tx, &input.staff_id).await?;
        if let Some(customer_id) = &input.customer_id {
            ensure_active_customer(&mut tx, customer_id).await?;
        }

        let now = self.clock.utc();
        let order = Order {
            id: new_id(),
            table_id: input.table_id,
            staff_id: input.staff_id,
            reservation_id: None,
            customer_id: input.customer_id,
            notes,
            status: OrderStatus::Open,
            opened_at: now,
            closed_at: None,
            updated_at: now,
        };

        insert_open_order(&mut tx, &order, &input.items).await?;
        tx.commit().await?;

        info!(
            id = %order.id,
            table = dining_table.number,
            items = input.items.len(),
            "Opened order"
        );
        Ok(order)
    }

    /// Opens an order for seated guests of a reservation, on its table and
    /// for its customer.
    ///
    /// ## Errors
    /// Same as [`open_from_table`](Self::open_from_table), plus
    /// - `State`: reservation is not `attended`
    /// - `Conflict`: the reservation already has a live order
    pub async fn open_from_reservation(
        &self,
        reservation_id: &str,
        staff_id: &str,
        items: Vec<NewItem>,
        notes: Option<&str>,
    ) -> DbResult<Order> {
        let notes = validate_notes(notes)?;
        validate_items(&items)?;

        let mut tx = begin_write(&self.pool).await?;

        let booked = reservation::load(&mut tx, reservation_id).await?;
        ensure_can_open_order(&booked)?;

        let live: Option<String> = sqlx::query_scalar(
            "SELECT id FROM orders WHERE reservation_id = ?1 AND status <> 'cancelled'",
        )
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?;

        if live.is_some() {
            return Err(CoreError::ReservationHasOrder {
                reservation_id: reservation_id.to_string(),
            }
            .into());
        }

        let dining_table = table::load(&mut tx, &booked.table_id).await?;
        ensure_table_active(&dining_table)?;
        ensure_active_staff(&mut tx, staff_id).await?;
        ensure_active_customer(&mut tx, &booked.customer_id).await?;

        let now = self.clock.utc();
        let order = Order {
            id: new_id(),
            table_id: booked.table_id.clone(),
            staff_id: staff_id.to_string(),
            reservation_id: Some(booked.id.clone()),
            customer_id: Some(booked.customer_id.clone()),
            notes,
            status: OrderStatus::Open,
            opened_at: now,
            closed_at: None,
            updated_at: now,
        };

        insert_open_order(&mut tx, &order, &items).await?;
        reservation::set_status(&mut tx, reservation_id, ReservationStatus::InProgress, now).await?;

        tx.commit().await?;

        info!(
            id = %order.id,
            reservation = booked.number,
            table = dining_table.number,
            "Opened order from reservation"
        );
        Ok(order)
    }

    /// Adds a line item at the product's current price.
    pub async fn add_item(&self, order_id: &str, product_id: &str, quantity: i64) -> DbResult<OrderItem> {
        validate_quantity(quantity)?;

        let mut tx = begin_write(&self.pool).await?;

        let order = load(&mut tx, order_id).await?;
        ensure_order_open(&order, "add item")?;

        let item = insert_item(&mut tx, order_id, &NewItem::new(product_id, quantity), self.clock.utc())
            .await?;

        tx.commit().await?;
        Ok(item)
    }

    /// Changes an item's quantity. The captured price is kept.
    pub async fn update_item_quantity(&self, item_id: &str, quantity: i64) -> DbResult<OrderItem> {
        validate_quantity(quantity)?;

        let mut tx = begin_write(&self.pool).await?;
        load_open_item(&mut tx, item_id, "update item").await?;

        let item = sqlx::query_as::<_, OrderItem>(
            "UPDATE order_items SET quantity = ?2 WHERE id = ?1 RETURNING *",
        )
        .bind(item_id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(item_id = %item_id, quantity, "Updated item quantity");
        Ok(item)
    }

    /// Removes an item from an open order.
    pub async fn remove_item(&self, item_id: &str) -> DbResult<()> {
        let mut tx = begin_write(&self.pool).await?;
        let item = load_open_item(&mut tx, item_id, "remove item").await?;

        sqlx::query("DELETE FROM order_items WHERE id = ?1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(item_id = %item_id, order_id = %item.order_id, "Removed order item");
        Ok(())
    }

    /// Marks an item as served.
    pub async fn mark_delivered(&self, item_id: &str) -> DbResult<OrderItem> {
        let mut tx = begin_write(&self.pool).await?;
        load_open_item(&mut tx, item_id, "deliver item").await?;

        let item = sqlx::query_as::<_, OrderItem>(
            "UPDATE order_items SET delivered = 1 WHERE id = ?1 RETURNING *",
        )
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(item_id = %item_id, "Item delivered");
        Ok(item)
    }

    /// Replaces the order notes. Blank clears them.
    pub async fn set_notes(&self, order_id: &str, notes: Option<&str>) -> DbResult<Order> {
        let notes = validate_notes(notes)?;

        let mut tx = begin_write(&self.pool).await?;

        let order = load(&mut tx, order_id).await?;
        ensure_order_open(&order, "edit notes")?;

        let order = sqlx::query_as::<_, Order>(
            "UPDATE orders SET notes = ?2, updated_at = ?3 WHERE id = ?1 RETURNING *",
        )
        .bind(order_id)
        .bind(&notes)
        .bind(self.clock.utc())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    /// Closes an order whose items have all been delivered.
    ///
    /// Closing does not bill. The table is freed and an originating
    /// reservation is completed.
    ///
    /// ## Errors
    /// - `State`: order is not open
    /// - `Conflict`: at least one item is undelivered
    pub async fn close(&self, order_id: &str) -> DbResult<Order> {
        let mut tx = begin_write(&self.pool).await?;

        let order = load(&mut tx, order_id).await?;
        let items = load_items(&mut tx, order_id).await?;
        ensure_can_close(&order, &items)?;

        let closed = finish(&mut tx, &order, OrderStatus::Closed, self.clock.utc()).await?;
        tx.commit().await?;

        info!(id = %order_id, items = items.len(), "Closed order");
        Ok(closed)
    }

    /// Cancels an open, uninvoiced order.
    ///
    /// The table is freed and an originating reservation goes back to
    /// `attended`, so the guests can start a new order.
    ///
    /// ## Errors
    /// - `Conflict`: the order has an invoice
    /// - `State`: order is not open
    pub async fn cancel(&self, order_id: &str) -> DbResult<Order> {
        let mut tx = begin_write(&self.pool).await?;

        let order = load(&mut tx, order_id).await?;
        let invoiced = has_invoice(&mut tx, order_id).await?;
        ensure_can_cancel_order(&order, invoiced)?;

        let cancelled = finish(&mut tx, &order, OrderStatus::Cancelled, self.clock.utc()).await?;
        tx.commit().await?;

        info!(id = %order_id, "Cancelled order");
        Ok(cancelled)
    }

    /// Gets an order by ID.
    pub async fn get(&self, order_id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    /// Lists an order's items.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        load_items(&mut conn, order_id).await
    }

    /// The table's open order, if any.
    pub async fn open_order_for_table(&self, table_id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE table_id = ?1 AND status = 'open'",
        )
        .bind(table_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
