//! # Domain Types
//!
//! Core domain types used throughout Comanda.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  DiningTable    │◄──│  Reservation    │   │     Order       │       │
//! │  │  ─────────────  │   │  ─────────────  │──►│  ─────────────  │       │
//! │  │  number         │   │  number         │   │  table_id       │       │
//! │  │  capacity       │   │  scheduled_at   │   │  reservation_id │       │
//! │  │  status         │   │  party_size     │   │  status         │       │
//! │  │  occupancy      │   │  status         │   │  └─ OrderItem*  │       │
//! │  └─────────────────┘   └─────────────────┘   └────────┬────────┘       │
//! │                                                       │ invoiced once  │
//! │                        ┌─────────────────┐   ┌────────▼────────┐       │
//! │                        │    Payment      │──►│    Invoice      │       │
//! │                        │  ─────────────  │   │  ─────────────  │       │
//! │                        │  amount_cents   │   │  code           │       │
//! │                        │  reverses_...   │   │  total_cents    │       │
//! │                        └─────────────────┘   │  └─ InvoiceLine*│       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (table number, reservation number, invoice code) - human-readable
//!
//! ## Status Instead of Flags
//! Nothing here is soft-deleted with a boolean. A table is `retired`, an
//! order is `cancelled`, an invoice is `voided`, a reservation is `cancelled`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Table
// =============================================================================

/// Lifecycle status of a table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Table can be reserved and seated.
    Active,
    /// Table was taken out of service. Terminal.
    Retired,
}

impl TableStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Active => "active",
            TableStatus::Retired => "retired",
        }
    }
}

impl Default for TableStatus {
    fn default() -> Self {
        TableStatus::Active
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a table currently has an open order.
///
/// Mutated only inside the transaction that opens, closes, cancels or
/// invoices that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    Free,
    Occupied,
}

impl Occupancy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Occupancy::Free => "free",
            Occupancy::Occupied => "occupied",
        }
    }
}

impl Default for Occupancy {
    fn default() -> Self {
        Occupancy::Free
    }
}

impl fmt::Display for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical seating unit ("mesa").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DiningTable {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Number painted on the table, unique among active tables.
    pub number: i64,

    /// Seats available (> 0).
    pub capacity: i64,

    /// Sector (salon, terrace, bar...) the table belongs to.
    pub sector_id: String,

    pub status: TableStatus,

    pub occupancy: Occupancy,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl DiningTable {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == TableStatus::Active
    }

    /// Checks whether a party of the given size fits.
    #[inline]
    pub fn fits(&self, party_size: i64) -> bool {
        party_size <= self.capacity
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// The status of a reservation.
///
/// ```text
///   Active ──mark_attended──► Attended ──open order──► InProgress ──close/invoice──► Completed
///     │                          ▲                         │
///     │                          └──────order cancelled────┘
///     │
///     └──cancel / no-show──► Cancelled   (cancel also allowed from Attended, InProgress)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Booked, guests not yet arrived.
    Active,
    /// Guests arrived and were seated.
    Attended,
    /// An order was opened from this reservation.
    InProgress,
    /// The order opened from it was closed or invoiced. Terminal.
    Completed,
    /// Cancelled by staff or recorded as a no-show. Terminal.
    Cancelled,
}

impl ReservationStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Attended => "attended",
            ReservationStatus::InProgress => "in_progress",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed | ReservationStatus::Cancelled
        )
    }
}

impl Default for ReservationStatus {
    fn default() -> Self {
        ReservationStatus::Active
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booked slot for a party at a table ("reserva").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Reservation {
    pub id: String,

    /// Human-facing number, unique among non-cancelled reservations.
    pub number: i64,

    /// Exact reserved date-time. Slot exclusivity compares this value.
    #[ts(as = "String")]
    pub scheduled_at: DateTime<Utc>,

    pub party_size: i64,
    pub customer_id: String,
    pub table_id: String,
    pub status: ReservationStatus,

    /// Set when cancelled; `"no-show"` for no-shows.
    pub cancellation_reason: Option<String>,

    /// Deposit ("seña") handed back to the customer on cancellation.
    pub deposit_returned: bool,

    /// Deposit kept by the restaurant on a no-show.
    pub deposit_recovered: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a reservation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewReservation {
    pub number: i64,
    #[ts(as = "String")]
    pub scheduled_at: DateTime<Utc>,
    pub party_size: i64,
    pub customer_id: String,
    pub table_id: String,
}

// =============================================================================
// Order (Comanda)
// =============================================================================

/// The status of an order.
///
/// `Open → Closed` and `Open → Cancelled`; both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Items can be added, changed and delivered.
    Open,
    /// Closed directly or by invoicing.
    Closed,
    /// Abandoned without billing.
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Closed => "closed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Open
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A restaurant check tied to one table ("comanda").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub table_id: String,

    /// Waiter who opened the order.
    pub staff_id: String,

    /// Set when the order was promoted from a reservation.
    pub reservation_id: Option<String>,

    pub customer_id: Option<String>,
    pub notes: Option<String>,
    pub status: OrderStatus,

    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}

/// A line item in an order.
/// The unit price is frozen from the product when the item is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Unit price in cents at time of ordering (frozen).
    pub unit_price_cents: i64,
    /// Kitchen/bar has served this line.
    pub delivered: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns quantity × unit price.
    #[inline]
    pub fn subtotal(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

/// A product and quantity to put on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewItem {
    pub product_id: String,
    pub quantity: i64,
}

impl NewItem {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Input for opening an order directly on a table (walk-in).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenOrder {
    pub table_id: String,
    pub staff_id: String,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<NewItem>,
}

// =============================================================================
// Invoice (Factura)
// =============================================================================

/// The status of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Issued,
    /// Annulled. Payments are kept; the order is not reopened.
    Voided,
}

impl InvoiceStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Voided => "voided",
        }
    }
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        InvoiceStatus::Issued
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The billed, immutable snapshot of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    pub id: String,

    /// `FACT-YYYYMMDD-NNNNN`, unique.
    pub code: String,

    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,

    pub customer_id: String,

    /// Source order; an order is invoiced at most once.
    pub order_id: Option<String>,

    /// Σ line subtotals, fixed at generation time.
    pub total_cents: i64,

    pub status: InvoiceStatus,

    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn is_voided(&self) -> bool {
        self.status == InvoiceStatus::Voided
    }
}

/// A frozen copy of one order line.
///
/// Structurally independent of `order_items`: later edits to the product or
/// the order never reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceLine {
    pub id: String,
    pub invoice_id: String,
    /// Order line this row was copied from.
    pub order_item_id: Option<String>,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// quantity × unit price.
    pub subtotal_cents: i64,
}

impl InvoiceLine {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }
}

// =============================================================================
// Payment (Pago)
// =============================================================================

/// A payment towards an invoice.
/// An invoice can have multiple payments for split tender scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub invoice_id: String,
    pub payment_method_id: String,
    /// Amount in cents. Negative for reversal entries.
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,
    /// Payment this entry compensates, if it is a reversal.
    pub reverses_payment_id: Option<String>,
    /// Free-text reason given for a reversal.
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn is_reversal(&self) -> bool {
        self.reverses_payment_id.is_some()
    }
}

/// Input for recording a payment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPayment {
    pub invoice_id: String,
    pub payment_method_id: String,
    pub amount_cents: i64,
    /// Defaults to the engine clock when absent.
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Derived settlement figures for an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceBalance {
    pub total: Money,
    pub paid: Money,
    pub balance_due: Money,
    pub is_settled: bool,
}

// =============================================================================
// Reference Data
// =============================================================================
//
// Owned by an external CRUD service. The engine only reads these (and the
// seed binary / tests insert them).

/// A dining area (salon, terrace, bar).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sector {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub is_active: bool,
}

/// Waiter or other staff member who can open orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// A menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Current price in cents; copied onto order items when added.
    pub price_cents: i64,
    pub is_active: bool,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// Cash, card, transfer...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentMethod {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

// =============================================================================
// Unit Tests
// =============================================================================
