//! # comanda-core: Pure Business Logic for Comanda
//!
//! This crate holds the lifecycle rules of the restaurant table & order
//! engine as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Comanda Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              HTTP layer / staff terminals (external)            │   │
//! │  │   reservation.create, order.open, billing.generate, ...        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    comanda-db (Database Layer)                  │   │
//! │  │   BEGIN IMMEDIATE transaction ─► load rows ─► ask core ─► write │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ comanda-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌──────────┐ ┌──────┐ │   │
//! │  │   │  types   │ │  money   │ │ lifecycle │ │ billing  │ │clock │ │   │
//! │  │   │  Table   │ │  Money   │ │  state    │ │  codes   │ │ now()│ │   │
//! │  │   │  Order   │ │  cents   │ │ machines  │ │ balances │ │      │ │   │
//! │  │   └──────────┘ └──────────┘ └───────────┘ └──────────┘ └──────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (DiningTable, Reservation, Order, Invoice, Payment)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types and the caller-facing [`ErrorKind`]
//! - [`validation`] - Input shape validation
//! - [`lifecycle`] - Reservation / order / table transition rules
//! - [`billing`] - Invoice codes, line snapshots, settlement, payment policy
//! - [`clock`] - Injectable time source
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: rules take loaded rows and return `CoreResult`
//! 2. **No I/O**: the only side effect in this crate is reading the wall clock
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use comanda_core::billing::{invoice_total, settle, snapshot_lines};
//! use comanda_core::{Money, OrderItem};
//! # use chrono::Utc;
//! # let item = |qty, cents| OrderItem {
//! #     id: "i".into(), order_id: "o".into(), product_id: "p".into(),
//! #     quantity: qty, unit_price_cents: cents, delivered: true, created_at: Utc::now(),
//! # };
//!
//! let lines = snapshot_lines(&[item(2, 10000), item(1, 20000)])?;
//! let total = invoice_total(&lines)?;
//! assert_eq!(total.to_string(), "400.00");
//!
//! let balance = settle(total, [Money::from_cents(40000)])?;
//! assert!(balance.is_settled);
//! # Ok::<(), comanda_core::CoreError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod billing;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use comanda_core::Money` instead of
// `use comanda_core::money::Money`

pub use billing::PaymentPolicy;
pub use clock::{Clock, DefaultClock, ManualClock};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single line item.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 100 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Highest menu price accepted, in cents (100,000,000.00).
///
/// `MAX_PRICE_CENTS * MAX_ITEM_QUANTITY` stays well inside `i64`.
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

/// Highest single payment accepted, in cents (10,000,000,000.00).
pub const MAX_PAYMENT_CENTS: i64 = 1_000_000_000_000;

/// Default prefix of invoice codes (`FACT-YYYYMMDD-NNNNN`).
pub const INVOICE_CODE_PREFIX: &str = "FACT";

/// Cancellation reason recorded for no-shows.
pub const NO_SHOW_REASON: &str = "no-show";

/// Maximum length of cancellation and reversal reasons.
pub const MAX_REASON_LENGTH: usize = 200;

/// Maximum length of order notes.
pub const MAX_NOTES_LENGTH: usize = 500;

/// Maximum length of reference-data names.
pub const MAX_NAME_LENGTH: usize = 200;
