//! # Billing Math
//!
//! Everything the Billing Engine and Payment Reconciler compute without
//! touching storage: invoice codes, line snapshots, totals, balances, and
//! the payment acceptance policy.
//!
//! ## Invoice Generation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderItem (A, qty 2, 100.00)  ──snapshot──►  InvoiceLine 200.00        │
//! │  OrderItem (B, qty 1, 200.00)  ──snapshot──►  InvoiceLine 200.00        │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                                  Invoice.total = Σ subtotals = 400.00   │
//! │                                                                         │
//! │  Code: FACT-20250601-00007                                              │
//! │        │    │        └── per-day sequence, allocated in the same tx    │
//! │        │    └── UTC issue date                                          │
//! │        └── configurable prefix                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Settlement
//! `balance_due = total − Σ payments` (reversals are negative entries),
//! `is_settled ⇔ balance_due ≤ 0`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Invoice, InvoiceBalance, Order, OrderItem, OrderStatus, Payment};

/// Width of the zero-padded sequence part of an invoice code.
pub const INVOICE_SEQUENCE_WIDTH: usize = 5;

// =============================================================================
// Invoice Codes
// =============================================================================

/// Key of the per-day sequence row for an issue timestamp (`YYYYMMDD`, UTC).
pub fn invoice_day(issued_at: DateTime<Utc>) -> String {
    issued_at.format("%Y%m%d").to_string()
}

/// Formats an invoice code.
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use comanda_core::billing::format_invoice_code;
///
/// let at = Utc.with_ymd_and_hms(2025, 6, 1, 21, 15, 0).unwrap();
/// assert_eq!(format_invoice_code("FACT", at, 7), "FACT-20250601-00007");
/// ```
pub fn format_invoice_code(prefix: &str, issued_at: DateTime<Utc>, sequence: i64) -> String {
    format!(
        "{}-{}-{:0width$}",
        prefix,
        invoice_day(issued_at),
        sequence,
        width = INVOICE_SEQUENCE_WIDTH
    )
}

/// Splits an invoice code into its date and sequence.
///
/// Returns `None` for anything that is not `PREFIX-YYYYMMDD-NNNNN`.
pub fn parse_invoice_code(prefix: &str, code: &str) -> Option<(NaiveDate, i64)> {
    let rest = code.strip_prefix(prefix)?.strip_prefix('-')?;
    let (day, seq) = rest.split_once('-')?;

    if day.len() != 8 || seq.len() < INVOICE_SEQUENCE_WIDTH {
        return None;
    }
    if !seq.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let date = NaiveDate::parse_from_str(day, "%Y%m%d").ok()?;
    let sequence = seq.parse::<i64>().ok().filter(|s| *s > 0)?;
    Some((date, sequence))
}

// =============================================================================
// Line Snapshots
// =============================================================================

/// Frozen copy of one order item, ready to be written as an invoice line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSnapshot {
    pub order_item_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub subtotal: Money,
}

fn too_large(field: &str) -> CoreError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
    .into()
}

/// Snapshots order items using the unit price captured when each was added.
///
/// Fails with `Validation` if a subtotal does not fit in `Money`.
pub fn snapshot_lines(items: &[OrderItem]) -> CoreResult<Vec<LineSnapshot>> {
    items
        .iter()
        .map(|item| {
            let unit_price = item.unit_price();
            let subtotal = unit_price
                .checked_multiply_quantity(item.quantity)
                .ok_or_else(|| too_large("line subtotal"))?;

            Ok(LineSnapshot {
                order_item_id: item.id.clone(),
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price,
                subtotal,
            })
        })
        .collect()
}

/// Invoice total: the sum of line subtotals.
pub fn invoice_total(lines: &[LineSnapshot]) -> CoreResult<Money> {
    lines.iter().try_fold(Money::zero(), |total, line| {
        total
            .checked_add(line.subtotal)
            .ok_or_else(|| too_large("invoice total"))
    })
}

/// Checks an order can be turned into an invoice.
///
/// `already_invoiced` is checked first: an invoiced order is also closed,
/// and "already invoiced" is the more useful answer.
pub fn ensure_billable(order: &Order, items: &[OrderItem], already_invoiced: bool) -> CoreResult<()> {
    if already_invoiced {
        return Err(CoreError::AlreadyInvoiced {
            order_id: order.id.clone(),
        });
    }

    if order.status != OrderStatus::Open {
        return Err(CoreError::OrderNotBillable {
            order_id: order.id.clone(),
            status: order.status.to_string(),
        });
    }

    if items.is_empty() {
        return Err(CoreError::EmptyOrder {
            order_id: order.id.clone(),
        });
    }

    Ok(())
}

/// Voiding is a one-way trip.
pub fn ensure_can_void(invoice: &Invoice) -> CoreResult<()> {
    if invoice.is_voided() {
        return Err(CoreError::AlreadyVoided {
            invoice_id: invoice.id.clone(),
        });
    }
    Ok(())
}

// =============================================================================
// Settlement
// =============================================================================

/// Computes paid / balance due / settled from the invoice total and the
/// signed payment amounts.
///
/// ## Example
/// ```rust
/// use comanda_core::billing::settle;
/// use comanda_core::Money;
///
/// let balance = settle(Money::from_cents(40000), [Money::from_cents(15000)])?;
/// assert_eq!(balance.balance_due.to_string(), "250.00");
/// assert!(!balance.is_settled);
/// # Ok::<(), comanda_core::CoreError>(())
/// ```
pub fn settle(
    total: Money,
    payments: impl IntoIterator<Item = Money>,
) -> CoreResult<InvoiceBalance> {
    let paid = payments
        .into_iter()
        .try_fold(Money::zero(), |paid, amount| paid.checked_add(amount))
        .ok_or_else(|| too_large("amount paid"))?;
    let balance_due = total
        .checked_sub(paid)
        .ok_or_else(|| too_large("balance due"))?;

    Ok(InvoiceBalance {
        total,
        paid,
        balance_due,
        is_settled: !balance_due.is_positive(),
    })
}

/// How the reconciler treats edge-case payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentPolicy {
    /// Accept payments beyond the balance due (tips, rounding up).
    pub allow_overpayment: bool,

    /// Accept payments against a voided invoice.
    pub allow_payments_on_voided: bool,
}

/// Checks a new (positive) payment against the invoice and the policy.
pub fn ensure_payment_accepted(
    invoice: &Invoice,
    balance: &InvoiceBalance,
    amount: Money,
    policy: &PaymentPolicy,
) -> CoreResult<()> {
    if invoice.is_voided() && !policy.allow_payments_on_voided {
        return Err(CoreError::invalid_transition(
            "Invoice",
            &invoice.id,
            invoice.status,
            "record payment",
        ));
    }

    if amount > balance.balance_due && !policy.allow_overpayment {
        return Err(CoreError::Overpayment {
            invoice_id: invoice.id.clone(),
            balance_due: balance.balance_due,
            attempted: amount,
        });
    }

    // The ledger sum must stay representable for every later settlement.
    balance
        .paid
        .checked_add(amount)
        .and_then(|paid| balance.total.checked_sub(paid))
        .ok_or_else(|| too_large("amount paid"))?;

    Ok(())
}

/// A payment can be reversed once, and a reversal cannot be reversed.
pub fn ensure_reversible(payment: &Payment, already_reversed: bool) -> CoreResult<()> {
    if payment.is_reversal() {
        return Err(CoreError::NotReversible {
            payment_id: payment.id.clone(),
            reason: "it is itself a reversal".to_string(),
        });
    }

    if already_reversed {
        return Err(CoreError::NotReversible {
            payment_id: payment.id.clone(),
            reason: "it was already reversed".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
