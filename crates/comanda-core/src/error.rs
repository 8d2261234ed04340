//! # Error Types
//!
//! Domain-specific error types for comanda-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  comanda-core errors (this file)                                       │
//! │  ├── CoreError        - Lifecycle and invariant violations             │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - Coarse taxonomy callers map to responses       │
//! │                                                                         │
//! │  comanda-db errors (separate crate)                                    │
//! │  └── DbError          - Storage failures + wrapped CoreError           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → HTTP layer              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Taxonomy
//! Every variant belongs to exactly one [`ErrorKind`]:
//!
//! | Kind         | Meaning                                                 |
//! |--------------|---------------------------------------------------------|
//! | `NotFound`   | referenced entity absent                                |
//! | `Validation` | malformed or out-of-range input                         |
//! | `Conflict`   | a state invariant would be violated                     |
//! | `State`      | operation illegal for the current lifecycle state       |
//! | `Capacity`   | party size exceeds table capacity                       |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse error classification exposed to callers.
///
/// The HTTP layer maps these to status codes; the engine itself never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    State,
    Capacity,
    /// Infrastructure failure (only produced by the storage layer).
    Storage,
}

// =============================================================================
// Core Error
// =============================================================================

/// Lifecycle and invariant violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Party does not fit at the table.
    ///
    /// ## When This Occurs
    /// ```text
    /// Reservation for 6 people
    ///      │
    ///      ▼
    /// Table 3 seats 4
    ///      │
    ///      ▼
    /// CapacityExceeded { table_number: 3, capacity: 4, party_size: 6 }
    /// ```
    #[error("Table {table_number} seats {capacity}, party of {party_size} does not fit")]
    CapacityExceeded {
        table_number: i64,
        capacity: i64,
        party_size: i64,
    },

    /// Another non-cancelled reservation already holds the slot.
    #[error("Table {table_id} is already reserved at {scheduled_at}")]
    SlotTaken {
        table_id: String,
        scheduled_at: DateTime<Utc>,
    },

    /// A human-facing number is already taken.
    #[error("{entity} number {number} is already in use")]
    DuplicateNumber { entity: String, number: i64 },

    /// Referenced entity exists but is retired/inactive.
    #[error("{entity} {id} is inactive")]
    Inactive { entity: String, id: String },

    /// The table already has an open order.
    #[error("Table {table_id} already has an open order")]
    TableBusy { table_id: String },

    /// The table cannot be retired while something still references it.
    #[error("Table {table_id} is still in use: {reason}")]
    TableInUse { table_id: String, reason: String },

    /// The reservation already produced a live order.
    #[error("Reservation {reservation_id} already has an order")]
    ReservationHasOrder { reservation_id: String },

    /// Closing requires every line item to be delivered.
    #[error("Order {order_id} has {pending} undelivered item(s)")]
    UndeliveredItems { order_id: String, pending: usize },

    /// Invoicing requires at least one line item.
    #[error("Order {order_id} has no items to invoice")]
    EmptyOrder { order_id: String },

    /// Invoicing requires an open order.
    #[error("Order {order_id} is {status}, only open orders can be invoiced")]
    OrderNotBillable { order_id: String, status: String },

    /// An order can be invoiced at most once.
    #[error("Order {order_id} has already been invoiced")]
    AlreadyInvoiced { order_id: String },

    /// Invoice was already voided.
    #[error("Invoice {invoice_id} is already voided")]
    AlreadyVoided { invoice_id: String },

    /// Entity was already cancelled.
    #[error("{entity} {id} is already cancelled")]
    AlreadyCancelled { entity: String, id: String },

    /// Payment would push the amount paid above the invoice total.
    #[error("Payment of {attempted} exceeds balance due {balance_due} on invoice {invoice_id}")]
    Overpayment {
        invoice_id: String,
        balance_due: Money,
        attempted: Money,
    },

    /// Payment already has a reversal entry, or is itself a reversal.
    #[error("Payment {payment_id} cannot be reversed: {reason}")]
    NotReversible { payment_id: String, reason: String },

    /// Operation not allowed from the current lifecycle state.
    ///
    /// ## When This Occurs
    /// - Marking a reservation attended twice
    /// - Adding items to a closed order
    /// - Paying a voided invoice
    #[error("{entity} {id} is {status}, cannot {operation}")]
    InvalidTransition {
        entity: String,
        id: String,
        status: String,
        operation: String,
    },

    /// No-show can only be recorded after the reserved time.
    #[error("Reservation {reservation_id} is scheduled for {scheduled_at}, too early for a no-show")]
    SlotNotElapsed {
        reservation_id: String,
        scheduled_at: DateTime<Utc>,
    },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an Inactive error for a given entity type and ID.
    pub fn inactive(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::Inactive {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an InvalidTransition error.
    pub fn invalid_transition(
        entity: impl Into<String>,
        id: impl Into<String>,
        status: impl std::fmt::Display,
        operation: impl Into<String>,
    ) -> Self {
        CoreError::InvalidTransition {
            entity: entity.into(),
            id: id.into(),
            status: status.to_string(),
            operation: operation.into(),
        }
    }

    /// Classifies the error into the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::CapacityExceeded { .. } => ErrorKind::Capacity,
            CoreError::InvalidTransition { .. } | CoreError::SlotNotElapsed { .. } => {
                ErrorKind::State
            }
            CoreError::SlotTaken { .. }
            | CoreError::DuplicateNumber { .. }
            | CoreError::Inactive { .. }
            | CoreError::TableBusy { .. }
            | CoreError::TableInUse { .. }
            | CoreError::ReservationHasOrder { .. }
            | CoreError::UndeliveredItems { .. }
            | CoreError::EmptyOrder { .. }
            | CoreError::OrderNotBillable { .. }
            | CoreError::AlreadyInvoiced { .. }
            | CoreError::AlreadyVoided { .. }
            | CoreError::AlreadyCancelled { .. }
            | CoreError::Overpayment { .. }
            | CoreError::NotReversible { .. } => ErrorKind::Conflict,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before any state is read.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Date-time must lie strictly in the future.
    #[error("{field} must be in the future (got {value})")]
    NotInFuture { field: String, value: DateTime<Utc> },

    /// A referenced record is inactive where an active one is required.
    #[error("{field} '{id}' is inactive")]
    InactiveReference { field: String, id: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::CapacityExceeded {
            table_number: 3,
            capacity: 4,
            party_size: 6,
        };
        assert_eq!(
            err.to_string(),
            "Table 3 seats 4, party of 6 does not fit"
        );

        let err = CoreError::UndeliveredItems {
            order_id: "o-1".to_string(),
            pending: 2,
        };
        assert_eq!(err.to_string(), "Order o-1 has 2 undelivered item(s)");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "reason".to_string(),
        };
        assert_eq!(err.to_string(), "reason is required");

        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "reason".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            CoreError::not_found("Order", "x").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::TableBusy {
                table_id: "t".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CoreError::invalid_transition("Reservation", "r", "attended", "mark attended").kind(),
            ErrorKind::State
        );
        assert_eq!(
            CoreError::CapacityExceeded {
                table_number: 1,
                capacity: 2,
                party_size: 3
            }
            .kind(),
            ErrorKind::Capacity
        );
        assert_eq!(
            CoreError::AlreadyVoided {
                invoice_id: "i".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::invalid_transition("Order", "o-9", "closed", "add items");
        assert_eq!(err.to_string(), "Order o-9 is closed, cannot add items");
    }
}
