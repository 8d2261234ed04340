//! # Validation Module
//!
//! Input validation utilities for Comanda.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP layer (external)                                        │
//! │  └── Type validation (deserialization)                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Shape checks (positive, in range, non-empty, in the future)       │
//! │  └── Runs before any state is read                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Repository transaction (comanda-db)                          │
//! │  ├── Existence / active checks against current rows                    │
//! │  └── Lifecycle rules (crate::lifecycle)                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database (SQLite)                                            │
//! │  ├── CHECK constraints                                                 │
//! │  └── Partial UNIQUE indexes for cross-row invariants                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use comanda_core::validation::{validate_party_size, validate_quantity};
//!
//! validate_quantity(2).unwrap();
//! assert!(validate_party_size(0).is_err());
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::{
    MAX_ITEM_QUANTITY, MAX_NAME_LENGTH, MAX_NOTES_LENGTH, MAX_PAYMENT_CENTS, MAX_PRICE_CENTS,
    MAX_REASON_LENGTH,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

fn positive(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a table number (> 0).
pub fn validate_table_number(number: i64) -> ValidationResult<()> {
    positive("table number", number)
}

/// Validates a table capacity (> 0).
pub fn validate_capacity(capacity: i64) -> ValidationResult<()> {
    positive("capacity", capacity)
}

/// Validates a reservation number (> 0).
pub fn validate_reservation_number(number: i64) -> ValidationResult<()> {
    positive("reservation number", number)
}

/// Validates a party size (> 0).
///
/// Whether the party fits at a particular table is a capacity check done
/// against the table row, not here.
pub fn validate_party_size(party_size: i64) -> ValidationResult<()> {
    positive("party size", party_size)
}

/// Validates a line item quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Order: Add Item                                                        │
/// │                                                                         │
/// │  Waiter enters quantity: 2                                             │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(2) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0? → Error: "quantity must be positive"               │
/// │       │                                                                 │
/// │       ├── qty > 999? → Error: "quantity must be between 1 and 999"     │
/// │       │                                                                 │
/// │       └── OK → OrderRepository::add_item                               │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    positive("quantity", qty)?;

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (courtesy items)
/// - Must not exceed MAX_PRICE_CENTS
///
/// ## Example
/// ```rust
/// use comanda_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_PAYMENT_CENTS
/// - Negative entries only come from `reverse`, never from callers
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    positive("payment amount", cents)?;

    if cents > MAX_PAYMENT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "payment amount".to_string(),
            min: 1,
            max: MAX_PAYMENT_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// Validates that a date-time lies strictly after `now`.
///
/// `now` comes from the engine clock so tests can pin it.
pub fn validate_future(
    field: &str,
    value: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ValidationResult<()> {
    if value <= now {
        return Err(ValidationError::NotInFuture {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

fn bounded_text(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Validates a cancellation or reversal reason.
///
/// ## Returns
/// The trimmed reason.
///
/// ## Example
/// ```rust
/// use comanda_core::validation::validate_reason;
///
/// assert_eq!(validate_reason("  guest called ").unwrap(), "guest called");
/// assert!(validate_reason("   ").is_err());
/// ```
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    bounded_text("reason", reason, MAX_REASON_LENGTH)
}

/// Validates a display name for reference data.
pub fn validate_name(name: &str) -> ValidationResult<String> {
    bounded_text("name", name, MAX_NAME_LENGTH)
}

/// Validates order notes.
///
/// Notes are optional: `None` or blank clears them.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if notes.chars().count() > MAX_NOTES_LENGTH {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LENGTH,
        });
    }

    Ok(Some(notes.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(100).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(matches!(
            validate_quantity(0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(validate_quantity(-1).is_err());
        assert!(matches!(
            validate_quantity(1000),
            Err(ValidationError::OutOfRange { max: 999, .. })
        ));
    }

    #[test]
    fn test_positive_numbers() {
        assert!(validate_table_number(3).is_ok());
        assert!(validate_table_number(0).is_err());
        assert!(validate_capacity(4).is_ok());
        assert!(validate_capacity(-2).is_err());
        assert!(validate_party_size(1).is_ok());
        assert!(validate_party_size(0).is_err());
        assert!(validate_reservation_number(0).is_err());
    }

    #[test]
    fn test_validate_price_and_payment() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_payment_amount(1).is_ok());
        assert!(validate_payment_amount(0).is_err());
        assert!(validate_payment_amount(-500).is_err());

        assert!(validate_price_cents(MAX_PRICE_CENTS).is_ok());
        assert!(matches!(
            validate_price_cents(MAX_PRICE_CENTS + 1),
            Err(ValidationError::OutOfRange { max: MAX_PRICE_CENTS, .. })
        ));
        assert!(validate_payment_amount(MAX_PAYMENT_CENTS).is_ok());
        assert!(matches!(
            validate_payment_amount(i64::MAX),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_future() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();

        assert!(validate_future("scheduled_at", now + Duration::minutes(1), now).is_ok());
        assert!(matches!(
            validate_future("scheduled_at", now, now),
            Err(ValidationError::NotInFuture { .. })
        ));
        assert!(validate_future("scheduled_at", now - Duration::days(1), now).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert_eq!(validate_reason(" rain ").unwrap(), "rain");
        assert!(matches!(
            validate_reason(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_reason(&"x".repeat(MAX_REASON_LENGTH + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_notes() {
        assert_eq!(validate_notes(None).unwrap(), None);
        assert_eq!(validate_notes(Some("   ")).unwrap(), None);
        assert_eq!(
            validate_notes(Some(" no salt ")).unwrap(),
            Some("no salt".to_string())
        );
        assert!(validate_notes(Some(&"n".repeat(MAX_NOTES_LENGTH + 1))).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("Terraza").unwrap(), "Terraza");
        assert!(validate_name("").is_err());
    }
}
