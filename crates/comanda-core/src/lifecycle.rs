//! # Lifecycle Rules
//!
//! Pure transition checks for tables, reservations and orders. The
//! repositories load the current rows inside a write transaction, ask this
//! module whether the operation is legal, and only then write.
//!
//! ## State Machines
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Reservation                                                            │
//! │                                                                         │
//! │   active ──attended──► attended ──open order──► in_progress            │
//! │     │                     ▲                        │   │                │
//! │     │                     └────order cancelled─────┘   │ close/invoice  │
//! │     │                                                  ▼                │
//! │     │                                              completed            │
//! │     │                                                                   │
//! │     ├──no-show (after slot)──► cancelled ◄── cancel (reason) from any   │
//! │     └──cancel (reason)─────────────┘         non-terminal state         │
//! │                                                                         │
//! │  Order                                                                  │
//! │                                                                         │
//! │   open ──close (all delivered) / invoice──► closed                     │
//! │     └──cancel (not invoiced)──────────────► cancelled                  │
//! │                                                                         │
//! │  Table                                                                  │
//! │                                                                         │
//! │   active ──retire (no open order, no pending reservation)──► retired   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::types::{DiningTable, Order, OrderItem, OrderStatus, Reservation, ReservationStatus};

// =============================================================================
// Tables
// =============================================================================

/// A retired table accepts no reservations or orders.
pub fn ensure_table_active(table: &DiningTable) -> CoreResult<()> {
    if !table.is_active() {
        return Err(CoreError::inactive("Table", &table.id));
    }
    Ok(())
}

/// Party size must not exceed the table capacity.
pub fn ensure_fits(table: &DiningTable, party_size: i64) -> CoreResult<()> {
    if !table.fits(party_size) {
        return Err(CoreError::CapacityExceeded {
            table_number: table.number,
            capacity: table.capacity,
            party_size,
        });
    }
    Ok(())
}

/// Checks a table can be retired.
///
/// `pending_reservations` counts reservations in `active`, `attended` or
/// `in_progress` that point at the table.
pub fn ensure_can_retire(
    table: &DiningTable,
    has_open_order: bool,
    pending_reservations: i64,
) -> CoreResult<()> {
    ensure_table_active(table)?;

    if has_open_order {
        return Err(CoreError::TableInUse {
            table_id: table.id.clone(),
            reason: "it has an open order".to_string(),
        });
    }

    if pending_reservations > 0 {
        return Err(CoreError::TableInUse {
            table_id: table.id.clone(),
            reason: format!("{pending_reservations} pending reservation(s)"),
        });
    }

    Ok(())
}

// =============================================================================
// Reservations
// =============================================================================

fn reservation_state_error(reservation: &Reservation, operation: &str) -> CoreError {
    CoreError::invalid_transition("Reservation", &reservation.id, reservation.status, operation)
}

/// Only an `active` reservation can be marked attended.
pub fn ensure_can_mark_attended(reservation: &Reservation) -> CoreResult<()> {
    if reservation.status != ReservationStatus::Active {
        return Err(reservation_state_error(reservation, "mark attended"));
    }
    Ok(())
}

/// A no-show needs an `active` reservation whose slot has started.
pub fn ensure_can_mark_no_show(reservation: &Reservation, now: DateTime<Utc>) -> CoreResult<()> {
    if reservation.status != ReservationStatus::Active {
        return Err(reservation_state_error(reservation, "mark no-show"));
    }

    if now < reservation.scheduled_at {
        return Err(CoreError::SlotNotElapsed {
            reservation_id: reservation.id.clone(),
            scheduled_at: reservation.scheduled_at,
        });
    }

    Ok(())
}

/// Cancel is allowed from any non-terminal state.
pub fn ensure_can_cancel_reservation(reservation: &Reservation) -> CoreResult<()> {
    match reservation.status {
        ReservationStatus::Cancelled => Err(CoreError::AlreadyCancelled {
            entity: "Reservation".to_string(),
            id: reservation.id.clone(),
        }),
        ReservationStatus::Completed => Err(reservation_state_error(reservation, "cancel")),
        ReservationStatus::Active | ReservationStatus::Attended | ReservationStatus::InProgress => {
            Ok(())
        }
    }
}

/// Any non-terminal reservation can move; once its order is open it stays
/// on the order's table.
pub fn ensure_can_reschedule(reservation: &Reservation, table_id: &str) -> CoreResult<()> {
    if reservation.status.is_terminal() {
        return Err(reservation_state_error(reservation, "reschedule"));
    }

    if reservation.status == ReservationStatus::InProgress && reservation.table_id != table_id {
        return Err(reservation_state_error(reservation, "move to another table"));
    }

    Ok(())
}

/// Orders are only opened from seated guests.
pub fn ensure_can_open_order(reservation: &Reservation) -> CoreResult<()> {
    if reservation.status != ReservationStatus::Attended {
        return Err(reservation_state_error(reservation, "open an order"));
    }
    Ok(())
}

/// Reservation status after its order is closed or invoiced.
///
/// Returns `None` when the reservation should be left alone (for example,
/// it was cancelled while the order stayed open).
pub fn reservation_after_order_closed(status: ReservationStatus) -> Option<ReservationStatus> {
    match status {
        ReservationStatus::InProgress => Some(ReservationStatus::Completed),
        _ => None,
    }
}

/// Reservation status after its order is cancelled: guests are still seated.
pub fn reservation_after_order_cancelled(status: ReservationStatus) -> Option<ReservationStatus> {
    match status {
        ReservationStatus::InProgress => Some(ReservationStatus::Attended),
        _ => None,
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Items and notes can only change while the order is open.
pub fn ensure_order_open(order: &Order, operation: &str) -> CoreResult<()> {
    if order.status != OrderStatus::Open {
        return Err(CoreError::invalid_transition(
            "Order",
            &order.id,
            order.status,
            operation,
        ));
    }
    Ok(())
}

/// Closing requires an open order with every item delivered.
///
/// Closing never bills; an order closed this way can no longer be invoiced.
pub fn ensure_can_close(order: &Order, items: &[OrderItem]) -> CoreResult<()> {
    ensure_order_open(order, "close")?;

    let pending = items.iter().filter(|item| !item.delivered).count();
    if pending > 0 {
        return Err(CoreError::UndeliveredItems {
            order_id: order.id.clone(),
            pending,
        });
    }

    Ok(())
}

/// An invoiced order cannot be cancelled; void the invoice instead.
pub fn ensure_can_cancel_order(order: &Order, invoiced: bool) -> CoreResult<()> {
    if invoiced {
        return Err(CoreError::AlreadyInvoiced {
            order_id: order.id.clone(),
        });
    }
    ensure_order_open(order, "cancel")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{Occupancy, TableStatus};
    use chrono::{Duration, TimeZone};

    fn slot() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 20, 0, 0).unwrap()
    }

    fn reservation(status: ReservationStatus) -> Reservation {
        Reservation {
            id: "r-1".into(),
            number: 10,
            scheduled_at: slot(),
            party_size: 4,
            customer_id: "c".into(),
            table_id: "t".into(),
            status,
            cancellation_reason: None,
            deposit_returned: false,
            deposit_recovered: false,
            created_at: slot() - Duration::days(7),
            updated_at: slot() - Duration::days(7),
        }
    }

    fn table(capacity: i64, status: TableStatus) -> DiningTable {
        DiningTable {
            id: "t".into(),
            number: 3,
            capacity,
            sector_id: "s".into(),
            status,
            occupancy: Occupancy::Free,
            created_at: slot(),
            updated_at: slot(),
        }
    }

    fn order(status: OrderStatus) -> Order {
        Order {
            id: "o-1".into(),
            table_id: "t".into(),
            staff_id: "w".into(),
            reservation_id: None,
            customer_id: None,
            notes: None,
            status,
            opened_at: slot(),
            closed_at: None,
            updated_at: slot(),
        }
    }

    fn item(delivered: bool) -> OrderItem {
        OrderItem {
            id: "i".into(),
            order_id: "o-1".into(),
            product_id: "p".into(),
            quantity: 1,
            unit_price_cents: 100,
            delivered,
            created_at: slot(),
        }
    }

    #[test]
    fn test_mark_attended_only_from_active() {
        assert!(ensure_can_mark_attended(&reservation(ReservationStatus::Active)).is_ok());

        let err = ensure_can_mark_attended(&reservation(ReservationStatus::Attended)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn test_no_show_requires_elapsed_slot() {
        let r = reservation(ReservationStatus::Active);

        let err = ensure_can_mark_no_show(&r, slot() - Duration::minutes(1)).unwrap_err();
        assert!(matches!(err, CoreError::SlotNotElapsed { .. }));
        assert!(ensure_can_mark_no_show(&r, slot()).is_ok());
        assert!(ensure_can_mark_no_show(&r, slot() + Duration::hours(1)).is_ok());

        let attended = reservation(ReservationStatus::Attended);
        assert!(ensure_can_mark_no_show(&attended, slot() + Duration::hours(1)).is_err());
    }

    #[test]
    fn test_cancel_reservation_rules() {
        for status in [
            ReservationStatus::Active,
            ReservationStatus::Attended,
            ReservationStatus::InProgress,
        ] {
            assert!(ensure_can_cancel_reservation(&reservation(status)).is_ok());
        }

        let err = ensure_can_cancel_reservation(&reservation(ReservationStatus::Cancelled))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = ensure_can_cancel_reservation(&reservation(ReservationStatus::Completed))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn test_reschedule_blocked_when_terminal() {
        let attended = reservation(ReservationStatus::Attended);
        assert!(ensure_can_reschedule(&attended, &attended.table_id).is_ok());
        assert!(ensure_can_reschedule(&attended, "t9").is_ok());

        let cancelled = reservation(ReservationStatus::Cancelled);
        assert!(ensure_can_reschedule(&cancelled, &cancelled.table_id).is_err());
        let completed = reservation(ReservationStatus::Completed);
        assert!(ensure_can_reschedule(&completed, &completed.table_id).is_err());
    }

    #[test]
    fn test_in_progress_reservation_keeps_its_table() {
        let seated = reservation(ReservationStatus::InProgress);
        assert!(ensure_can_reschedule(&seated, &seated.table_id).is_ok());

        let err = ensure_can_reschedule(&seated, "t9").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn test_open_order_requires_attended() {
        assert!(ensure_can_open_order(&reservation(ReservationStatus::Attended)).is_ok());
        let err = ensure_can_open_order(&reservation(ReservationStatus::Active)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn test_reservation_follow_ups() {
        assert_eq!(
            reservation_after_order_closed(ReservationStatus::InProgress),
            Some(ReservationStatus::Completed)
        );
        assert_eq!(
            reservation_after_order_closed(ReservationStatus::Cancelled),
            None
        );
        assert_eq!(
            reservation_after_order_cancelled(ReservationStatus::InProgress),
            Some(ReservationStatus::Attended)
        );
    }

    #[test]
    fn test_capacity_and_activity() {
        assert!(ensure_fits(&table(4, TableStatus::Active), 4).is_ok());

        let err = ensure_fits(&table(4, TableStatus::Active), 6).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert_eq!(err.to_string(), "Table 3 seats 4, party of 6 does not fit");

        let err = ensure_table_active(&table(4, TableStatus::Retired)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_retire_rules() {
        let t = table(4, TableStatus::Active);
        assert!(ensure_can_retire(&t, false, 0).is_ok());
        assert!(matches!(
            ensure_can_retire(&t, true, 0),
            Err(CoreError::TableInUse { .. })
        ));
        assert!(matches!(
            ensure_can_retire(&t, false, 2),
            Err(CoreError::TableInUse { .. })
        ));
        assert!(ensure_can_retire(&table(4, TableStatus::Retired), false, 0).is_err());
    }

    #[test]
    fn test_close_requires_delivery() {
        let o = order(OrderStatus::Open);
        assert!(ensure_can_close(&o, &[item(true), item(true)]).is_ok());
        assert!(ensure_can_close(&o, &[]).is_ok());

        let err = ensure_can_close(&o, &[item(true), item(false)]).unwrap_err();
        assert!(matches!(err, CoreError::UndeliveredItems { pending: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = ensure_can_close(&order(OrderStatus::Closed), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn test_cancel_order_rules() {
        assert!(ensure_can_cancel_order(&order(OrderStatus::Open), false).is_ok());

        let err = ensure_can_cancel_order(&order(OrderStatus::Closed), true).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyInvoiced { .. }));

        let err = ensure_can_cancel_order(&order(OrderStatus::Cancelled), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn test_mutations_need_open_order() {
        assert!(ensure_order_open(&order(OrderStatus::Open), "add items").is_ok());
        let err = ensure_order_open(&order(OrderStatus::Closed), "add items").unwrap_err();
        assert_eq!(err.to_string(), "Order o-1 is closed, cannot add items");
    }
}
