//! # Reservation Repository
//!
//! The Reservation Manager: booking, attendance, no-shows, cancellation and
//! rescheduling against a table and exact time slot.
//!
//! ## Slot Exclusivity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Table 3 @ 2025-06-01T20:00                                            │
//! │                                                                         │
//! │  #101 active     ✓ holds the slot                                      │
//! │  #102 ─────────► SlotTaken (Conflict)         application check        │
//! │                  UNIQUE(table_id, scheduled_at) WHERE status <>        │
//! │                  'cancelled'                   storage backstop        │
//! │                                                                         │
//! │  Table 3 @ 2025-06-01T20:30                                            │
//! │  #102 active     ✓ a different instant is a different slot             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use comanda_core::lifecycle::{
    ensure_can_cancel_reservation, ensure_can_mark_attended, ensure_can_mark_no_show,
    ensure_can_reschedule, ensure_fits, ensure_table_active,
};
use comanda_core::validation::{
    validate_future, validate_party_size, validate_reason, validate_reservation_number,
};
use comanda_core::{
    Clock, CoreError, Customer, NewReservation, Reservation, ReservationStatus, NO_SHOW_REASON,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use super::catalog::{self, ReferenceKind};
use super::{begin_write, new_id, table, translate_unique};
use crate::error::{DbError, DbResult};

/// Loads a reservation inside an open transaction.
pub(crate) async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Reservation> {
    sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Reservation", id))
}

/// Moves a reservation to a new status inside an open transaction.
pub(crate) async fn set_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: ReservationStatus,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query("UPDATE reservations SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(status)
        .bind(now)
        .execute(conn)
        .await?;

    debug!(reservation_id = %id, status = %status, "Reservation status changed");
    Ok(())
}

/// Checks slot and number exclusivity, ignoring `exclude_id` (the row being
/// rescheduled).
async fn ensure_slot_free(
    conn: &mut SqliteConnection,
    table_id: &str,
    scheduled_at: DateTime<Utc>,
    exclude_id: Option<&str>,
) -> DbResult<()> {
    let holder: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM reservations
        WHERE table_id = ?1 AND scheduled_at = ?2 AND status <> 'cancelled'
          AND (?3 IS NULL OR id <> ?3)
        LIMIT 1
        "#,
    )
    .bind(table_id)
    .bind(scheduled_at)
    .bind(exclude_id)
    .fetch_optional(conn)
    .await?;

    if holder.is_some() {
        return Err(slot_taken(table_id, scheduled_at).into());
    }
    Ok(())
}

fn slot_taken(table_id: &str, scheduled_at: DateTime<Utc>) -> CoreError {
    CoreError::SlotTaken {
        table_id: table_id.to_string(),
        scheduled_at,
    }
}

fn duplicate_number(number: i64) -> CoreError {
    CoreError::DuplicateNumber {
        entity: "Reservation".to_string(),
        number,
    }
}

/// Maps the two reservation indexes back to their domain errors.
fn translate_reservation_unique(
    err: sqlx::Error,
    number: i64,
    table_id: &str,
    scheduled_at: DateTime<Utc>,
) -> DbError {
    translate_unique(err.into(), |field| {
        if field.starts_with("reservations.table_id") {
            Some(slot_taken(table_id, scheduled_at))
        } else if field == "reservations.number" {
            Some(duplicate_number(number))
        } else {
            None
        }
    })
}

/// Repository for reservations.
#[derive(Clone)]
pub struct ReservationRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl ReservationRepository {
    /// Creates a new ReservationRepository.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        ReservationRepository { pool, clock }
    }

    /// Books a table for a party at an exact time.
    ///
    /// ## Errors
    /// - `Validation`: time not strictly in the future, party size or number ≤ 0
    /// - `NotFound`: customer or table missing
    /// - `Conflict`: customer inactive or table retired
    /// - `Capacity`: party larger than the table
    /// - `Conflict`: slot taken, or number used by a non-cancelled reservation
    pub async fn create(&self, input: NewReservation) -> DbResult<Reservation> {
        let now = self.clock.utc();

        validate_reservation_number(input.number)?;
        validate_party_size(input.party_size)?;
        validate_future("scheduled_at", input.scheduled_at, now)?;

        let mut tx = begin_write(&self.pool).await?;

        let customer: Customer =
            catalog::load(&mut tx, ReferenceKind::Customer, &input.customer_id).await?;
        if !customer.is_active {
            return Err(CoreError::inactive("Customer", &customer.id).into());
        }

        let dining_table = table::load(&mut tx, &input.table_id).await?;
        ensure_table_active(&dining_table)?;
        ensure_fits(&dining_table, input.party_size)?;

        ensure_slot_free(&mut tx, &input.table_id, input.scheduled_at, None).await?;

        let number_taken: Option<String> = sqlx::query_scalar(
            "SELECT id FROM reservations WHERE number = ?1 AND status <> 'cancelled'",
        )
        .bind(input.number)
        .fetch_optional(&mut *tx)
        .await?;

        if number_taken.is_some() {
            return Err(duplicate_number(input.number).into());
        }

        let reservation = Reservation {
            id: new_id(),
            number: input.number,
            scheduled_at: input.scheduled_at,
            party_size: input.party_size,
            customer_id: input.customer_id,
            table_id: input.table_id,
            status: ReservationStatus::Active,
            cancellation_reason: None,
            deposit_returned: false,
            deposit_recovered: false,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, number, scheduled_at, party_size, customer_id, table_id, status,
                cancellation_reason, deposit_returned, deposit_recovered, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&reservation.id)
        .bind(reservation.number)
        .bind(reservation.scheduled_at)
        .bind(reservation.party_size)
        .bind(&reservation.customer_id)
        .bind(&reservation.table_id)
        .bind(reservation.status)
        .bind(&reservation.cancellation_reason)
        .bind(reservation.deposit_returned)
        .bind(reservation.deposit_recovered)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            translate_reservation_unique(
                e,
                reservation.number,
                &reservation.table_id,
                reservation.scheduled_at,
            )
        })?;

        tx.commit().await?;

        info!(
            id = %reservation.id,
            number = reservation.number,
            table_id = %reservation.table_id,
            scheduled_at = %reservation.scheduled_at,
            "Created reservation"
        );
        Ok(reservation)
    }

    /// Records that the guests arrived. Legal only from `active`.
    pub async fn mark_attended(&self, id: &str) -> DbResult<Reservation> {
        let mut tx = begin_write(&self.pool).await?;

        let mut reservation = load(&mut tx, id).await?;
        ensure_can_mark_attended(&reservation)?;

        let now = self.clock.utc();
        set_status(&mut tx, id, ReservationStatus::Attended, now).await?;

        tx.commit().await?;

        reservation.status = ReservationStatus::Attended;
        reservation.updated_at = now;
        info!(id = %id, "Reservation attended");
        Ok(reservation)
    }

    /// Records a no-show once the slot has started.
    ///
    /// Sets `cancelled` with reason `"no-show"` and records whether the
    /// deposit was kept.
    pub async fn mark_no_show(&self, id: &str, deposit_recovered: bool) -> DbResult<Reservation> {
        let mut tx = begin_write(&self.pool).await?;

        let reservation = load(&mut tx, id).await?;
        let now = self.clock.utc();
        ensure_can_mark_no_show(&reservation, now)?;

        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations SET
                status = 'cancelled',
                cancellation_reason = ?2,
                deposit_recovered = ?3,
                updated_at = ?4
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(NO_SHOW_REASON)
        .bind(deposit_recovered)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(id = %id, deposit_recovered, "Reservation marked no-show");
        Ok(reservation)
    }

    /// Cancels a reservation from any non-terminal state.
    ///
    /// ## Errors
    /// - `Validation`: blank reason
    /// - `Conflict`: already cancelled
    /// - `State`: completed
    pub async fn cancel(&self, id: &str, reason: &str, deposit_returned: bool) -> DbResult<Reservation> {
        let reason = validate_reason(reason)?;

        let mut tx = begin_write(&self.pool).await?;

        let reservation = load(&mut tx, id).await?;
        ensure_can_cancel_reservation(&reservation)?;

        let now = self.clock.utc();
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations SET
                status = 'cancelled',
                cancellation_reason = ?2,
                deposit_returned = ?3,
                updated_at = ?4
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&reason)
        .bind(deposit_returned)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(id = %id, reason = %reason, deposit_returned, "Reservation cancelled");
        Ok(reservation)
    }

    /// Moves a reservation to another time, table or party size.
    ///
    /// Reruns the future-date, activity, capacity and slot checks; the
    /// reservation's own current slot does not count as taken. An
    /// `in_progress` reservation cannot change table.
    pub async fn reschedule(
        &self,
        id: &str,
        scheduled_at: DateTime<Utc>,
        table_id: &str,
        party_size: i64,
    ) -> DbResult<Reservation> {
        let now = self.clock.utc();

        validate_party_size(party_size)?;
        validate_future("scheduled_at", scheduled_at, now)?;

        let mut tx = begin_write(&self.pool).await?;

        let reservation = load(&mut tx, id).await?;
        ensure_can_reschedule(&reservation, table_id)?;

        let dining_table = table::load(&mut tx, table_id).await?;
        ensure_table_active(&dining_table)?;
        ensure_fits(&dining_table, party_size)?;

        ensure_slot_free(&mut tx, table_id, scheduled_at, Some(id)).await?;

        let updated = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations SET
                scheduled_at = ?2,
                table_id = ?3,
                party_size = ?4,
                updated_at = ?5
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(scheduled_at)
        .bind(table_id)
        .bind(party_size)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| translate_reservation_unique(e, reservation.number, table_id, scheduled_at))?;

        tx.commit().await?;

        info!(
            id = %id,
            table_id = %table_id,
            scheduled_at = %scheduled_at,
            party_size,
            "Reservation rescheduled"
        );
        Ok(updated)
    }

    /// Gets a reservation by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(reservation)
    }

    /// Lists the non-cancelled reservations of a table in slot order.
    pub async fn list_for_table(&self, table_id: &str) -> DbResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE table_id = ?1 AND status <> 'cancelled'
            ORDER BY scheduled_at
            "#,
        )
        .bind(table_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
