//! # Table Repository
//!
//! The Table Registry: table records, retirement, and the occupancy flag.
//!
//! ## Occupancy Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  occupancy is never set by callers directly.                           │
//! │                                                                         │
//! │  OrderRepository::open_*        ──► occupy(conn, table)   ─┐           │
//! │  OrderRepository::close/cancel  ──► release(conn, table)   ├ same tx   │
//! │  InvoiceRepository::generate    ──► release(conn, table)  ─┘ as the    │
//! │                                                              order     │
//! │                                                              change    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use comanda_core::lifecycle::ensure_can_retire;
use comanda_core::validation::{validate_capacity, validate_table_number};
use comanda_core::{Clock, CoreError, DiningTable, Occupancy, Sector, TableStatus};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use super::catalog::{self, ReferenceKind};
use super::{begin_write, new_id, translate_unique};
use crate::error::{DbError, DbResult};

/// Loads a table inside an open transaction.
pub(crate) async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<DiningTable> {
    sqlx::query_as::<_, DiningTable>("SELECT * FROM dining_tables WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Table", id))
}

async fn set_occupancy(
    conn: &mut SqliteConnection,
    id: &str,
    occupancy: Occupancy,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE dining_tables SET occupancy = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(occupancy)
        .bind(now)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Table", id));
    }

    debug!(table_id = %id, occupancy = %occupancy, "Table occupancy changed");
    Ok(())
}

/// Marks a table occupied. Only called inside the transaction that opens
/// an order on it.
pub(crate) async fn occupy(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<()> {
    set_occupancy(conn, id, Occupancy::Occupied, now).await
}

/// Marks a table free. Only called inside the transaction that closes,
/// cancels or invoices its order.
pub(crate) async fn release(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<()> {
    set_occupancy(conn, id, Occupancy::Free, now).await
}

/// Repository for dining tables.
#[derive(Clone)]
pub struct TableRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl TableRepository {
    /// Creates a new TableRepository.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        TableRepository { pool, clock }
    }

    /// Registers a new table, `active` and `free`.
    ///
    /// ## Errors
    /// - `Validation`: number or capacity ≤ 0
    /// - `NotFound`: sector missing or inactive
    /// - `Conflict`: another active table has the number
    pub async fn register(&self, number: i64, capacity: i64, sector_id: &str) -> DbResult<DiningTable> {
        validate_table_number(number)?;
        validate_capacity(capacity)?;

        let mut tx = begin_write(&self.pool).await?;

        let sector: Sector = catalog::load(&mut tx, ReferenceKind::Sector, sector_id).await?;
        if !sector.is_active {
            return Err(DbError::not_found("Sector", sector_id));
        }

        let taken: Option<String> = sqlx::query_scalar(
            "SELECT id FROM dining_tables WHERE number = ?1 AND status = 'active'",
        )
        .bind(number)
        .fetch_optional(&mut *tx)
        .await?;

        if taken.is_some() {
            return Err(duplicate_number(number).into());
        }

        let now = self.clock.utc();
        let table = DiningTable {
            id: new_id(),
            number,
            capacity,
            sector_id: sector_id.to_string(),
            status: TableStatus::Active,
            occupancy: Occupancy::Free,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO dining_tables (
                id, number, capacity, sector_id, status, occupancy, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&table.id)
        .bind(table.number)
        .bind(table.capacity)
        .bind(&table.sector_id)
        .bind(table.status)
        .bind(table.occupancy)
        .bind(table.created_at)
        .bind(table.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            translate_unique(e.into(), |field| {
                (field == "dining_tables.number").then(|| duplicate_number(number))
            })
        })?;

        tx.commit().await?;

        info!(id = %table.id, number, capacity, "Registered table");
        Ok(table)
    }

    /// Retires a table.
    ///
    /// ## Errors
    /// - `NotFound`: no such table
    /// - `Conflict`: already retired, has an open order, or a reservation in
    ///   `active` / `attended` / `in_progress` still points at it
    pub async fn retire(&self, id: &str) -> DbResult<DiningTable> {
        let mut tx = begin_write(&self.pool).await?;

        let table = load(&mut tx, id).await?;

        let open_orders: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE table_id = ?1 AND status = 'open'")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        let pending_reservations: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM reservations
            WHERE table_id = ?1 AND status IN ('active', 'attended', 'in_progress')
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        ensure_can_retire(&table, open_orders > 0, pending_reservations)?;

        let now = self.clock.utc();
        let table = sqlx::query_as::<_, DiningTable>(
            "UPDATE dining_tables SET status = 'retired', updated_at = ?2 WHERE id = ?1 RETURNING *",
        )
        .bind(id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(id = %id, number = table.number, "Retired table");
        Ok(table)
    }

    /// Gets a table by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<DiningTable>> {
        let table = sqlx::query_as::<_, DiningTable>("SELECT * FROM dining_tables WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(table)
    }

    /// Lists active tables ordered by number.
    pub async fn list_active(&self) -> DbResult<Vec<DiningTable>> {
        let tables = sqlx::query_as::<_, DiningTable>(
            "SELECT * FROM dining_tables WHERE status = 'active' ORDER BY number",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }
}

fn duplicate_number(number: i64) -> CoreError {
    CoreError::DuplicateNumber {
        entity: "Table".to_string(),
        number,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use comanda_core::ErrorKind;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sector = db.catalog().insert_sector("Salon").await.unwrap();
        (db, sector.id)
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let (db, sector) = setup().await;

        let t5 = db.tables().register(5, 2, &sector).await.unwrap();
        let t3 = db.tables().register(3, 4, &sector).await.unwrap();

        assert_eq!(t3.status, TableStatus::Active);
        assert_eq!(t3.occupancy, Occupancy::Free);

        let active = db.tables().list_active().await.unwrap();
        let numbers: Vec<i64> = active.iter().map(|t| t.number).collect();
        assert_eq!(numbers, vec![3, 5]);

        assert_eq!(db.tables().get(&t5.id).await.unwrap(), Some(t5));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (db, sector) = setup().await;

        let err = db.tables().register(0, 4, &sector).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = db.tables().register(1, 0, &sector).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = db.tables().register(1, 4, "no-such-sector").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_inactive_sector_is_not_found() {
        let (db, sector) = setup().await;
        db.catalog()
            .set_active(ReferenceKind::Sector, &sector, false)
            .await
            .unwrap();

        let err = db.tables().register(1, 4, &sector).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_duplicate_active_number() {
        let (db, sector) = setup().await;
        let first = db.tables().register(7, 4, &sector).await.unwrap();

        let err = db.tables().register(7, 2, &sector).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::DuplicateNumber { number: 7, .. })
        ));

        // The number is free again once the old table is retired.
        db.tables().retire(&first.id).await.unwrap();
        assert!(db.tables().register(7, 2, &sector).await.is_ok());
    }

    #[tokio::test]
    async fn test_retire_twice_conflicts() {
        let (db, sector) = setup().await;
        let table = db.tables().register(2, 4, &sector).await.unwrap();

        let retired = db.tables().retire(&table.id).await.unwrap();
        assert_eq!(retired.status, TableStatus::Retired);
        assert!(db.tables().list_active().await.unwrap().is_empty());

        let err = db.tables().retire(&table.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = db.tables().retire("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_occupy_and_release() {
        let (db, sector) = setup().await;
        let table = db.tables().register(9, 4, &sector).await.unwrap();
        let now = Utc::now();

        let mut conn = db.pool().acquire().await.unwrap();
        occupy(&mut conn, &table.id, now).await.unwrap();
        assert_eq!(load(&mut conn, &table.id).await.unwrap().occupancy, Occupancy::Occupied);

        release(&mut conn, &table.id, now).await.unwrap();
        assert_eq!(load(&mut conn, &table.id).await.unwrap().occupancy, Occupancy::Free);

        assert!(occupy(&mut conn, "missing", now).await.is_err());
    }
}
