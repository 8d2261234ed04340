//! End-to-end lifecycle scenarios against a file database with several
//! pooled connections.

use chrono::{DateTime, TimeZone, Utc};
use comanda_core::{
    CoreError, ErrorKind, ManualClock, Money, NewItem, NewPayment, NewReservation, Occupancy,
    OpenOrder, OrderStatus, ReservationStatus,
};
use comanda_db::{Database, DbConfig, DbError};
use std::sync::Arc;
use tempfile::TempDir;

struct Restaurant {
    db: Database,
    clock: Arc<ManualClock>,
    _dir: TempDir,
    table3: String,
    waiter: String,
    customer: String,
    a: String,
    b: String,
    cash: String,
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
}

async fn restaurant() -> Restaurant {
    let dir = TempDir::new().unwrap();
    let config = DbConfig::new(dir.path().join("comanda.db")).max_connections(4);

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 5, 20, 12, 0, 0).unwrap(),
    ));
    let db = Database::new(config).await.unwrap().with_clock(clock.clone());

    let catalog = db.catalog();
    let sector = catalog.insert_sector("Salon").await.unwrap();
    let waiter = catalog.insert_staff("Luis").await.unwrap();
    let customer = catalog.insert_customer("Ana", Some("555-0101")).await.unwrap();
    let a = catalog.insert_product("A", Money::from_cents(10000)).await.unwrap();
    let b = catalog.insert_product("B", Money::from_cents(20000)).await.unwrap();
    let cash = catalog.insert_payment_method("Cash").await.unwrap();
    let table3 = db.tables().register(3, 4, &sector.id).await.unwrap();

    Restaurant {
        db,
        clock,
        _dir: dir,
        table3: table3.id,
        waiter: waiter.id,
        customer: customer.id,
        a: a.id,
        b: b.id,
        cash: cash.id,
    }
}

fn walk_in(r: &Restaurant, items: Vec<NewItem>) -> OpenOrder {
    OpenOrder {
        table_id: r.table3.clone(),
        staff_id: r.waiter.clone(),
        items,
        ..Default::default()
    }
}

async fn open_orders_on_table(r: &Restaurant) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE table_id = ?1 AND status = 'open'")
        .bind(&r.table3)
        .fetch_one(r.db.pool())
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_opens_on_one_table_yield_one_order() {
    let r = restaurant().await;
    let (first, second) = (r.db.orders(), r.db.orders());

    let (x, y) = tokio::join!(
        first.open_from_table(walk_in(&r, vec![])),
        second.open_from_table(walk_in(&r, vec![])),
    );

    let results = [x, y];
    let ok = results.iter().filter(|res| res.is_ok()).count();
    assert_eq!(ok, 1);

    let err = results.into_iter().find_map(Result::err).unwrap();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, DbError::Domain(CoreError::TableBusy { .. })));

    assert_eq!(open_orders_on_table(&r).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_bookings_of_one_slot_yield_one_reservation() {
    let r = restaurant().await;
    let booking = |number| NewReservation {
        number,
        scheduled_at: at(20, 0),
        party_size: 2,
        customer_id: r.customer.clone(),
        table_id: r.table3.clone(),
    };

    let (first, second) = (r.db.reservations(), r.db.reservations());
    let (x, y) = tokio::join!(first.create(booking(1)), second.create(booking(2)));

    assert_eq!([&x, &y].iter().filter(|res| res.is_ok()).count(), 1);
    let err = x.err().or(y.err()).unwrap();
    assert!(matches!(err, DbError::Domain(CoreError::SlotTaken { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_billing_of_one_order_yields_one_invoice() {
    let r = restaurant().await;
    let order = r
        .db
        .orders()
        .open_from_table(walk_in(&r, vec![NewItem::new(&r.a, 1)]))
        .await
        .unwrap();

    let (first, second) = (r.db.invoices(), r.db.invoices());
    let (x, y) = tokio::join!(
        first.generate_from_order(&order.id, &r.customer),
        second.generate_from_order(&order.id, &r.customer),
    );

    assert_eq!([&x, &y].iter().filter(|res| res.is_ok()).count(), 1);
    let err = x.err().or(y.err()).unwrap();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let invoices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE order_id = ?1")
        .bind(&order.id)
        .fetch_one(r.db.pool())
        .await
        .unwrap();
    assert_eq!(invoices, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_billing_of_two_tables_allocates_consecutive_codes() {
    let r = restaurant().await;
    r.clock.set(at(21, 0));

    let table3 = r.db.tables().get(&r.table3).await.unwrap().unwrap();
    let table5 = r.db.tables().register(5, 4, &table3.sector_id).await.unwrap();

    let orders = r.db.orders();
    let first = orders
        .open_from_table(walk_in(&r, vec![NewItem::new(&r.a, 1)]))
        .await
        .unwrap();
    let second = orders
        .open_from_table(OpenOrder {
            table_id: table5.id.clone(),
            ..walk_in(&r, vec![NewItem::new(&r.b, 1)])
        })
        .await
        .unwrap();

    let (terminal_a, terminal_b) = (r.db.invoices(), r.db.invoices());
    let (x, y) = tokio::join!(
        terminal_a.generate_from_order(&first.id, &r.customer),
        terminal_b.generate_from_order(&second.id, &r.customer),
    );

    let mut codes = vec![x.unwrap().code, y.unwrap().code];
    codes.sort();
    assert_eq!(codes, vec!["FACT-20250601-00001", "FACT-20250601-00002"]);

    for table in [&r.table3, &table5.id] {
        let table = r.db.tables().get(table).await.unwrap().unwrap();
        assert_eq!(table.occupancy, Occupancy::Free);
    }
}

#[tokio::test]
async fn open_close_cancel_interleavings_keep_one_open_order() {
    let r = restaurant().await;
    let orders = r.db.orders();

    for round in 0..6 {
        let order = orders.open_from_table(walk_in(&r, vec![])).await.unwrap();
        assert!(orders.open_from_table(walk_in(&r, vec![])).await.is_err());
        assert_eq!(open_orders_on_table(&r).await, 1);

        if round % 2 == 0 {
            let item = orders.add_item(&order.id, &r.a, 1).await.unwrap();
            assert!(orders.close(&order.id).await.is_err());
            orders.mark_delivered(&item.id).await.unwrap();
            orders.close(&order.id).await.unwrap();
        } else {
            orders.cancel(&order.id).await.unwrap();
        }

        assert_eq!(open_orders_on_table(&r).await, 0);
        let table = r.db.tables().get(&r.table3).await.unwrap().unwrap();
        assert_eq!(table.occupancy, Occupancy::Free);
    }
}

#[tokio::test]
async fn slot_on_the_half_hour_is_free() {
    let r = restaurant().await;
    let booking = |number, when| NewReservation {
        number,
        scheduled_at: when,
        party_size: 4,
        customer_id: r.customer.clone(),
        table_id: r.table3.clone(),
    };

    r.db.reservations().create(booking(1, at(20, 0))).await.unwrap();

    let err = r.db.reservations().create(booking(2, at(20, 0))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert!(r.db.reservations().create(booking(2, at(20, 30))).await.is_ok());
}

#[tokio::test]
async fn reservation_to_paid_invoice() {
    let r = restaurant().await;

    let reservation = r
        .db
        .reservations()
        .create(NewReservation {
            number: 7,
            scheduled_at: at(20, 0),
            party_size: 3,
            customer_id: r.customer.clone(),
            table_id: r.table3.clone(),
        })
        .await
        .unwrap();

    r.clock.set(at(20, 10));
    r.db.reservations().mark_attended(&reservation.id).await.unwrap();
    let err = r.db.reservations().mark_attended(&reservation.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let order = r
        .db
        .orders()
        .open_from_reservation(
            &reservation.id,
            &r.waiter,
            vec![NewItem::new(&r.a, 2), NewItem::new(&r.b, 1)],
            None,
        )
        .await
        .unwrap();

    // Menu price changes after ordering do not reach the bill.
    r.db.catalog()
        .update_product_price(&r.a, Money::from_cents(15000))
        .await
        .unwrap();

    let invoice = r
        .db
        .invoices()
        .generate_from_order(&order.id, &r.customer)
        .await
        .unwrap();
    assert_eq!(invoice.total().to_string(), "400.00");
    assert!(invoice.code.starts_with("FACT-20250601-"));

    let lines = r.db.invoices().lines(&invoice.id).await.unwrap();
    let sum: Money = lines.iter().map(|l| l.subtotal()).sum();
    assert_eq!(sum, invoice.total());

    let order = r.db.orders().get(&order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Closed);
    let reservation = r.db.reservations().get(&reservation.id).await.unwrap().unwrap();
    assert_eq!(reservation.status, ReservationStatus::Completed);
    let table = r.db.tables().get(&r.table3).await.unwrap().unwrap();
    assert_eq!(table.occupancy, Occupancy::Free);

    let pay = |cents| NewPayment {
        invoice_id: invoice.id.clone(),
        payment_method_id: r.cash.clone(),
        amount_cents: cents,
        paid_at: None,
    };

    r.db.payments().record(pay(15000)).await.unwrap();
    let balance = r.db.payments().balance(&invoice.id).await.unwrap();
    assert_eq!(balance.balance_due, invoice.total() - balance.paid);
    assert!(!balance.is_settled);

    r.db.payments().record(pay(25000)).await.unwrap();
    assert!(r.db.payments().is_settled(&invoice.id).await.unwrap());
}

#[tokio::test]
async fn table_with_pending_reservation_cannot_retire() {
    let r = restaurant().await;

    let reservation = r
        .db
        .reservations()
        .create(NewReservation {
            number: 1,
            scheduled_at: at(21, 0),
            party_size: 2,
            customer_id: r.customer.clone(),
            table_id: r.table3.clone(),
        })
        .await
        .unwrap();

    let err = r.db.tables().retire(&r.table3).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    r.db.reservations()
        .cancel(&reservation.id, "closed for a private event", true)
        .await
        .unwrap();

    let order = r.db.orders().open_from_table(walk_in(&r, vec![])).await.unwrap();
    let err = r.db.tables().retire(&r.table3).await.unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::TableInUse { .. })));

    r.db.orders().cancel(&order.id).await.unwrap();
    assert!(r.db.tables().retire(&r.table3).await.is_ok());
}
