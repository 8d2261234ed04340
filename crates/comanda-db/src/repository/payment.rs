//! # Payment Repository
//!
//! The Payment Reconciler: an append-only ledger of payments per invoice.
//!
//! ## Ledger Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  FACT-20250601-00001   total 400.00                                    │
//! │                                                                         │
//! │  p1  card   +250.00                                                    │
//! │  p2  cash   +150.00                                                    │
//! │  p3  cash   -150.00   reverses p2   (at most one reversal per payment) │
//! │  ─────────────────                                                      │
//! │  paid 250.00   balance due 150.00   settled: no                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are never updated or deleted. A mistaken payment is undone by
//! [`PaymentRepository::reverse`], which appends the negative entry.

use comanda_core::billing::{ensure_payment_accepted, ensure_reversible, settle};
use comanda_core::validation::{validate_notes, validate_payment_amount};
use comanda_core::{
    Clock, CoreError, Invoice, InvoiceBalance, Money, NewPayment, Payment, PaymentMethod,
    PaymentPolicy,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::info;

use super::catalog::{self, ReferenceKind};
use super::{begin_write, invoice, new_id, translate_unique};
use crate::error::{DbError, DbResult};

async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Payment> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("Payment", id))
}

/// Settlement figures from every ledger row of the invoice, reversals included.
async fn balance_of(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<InvoiceBalance> {
    let amounts: Vec<i64> =
        sqlx::query_scalar("SELECT amount_cents FROM payments WHERE invoice_id = ?1")
            .bind(&invoice.id)
            .fetch_all(conn)
            .await?;

    Ok(settle(
        invoice.total(),
        amounts.into_iter().map(Money::from_cents),
    )?)
}

async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, invoice_id, payment_method_id, amount_cents, paid_at,
            reverses_payment_id, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.invoice_id)
    .bind(&payment.payment_method_id)
    .bind(payment.amount_cents)
    .bind(payment.paid_at)
    .bind(&payment.reverses_payment_id)
    .bind(&payment.note)
    .bind(payment.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Repository for payments.
#[derive(Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    policy: PaymentPolicy,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository applying `policy` to new payments.
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, policy: PaymentPolicy) -> Self {
        PaymentRepository { pool, clock, policy }
    }

    /// Records a payment against an invoice.
    ///
    /// ## Errors
    /// - `Validation`: amount ≤ 0, above `MAX_PAYMENT_CENTS`, or the ledger
    ///   sum would no longer fit in `Money`
    /// - `NotFound`: invoice or payment method missing
    /// - `Conflict`: payment method inactive
    /// - `State`: invoice voided (unless the policy allows it)
    /// - `Conflict`: amount above the balance due (unless the policy allows it)
    pub async fn record(&self, input: NewPayment) -> DbResult<Payment> {
        validate_payment_amount(input.amount_cents)?;
        let amount = Money::from_cents(input.amount_cents);

        let mut tx = begin_write(&self.pool).await?;

        let invoice = invoice::load(&mut tx, &input.invoice_id).await?;

        let method: PaymentMethod =
            catalog::load(&mut tx, ReferenceKind::PaymentMethod, &input.payment_method_id).await?;
        if !method.is_active {
            return Err(CoreError::inactive("PaymentMethod", &method.id).into());
        }

        let balance = balance_of(&mut tx, &invoice).await?;
        ensure_payment_accepted(&invoice, &balance, amount, &self.policy)?;

        let now = self.clock.utc();
        let payment = Payment {
            id: new_id(),
            invoice_id: invoice.id.clone(),
            payment_method_id: method.id,
            amount_cents: amount.cents(),
            paid_at: input.paid_at.unwrap_or(now),
            reverses_payment_id: None,
            note: None,
            created_at: now,
        };

        insert(&mut tx, &payment).await?;
        tx.commit().await?;

        info!(
            invoice = %invoice.code,
            amount = %amount,
            balance_due = %(balance.balance_due - amount),
            "Recorded payment"
        );
        Ok(payment)
    }

    /// Appends a compensating negative entry for a payment.
    ///
    /// ## Errors
    /// - `NotFound`: payment missing
    /// - `Conflict`: already reversed, or the target is itself a reversal
    pub async fn reverse(&self, payment_id: &str, reason: Option<&str>) -> DbResult<Payment> {
        let note = validate_notes(reason)?;

        let mut tx = begin_write(&self.pool).await?;

        let original = load(&mut tx, payment_id).await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM payments WHERE reverses_payment_id = ?1")
                .bind(payment_id)
                .fetch_optional(&mut *tx)
                .await?;
        ensure_reversible(&original, existing.is_some())?;

        let now = self.clock.utc();
        let reversal = Payment {
            id: new_id(),
            invoice_id: original.invoice_id.clone(),
            payment_method_id: original.payment_method_id.clone(),
            amount_cents: -original.amount_cents,
            paid_at: now,
            reverses_payment_id: Some(original.id.clone()),
            note,
            created_at: now,
        };

        insert(&mut tx, &reversal).await.map_err(|e| {
            translate_unique(e.into(), |field| {
                (field == "payments.reverses_payment_id").then(|| CoreError::NotReversible {
                    payment_id: original.id.clone(),
                    reason: "it was already reversed".to_string(),
                })
            })
        })?;

        tx.commit().await?;

        info!(
            payment_id = %payment_id,
            amount = %reversal.amount(),
            "Reversed payment"
        );
        Ok(reversal)
    }

    /// Total, paid, balance due and settled flag in one read.
    pub async fn balance(&self, invoice_id: &str) -> DbResult<InvoiceBalance> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoice::load(&mut conn, invoice_id).await?;
        balance_of(&mut conn, &invoice).await
    }

    /// Sum of the invoice's ledger rows.
    pub async fn amount_paid(&self, invoice_id: &str) -> DbResult<Money> {
        Ok(self.balance(invoice_id).await?.paid)
    }

    /// Invoice total minus the amount paid. Negative when overpaid.
    pub async fn balance_due(&self, invoice_id: &str) -> DbResult<Money> {
        Ok(self.balance(invoice_id).await?.balance_due)
    }

    /// Whether nothing is left to pay.
    pub async fn is_settled(&self, invoice_id: &str) -> DbResult<bool> {
        Ok(self.balance(invoice_id).await?.is_settled)
    }

    /// Lists the invoice's ledger rows, oldest first.
    pub async fn list(&self, invoice_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE invoice_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::{TimeZone, Utc};
    use comanda_core::{ErrorKind, ManualClock, NewItem, OpenOrder, MAX_PAYMENT_CENTS};

    struct Fixture {
        db: Database,
        invoice: String,
        cash: String,
    }

    async fn setup_with(policy: PaymentPolicy) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap(),
        ));
        let mut config = crate::config::EngineConfig::default();
        config.payments = policy;

        let db = Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .with_clock(clock)
            .with_engine_config(config);

        let catalog = db.catalog();
        let sector = catalog.insert_sector("Salon").await.unwrap();
        let staff = catalog.insert_staff("Luis").await.unwrap();
        let customer = catalog.insert_customer("Ana", None).await.unwrap();
        let a = catalog.insert_product("A", Money::from_cents(10000)).await.unwrap();
        let b = catalog.insert_product("B", Money::from_cents(20000)).await.unwrap();
        let cash = catalog.insert_payment_method("Cash").await.unwrap();
        let table = db.tables().register(3, 4, &sector.id).await.unwrap();

        let order = db
            .orders()
            .open_from_table(OpenOrder {
                table_id: table.id,
                staff_id: staff.id,
                items: vec![NewItem::new(&a.id, 2), NewItem::new(&b.id, 1)],
                ..Default::default()
            })
            .await
            .unwrap();
        let invoice = db
            .invoices()
            .generate_from_order(&order.id, &customer.id)
            .await
            .unwrap();

        Fixture {
            db,
            invoice: invoice.id,
            cash: cash.id,
        }
    }

    async fn setup() -> Fixture {
        setup_with(PaymentPolicy::default()).await
    }

    fn pay(f: &Fixture, cents: i64) -> NewPayment {
        NewPayment {
            invoice_id: f.invoice.clone(),
            payment_method_id: f.cash.clone(),
            amount_cents: cents,
            paid_at: None,
        }
    }

    #[tokio::test]
    async fn test_partial_then_full_settlement() {
        let f = setup().await;
        let payments = f.db.payments();

        payments.record(pay(&f, 25000)).await.unwrap();
        let balance = payments.balance(&f.invoice).await.unwrap();
        assert_eq!(balance.total.to_string(), "400.00");
        assert_eq!(balance.paid.to_string(), "250.00");
        assert_eq!(balance.balance_due.to_string(), "150.00");
        assert!(!balance.is_settled);

        payments.record(pay(&f, 15000)).await.unwrap();
        assert!(payments.is_settled(&f.invoice).await.unwrap());
        assert_eq!(payments.balance_due(&f.invoice).await.unwrap(), Money::zero());
        assert_eq!(payments.amount_paid(&f.invoice).await.unwrap(), Money::from_cents(40000));
        assert_eq!(payments.list(&f.invoice).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_rejections() {
        let f = setup().await;
        let payments = f.db.payments();

        let err = payments.record(pay(&f, 0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = payments.record(pay(&f, 40001)).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Overpayment { .. })));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let mut missing_invoice = pay(&f, 100);
        missing_invoice.invoice_id = "nope".into();
        assert_eq!(
            payments.record(missing_invoice).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let mut missing_method = pay(&f, 100);
        missing_method.payment_method_id = "nope".into();
        assert_eq!(
            payments.record(missing_method).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        f.db.catalog()
            .set_active(ReferenceKind::PaymentMethod, &f.cash, false)
            .await
            .unwrap();
        let err = payments.record(pay(&f, 100)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert!(payments.list(&f.invoice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_voided_invoice_rejects_payments_by_default() {
        let f = setup().await;
        f.db.invoices().void(&f.invoice).await.unwrap();

        let err = f.db.payments().record(pay(&f, 100)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[tokio::test]
    async fn test_policy_allows_tips_and_voided_payments() {
        let f = setup_with(PaymentPolicy {
            allow_overpayment: true,
            allow_payments_on_voided: true,
        })
        .await;
        let payments = f.db.payments();

        payments.record(pay(&f, 45000)).await.unwrap();
        let balance = payments.balance(&f.invoice).await.unwrap();
        assert_eq!(balance.balance_due, Money::from_cents(-5000));
        assert!(balance.is_settled);

        f.db.invoices().void(&f.invoice).await.unwrap();
        assert!(payments.record(pay(&f, 100)).await.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_payments_never_reach_the_ledger() {
        let f = setup_with(PaymentPolicy {
            allow_overpayment: true,
            allow_payments_on_voided: false,
        })
        .await;
        let payments = f.db.payments();

        let err = payments.record(pay(&f, i64::MAX)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(payments.list(&f.invoice).await.unwrap().is_empty());

        payments.record(pay(&f, MAX_PAYMENT_CENTS)).await.unwrap();
        payments.record(pay(&f, MAX_PAYMENT_CENTS)).await.unwrap();

        let balance = payments.balance(&f.invoice).await.unwrap();
        assert_eq!(balance.paid.cents(), 2 * MAX_PAYMENT_CENTS);
        assert!(balance.is_settled);
    }

    #[tokio::test]
    async fn test_reverse_once() {
        let f = setup().await;
        let payments = f.db.payments();

        payments.record(pay(&f, 25000)).await.unwrap();
        let mistake = payments.record(pay(&f, 15000)).await.unwrap();
        assert!(payments.is_settled(&f.invoice).await.unwrap());

        let reversal = payments
            .reverse(&mistake.id, Some("wrong table"))
            .await
            .unwrap();
        assert_eq!(reversal.amount(), Money::from_cents(-15000));
        assert_eq!(reversal.reverses_payment_id.as_deref(), Some(mistake.id.as_str()));
        assert_eq!(reversal.note.as_deref(), Some("wrong table"));

        let balance = payments.balance(&f.invoice).await.unwrap();
        assert_eq!(balance.paid.to_string(), "250.00");
        assert!(!balance.is_settled);

        let err = payments.reverse(&mistake.id, None).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::NotReversible { .. })));

        let err = payments.reverse(&reversal.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = payments.reverse("missing", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // The ledger keeps every row.
        assert_eq!(payments.list(&f.invoice).await.unwrap().len(), 3);
    }
}
