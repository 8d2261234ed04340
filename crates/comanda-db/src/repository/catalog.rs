//! # Catalog Repository
//!
//! Reference data the lifecycle engine reads: sectors, customers, staff,
//! products and payment methods.
//!
//! Full CRUD for these lives in another service. This repository offers the
//! inserts, lookups, price change and activation toggle needed to seed a
//! restaurant and exercise the engine.

use comanda_core::validation::{validate_name, validate_price_cents};
use comanda_core::{Customer, Money, PaymentMethod, Product, Sector, StaffMember};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use super::new_id;
use crate::error::{DbError, DbResult};

/// The reference tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Sector,
    Customer,
    Staff,
    Product,
    PaymentMethod,
}

impl ReferenceKind {
    /// Table name. Only ever one of these constants, never caller input.
    const fn table(self) -> &'static str {
        match self {
            ReferenceKind::Sector => "sectors",
            ReferenceKind::Customer => "customers",
            ReferenceKind::Staff => "staff",
            ReferenceKind::Product => "products",
            ReferenceKind::PaymentMethod => "payment_methods",
        }
    }

    /// Entity name used in errors.
    pub const fn entity(self) -> &'static str {
        match self {
            ReferenceKind::Sector => "Sector",
            ReferenceKind::Customer => "Customer",
            ReferenceKind::Staff => "Staff",
            ReferenceKind::Product => "Product",
            ReferenceKind::PaymentMethod => "PaymentMethod",
        }
    }
}

/// Loads a reference row inside an open transaction.
pub(crate) async fn load<T>(conn: &mut SqliteConnection, kind: ReferenceKind, id: &str) -> DbResult<T>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let sql = format!("SELECT * FROM {} WHERE id = ?1", kind.table());
    sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found(kind.entity(), id))
}

/// Repository for reference data.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Inserts
    // -------------------------------------------------------------------------

    pub async fn insert_sector(&self, name: &str) -> DbResult<Sector> {
        let sector = Sector {
            id: new_id(),
            name: validate_name(name)?,
            is_active: true,
        };

        sqlx::query("INSERT INTO sectors (id, name, is_active) VALUES (?1, ?2, ?3)")
            .bind(&sector.id)
            .bind(&sector.name)
            .bind(sector.is_active)
            .execute(&self.pool)
            .await?;

        debug!(id = %sector.id, name = %sector.name, "Inserted sector");
        Ok(sector)
    }

    pub async fn insert_customer(&self, name: &str, phone: Option<&str>) -> DbResult<Customer> {
        let customer = Customer {
            id: new_id(),
            name: validate_name(name)?,
            phone: phone.map(str::to_string),
            is_active: true,
        };

        sqlx::query("INSERT INTO customers (id, name, phone, is_active) VALUES (?1, ?2, ?3, ?4)")
            .bind(&customer.id)
            .bind(&customer.name)
            .bind(&customer.phone)
            .bind(customer.is_active)
            .execute(&self.pool)
            .await?;

        debug!(id = %customer.id, "Inserted customer");
        Ok(customer)
    }

    pub async fn insert_staff(&self, name: &str) -> DbResult<StaffMember> {
        let staff = StaffMember {
            id: new_id(),
            name: validate_name(name)?,
            is_active: true,
        };

        sqlx::query("INSERT INTO staff (id, name, is_active) VALUES (?1, ?2, ?3)")
            .bind(&staff.id)
            .bind(&staff.name)
            .bind(staff.is_active)
            .execute(&self.pool)
            .await?;

        debug!(id = %staff.id, "Inserted staff member");
        Ok(staff)
    }

    pub async fn insert_product(&self, name: &str, price: Money) -> DbResult<Product> {
        validate_price_cents(price.cents())?;

        let product = Product {
            id: new_id(),
            name: validate_name(name)?,
            price_cents: price.cents(),
            is_active: true,
        };

        sqlx::query(
            "INSERT INTO products (id, name, price_cents, is_active) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.is_active)
        .execute(&self.pool)
        .await?;

        debug!(id = %product.id, price = %price, "Inserted product");
        Ok(product)
    }

    pub async fn insert_payment_method(&self, name: &str) -> DbResult<PaymentMethod> {
        let method = PaymentMethod {
            id: new_id(),
            name: validate_name(name)?,
            is_active: true,
        };

        sqlx::query("INSERT INTO payment_methods (id, name, is_active) VALUES (?1, ?2, ?3)")
            .bind(&method.id)
            .bind(&method.name)
            .bind(method.is_active)
            .execute(&self.pool)
            .await?;

        debug!(id = %method.id, name = %method.name, "Inserted payment method");
        Ok(method)
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    async fn get<T>(&self, kind: ReferenceKind, id: &str) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let sql = format!("SELECT * FROM {} WHERE id = ?1", kind.table());
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_sector(&self, id: &str) -> DbResult<Option<Sector>> {
        self.get(ReferenceKind::Sector, id).await
    }

    pub async fn get_customer(&self, id: &str) -> DbResult<Option<Customer>> {
        self.get(ReferenceKind::Customer, id).await
    }

    pub async fn get_staff(&self, id: &str) -> DbResult<Option<StaffMember>> {
        self.get(ReferenceKind::Staff, id).await
    }

    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        self.get(ReferenceKind::Product, id).await
    }

    pub async fn get_payment_method(&self, id: &str) -> DbResult<Option<PaymentMethod>> {
        self.get(ReferenceKind::PaymentMethod, id).await
    }

    // -------------------------------------------------------------------------
    // Updates
    // -------------------------------------------------------------------------

    /// Changes a product's current price.
    ///
    /// Existing order items and invoice lines keep the price they captured.
    pub async fn update_product_price(&self, id: &str, price: Money) -> DbResult<Product> {
        validate_price_cents(price.cents())?;

        let product = sqlx::query_as::<_, Product>(
            "UPDATE products SET price_cents = ?2 WHERE id = ?1 RETURNING *",
        )
        .bind(id)
        .bind(price.cents())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))?;

        debug!(id = %id, price = %price, "Updated product price");
        Ok(product)
    }

    /// Activates or deactivates a reference record.
    pub async fn set_active(&self, kind: ReferenceKind, id: &str, active: bool) -> DbResult<()> {
        let sql = format!("UPDATE {} SET is_active = ?2 WHERE id = ?1", kind.table());
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind.entity(), id));
        }

        debug!(entity = kind.entity(), id = %id, active, "Changed active flag");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use comanda_core::{ErrorKind, MAX_PRICE_CENTS};

    async fn setup() -> CatalogRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.catalog()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let catalog = setup().await;

        let sector = catalog.insert_sector("Salon").await.unwrap();
        let customer = catalog.insert_customer("Ana", Some("555-0101")).await.unwrap();
        let staff = catalog.insert_staff("Luis").await.unwrap();
        let product = catalog
            .insert_product("Milanesa", Money::from_cents(10000))
            .await
            .unwrap();
        let method = catalog.insert_payment_method("Cash").await.unwrap();

        assert_eq!(catalog.get_sector(&sector.id).await.unwrap(), Some(sector));
        assert_eq!(catalog.get_customer(&customer.id).await.unwrap(), Some(customer));
        assert_eq!(catalog.get_staff(&staff.id).await.unwrap(), Some(staff));
        assert_eq!(catalog.get_product(&product.id).await.unwrap(), Some(product));
        assert_eq!(catalog.get_payment_method(&method.id).await.unwrap(), Some(method));
        assert_eq!(catalog.get_product("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_validates() {
        let catalog = setup().await;

        let err = catalog.insert_sector("  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = catalog
            .insert_product("Free?", Money::from_cents(-1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = catalog
            .insert_product("Caviar", Money::from_cents(10_000_000_000_000_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let flan = catalog
            .insert_product("Flan", Money::from_cents(MAX_PRICE_CENTS))
            .await
            .unwrap();
        let err = catalog
            .update_product_price(&flan.id, Money::from_cents(MAX_PRICE_CENTS + 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_update_price_and_deactivate() {
        let catalog = setup().await;
        let product = catalog
            .insert_product("Flan", Money::from_cents(3000))
            .await
            .unwrap();

        let updated = catalog
            .update_product_price(&product.id, Money::from_cents(3500))
            .await
            .unwrap();
        assert_eq!(updated.price_cents, 3500);

        catalog
            .set_active(ReferenceKind::Product, &product.id, false)
            .await
            .unwrap();
        let stored = catalog.get_product(&product.id).await.unwrap().unwrap();
        assert!(!stored.is_active);

        let err = catalog
            .set_active(ReferenceKind::Customer, "missing", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = catalog
            .update_product_price("missing", Money::from_cents(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
