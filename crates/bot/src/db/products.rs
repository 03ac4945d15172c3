//! Product repository for the per-enterprise shop.

use sqlx::SqlitePool;

use crewstore_core::{EnterpriseId, ProductId};

use super::RepositoryError;
use crate::models::{NewProduct, Product};

/// Internal row type for product queries.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price: i64,
    remaining: i64,
    enterprise_id: i64,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        if row.price < 0 || row.remaining < 0 {
            return Err(RepositoryError::DataCorruption(format!(
                "negative price or stock for product {}",
                row.id
            )));
        }

        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            price: row.price,
            remaining: row.remaining,
            enterprise_id: EnterpriseId::new(row.enterprise_id),
        })
    }
}

/// Repository for shop products.
pub struct ProductRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, price, remaining, enterprise_id FROM shop WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Products of an enterprise. With `in_stock_only`, sold-out items are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        enterprise: EnterpriseId,
        in_stock_only: bool,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, price, remaining, enterprise_id
            FROM shop
            WHERE enterprise_id = ? AND (? = 0 OR remaining > 0)
            ORDER BY id
            ",
        )
        .bind(enterprise)
        .bind(in_stock_only)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Add a product to an enterprise shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails (including the
    /// non-negative checks on price and stock).
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO shop (name, price, remaining, enterprise_id)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, price, remaining, enterprise_id
            ",
        )
        .bind(product.name.as_str())
        .bind(product.price)
        .bind(product.remaining)
        .bind(product.enterprise_id)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Set the unit price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn set_price(&self, id: ProductId, price: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE shop SET price = ? WHERE id = ?")
            .bind(price)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Overwrite the stock count (admin stock correction).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn set_remaining(&self, id: ProductId, remaining: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE shop SET remaining = ? WHERE id = ?")
            .bind(remaining)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove a product. Existing orders keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
