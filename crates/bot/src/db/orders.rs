//! Order repository: the atomic purchase and the order lifecycle.

use sqlx::SqlitePool;

use crewstore_core::{EnterpriseId, OrderId, OrderStatus, ProductId, UserId};

use super::{RepositoryError, with_busy_retry};
use crate::models::{Decision, Order, OrderDetails, PurchaseRequest, ResolvedOrder};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for order queries.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    buyer_id: i64,
    product_id: i64,
    product_name: String,
    price: i64,
    status: String,
    enterprise_id: i64,
    created_at: i64,
    resolved_at: Option<i64>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<OrderStatus>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid status for order {}: {e}", row.id))
        })?;

        Ok(Self {
            id: OrderId::new(row.id),
            buyer_id: UserId::new(row.buyer_id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            price: row.price,
            status,
            enterprise_id: EnterpriseId::new(row.enterprise_id),
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

/// Internal row type for orders joined with the buyer profile.
#[derive(Debug, sqlx::FromRow)]
struct OrderDetailsRow {
    #[sqlx(flatten)]
    order: OrderRow,
    buyer_schedule: String,
    buyer_name: String,
}

impl TryFrom<OrderDetailsRow> for OrderDetails {
    type Error = RepositoryError;

    fn try_from(row: OrderDetailsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            order: row.order.try_into()?,
            buyer_schedule: row.buyer_schedule,
            buyer_name: row.buyer_name,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for purchase orders.
pub struct OrderRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Debit the buyer, take one unit of stock and record a pending order.
    ///
    /// All three steps commit together or not at all. The debit is conditioned
    /// on `balance >= price` and the decrement on `remaining > 0`, so
    /// concurrent purchases of the last unit cannot both pass.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InsufficientFunds` if the balance is below the price.
    /// Returns `RepositoryError::NotFound` if the buyer does not exist.
    /// Returns `RepositoryError::OutOfStock` if no unit is left.
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[tracing::instrument(
        skip(self, request),
        fields(buyer_id = %request.buyer_id, product_id = %request.product_id)
    )]
    pub async fn purchase(&self, request: &PurchaseRequest) -> Result<Order, RepositoryError> {
        with_busy_retry("purchase", || async move {
            let mut tx = self.pool.begin().await?;

            let debited = sqlx::query(
                "UPDATE users SET balance = balance - ? WHERE id = ? AND balance >= ?",
            )
            .bind(request.price)
            .bind(request.buyer_id)
            .bind(request.price)
            .execute(&mut *tx)
            .await?;

            if debited.rows_affected() == 0 {
                let buyer = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE id = ?")
                    .bind(request.buyer_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                return Err(if buyer.is_some() {
                    RepositoryError::InsufficientFunds
                } else {
                    RepositoryError::NotFound
                });
            }

            let decremented =
                sqlx::query("UPDATE shop SET remaining = remaining - 1 WHERE id = ? AND remaining > 0")
                    .bind(request.product_id)
                    .execute(&mut *tx)
                    .await?;

            if decremented.rows_affected() == 0 {
                return Err(RepositoryError::OutOfStock);
            }

            let row = sqlx::query_as::<_, OrderRow>(
                r"
                INSERT INTO orders (buyer_id, product_id, product_name, price, status,
                                    enterprise_id, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING id, buyer_id, product_id, product_name, price, status,
                          enterprise_id, created_at, resolved_at
                ",
            )
            .bind(request.buyer_id)
            .bind(request.product_id)
            .bind(request.product_name.as_str())
            .bind(request.price)
            .bind(OrderStatus::Pending)
            .bind(request.enterprise_id)
            .bind(request.created_at)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Order::try_from(row)
        })
        .await
    }

    /// Move a pending order to its terminal status.
    ///
    /// Denial re-credits the captured price inside the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::AlreadyProcessed` if the order is not pending.
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[tracing::instrument(skip(self), fields(order_id = %id))]
    pub async fn set_status(
        &self,
        id: OrderId,
        decision: Decision,
        now: i64,
    ) -> Result<ResolvedOrder, RepositoryError> {
        with_busy_retry("set_order_status", || async move {
            let mut tx = self.pool.begin().await?;

            let resolved = sqlx::query_as::<_, (UserId, String, i64)>(
                r"
                UPDATE orders SET status = ?, resolved_at = ?
                WHERE id = ? AND status = ?
                RETURNING buyer_id, product_name, price
                ",
            )
            .bind(decision.status())
            .bind(now)
            .bind(id)
            .bind(OrderStatus::Pending)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((buyer_id, product_name, price)) = resolved else {
                let existing = sqlx::query_scalar::<_, String>("SELECT status FROM orders WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
                return Err(if existing.is_some() {
                    RepositoryError::AlreadyProcessed
                } else {
                    RepositoryError::NotFound
                });
            };

            if decision == Decision::Deny {
                let refunded = sqlx::query("UPDATE users SET balance = balance + ? WHERE id = ?")
                    .bind(price)
                    .bind(buyer_id)
                    .execute(&mut *tx)
                    .await?;
                if refunded.rows_affected() == 0 {
                    tracing::warn!(buyer_id = %buyer_id, "buyer no longer exists, refund skipped");
                }
            }

            tx.commit().await?;
            Ok::<_, RepositoryError>(ResolvedOrder {
                buyer_id,
                product_name,
                price,
                status: decision.status(),
            })
        })
        .await
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, buyer_id, product_id, product_name, price, status,
                   enterprise_id, created_at, resolved_at
            FROM orders
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// An order with its buyer's profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn details(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderDetailsRow>(
            r"
            SELECT o.id, o.buyer_id, o.product_id, o.product_name, o.price, o.status,
                   o.enterprise_id, o.created_at, o.resolved_at,
                   COALESCE(u.schedule_number, '') AS buyer_schedule,
                   COALESCE(u.name, '') AS buyer_name
            FROM orders o
            LEFT JOIN users u ON u.id = o.buyer_id
            WHERE o.id = ?
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// A buyer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn history(&self, buyer: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, buyer_id, product_id, product_name, price, status,
                   enterprise_id, created_at, resolved_at
            FROM orders
            WHERE buyer_id = ?
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(buyer)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Pending orders of an enterprise, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn pending_for_enterprise(
        &self,
        enterprise: EnterpriseId,
    ) -> Result<Vec<OrderDetails>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderDetailsRow>(
            r"
            SELECT o.id, o.buyer_id, o.product_id, o.product_name, o.price, o.status,
                   o.enterprise_id, o.created_at, o.resolved_at,
                   COALESCE(u.schedule_number, '') AS buyer_schedule,
                   COALESCE(u.name, '') AS buyer_name
            FROM orders o
            LEFT JOIN users u ON u.id = o.buyer_id
            WHERE o.enterprise_id = ? AND o.status = ?
            ORDER BY o.created_at, o.id
            ",
        )
        .bind(enterprise)
        .bind(OrderStatus::Pending)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ProductRepository, UserRepository};
    use crate::testing::TestStore;
    use crewstore_core::Role;

    async fn request(store: &TestStore, buyer: UserId, product: ProductId) -> PurchaseRequest {
        let product = ProductRepository::new(store.pool())
            .get(product)
            .await
            .expect("get")
            .expect("product");
        PurchaseRequest {
            buyer_id: buyer,
            product_id: product.id,
            product_name: product.name,
            price: product.price,
            enterprise_id: product.enterprise_id,
            created_at: 1_000,
        }
    }

    #[tokio::test]
    async fn test_purchase_debits_and_decrements() {
        let store = TestStore::new().await;
        let buyer = store.seed_user(10, 1, Role::Worker, "1", 5).await;
        let product = store.seed_product(1, "Mug", 3, 2).await;
        let orders = OrderRepository::new(store.pool());

        let order = orders
            .purchase(&request(&store, buyer, product).await)
            .await
            .expect("purchase");

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.price, 3);
        assert_eq!(UserRepository::new(store.pool()).balance(buyer).await.expect("balance"), 2);
        let product = ProductRepository::new(store.pool())
            .get(product)
            .await
            .expect("get")
            .expect("product");
        assert_eq!(product.remaining, 1);
    }

    #[tokio::test]
    async fn test_purchase_insufficient_funds_leaves_stock() {
        let store = TestStore::new().await;
        let buyer = store.seed_user(10, 1, Role::Worker, "1", 1).await;
        let product = store.seed_product(1, "Mug", 3, 2).await;
        let orders = OrderRepository::new(store.pool());

        let result = orders.purchase(&request(&store, buyer, product).await).await;

        assert!(matches!(result, Err(RepositoryError::InsufficientFunds)));
        let product = ProductRepository::new(store.pool())
            .get(product)
            .await
            .expect("get")
            .expect("product");
        assert_eq!(product.remaining, 2);
    }

    #[tokio::test]
    async fn test_out_of_stock_rolls_back_debit() {
        let store = TestStore::new().await;
        let buyer = store.seed_user(10, 1, Role::Worker, "1", 5).await;
        let product = store.seed_product(1, "Mug", 3, 0).await;
        let orders = OrderRepository::new(store.pool());

        let result = orders.purchase(&request(&store, buyer, product).await).await;

        assert!(matches!(result, Err(RepositoryError::OutOfStock)));
        assert_eq!(UserRepository::new(store.pool()).balance(buyer).await.expect("balance"), 5);
        assert!(orders.history(buyer).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn test_deny_refunds_once() {
        let store = TestStore::new().await;
        let buyer = store.seed_user(10, 1, Role::Worker, "1", 5).await;
        let product = store.seed_product(1, "Mug", 3, 2).await;
        let orders = OrderRepository::new(store.pool());
        let order = orders
            .purchase(&request(&store, buyer, product).await)
            .await
            .expect("purchase");

        let resolved = orders
            .set_status(order.id, Decision::Deny, 2_000)
            .await
            .expect("deny");
        assert_eq!(resolved.status, OrderStatus::Denied);

        let again = orders.set_status(order.id, Decision::Deny, 2_001).await;
        assert!(matches!(again, Err(RepositoryError::AlreadyProcessed)));
        assert_eq!(UserRepository::new(store.pool()).balance(buyer).await.expect("balance"), 5);

        let missing = orders.set_status(OrderId::new(999), Decision::Accept, 2_002).await;
        assert!(matches!(missing, Err(RepositoryError::NotFound)));
    }
}
