//! Commerce engine: purchases, balance top-ups and the order lifecycle.
//!
//! Preconditions are checked up front for a precise message, then enforced
//! again by the conditional updates in the store, which are what actually
//! keep balances and stock consistent under concurrent sessions.

use chrono::DateTime;
use tracing::{info, instrument, warn};

use crewstore_core::{OrderId, OrderStatus, ProductId, Role, UserId};

use super::Caller;
use crate::db::{OrderRepository, ProductRepository, UserRepository};
use crate::error::AppError;
use crate::gateway::{Button, Gateway, Reply};
use crate::models::{Decision, Order, PurchaseRequest, TopUpOutcome};
use crate::state::BotState;

/// Amounts offered by the top-up picker.
pub const TOP_UP_AMOUNTS: [i64; 2] = [1, 2];

fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Being packed 🚚",
        OrderStatus::Accepted => "Completed ✅",
        OrderStatus::Denied => "Cancelled ❌",
    }
}

fn history_line(order: &Order) -> String {
    let date = DateTime::from_timestamp(order.created_at, 0)
        .map_or_else(|| "?".to_string(), |d| d.format("%Y-%m-%d").to_string());
    format!(
        "{date} | {} | {} | {}🌟",
        order.product_name,
        status_label(order.status),
        order.price
    )
}

/// Purchase, top-up and order decisions.
pub struct CommerceService<'a, G> {
    state: &'a BotState<G>,
}

impl<'a, G: Gateway> CommerceService<'a, G> {
    #[must_use]
    pub const fn new(state: &'a BotState<G>) -> Self {
        Self { state }
    }

    fn users(&self) -> UserRepository<'_> {
        UserRepository::new(self.state.pool())
    }

    fn orders(&self) -> OrderRepository<'_> {
        OrderRepository::new(self.state.pool())
    }

    fn products(&self) -> ProductRepository<'_> {
        ProductRepository::new(self.state.pool())
    }

    // =========================================================================
    // Worker views
    // =========================================================================

    /// Current balance of the caller.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the caller has no record.
    pub async fn balance(&self, caller: &Caller) -> Result<Reply, AppError> {
        let balance = self.users().balance(caller.id).await?;
        Ok(Reply::text(format!("Your current balance: {balance}🌟")))
    }

    /// In-stock products of the caller's enterprise, one buy button each.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the caller has no enterprise.
    pub async fn market(&self, caller: &Caller) -> Result<Reply, AppError> {
        let products = self.products().list(caller.enterprise()?, true).await?;
        if products.is_empty() {
            return Ok(Reply::text("😔 Everything is sold out!"));
        }

        let mut reply = Reply::text("🛍️ Shop. Pick a product:");
        for product in products {
            reply = reply.with_row(vec![Button::new(
                format!("{} ({}🌟, {} left)", product.name, product.price, product.remaining),
                format!("buy_product:{}", product.id),
            )]);
        }
        Ok(reply)
    }

    /// The caller's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` if the query fails.
    pub async fn history(&self, caller: &Caller) -> Result<Reply, AppError> {
        let orders = self.orders().history(caller.id).await?;
        if orders.is_empty() {
            return Ok(Reply::text("You have no orders yet."));
        }

        let lines: Vec<String> = orders.iter().map(history_line).collect();
        Ok(Reply::text(format!("Order history:\n{}", lines.join("\n"))))
    }

    // =========================================================================
    // Purchase
    // =========================================================================

    /// Buy one unit of `product`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound`, `AppError::CrossTenant`,
    /// `AppError::OutOfStock` or `AppError::InsufficientFunds` without any
    /// mutation, and `AppError::StoreUnavailable` on store failures.
    #[instrument(skip(self, caller), fields(buyer_id = %caller.id, product_id = %product))]
    pub async fn purchase(&self, caller: &Caller, product: ProductId) -> Result<Reply, AppError> {
        let product = self
            .products()
            .get(product)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("product {product}")))?;
        caller.same_enterprise(Some(product.enterprise_id))?;
        if product.remaining < 1 {
            return Err(AppError::OutOfStock);
        }

        let order = self
            .orders()
            .purchase(&PurchaseRequest {
                buyer_id: caller.id,
                product_id: product.id,
                product_name: product.name.clone(),
                price: product.price,
                enterprise_id: product.enterprise_id,
                created_at: self.state.now(),
            })
            .await?;

        info!(
            order_id = %order.id,
            buyer_id = %caller.id,
            price = order.price,
            "Purchase completed"
        );

        let buyer_label = self
            .users()
            .get(caller.id)
            .await?
            .map_or_else(|| caller.id.to_string(), |u| u.label());
        match self.users().find_admin(product.enterprise_id).await? {
            Some(admin) => {
                let notice = Reply::text(format!(
                    "🛒 New order!\nBuyer: {buyer_label}\nProduct: {}\nStatus: pending\n\n\
                     Open «Orders» to process it.",
                    order.product_name
                ))
                .with_row(vec![Button::new("Open order", format!("orders_order:{}", order.id))]);
                self.state.notifier().reply(admin, notice).await;
            }
            None => warn!(
                enterprise_id = %product.enterprise_id,
                order_id = %order.id,
                "No admin to notify about new order"
            ),
        }

        Ok(Reply::text(format!(
            "Thank you for your purchase!\nYou bought: {}.\n\
             We will let you know when it is ready for pickup.",
            order.product_name
        ))
        .with_toast("Purchase placed!"))
    }

    // =========================================================================
    // Top-up
    // =========================================================================

    /// Amount picker for one worker.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::CrossTenant` for workers
    /// outside the caller's enterprise.
    pub async fn top_up_amounts(&self, caller: &Caller, worker: UserId) -> Result<Reply, AppError> {
        let user = self
            .users()
            .get(worker)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("worker {worker}")))?;
        caller.same_enterprise(user.enterprise_id)?;

        let buttons = TOP_UP_AMOUNTS
            .iter()
            .map(|amount| Button::new(format!("+{amount}🌟"), format!("topup_amount:{amount}:{worker}")))
            .collect();

        Ok(Reply::text(format!(
            "{}\nBalance: {}🌟\nHow much to add?",
            user.label(),
            user.balance
        ))
        .with_row(buttons))
    }

    /// Credit `amount` to a worker, at most once per cooldown window.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for non-positive amounts or non-worker
    /// targets, `AppError::CrossTenant` for workers of another enterprise and
    /// `AppError::CooldownActive` with the remaining wait, all without mutation.
    #[instrument(skip(self, caller), fields(manager_id = %caller.id, worker_id = %worker))]
    pub async fn top_up(
        &self,
        caller: &Caller,
        worker: UserId,
        amount: i64,
    ) -> Result<Reply, AppError> {
        if amount <= 0 {
            return Err(AppError::Validation(
                "The top-up amount must be positive.".to_string(),
            ));
        }

        let user = self
            .users()
            .get(worker)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("worker {worker}")))?;
        caller.same_enterprise(user.enterprise_id)?;
        if user.role != Role::Worker {
            return Err(AppError::Validation(format!(
                "Only workers can be topped up; {} is a {}.",
                user.label(),
                user.role
            )));
        }

        let now = self.state.now();
        let cooldown = self.state.rules().topup_cooldown_secs;
        let balance = match self
            .users()
            .credit_with_cooldown(worker, amount, now, cooldown)
            .await?
        {
            TopUpOutcome::Credited { balance } => balance,
            TopUpOutcome::Cooldown { last_topup_at } => {
                return Err(AppError::CooldownActive {
                    remaining_secs: cooldown - (now - last_topup_at),
                });
            }
        };

        info!(worker_id = %worker, amount, balance, "Balance topped up");

        self.state
            .notifier()
            .text(worker, format!("💰 Your balance was topped up by {amount}🌟!"))
            .await;

        Ok(Reply::text(format!(
            "✅ {} topped up by {amount}🌟. New balance: {balance}🌟",
            user.label()
        ))
        .with_toast("Done!"))
    }

    // =========================================================================
    // Order lifecycle
    // =========================================================================

    /// Pending orders of the caller's enterprise, one button each.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the caller has no enterprise.
    pub async fn pending_orders(&self, caller: &Caller) -> Result<Reply, AppError> {
        let pending = self
            .orders()
            .pending_for_enterprise(caller.enterprise()?)
            .await?;
        if pending.is_empty() {
            return Ok(Reply::text("No pending orders. 🎉"));
        }

        let mut reply = Reply::text(format!("Pending orders: {}", pending.len()));
        for details in pending {
            reply = reply.with_row(vec![Button::new(
                format!("{} ({})", details.buyer_label(), details.order.product_name),
                format!("orders_order:{}", details.order.id),
            )]);
        }
        Ok(reply)
    }

    /// One order with accept/deny buttons.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::CrossTenant`.
    pub async fn order_card(&self, caller: &Caller, order: OrderId) -> Result<Reply, AppError> {
        let details = self
            .orders()
            .details(order)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order}")))?;
        caller.same_enterprise(Some(details.order.enterprise_id))?;

        let reply = Reply::text(format!(
            "Order #{}\nBuyer: {}\nProduct: {}\nPrice: {}🌟\nStatus: {}",
            details.order.id,
            details.buyer_label(),
            details.order.product_name,
            details.order.price,
            status_label(details.order.status)
        ));

        if details.order.status.is_terminal() {
            return Ok(reply);
        }
        Ok(reply.with_row(vec![
            Button::new("✅ Accept", format!("orders_order:{order}:accept")),
            Button::new("❌ Deny", format!("orders_order:{order}:deny")),
        ]))
    }

    /// Accept or deny a pending order; denial refunds the buyer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyProcessed` if the order is already decided,
    /// `AppError::NotFound` or `AppError::CrossTenant` otherwise.
    #[instrument(skip(self, caller), fields(admin_id = %caller.id, order_id = %order))]
    pub async fn resolve_order(
        &self,
        caller: &Caller,
        order: OrderId,
        decision: Decision,
    ) -> Result<Reply, AppError> {
        let existing = self
            .orders()
            .get(order)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order}")))?;
        caller.same_enterprise(Some(existing.enterprise_id))?;

        let resolved = self
            .orders()
            .set_status(order, decision, self.state.now())
            .await?;
        info!(order_id = %order, status = %resolved.status, "Order resolved");

        let (buyer_text, reply) = match decision {
            Decision::Accept => (
                format!(
                    "📦 Your order ({}) has arrived at the office.\nYou can pick it up.",
                    resolved.product_name
                ),
                Reply::text("✅ The buyer was notified that the order is ready.")
                    .with_toast("Order accepted."),
            ),
            Decision::Deny => (
                format!(
                    "Your order ({}) was cancelled and {}🌟 returned to your balance.\n\
                     Ask the shop admin for details.",
                    resolved.product_name, resolved.price
                ),
                Reply::text(format!(
                    "❌ Order cancelled, {}🌟 refunded to the buyer.",
                    resolved.price
                ))
                .with_toast("Order denied."),
            ),
        };
        self.state.notifier().text(resolved.buyer_id, buyer_text).await;

        Ok(reply)
    }
}
