//! Purchase order domain types.

use crewstore_core::{EnterpriseId, OrderId, OrderStatus, ProductId, UserId};

/// A purchase order with the product snapshot taken at purchase time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub product_id: ProductId,
    pub product_name: String,
    /// Price paid, refunded on denial.
    pub price: i64,
    pub status: OrderStatus,
    pub enterprise_id: EnterpriseId,
    /// Epoch seconds.
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

/// An order joined with its buyer's profile, for the admin's order list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    pub order: Order,
    /// Buyer schedule number and name, empty when the buyer was deleted.
    pub buyer_schedule: String,
    pub buyer_name: String,
}

impl OrderDetails {
    #[must_use]
    pub fn buyer_label(&self) -> String {
        let label = format!("{} {}", self.buyer_schedule, self.buyer_name);
        let label = label.trim();
        if label.is_empty() {
            self.order.buyer_id.to_string()
        } else {
            label.to_string()
        }
    }
}

/// Everything the atomic purchase needs, captured before the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub buyer_id: UserId,
    pub product_id: ProductId,
    pub product_name: String,
    pub price: i64,
    pub enterprise_id: EnterpriseId,
    pub created_at: i64,
}

/// Admin decision on a pending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Deny,
}

impl Decision {
    /// Terminal status the decision moves the order to.
    #[must_use]
    pub const fn status(self) -> OrderStatus {
        match self {
            Self::Accept => OrderStatus::Accepted,
            Self::Deny => OrderStatus::Denied,
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Self::Accept),
            "deny" => Ok(Self::Deny),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// Outcome of resolving a pending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    pub buyer_id: UserId,
    pub product_name: String,
    pub price: i64,
    pub status: OrderStatus,
}
