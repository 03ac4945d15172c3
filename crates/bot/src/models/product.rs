//! Shop product domain types.

use crewstore_core::{EnterpriseId, ProductId};

/// A product sold inside one enterprise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit price in points.
    pub price: i64,
    /// Units left in stock.
    pub remaining: i64,
    pub enterprise_id: EnterpriseId,
}

/// Parameters for creating a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub price: i64,
    pub remaining: i64,
    pub enterprise_id: EnterpriseId,
}

/// Product attribute editable from the shop editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductField {
    Price,
    Remaining,
}

impl ProductField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Remaining => "remains",
        }
    }
}

impl std::str::FromStr for ProductField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price" => Ok(Self::Price),
            "remains" => Ok(Self::Remaining),
            other => Err(format!("unknown product field: {other}")),
        }
    }
}
