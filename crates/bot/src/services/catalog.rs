//! Catalog administration: the admin's shop editor.
//!
//! Numeric input that fails validation keeps the conversation where it is,
//! so the admin can simply send the value again.

use tracing::{info, instrument};

use crewstore_core::ProductId;

use super::Caller;
use crate::conversation::ConversationState;
use crate::db::ProductRepository;
use crate::error::AppError;
use crate::gateway::{Button, Gateway, Reply};
use crate::models::user::parse_non_negative;
use crate::models::{NewProduct, Product, ProductField};
use crate::state::BotState;

/// Shop editing for admins.
pub struct CatalogService<'a, G> {
    state: &'a BotState<G>,
}

impl<'a, G: Gateway> CatalogService<'a, G> {
    #[must_use]
    pub const fn new(state: &'a BotState<G>) -> Self {
        Self { state }
    }

    fn products(&self) -> ProductRepository<'_> {
        ProductRepository::new(self.state.pool())
    }

    async fn own_product(&self, caller: &Caller, id: ProductId) -> Result<Product, AppError> {
        let product = self
            .products()
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;
        caller.same_enterprise(Some(product.enterprise_id))?;
        Ok(product)
    }

    /// Entry menu of the shop editor.
    #[must_use]
    pub fn editor_menu() -> Reply {
        Reply::text("Shop menu:")
            .with_row(vec![Button::new("📝 Edit a product", "shop_edit:choose")])
            .with_row(vec![Button::new("➕ Add a product", "shop_edit:shop_add")])
    }

    /// Every product of the enterprise, including sold-out ones.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the caller has no enterprise.
    pub async fn choose(&self, caller: &Caller) -> Result<Reply, AppError> {
        let products = self.products().list(caller.enterprise()?, false).await?;
        if products.is_empty() {
            return Ok(Reply::text("The shop is empty. Add a product first."));
        }

        let mut reply = Reply::text("Which product do you want to edit?");
        for product in products {
            reply = reply.with_row(vec![Button::new(
                format!("{} ({}🌟, {} pcs)", product.name, product.price, product.remaining),
                format!("shop_edititem:{}", product.id),
            )]);
        }
        Ok(reply)
    }

    /// Actions for one product.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::CrossTenant`.
    pub async fn item_menu(&self, caller: &Caller, id: ProductId) -> Result<Reply, AppError> {
        let product = self.own_product(caller, id).await?;

        Ok(Reply::text(format!(
            "{}\nPrice: {}🌟\nIn stock: {}\n\nWhat do you want to change?",
            product.name, product.price, product.remaining
        ))
        .with_row(vec![
            Button::new("💲 Price", format!("shop_editfield:price:{id}")),
            Button::new("📦 Stock", format!("shop_editfield:remains:{id}")),
        ])
        .with_row(vec![Button::new("🗑️ Delete", format!("shop_editdel:{id}"))]))
    }

    /// Start collecting a new price or stock count.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::CrossTenant`.
    pub async fn begin_edit(
        &self,
        caller: &Caller,
        field: ProductField,
        id: ProductId,
    ) -> Result<Reply, AppError> {
        let product = self.own_product(caller, id).await?;

        let (state, prompt) = match field {
            ProductField::Price => (
                ConversationState::ProductPrice { product: id },
                format!("Enter the new price of {}:", product.name),
            ),
            ProductField::Remaining => (
                ConversationState::ProductRemaining { product: id },
                format!("Enter the number of {} in stock:", product.name),
            ),
        };
        self.state.conversations().begin(caller.id, state).await;
        Ok(Reply::text(prompt))
    }

    /// Apply a collected price or stock count.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` (conversation kept) for bad numbers.
    #[instrument(skip(self, caller, raw), fields(admin_id = %caller.id, product_id = %id))]
    pub async fn submit_field(
        &self,
        caller: &Caller,
        field: ProductField,
        id: ProductId,
        raw: &str,
    ) -> Result<Reply, AppError> {
        let value = parse_non_negative(raw).map_err(AppError::Validation)?;
        self.state.conversations().clear(caller.id).await;
        self.own_product(caller, id).await?;

        match field {
            ProductField::Price => {
                self.products().set_price(id, value).await?;
                info!(product_id = %id, price = value, "Price updated");
                Ok(Reply::text("✅ Price updated!"))
            }
            ProductField::Remaining => {
                self.products().set_remaining(id, value).await?;
                info!(product_id = %id, remaining = value, "Stock updated");
                Ok(Reply::text("✅ Stock updated!"))
            }
        }
    }

    /// Remove a product. Orders already placed keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::CrossTenant`.
    #[instrument(skip(self, caller), fields(admin_id = %caller.id, product_id = %id))]
    pub async fn delete(&self, caller: &Caller, id: ProductId) -> Result<Reply, AppError> {
        let product = self.own_product(caller, id).await?;
        self.products().delete(id).await?;
        self.state.conversations().clear(caller.id).await;

        info!(product_id = %id, "Product deleted");
        Ok(Reply::text(format!("✅ {} deleted.", product.name)))
    }

    // =========================================================================
    // Add product: name → price → remaining
    // =========================================================================

    pub async fn begin_add(&self, caller: &Caller) -> Reply {
        self.state
            .conversations()
            .begin(caller.id, ConversationState::NewProductName)
            .await;
        Reply::text("Enter the name of the new product:")
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` (conversation kept) for a blank name.
    pub async fn submit_name(&self, caller: &Caller, raw: &str) -> Result<Reply, AppError> {
        let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            return Err(AppError::Validation(
                "The name must not be empty.".to_string(),
            ));
        }

        self.state
            .conversations()
            .begin(caller.id, ConversationState::NewProductPrice { name })
            .await;
        Ok(Reply::text("Enter the price:"))
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` (conversation kept) for bad numbers.
    pub async fn submit_price(
        &self,
        caller: &Caller,
        name: String,
        raw: &str,
    ) -> Result<Reply, AppError> {
        let price = parse_non_negative(raw).map_err(AppError::Validation)?;
        self.state
            .conversations()
            .begin(
                caller.id,
                ConversationState::NewProductRemaining { name, price },
            )
            .await;
        Ok(Reply::text("Enter the quantity in stock:"))
    }

    /// Create the product once the stock count is valid.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` (conversation kept) for bad numbers.
    #[instrument(skip(self, caller, name, raw), fields(admin_id = %caller.id))]
    pub async fn submit_remaining(
        &self,
        caller: &Caller,
        name: String,
        price: i64,
        raw: &str,
    ) -> Result<Reply, AppError> {
        let remaining = parse_non_negative(raw).map_err(AppError::Validation)?;
        let enterprise_id = caller.enterprise()?;
        self.state.conversations().clear(caller.id).await;

        let product = self
            .products()
            .create(&NewProduct {
                name,
                price,
                remaining,
                enterprise_id,
            })
            .await?;

        info!(product_id = %product.id, "Product added");
        Ok(Reply::text(format!(
            "✅ Product added: {} ({}🌟, {} pcs)",
            product.name, product.price, product.remaining
        )))
    }
}
