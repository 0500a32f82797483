//! Cart operations.

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use crate::domain::aggregates::{Cart, CartDetails, CartLine, LineUpdate};
use crate::domain::value_objects::Quantity;
use crate::service::Storefront;
use crate::store::Transaction;
use crate::{CommerceError, Result};

impl Storefront {
    /// The user's cart priced at current catalog prices, created on first access.
    #[instrument(skip(self))]
    pub async fn cart(&self, user_id: Uuid) -> Result<CartDetails> {
        let mut tx = self.begin().await?;
        let cart = tx.ensure_cart(user_id).await?;
        let details = priced(tx.as_mut(), &cart).await?;
        tx.commit().await?;
        debug!(cart_id = %details.cart_id, items = details.item_count, "cart loaded");
        Ok(details)
    }

    /// Adds `quantity` units of a product, merging into an existing line.
    /// The merged quantity must still fit in current stock.
    #[instrument(skip(self))]
    pub async fn add_item(&self, user_id: Uuid, product_id: Uuid, quantity: u32) -> Result<CartLine> {
        let quantity = Quantity::new(quantity)?;
        let mut tx = self.begin().await?;
        let product = tx.product(product_id).await?.ok_or(CommerceError::ProductNotFound(product_id))?;
        let mut cart = tx.ensure_cart(user_id).await?;
        let target = cart.resolve_quantity(product_id, quantity, LineUpdate::Increment)?;
        if !product.has_stock(target) {
            warn!(available = product.stock(), requested = target.value(), "insufficient stock for cart line");
            return Err(CommerceError::insufficient_stock(&product, target));
        }
        let line = cart.add_or_update_line(product_id, quantity, LineUpdate::Increment)?.clone();
        priced(tx.as_mut(), &cart).await?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        info!(line_id = %line.id(), quantity = line.quantity().value(), "cart line saved");
        Ok(line)
    }

    /// Sets the quantity of one of the user's cart lines.
    #[instrument(skip(self))]
    pub async fn update_item(&self, user_id: Uuid, line_id: Uuid, quantity: u32) -> Result<CartLine> {
        let quantity = Quantity::new(quantity)?;
        let mut tx = self.begin().await?;
        let mut cart = owned_cart(tx.as_mut(), user_id, line_id).await?;
        let product_id = cart.line(line_id).map(CartLine::product_id).ok_or(CommerceError::CartLineNotFound)?;
        let product = tx.product(product_id).await?.ok_or(CommerceError::ProductNotFound(product_id))?;
        if !product.has_stock(quantity) {
            warn!(available = product.stock(), requested = quantity.value(), "insufficient stock for cart line");
            return Err(CommerceError::insufficient_stock(&product, quantity));
        }
        let line = cart.set_line_quantity(line_id, quantity)?.clone();
        priced(tx.as_mut(), &cart).await?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        info!(quantity = quantity.value(), "cart line updated");
        Ok(line)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, line_id: Uuid) -> Result<()> {
        let mut tx = self.begin().await?;
        let mut cart = owned_cart(tx.as_mut(), user_id, line_id).await?;
        cart.remove_line(line_id)?;
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        info!("cart line removed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
        let mut tx = self.begin().await?;
        let mut cart = tx.cart_for_user(user_id).await?.ok_or(CommerceError::CartNotFound)?;
        cart.clear();
        tx.save_cart(&cart).await?;
        tx.commit().await?;
        info!(cart_id = %cart.id(), "cart cleared");
        Ok(())
    }
}

/// Prices `cart` at live catalog prices. Fails when a total no longer fits in `Money`.
async fn priced(tx: &mut dyn Transaction, cart: &Cart) -> Result<CartDetails> {
    let ids: Vec<Uuid> = cart.lines().iter().map(CartLine::product_id).collect();
    let products = tx.products(&ids).await?;
    Ok(cart.details(&products)?)
}

/// Loads the cart holding `line_id`, provided it belongs to `user_id`.
async fn owned_cart(tx: &mut dyn Transaction, user_id: Uuid, line_id: Uuid) -> Result<Cart> {
    match tx.cart_line_owner(line_id).await? {
        None => Err(CommerceError::CartLineNotFound),
        Some(owner) if owner != user_id => {
            warn!(%owner, "cart line belongs to another user");
            Err(CommerceError::Unauthorized)
        }
        Some(_) => tx.cart_for_user(user_id).await?.ok_or(CommerceError::CartNotFound),
    }
}
