//! Catalog and restocking.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::{Money, Quantity};
use crate::service::Storefront;
use crate::{CommerceError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: u32,
    #[validate(url)]
    pub image_url: Option<String>,
}

/// Partial product edit. Absent fields are left alone; `description` and
/// `image_url` are cleared by an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProductChanges {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub price: Option<Decimal>,
    pub stock: Option<u32>,
    #[validate(url)]
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl Storefront {
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        let price = Money::new(input.price)?;
        let mut product = Product::create(input.name, price, input.stock)
            .map_err(|e| CommerceError::Validation(e.to_string()))?;
        product.set_description(input.description);
        product.set_image_url(input.image_url);
        let events = product.take_events();

        let mut tx = self.begin().await?;
        tx.insert_product(&product).await?;
        self.commit(tx, events).await?;
        info!(product_id = %product.id(), stock = product.stock(), "product created");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn product(&self, id: Uuid) -> Result<Product> {
        let mut tx = self.begin().await?;
        let product = tx.product(id).await?.ok_or(CommerceError::ProductNotFound(id))?;
        tx.commit().await?;
        Ok(product)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let mut tx = self.begin().await?;
        let products = tx.list_products().await?;
        tx.commit().await?;
        Ok(products)
    }

    /// Applies admin edits. A price change affects carts immediately but never
    /// the lines of orders already placed.
    #[instrument(skip(self, changes))]
    pub async fn update_product(&self, id: Uuid, changes: ProductChanges) -> Result<Product> {
        let mut tx = self.begin().await?;
        let mut product = tx.products_for_update(&[id]).await?.remove(&id).ok_or(CommerceError::ProductNotFound(id))?;
        if let Some(name) = changes.name {
            product.rename(name).map_err(|e| CommerceError::Validation(e.to_string()))?;
        }
        if let Some(description) = changes.description { product.set_description(description); }
        if let Some(url) = changes.image_url { product.set_image_url(url); }
        if let Some(price) = changes.price { product.update_price(Money::new(price)?); }
        if let Some(stock) = changes.stock { product.set_stock(stock); }
        let events = product.take_events();
        tx.update_product(&product).await?;
        self.commit(tx, events).await?;
        info!(product_id = %id, "product updated");
        Ok(product)
    }

    /// Removes a product that no order refers to, along with any cart lines for it.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        let mut tx = self.begin().await?;
        if tx.product_is_ordered(id).await? {
            warn!(product_id = %id, "refusing to delete ordered product");
            return Err(CommerceError::Validation("Product is referenced by existing orders".to_string()));
        }
        if !tx.delete_product(id).await? {
            return Err(CommerceError::ProductNotFound(id));
        }
        tx.commit().await?;
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restock(&self, id: Uuid, quantity: u32) -> Result<Product> {
        let quantity = Quantity::new(quantity)?;
        let mut tx = self.begin().await?;
        let mut product = tx.products_for_update(&[id]).await?.remove(&id).ok_or(CommerceError::ProductNotFound(id))?;
        let before = product.stock();
        product.increase_stock(quantity).map_err(|e| CommerceError::from_product(&product, e))?;
        if !tx.compare_and_set_stock(id, before, product.stock()).await? {
            return Err(CommerceError::TransactionFailure(format!("stock of product {id} changed during restock")));
        }
        let events = product.take_events();
        self.commit(tx, events).await?;
        info!(product_id = %id, added = quantity.value(), stock = product.stock(), "product restocked");
        Ok(product)
    }
}
