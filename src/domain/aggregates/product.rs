//! Product Aggregate
//!
//! Owns the per-product stock counter. `stock` is unsigned, and every
//! decrement goes through [`Product::reduce_stock`], which refuses to go
//! below zero.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity};
use crate::domain::events::{DomainEvent, ProductEvent};

#[derive(Clone, Debug, Serialize)]
pub struct Product {
    id: Uuid,
    name: String,
    description: Option<String>,
    price: Money,
    stock: u32,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Product {
    pub fn create(name: impl Into<String>, price: Money, stock: u32) -> Result<Self, ProductError> {
        let name = name.into();
        if name.trim().is_empty() { return Err(ProductError::MissingName); }
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut product = Self {
            id, name, description: None, price, stock, image_url: None,
            created_at: now, updated_at: now, events: vec![],
        };
        product.raise_event(DomainEvent::Product(ProductEvent::Created { product_id: id, stock }));
        Ok(product)
    }

    /// Rebuilds a product from persisted state without raising events.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: Uuid, name: String, description: Option<String>, price: Money, stock: u32,
        image_url: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, name, description, price, stock, image_url, created_at, updated_at, events: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn price(&self) -> Money { self.price }
    pub fn stock(&self) -> u32 { self.stock }
    pub fn image_url(&self) -> Option<&str> { self.image_url.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// True iff `quantity` units can be taken from current stock.
    pub fn has_stock(&self, quantity: Quantity) -> bool { quantity.value() <= self.stock }

    /// Takes `quantity` units out of stock, returning what remains.
    /// Stock is left untouched on failure.
    pub fn reduce_stock(&mut self, quantity: Quantity) -> Result<u32, ProductError> {
        if !self.has_stock(quantity) {
            return Err(ProductError::InsufficientStock { available: self.stock, requested: quantity.value() });
        }
        self.stock -= quantity.value();
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockReduced {
            product_id: self.id, quantity: quantity.value(), remaining: self.stock,
        }));
        Ok(self.stock)
    }

    pub fn increase_stock(&mut self, quantity: Quantity) -> Result<u32, ProductError> {
        self.stock = self.stock.checked_add(quantity.value()).ok_or(ProductError::StockOverflow)?;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockIncreased {
            product_id: self.id, quantity: quantity.value(), stock: self.stock,
        }));
        Ok(self.stock)
    }

    /// Overwrites the stock level (admin edit).
    pub fn set_stock(&mut self, stock: u32) { self.stock = stock; self.touch(); }

    pub fn update_price(&mut self, new_price: Money) {
        if new_price == self.price { return; }
        let old_price = std::mem::replace(&mut self.price, new_price);
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::PriceChanged {
            product_id: self.id, old_price: old_price.amount(), new_price: new_price.amount(),
        }));
    }

    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), ProductError> {
        let name = name.into();
        if name.trim().is_empty() { return Err(ProductError::MissingName); }
        self.name = name;
        self.touch();
        Ok(())
    }

    pub fn set_description(&mut self, description: Option<String>) { self.description = description; self.touch(); }
    pub fn set_image_url(&mut self, url: Option<String>) { self.image_url = url; self.touch(); }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError { MissingName, InsufficientStock { available: u32, requested: u32 }, StockOverflow }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "Missing name"),
            Self::InsufficientStock { available, requested } => write!(f, "Insufficient stock: requested {requested}, available {available}"),
            Self::StockOverflow => write!(f, "Stock overflow"),
        }
    }
}
