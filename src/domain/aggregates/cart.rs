//! Cart Aggregate

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::{Money, MoneyError, Quantity};

/// A user's pending lines. One cart per user, at most one line per product.
#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    id: Uuid,
    user_id: Uuid,
    lines: Vec<CartLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartLine {
    id: Uuid,
    product_id: Uuid,
    quantity: Quantity,
}

impl CartLine {
    pub(crate) fn restore(id: Uuid, product_id: Uuid, quantity: Quantity) -> Self { Self { id, product_id, quantity } }
    pub fn id(&self) -> Uuid { self.id }
    pub fn product_id(&self) -> Uuid { self.product_id }
    pub fn quantity(&self) -> Quantity { self.quantity }
}

/// How an incoming quantity combines with a line that already exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineUpdate { Set, Increment }

/// Cart lines priced at the current catalog price.
#[derive(Clone, Debug, Serialize)]
pub struct CartDetails {
    pub cart_id: Uuid,
    pub items: Vec<PricedCartLine>,
    pub total: Money,
    pub item_count: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PricedCartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl Cart {
    pub fn for_user(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), user_id, lines: vec![], created_at: now, updated_at: now }
    }

    pub(crate) fn restore(id: Uuid, user_id: Uuid, lines: Vec<CartLine>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { id, user_id, lines, created_at, updated_at }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn item_count(&self) -> u64 { self.lines.iter().map(|l| u64::from(l.quantity.value())).sum() }

    pub fn line(&self, line_id: Uuid) -> Option<&CartLine> { self.lines.iter().find(|l| l.id == line_id) }
    pub fn line_for_product(&self, product_id: Uuid) -> Option<&CartLine> { self.lines.iter().find(|l| l.product_id == product_id) }

    /// Quantity the product's line would hold after applying `quantity` with `mode`.
    pub fn resolve_quantity(&self, product_id: Uuid, quantity: Quantity, mode: LineUpdate) -> Result<Quantity, CartError> {
        match (self.line_for_product(product_id), mode) {
            (Some(existing), LineUpdate::Increment) => existing.quantity.checked_add(quantity).ok_or(CartError::QuantityOverflow),
            _ => Ok(quantity),
        }
    }

    /// Adds a line for `product_id`, or merges into the existing one.
    pub fn add_or_update_line(&mut self, product_id: Uuid, quantity: Quantity, mode: LineUpdate) -> Result<&CartLine, CartError> {
        let target = self.resolve_quantity(product_id, quantity, mode)?;
        let index = match self.lines.iter().position(|l| l.product_id == product_id) {
            Some(i) => { self.lines[i].quantity = target; i }
            None => {
                self.lines.push(CartLine { id: Uuid::now_v7(), product_id, quantity: target });
                self.lines.len() - 1
            }
        };
        self.touch();
        Ok(&self.lines[index])
    }

    pub fn set_line_quantity(&mut self, line_id: Uuid, quantity: Quantity) -> Result<&CartLine, CartError> {
        let index = self.lines.iter().position(|l| l.id == line_id).ok_or(CartError::LineNotFound)?;
        self.lines[index].quantity = quantity;
        self.touch();
        Ok(&self.lines[index])
    }

    pub fn remove_line(&mut self, line_id: Uuid) -> Result<CartLine, CartError> {
        let index = self.lines.iter().position(|l| l.id == line_id).ok_or(CartError::LineNotFound)?;
        let line = self.lines.remove(index);
        self.touch();
        Ok(line)
    }

    /// Drops any line for `product_id`; returns whether one was present.
    pub fn remove_product(&mut self, product_id: Uuid) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        let removed = self.lines.len() != before;
        if removed { self.touch(); }
        removed
    }

    pub fn clear(&mut self) {
        if self.lines.is_empty() { return; }
        self.lines.clear();
        self.touch();
    }

    /// Sum of `quantity * price` at the products' live prices.
    pub fn total(&self, products: &HashMap<Uuid, Product>) -> Result<Money, CartError> {
        self.lines.iter().map(|l| {
            let product = products.get(&l.product_id).ok_or(CartError::ProductMissing(l.product_id))?;
            product.price().checked_mul(l.quantity).map_err(CartError::Amount)
        }).collect::<Result<Vec<_>, _>>()
            .and_then(|subtotals| Money::try_sum(subtotals).map_err(CartError::Amount))
    }

    pub fn details(&self, products: &HashMap<Uuid, Product>) -> Result<CartDetails, CartError> {
        let items = self.lines.iter().map(|l| {
            let product = products.get(&l.product_id).ok_or(CartError::ProductMissing(l.product_id))?;
            Ok(PricedCartLine {
                id: l.id, product_id: l.product_id, product_name: product.name().to_string(),
                quantity: l.quantity, unit_price: product.price(),
                subtotal: product.price().checked_mul(l.quantity).map_err(CartError::Amount)?,
            })
        }).collect::<Result<Vec<_>, CartError>>()?;
        let total = Money::try_sum(items.iter().map(|i| i.subtotal)).map_err(CartError::Amount)?;
        Ok(CartDetails { cart_id: self.id, items, total, item_count: self.item_count() })
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { LineNotFound, ProductMissing(Uuid), QuantityOverflow, Amount(MoneyError) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LineNotFound => write!(f, "Cart item not found"),
            Self::ProductMissing(id) => write!(f, "Product {id} no longer exists"),
            Self::QuantityOverflow => write!(f, "Quantity too large"),
            Self::Amount(e) => write!(f, "Cart total: {e}"),
        }
    }
}
