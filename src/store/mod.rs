//! Transactional persistence.
//!
//! Every service operation runs inside one [`Transaction`] obtained from
//! [`Store::begin`]. Nothing a transaction writes is visible until
//! [`Transaction::commit`]; dropping it without committing (an early `?`
//! return, a panic) discards every write made through it.

use std::collections::HashMap;
use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Order, Product};
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

#[async_trait]
pub trait Transaction: Send {
    async fn product(&mut self, id: Uuid) -> Result<Option<Product>>;

    /// Loads the given products and holds them against concurrent stock
    /// changes until this transaction ends. Missing ids are absent from the map.
    async fn products_for_update(&mut self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>>;

    /// Loads products without locking; missing ids are absent from the map.
    async fn products(&mut self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>>;

    /// All products, newest first.
    async fn list_products(&mut self) -> Result<Vec<Product>>;

    async fn insert_product(&mut self, product: &Product) -> Result<()>;

    /// Overwrites every stored field of `product`. Contended stock changes
    /// go through [`Transaction::compare_and_set_stock`] instead.
    async fn update_product(&mut self, product: &Product) -> Result<()>;

    /// Deletes a product and any cart lines pointing at it. Returns whether it existed.
    async fn delete_product(&mut self, id: Uuid) -> Result<bool>;

    async fn product_is_ordered(&mut self, id: Uuid) -> Result<bool>;

    /// Sets stock to `new` only if it still equals `expected`.
    /// Returns `false`, writing nothing, when the stored value has moved.
    async fn compare_and_set_stock(&mut self, id: Uuid, expected: u32, new: u32) -> Result<bool>;

    async fn cart_for_user(&mut self, user_id: Uuid) -> Result<Option<Cart>>;

    /// User owning the cart that holds `line_id`, if the line exists.
    async fn cart_line_owner(&mut self, line_id: Uuid) -> Result<Option<Uuid>>;

    /// The user's cart, created empty if the user has none yet. Concurrent
    /// first accesses for one user all end up with the same stored cart.
    async fn ensure_cart(&mut self, user_id: Uuid) -> Result<Cart>;

    /// Writes a cart obtained from this store together with its full line set.
    async fn save_cart(&mut self, cart: &Cart) -> Result<()>;

    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn order(&mut self, id: Uuid) -> Result<Option<Order>>;

    /// Loads an order and holds it against concurrent status changes.
    async fn order_for_update(&mut self, id: Uuid) -> Result<Option<Order>>;

    /// Orders for one user, newest first.
    async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>>;

    async fn all_orders(&mut self) -> Result<Vec<Order>>;

    async fn update_order_status(&mut self, order: &Order) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
