//! In-process store.
//!
//! Transactions are fully serialized: `begin` takes the store lock and holds
//! it until the transaction is committed or dropped. Writes go to a private
//! copy of the tables that replaces the shared copy on commit.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Order, Product};
use crate::store::{Store, Transaction};
use crate::Result;

#[derive(Clone, Debug, Default)]
struct Tables {
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    orders: Vec<Order>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, Uuid)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn product(&mut self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn products_for_update(&mut self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> {
        self.products(ids).await
    }

    async fn products(&mut self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> {
        Ok(ids.iter().filter_map(|id| self.working.products.get(id).map(|p| (*id, p.clone()))).collect())
    }

    async fn list_products(&mut self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self.working.products.values().cloned().collect();
        newest_first(&mut products, |p| (p.created_at(), p.id()));
        Ok(products)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        self.working.products.insert(product.id(), product.clone());
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        if let Some(stored) = self.working.products.get_mut(&product.id()) {
            *stored = product.clone();
        }
        Ok(())
    }

    async fn delete_product(&mut self, id: Uuid) -> Result<bool> {
        let existed = self.working.products.remove(&id).is_some();
        for cart in self.working.carts.values_mut() {
            cart.remove_product(id);
        }
        Ok(existed)
    }

    async fn product_is_ordered(&mut self, id: Uuid) -> Result<bool> {
        Ok(self.working.orders.iter().any(|o| o.items().iter().any(|l| l.product_id() == id)))
    }

    async fn compare_and_set_stock(&mut self, id: Uuid, expected: u32, new: u32) -> Result<bool> {
        match self.working.products.get_mut(&id) {
            Some(p) if p.stock() == expected => { p.set_stock(new); Ok(true) }
            _ => Ok(false),
        }
    }

    async fn cart_for_user(&mut self, user_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.working.carts.get(&user_id).cloned())
    }

    async fn cart_line_owner(&mut self, line_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self.working.carts.values().find(|c| c.line(line_id).is_some()).map(Cart::user_id))
    }

    async fn ensure_cart(&mut self, user_id: Uuid) -> Result<Cart> {
        Ok(self.working.carts.entry(user_id).or_insert_with(|| Cart::for_user(user_id)).clone())
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<()> {
        self.working.carts.insert(cart.user_id(), cart.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.working.orders.push(order.clone());
        Ok(())
    }

    async fn order(&mut self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.working.orders.iter().find(|o| o.id() == id).cloned())
    }

    async fn order_for_update(&mut self, id: Uuid) -> Result<Option<Order>> {
        self.order(id).await
    }

    async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.working.orders.iter().filter(|o| o.user_id() == user_id).cloned().collect();
        newest_first(&mut orders, |o| (o.created_at(), o.id()));
        Ok(orders)
    }

    async fn all_orders(&mut self) -> Result<Vec<Order>> {
        let mut orders = self.working.orders.clone();
        newest_first(&mut orders, |o| (o.created_at(), o.id()));
        Ok(orders)
    }

    async fn update_order_status(&mut self, order: &Order) -> Result<()> {
        if let Some(stored) = self.working.orders.iter_mut().find(|o| o.id() == order.id()) {
            *stored = order.clone();
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        debug!("rolling back in-memory transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;
    use rust_decimal::Decimal;

    fn widget(stock: u32) -> Product {
        Product::create("Widget", Money::new(Decimal::new(500, 2)).unwrap(), stock).unwrap()
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let p = widget(4);
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.commit().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.product(p.id()).await.unwrap().map(|p| p.stock()), Some(4));
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = MemoryStore::new();
        let p = widget(4);
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_product(&p).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.product(p.id()).await.unwrap().is_none());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_compare_and_set_stock() {
        let store = MemoryStore::new();
        let p = widget(5);
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        assert!(!tx.compare_and_set_stock(p.id(), 4, 1).await.unwrap());
        assert!(tx.compare_and_set_stock(p.id(), 5, 2).await.unwrap());
        assert!(!tx.compare_and_set_stock(Uuid::new_v4(), 0, 0).await.unwrap());
        assert_eq!(tx.product(p.id()).await.unwrap().map(|p| p.stock()), Some(2));
    }

    #[tokio::test]
    async fn test_ensure_cart_creates_once() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        let first = tx.ensure_cart(user).await.unwrap();
        assert_eq!(tx.ensure_cart(user).await.unwrap().id(), first.id());
        tx.commit().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.cart_for_user(user).await.unwrap().map(|c| c.id()), Some(first.id()));
    }

    #[tokio::test]
    async fn test_delete_product_drops_cart_lines() {
        use crate::domain::aggregates::LineUpdate;
        use crate::domain::value_objects::Quantity;
        let store = MemoryStore::new();
        let p = widget(5);
        let user = Uuid::new_v4();
        let mut cart = Cart::for_user(user);
        cart.add_or_update_line(p.id(), Quantity::new(1).unwrap(), LineUpdate::Increment).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.save_cart(&cart).await.unwrap();
        assert!(tx.delete_product(p.id()).await.unwrap());
        assert!(!tx.delete_product(p.id()).await.unwrap());
        assert!(tx.cart_for_user(user).await.unwrap().unwrap().is_empty());
    }
}
