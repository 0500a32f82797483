//! Checkout: turns a user's cart into an order and reserves its stock.
//!
//! The whole conversion runs in one transaction:
//!
//! 1. load the cart (`CartNotFound`, `EmptyCart`);
//! 2. lock every product on it and pre-check each line against stock, failing
//!    with `InsufficientStock` before anything is written;
//! 3. per line, in cart order, snapshot the live price into an order line and
//!    decrement stock through a compare-and-set write;
//! 4. create the order, clear the cart, commit.
//!
//! The pre-check is only a fast path. The compare-and-set in step 3 is what
//! actually keeps stock from going negative: if it loses a race, the
//! checkout fails with `InsufficientStock` and the transaction is dropped,
//! taking every earlier decrement and write with it.

use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use crate::domain::aggregates::{CartLine, Order, OrderLine, Product};
use crate::service::Storefront;
use crate::store::Transaction;
use crate::{CommerceError, Result};

impl Storefront {
    #[instrument(skip(self))]
    pub async fn checkout(&self, user_id: Uuid) -> Result<Order> {
        let mut tx = self.begin().await?;
        let mut cart = tx.cart_for_user(user_id).await?.ok_or(CommerceError::CartNotFound)?;
        if cart.is_empty() {
            return Err(CommerceError::EmptyCart);
        }

        let ids: Vec<Uuid> = cart.lines().iter().map(CartLine::product_id).collect();
        let mut products = tx.products_for_update(&ids).await?;
        precheck(cart.lines(), &products)?;

        let mut events = Vec::new();
        let mut items = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let product = products.get_mut(&line.product_id()).ok_or(CommerceError::ProductNotFound(line.product_id()))?;
            items.push(OrderLine::snapshot(product, line.quantity()));
            reserve(tx.as_mut(), product, line).await?;
            events.extend(product.take_events());
        }

        let mut order = Order::place(user_id, items)?;
        events.extend(order.take_events());
        tx.insert_order(&order).await?;
        cart.clear();
        tx.save_cart(&cart).await?;
        self.commit(tx, events).await?;

        info!(order_id = %order.id(), total = %order.total_amount(), lines = order.items().len(), "order placed");
        Ok(order)
    }
}

/// Verifies every line fits in current stock without touching anything.
fn precheck(lines: &[CartLine], products: &HashMap<Uuid, Product>) -> Result<()> {
    for line in lines {
        let product = products.get(&line.product_id()).ok_or(CommerceError::ProductNotFound(line.product_id()))?;
        if !product.has_stock(line.quantity()) {
            warn!(product_id = %product.id(), available = product.stock(), requested = line.quantity().value(), "checkout rejected");
            return Err(CommerceError::insufficient_stock(product, line.quantity()));
        }
    }
    Ok(())
}

/// Takes the line's quantity out of `product` and persists the new level,
/// but only if the stored level is still the one `product` was read with.
async fn reserve(tx: &mut dyn Transaction, product: &mut Product, line: &CartLine) -> Result<()> {
    let expected = product.stock();
    product.reduce_stock(line.quantity()).map_err(|e| CommerceError::from_product(product, e))?;
    if tx.compare_and_set_stock(product.id(), expected, product.stock()).await? {
        return Ok(());
    }
    let available = tx.product(product.id()).await?.map_or(0, |p| p.stock());
    warn!(product_id = %product.id(), expected, available, "stock changed under checkout");
    Err(CommerceError::InsufficientStock {
        product_id: product.id(),
        product_name: product.name().to_string(),
        available,
        requested: line.quantity().value(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use crate::domain::aggregates::{Cart, OrderStatus, TransitionPolicy};
    use crate::service::testing::{seed_product, storefront};
    use crate::service::ProductChanges;
    use crate::store::{MemoryStore, Store};

    #[tokio::test]
    async fn test_checkout_happy_path() {
        let sf = storefront();
        let user = Uuid::new_v4();
        let a = seed_product(&sf, 1250, 5).await;
        sf.add_item(user, a.id(), 3).await.unwrap();

        let order = sf.checkout(user).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_amount().amount(), Decimal::new(3750, 2));
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].price().amount(), Decimal::new(1250, 2));
        assert_eq!(sf.product(a.id()).await.unwrap().stock(), 2);
        assert!(sf.cart(user).await.unwrap().items.is_empty());
        assert_eq!(sf.orders_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_insufficient_stock_changes_nothing() {
        let sf = storefront();
        let user = Uuid::new_v4();
        let a = seed_product(&sf, 100, 10).await;
        let b = seed_product(&sf, 200, 5).await;
        sf.add_item(user, a.id(), 2).await.unwrap();
        sf.add_item(user, b.id(), 5).await.unwrap();
        sf.update_product(b.id(), ProductChanges { stock: Some(2), ..Default::default() }).await.unwrap();

        match sf.checkout(user).await {
            Err(CommerceError::InsufficientStock { product_id, available, requested, .. }) => {
                assert_eq!((product_id, available, requested), (b.id(), 2, 5));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(sf.product(a.id()).await.unwrap().stock(), 10);
        assert_eq!(sf.product(b.id()).await.unwrap().stock(), 2);
        assert_eq!(sf.cart(user).await.unwrap().items.len(), 2);
        assert!(sf.orders_for_user(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_requires_non_empty_cart() {
        let sf = storefront();
        let user = Uuid::new_v4();
        assert!(matches!(sf.checkout(user).await, Err(CommerceError::CartNotFound)));
        sf.cart(user).await.unwrap();
        assert!(matches!(sf.checkout(user).await, Err(CommerceError::EmptyCart)));
    }

    #[tokio::test]
    async fn test_total_uses_price_at_checkout_and_snapshot_survives_edits() {
        let sf = storefront();
        let user = Uuid::new_v4();
        let a = seed_product(&sf, 1000, 10).await;
        let b = seed_product(&sf, 300, 10).await;
        sf.add_item(user, a.id(), 2).await.unwrap();
        sf.add_item(user, b.id(), 3).await.unwrap();
        sf.update_product(a.id(), ProductChanges { price: Some(Decimal::new(1100, 2)), ..Default::default() }).await.unwrap();

        let order = sf.checkout(user).await.unwrap();
        assert_eq!(order.total_amount().amount(), Decimal::new(3100, 2));
        let products: Vec<Uuid> = order.items().iter().map(|l| l.product_id()).collect();
        assert_eq!(products, vec![a.id(), b.id()]);

        sf.update_product(a.id(), ProductChanges { price: Some(Decimal::new(9999, 2)), ..Default::default() }).await.unwrap();
        let stored = sf.order_for_user(order.id(), user).await.unwrap();
        assert_eq!(stored.items()[0].price().amount(), Decimal::new(1100, 2));
        assert_eq!(stored.total_amount().amount(), Decimal::new(3100, 2));
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_never_oversell() {
        let sf = storefront();
        let p = seed_product(&sf, 500, 5).await;
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        sf.add_item(u1, p.id(), 3).await.unwrap();
        sf.add_item(u2, p.id(), 3).await.unwrap();

        let (r1, r2) = tokio::join!(
            tokio::spawn({ let sf = sf.clone(); async move { sf.checkout(u1).await } }),
            tokio::spawn({ let sf = sf.clone(); async move { sf.checkout(u2).await } }),
        );
        let results = [r1.unwrap(), r2.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(CommerceError::InsufficientStock { available: 2, requested: 3, .. }))));
        assert_eq!(sf.product(p.id()).await.unwrap().stock(), 2);
    }

    /// Store whose locked reads report one unit for sold-out products, so the
    /// pre-check passes and the compare-and-set decrement is what must refuse.
    struct StaleStock(MemoryStore);
    struct StaleTx(Box<dyn Transaction>);

    #[async_trait]
    impl Store for StaleStock {
        async fn begin(&self) -> Result<Box<dyn Transaction>> { Ok(Box::new(StaleTx(self.0.begin().await?))) }
    }

    #[async_trait]
    impl Transaction for StaleTx {
        async fn product(&mut self, id: Uuid) -> Result<Option<Product>> { self.0.product(id).await }
        async fn products_for_update(&mut self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> {
            let mut products = self.0.products_for_update(ids).await?;
            for p in products.values_mut().filter(|p| p.stock() == 0) { p.set_stock(1); }
            Ok(products)
        }
        async fn products(&mut self, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> { self.0.products(ids).await }
        async fn list_products(&mut self) -> Result<Vec<Product>> { self.0.list_products().await }
        async fn insert_product(&mut self, p: &Product) -> Result<()> { self.0.insert_product(p).await }
        async fn update_product(&mut self, p: &Product) -> Result<()> { self.0.update_product(p).await }
        async fn delete_product(&mut self, id: Uuid) -> Result<bool> { self.0.delete_product(id).await }
        async fn product_is_ordered(&mut self, id: Uuid) -> Result<bool> { self.0.product_is_ordered(id).await }
        async fn compare_and_set_stock(&mut self, id: Uuid, expected: u32, new: u32) -> Result<bool> {
            self.0.compare_and_set_stock(id, expected, new).await
        }
        async fn cart_for_user(&mut self, user_id: Uuid) -> Result<Option<Cart>> { self.0.cart_for_user(user_id).await }
        async fn cart_line_owner(&mut self, line_id: Uuid) -> Result<Option<Uuid>> { self.0.cart_line_owner(line_id).await }
        async fn ensure_cart(&mut self, user_id: Uuid) -> Result<Cart> { self.0.ensure_cart(user_id).await }
        async fn save_cart(&mut self, cart: &Cart) -> Result<()> { self.0.save_cart(cart).await }
        async fn insert_order(&mut self, order: &Order) -> Result<()> { self.0.insert_order(order).await }
        async fn order(&mut self, id: Uuid) -> Result<Option<Order>> { self.0.order(id).await }
        async fn order_for_update(&mut self, id: Uuid) -> Result<Option<Order>> { self.0.order_for_update(id).await }
        async fn orders_for_user(&mut self, user_id: Uuid) -> Result<Vec<Order>> { self.0.orders_for_user(user_id).await }
        async fn all_orders(&mut self) -> Result<Vec<Order>> { self.0.all_orders().await }
        async fn update_order_status(&mut self, order: &Order) -> Result<()> { self.0.update_order_status(order).await }
        async fn commit(self: Box<Self>) -> Result<()> { self.0.commit().await }
        async fn rollback(self: Box<Self>) -> Result<()> { self.0.rollback().await }
    }

    #[tokio::test]
    async fn test_guarded_decrement_rolls_back_everything() {
        let inner = MemoryStore::new();
        let sf = Storefront::new(Arc::new(inner.clone()), TransitionPolicy::Lifecycle);
        let user = Uuid::new_v4();
        let a = seed_product(&sf, 100, 4).await;
        let b = seed_product(&sf, 100, 1).await;
        sf.add_item(user, a.id(), 2).await.unwrap();
        sf.add_item(user, b.id(), 1).await.unwrap();
        sf.update_product(b.id(), ProductChanges { stock: Some(0), ..Default::default() }).await.unwrap();

        let stale = Storefront::new(Arc::new(StaleStock(inner)), TransitionPolicy::Lifecycle);
        match stale.checkout(user).await {
            Err(CommerceError::InsufficientStock { product_id, available, requested, .. }) => {
                assert_eq!((product_id, available, requested), (b.id(), 0, 1));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        // a was decremented before b failed; the rollback must restore it.
        assert_eq!(sf.product(a.id()).await.unwrap().stock(), 4);
        assert_eq!(sf.product(b.id()).await.unwrap().stock(), 0);
        assert_eq!(sf.cart(user).await.unwrap().items.len(), 2);
        assert!(sf.all_orders().await.unwrap().is_empty());
    }
}
