//! Order queries, simulated payment and admin status changes.

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use crate::domain::aggregates::{Order, OrderStatus, PaymentDetails};
use crate::service::Storefront;
use crate::{CommerceError, Result};

impl Storefront {
    /// Orders placed by `user_id`, newest first.
    #[instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut tx = self.begin().await?;
        let orders = tx.orders_for_user(user_id).await?;
        tx.commit().await?;
        debug!(count = orders.len(), "orders loaded");
        Ok(orders)
    }

    #[instrument(skip(self))]
    pub async fn order_for_user(&self, order_id: Uuid, user_id: Uuid) -> Result<Order> {
        let mut tx = self.begin().await?;
        let order = tx.order(order_id).await?.ok_or(CommerceError::OrderNotFound)?;
        tx.commit().await?;
        if order.user_id() != user_id {
            warn!(owner = %order.user_id(), "order belongs to another user");
            return Err(CommerceError::Unauthorized);
        }
        Ok(order)
    }

    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        let mut tx = self.begin().await?;
        let orders = tx.all_orders().await?;
        tx.commit().await?;
        Ok(orders)
    }

    /// Captures a simulated payment for one of the caller's own orders.
    ///
    /// Ownership is checked here even when the caller already did, since
    /// capture changes state. An order already at `paid` or beyond is
    /// rejected with `AlreadyPaid` and left untouched.
    #[instrument(skip(self))]
    pub async fn simulate_payment(&self, order_id: Uuid, user_id: Uuid) -> Result<(Order, PaymentDetails)> {
        let mut tx = self.begin().await?;
        let mut order = tx.order_for_update(order_id).await?.ok_or(CommerceError::OrderNotFound)?;
        if order.user_id() != user_id {
            warn!(owner = %order.user_id(), "payment attempted on another user's order");
            return Err(CommerceError::Unauthorized);
        }
        let payment = order.capture_payment(self.policy).map_err(|e| {
            warn!(status = %order.status(), error = %e, "payment rejected");
            CommerceError::from(e)
        })?;
        let events = order.take_events();
        tx.update_order_status(&order).await?;
        self.commit(tx, events).await?;
        info!(amount = %payment.amount_paid, "payment captured");
        Ok((order, payment))
    }

    /// Moves an order to `status`, subject to the configured transition policy.
    #[instrument(skip(self))]
    pub async fn update_order_status(&self, order_id: Uuid, status: &str) -> Result<Order> {
        let to: OrderStatus = status.parse()?;
        let mut tx = self.begin().await?;
        let mut order = tx.order_for_update(order_id).await?.ok_or(CommerceError::OrderNotFound)?;
        let from = order.status();
        if let Err(e) = order.update_status(to, self.policy) {
            warn!(%from, %to, policy = ?self.policy, "status change rejected");
            return Err(e.into());
        }
        let events = order.take_events();
        tx.update_order_status(&order).await?;
        self.commit(tx, events).await?;
        info!(%from, %to, "order status updated");
        Ok(order)
    }
}
