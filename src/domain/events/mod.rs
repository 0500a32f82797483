//! Domain events
use crate::domain::aggregates::OrderStatus;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, stock: u32 },
    PriceChanged { product_id: Uuid, old_price: Decimal, new_price: Decimal },
    StockReduced { product_id: Uuid, quantity: u32, remaining: u32 },
    StockIncreased { product_id: Uuid, quantity: u32, stock: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Decimal, lines: usize },
    Paid { order_id: Uuid, amount: Decimal },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}

impl DomainEvent {
    /// Subject the event is published under, e.g. `storefront.order.placed`.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Created { .. }) => "storefront.product.created",
            Self::Product(ProductEvent::PriceChanged { .. }) => "storefront.product.price_changed",
            Self::Product(ProductEvent::StockReduced { .. }) => "storefront.product.stock_reduced",
            Self::Product(ProductEvent::StockIncreased { .. }) => "storefront.product.stock_increased",
            Self::Order(OrderEvent::Placed { .. }) => "storefront.order.placed",
            Self::Order(OrderEvent::Paid { .. }) => "storefront.order.paid",
            Self::Order(OrderEvent::StatusChanged { .. }) => "storefront.order.status_changed",
        }
    }
}
