//! Order Aggregate
//!
//! An order is frozen at checkout: lines carry the unit price paid, and only
//! the status moves afterwards. Which status moves are legal is decided by a
//! [`TransitionPolicy`].

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::{Money, MoneyError, Quantity};
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    id: Uuid,
    user_id: Uuid,
    status: OrderStatus,
    total_amount: Money,
    items: Vec<OrderLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Frozen copy of a cart line. `price` is the unit price at purchase time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    id: Uuid,
    product_id: Uuid,
    quantity: Quantity,
    price: Money,
}

impl OrderLine {
    pub fn snapshot(product: &Product, quantity: Quantity) -> Self {
        Self { id: Uuid::now_v7(), product_id: product.id(), quantity, price: product.price() }
    }
    pub(crate) fn restore(id: Uuid, product_id: Uuid, quantity: Quantity, price: Money) -> Self { Self { id, product_id, quantity, price } }
    pub fn id(&self) -> Uuid { self.id }
    pub fn product_id(&self) -> Uuid { self.product_id }
    pub fn quantity(&self) -> Quantity { self.quantity }
    pub fn price(&self) -> Money { self.price }
    pub fn subtotal(&self) -> Result<Money, MoneyError> { self.price.checked_mul(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Paid, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [Self::Pending, Self::Paid, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Payment has been captured and not reversed.
    pub fn is_paid(&self) -> bool { matches!(self, Self::Paid | Self::Processing | Self::Shipped | Self::Delivered) }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// The status after this one on the fulfilment path, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            Self::Pending => Some(Self::Paid),
            Self::Paid => Some(Self::Processing),
            Self::Processing => Some(Self::Shipped),
            Self::Shipped => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownStatus(pub String);
impl std::error::Error for UnknownStatus {}
impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Unknown order status '{}'", self.0) }
}

/// Which status changes an order accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// `pending -> paid -> processing -> shipped -> delivered`, plus
    /// `cancelled` from any non-terminal status.
    #[default]
    Lifecycle,
    /// Any status may be set from any status.
    Unrestricted,
}

impl TransitionPolicy {
    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Lifecycle => {
                !from.is_terminal() && (from.next() == Some(to) || to == OrderStatus::Cancelled)
            }
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lifecycle" => Ok(Self::Lifecycle),
            "unrestricted" => Ok(Self::Unrestricted),
            other => Err(format!("unknown transition policy '{other}'")),
        }
    }
}

/// Confirmation of a simulated capture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentDetails {
    pub order_id: Uuid,
    pub amount_paid: Money,
    pub payment_method: String,
    pub paid_at: DateTime<Utc>,
}

impl Order {
    pub fn place(user_id: Uuid, items: Vec<OrderLine>) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let id = Uuid::now_v7();
        let now = Utc::now();
        let subtotals = items.iter().map(OrderLine::subtotal).collect::<Result<Vec<_>, _>>().map_err(OrderError::Amount)?;
        let total_amount = Money::try_sum(subtotals).map_err(OrderError::Amount)?;
        let mut order = Self {
            id, user_id, status: OrderStatus::Pending, total_amount, items,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: id, user_id, total: total_amount.amount(), lines: order.items.len(),
        }));
        Ok(order)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: Uuid, user_id: Uuid, status: OrderStatus, total_amount: Money, items: Vec<OrderLine>,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, user_id, status, total_amount, items, created_at, updated_at, events: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn total_amount(&self) -> Money { self.total_amount }
    pub fn items(&self) -> &[OrderLine] { &self.items }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_paid(&self) -> bool { self.status.is_paid() }

    pub fn update_status(&mut self, to: OrderStatus, policy: TransitionPolicy) -> Result<(), OrderError> {
        let from = self.status;
        if !policy.allows(from, to) { return Err(OrderError::InvalidTransition { from, to }); }
        if from == to { return Ok(()); }
        self.status = to;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to }));
        Ok(())
    }

    /// Simulated capture: moves the order to `paid` and returns the receipt.
    pub fn capture_payment(&mut self, policy: TransitionPolicy) -> Result<PaymentDetails, OrderError> {
        if self.is_paid() { return Err(OrderError::AlreadyPaid { status: self.status }); }
        self.update_status(OrderStatus::Paid, policy)?;
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id, amount: self.total_amount.amount() }));
        Ok(PaymentDetails {
            order_id: self.id,
            amount_paid: self.total_amount,
            payment_method: "simulated".to_string(),
            paid_at: self.updated_at,
        })
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { NoItems, Amount(MoneyError), AlreadyPaid { status: OrderStatus }, InvalidTransition { from: OrderStatus, to: OrderStatus } }
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::Amount(e) => write!(f, "Order total: {e}"),
            Self::AlreadyPaid { status } => write!(f, "Order has already been paid (status: {status})"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {from} to {to}"),
        }
    }
}
