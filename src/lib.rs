//! Storefront backend
//!
//! Cart, checkout, orders and simulated payment for a small shop.
//!
//! ## Features
//! - Product catalog with per-product stock
//! - Per-user shopping cart priced at live catalog prices
//! - Atomic checkout: cart becomes an order, stock is reserved, cart is cleared
//! - Order status lifecycle with a configurable transition policy
//! - Simulated payment capture
//!
//! State lives behind the [`store::Store`] unit-of-work abstraction, backed by
//! Postgres in production and an in-process store in tests.

use thiserror::Error;
use uuid::Uuid;

pub mod config;
pub mod domain;
pub mod http;
pub mod publisher;
pub mod service;
pub mod store;

pub use domain::aggregates::{Cart, Order, OrderLine, OrderStatus, PaymentDetails, Product, TransitionPolicy};
pub use domain::value_objects::{Money, Quantity};
pub use service::Storefront;

use domain::aggregates::{CartError, OrderError, ProductError, UnknownStatus};
use domain::value_objects::{MoneyError, QuantityError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("Cart not found")]
    CartNotFound,

    #[error("Cart item not found")]
    CartLineNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for product: {product_name}")]
    InsufficientStock {
        product_id: Uuid,
        product_name: String,
        available: u32,
        requested: u32,
    },

    #[error("Order has already been paid")]
    AlreadyPaid { status: OrderStatus },

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Transaction failed: {0}")]
    TransactionFailure(String),
}

pub type Result<T> = std::result::Result<T, CommerceError>;

impl CommerceError {
    pub(crate) fn insufficient_stock(product: &Product, requested: Quantity) -> Self {
        Self::InsufficientStock {
            product_id: product.id(),
            product_name: product.name().to_string(),
            available: product.stock(),
            requested: requested.value(),
        }
    }

    /// Lifts a product rule violation, naming the product it concerns.
    pub(crate) fn from_product(product: &Product, err: ProductError) -> Self {
        match err {
            ProductError::InsufficientStock { available, requested } => Self::InsufficientStock {
                product_id: product.id(),
                product_name: product.name().to_string(),
                available,
                requested,
            },
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<CartError> for CommerceError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::LineNotFound => Self::CartLineNotFound,
            CartError::ProductMissing(id) => Self::ProductNotFound(id),
            CartError::QuantityOverflow | CartError::Amount(_) => Self::Validation(err.to_string()),
        }
    }
}

impl From<OrderError> for CommerceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NoItems => Self::EmptyCart,
            OrderError::Amount(_) => Self::Validation(err.to_string()),
            OrderError::AlreadyPaid { status } => Self::AlreadyPaid { status },
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
        }
    }
}

impl From<QuantityError> for CommerceError {
    fn from(_: QuantityError) -> Self { Self::InvalidQuantity }
}

impl From<MoneyError> for CommerceError {
    fn from(err: MoneyError) -> Self { Self::Validation(err.to_string()) }
}

impl From<UnknownStatus> for CommerceError {
    fn from(err: UnknownStatus) -> Self { Self::InvalidStatus(err.0) }
}

impl From<sqlx::Error> for CommerceError {
    fn from(err: sqlx::Error) -> Self { Self::TransactionFailure(err.to_string()) }
}
