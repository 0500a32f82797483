//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Product, ProductError};
pub use order::{Order, OrderError, OrderLine, OrderStatus, PaymentDetails, TransitionPolicy, UnknownStatus};
pub use cart::{Cart, CartDetails, CartError, CartLine, LineUpdate, PricedCartLine};
