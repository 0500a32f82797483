//! Storefront service: the operations the HTTP layer invokes.
//!
//! Every operation opens one store transaction and commits it only once all
//! of its steps succeed. Any `?` before the commit drops the transaction and
//! with it every write made so far. Domain events raised along the way are
//! published after the commit, never before.

use std::fmt;
use std::sync::Arc;
use crate::domain::aggregates::TransitionPolicy;
use crate::domain::events::DomainEvent;
use crate::publisher::EventPublisher;
use crate::store::{Store, Transaction};
use crate::Result;

mod cart;
mod catalog;
mod checkout;
mod orders;

pub use catalog::{NewProduct, ProductChanges};

#[derive(Clone)]
pub struct Storefront {
    store: Arc<dyn Store>,
    policy: TransitionPolicy,
    publisher: EventPublisher,
}

impl fmt::Debug for Storefront {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storefront")
            .field("policy", &self.policy)
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl Storefront {
    pub fn new(store: Arc<dyn Store>, policy: TransitionPolicy) -> Self {
        Self { store, policy, publisher: EventPublisher::disabled() }
    }

    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn policy(&self) -> TransitionPolicy { self.policy }

    async fn begin(&self) -> Result<Box<dyn Transaction>> { self.store.begin().await }

    async fn commit(&self, tx: Box<dyn Transaction>, events: Vec<DomainEvent>) -> Result<()> {
        tx.commit().await?;
        self.publisher.publish(events).await;
        Ok(())
    }
}
