use async_trait::async_trait;
use common::OrderId;
use domain::{CheckoutProduct, OrderAggregate, OrderNumber, ProductId};

use crate::Result;

/// Core trait for order persistence.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Exclusive handle on one order, see [`OrderTx`].
    type Tx: OrderTx;

    /// Persists a new aggregate with all of its records atomically.
    ///
    /// Fails with `Conflict` if the order number is already taken.
    async fn insert_order(&self, order: &OrderAggregate) -> Result<()>;

    /// Reads the last committed state of an order.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderAggregate>>;

    /// Reads the last committed state of an order by its order number.
    async fn find_by_order_number(&self, number: &OrderNumber) -> Result<Option<OrderAggregate>>;

    /// Checks whether an order number is already in use.
    async fn order_number_exists(&self, number: &OrderNumber) -> Result<bool>;

    /// Locks an order for a read-modify-write.
    ///
    /// Waits while another handle holds the same order. Fails with `NotFound`
    /// if the order does not exist.
    async fn lock_order(&self, id: OrderId) -> Result<Self::Tx>;
}

/// An exclusive unit of work on one order.
///
/// Changes made through [`OrderTx::aggregate_mut`] become visible only on
/// [`OrderTx::commit`]. Dropping the handle discards them.
#[async_trait]
pub trait OrderTx: Send {
    /// The working copy as loaded under the lock, plus local changes.
    fn aggregate(&self) -> &OrderAggregate;

    fn aggregate_mut(&mut self) -> &mut OrderAggregate;

    /// Writes the working copy and releases the lock.
    async fn commit(self) -> Result<OrderAggregate>;
}

/// Read access to the product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Resolves a product with its game for checkout.
    ///
    /// Returns inactive products too; callers decide whether to sell them.
    async fn get_product_for_checkout(&self, id: &ProductId) -> Result<Option<CheckoutProduct>>;
}
