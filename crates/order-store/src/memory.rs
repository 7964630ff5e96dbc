use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{CheckoutProduct, OrderAggregate, OrderNumber, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Result, StoreError,
    store::{CatalogStore, OrderStore, OrderTx},
};

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, OrderAggregate>,
    by_number: HashMap<OrderNumber, OrderId>,
    locks: HashMap<OrderId, Arc<Mutex<()>>>,
}

/// In-memory order store implementation for testing and local runs.
///
/// Provides the same locking semantics as the PostgreSQL implementation:
/// one [`InMemoryOrderTx`] per order at a time, changes applied on commit.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns every stored order, oldest first.
    pub async fn all_orders(&self) -> Vec<OrderAggregate> {
        let mut orders: Vec<_> = self.tables.read().await.orders.values().cloned().collect();
        orders.sort_by_key(|order| order.order().created_at);
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    type Tx = InMemoryOrderTx;

    async fn insert_order(&self, order: &OrderAggregate) -> Result<()> {
        let mut tables = self.tables.write().await;
        let number = order.order_number().clone();
        if tables.by_number.contains_key(&number) {
            return Err(StoreError::Conflict(format!(
                "order number {number} already exists"
            )));
        }
        if tables.orders.contains_key(&order.id()) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.id()
            )));
        }

        tables.by_number.insert(number, order.id());
        tables.locks.insert(order.id(), Arc::new(Mutex::new(())));
        tables.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderAggregate>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn find_by_order_number(&self, number: &OrderNumber) -> Result<Option<OrderAggregate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_number
            .get(number)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn order_number_exists(&self, number: &OrderNumber) -> Result<bool> {
        Ok(self.tables.read().await.by_number.contains_key(number))
    }

    async fn lock_order(&self, id: OrderId) -> Result<InMemoryOrderTx> {
        let lock = {
            let tables = self.tables.read().await;
            tables
                .locks
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound(id))?
        };

        // Wait for the order without holding the table lock.
        let guard = lock.lock_owned().await;

        let working = self
            .tables
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;

        Ok(InMemoryOrderTx {
            tables: self.tables.clone(),
            working,
            _guard: guard,
        })
    }
}

/// Exclusive handle on one order in an [`InMemoryOrderStore`].
pub struct InMemoryOrderTx {
    tables: Arc<RwLock<Tables>>,
    working: OrderAggregate,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl OrderTx for InMemoryOrderTx {
    fn aggregate(&self) -> &OrderAggregate {
        &self.working
    }

    fn aggregate_mut(&mut self) -> &mut OrderAggregate {
        &mut self.working
    }

    async fn commit(self) -> Result<OrderAggregate> {
        let mut tables = self.tables.write().await;
        tables.orders.insert(self.working.id(), self.working.clone());
        Ok(self.working)
    }
}

/// In-memory catalog for testing and local runs.
#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    products: Arc<RwLock<HashMap<ProductId, CheckoutProduct>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding the given products.
    pub fn with_products(products: impl IntoIterator<Item = CheckoutProduct>) -> Self {
        let map = products.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            products: Arc::new(RwLock::new(map)),
        }
    }

    /// Adds or replaces a product.
    pub async fn upsert(&self, product: CheckoutProduct) {
        self.products.write().await.insert(product.id.clone(), product);
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get_product_for_checkout(&self, id: &ProductId) -> Result<Option<CheckoutProduct>> {
        Ok(self.products.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use domain::{
        CustomerIdentity, GameAccount, GameRef, Money, NewOrder, OrderStatus, PaymentChannel,
        PaymentStatus,
    };

    use super::*;

    fn product() -> CheckoutProduct {
        CheckoutProduct {
            id: ProductId::new("ml-86"),
            name: "86 Diamonds".to_string(),
            price: Money::new(20000),
            discount_price: None,
            is_active: true,
            provider_code: "ML86".to_string(),
            game: GameRef {
                slug: "mobile-legends".to_string(),
                name: "Mobile Legends".to_string(),
                code: "mobilelegends".to_string(),
            },
        }
    }

    fn create_test_order(number: &str) -> OrderAggregate {
        OrderAggregate::create(
            NewOrder {
                order_number: OrderNumber::new(number),
                customer: CustomerIdentity::Guest {
                    email: "a@b.c".to_string(),
                    name: None,
                    phone: None,
                },
                game_account: GameAccount::new("123", None),
                product: product(),
                quantity: 1,
                payment_channel: PaymentChannel::Qris,
                admin_fee: Money::zero(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let store = InMemoryOrderStore::new();
        let order = create_test_order("TU1");
        store.insert_order(&order).await.unwrap();

        assert_eq!(store.get_order(order.id()).await.unwrap(), Some(order.clone()));
        assert_eq!(
            store
                .find_by_order_number(&OrderNumber::new("TU1"))
                .await
                .unwrap(),
            Some(order)
        );
        assert!(
            store
                .order_number_exists(&OrderNumber::new("TU1"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn duplicate_order_number_conflicts() {
        let store = InMemoryOrderStore::new();
        store.insert_order(&create_test_order("TU1")).await.unwrap();

        let result = store.insert_order(&create_test_order("TU1")).await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn lock_missing_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let result = store.lock_order(OrderId::new()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn commit_publishes_changes() {
        let store = InMemoryOrderStore::new();
        let order = create_test_order("TU1");
        store.insert_order(&order).await.unwrap();

        let mut tx = store.lock_order(order.id()).await.unwrap();
        tx.aggregate_mut()
            .transition_order(OrderStatus::Cancelled, Utc::now())
            .unwrap();

        // Readers still see the committed state.
        let before = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(before.status(), OrderStatus::Pending);

        tx.commit().await.unwrap();
        let after = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(after.status(), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn drop_discards_changes() {
        let store = InMemoryOrderStore::new();
        let order = create_test_order("TU1");
        store.insert_order(&order).await.unwrap();

        {
            let mut tx = store.lock_order(order.id()).await.unwrap();
            tx.aggregate_mut().increment_retry(Utc::now());
        }

        let stored = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.order().retry_count, 0);
        assert_eq!(stored.payment_status(), None::<PaymentStatus>);
    }

    #[tokio::test]
    async fn second_lock_waits_for_first() {
        let store = InMemoryOrderStore::new();
        let order = create_test_order("TU1");
        store.insert_order(&order).await.unwrap();

        let mut first = store.lock_order(order.id()).await.unwrap();

        let contender = {
            let store = store.clone();
            let id = order.id();
            tokio::spawn(async move {
                let tx = store.lock_order(id).await.unwrap();
                tx.aggregate().order().retry_count
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        first.aggregate_mut().increment_retry(Utc::now());
        first.commit().await.unwrap();

        // The waiting handle sees the committed change.
        assert_eq!(contender.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn catalog_lookup() {
        let catalog = InMemoryCatalogStore::with_products([product()]);

        let found = catalog
            .get_product_for_checkout(&ProductId::new("ml-86"))
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.provider_code), Some("ML86".to_string()));

        let missing = catalog
            .get_product_for_checkout(&ProductId::new("nope"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
