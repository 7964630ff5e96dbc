//! Order creation and the checkout flow.

use std::sync::Arc;

use common::OrderId;
use domain::{
    CheckoutProduct, CustomerIdentity, GameAccount, Money, NewOrder, NewPayment, OrderAggregate,
    OrderItem, OrderNumber, OrderStatus, Payment, PaymentChannel, ProductId, Transaction, TransactionCode,
    TransactionStatus,
};
use order_store::{CatalogStore, OrderStore, OrderTx};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::services::{
    CatalogService, CustomerDetails, GatewayToken, ItemDetail, PaymentGateway, TokenRequest,
    compute_admin_fee,
};

/// Attempts at drawing an unused order number before giving up.
const ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// Item id of the admin fee line sent to the gateway.
const ADMIN_FEE_ITEM: &str = "ADMIN_FEE";

/// A checkout submitted by a customer.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub customer: CustomerIdentity,
    pub game_account: GameAccount,
    pub payment_channel: PaymentChannel,
}

/// The payable order handed back to the customer.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order: OrderAggregate,
    pub token: String,
    pub redirect_url: Option<String>,
}

/// Creates orders and attaches their payment and fulfillment records.
pub struct OrderManager<S, C, G> {
    store: S,
    catalog: CatalogService<C>,
    gateway: G,
    clock: Arc<dyn Clock>,
    config: SagaConfig,
}

impl<S, C, G> OrderManager<S, C, G>
where
    S: OrderStore,
    C: CatalogStore,
    G: PaymentGateway,
{
    pub fn new(store: S, catalog: C, gateway: G, clock: Arc<dyn Clock>, config: SagaConfig) -> Self {
        Self {
            store,
            catalog: CatalogService::new(catalog),
            gateway,
            clock,
            config,
        }
    }

    /// Creates a PENDING order for a product.
    #[tracing::instrument(skip(self, customer, game_account))]
    pub async fn create_order(
        &self,
        product_id: &ProductId,
        quantity: u32,
        customer: CustomerIdentity,
        game_account: GameAccount,
        payment_channel: PaymentChannel,
    ) -> Result<OrderAggregate> {
        let product = self.catalog.product_for_checkout(product_id).await?;
        self.create_for_product(product, quantity, customer, game_account, payment_channel)
            .await
    }

    async fn create_for_product(
        &self,
        product: CheckoutProduct,
        quantity: u32,
        customer: CustomerIdentity,
        game_account: GameAccount,
        payment_channel: PaymentChannel,
    ) -> Result<OrderAggregate> {
        if quantity < 1 || quantity > OrderItem::MAX_QUANTITY {
            return Err(SagaError::InvalidQuantity(quantity));
        }
        let admin_fee = compute_admin_fee(payment_channel);

        for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
            let now = self.clock.now();
            let order_number = {
                let mut rng = rand::thread_rng();
                OrderNumber::generate(&self.config.order_number_prefix, now, &mut rng)
            };

            let taken = self
                .store
                .order_number_exists(&order_number)
                .await
                .map_err(|e| SagaError::OrderCreationFailed(e.to_string()))?;
            if taken {
                tracing::debug!(attempt, %order_number, "order number taken");
                continue;
            }

            let order = OrderAggregate::create(
                NewOrder {
                    order_number,
                    customer: customer.clone(),
                    game_account: game_account.clone(),
                    product: product.clone(),
                    quantity,
                    payment_channel,
                    admin_fee,
                },
                now,
            )?;

            match self.store.insert_order(&order).await {
                Ok(()) => {
                    tracing::info!(
                        order_id = %order.id(),
                        order_number = %order.order_number(),
                        total = %order.order().total_amount,
                        "order created"
                    );
                    return Ok(order);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(attempt, error = %e, "order number raced, retrying");
                }
                Err(e) => return Err(SagaError::OrderCreationFailed(e.to_string())),
            }
        }

        Err(SagaError::OrderCreationFailed(format!(
            "no free order number after {ORDER_NUMBER_ATTEMPTS} attempts"
        )))
    }

    /// Opens the payment for an order from a gateway token. Returns the
    /// existing payment unchanged if one is attached.
    #[tracing::instrument(skip(self, token))]
    pub async fn attach_payment(&self, order_id: OrderId, token: &GatewayToken) -> Result<Payment> {
        let mut tx = self.store.lock_order(order_id).await?;
        let payment = tx
            .aggregate_mut()
            .attach_payment(self.new_payment(token), self.clock.now())
            .clone();
        tx.commit().await?;
        Ok(payment)
    }

    /// Opens the fulfillment transaction. Returns the existing one if present.
    #[tracing::instrument(skip(self))]
    pub async fn attach_transaction(
        &self,
        order_id: OrderId,
        initial: TransactionStatus,
    ) -> Result<Transaction> {
        let mut tx = self.store.lock_order(order_id).await?;
        let now = self.clock.now();
        let code = {
            let mut rng = rand::thread_rng();
            TransactionCode::generate(now, &mut rng)
        };
        let transaction = tx
            .aggregate_mut()
            .attach_transaction(initial, code, now)?
            .clone();
        tx.commit().await?;
        Ok(transaction)
    }

    /// Moves an order to `status`. Re-applying the current status is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn mark_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderAggregate> {
        let mut tx = self.store.lock_order(order_id).await?;
        if !tx.aggregate_mut().transition_order(status, self.clock.now())? {
            return Ok(tx.aggregate().clone());
        }
        Ok(tx.commit().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn increment_retry(&self, order_id: OrderId) -> Result<OrderAggregate> {
        let mut tx = self.store.lock_order(order_id).await?;
        tx.aggregate_mut().increment_retry(self.clock.now());
        Ok(tx.commit().await?)
    }

    /// Runs a submitted checkout: creates the order, opens a checkout session
    /// with the gateway and attaches the payment and a PENDING transaction.
    ///
    /// If the gateway refuses the session the order is marked FAILED and the
    /// gateway error is returned.
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        metrics::counter!("checkout_total").increment(1);

        let result = self.run_checkout(request).await;
        if let Err(e) = &result {
            metrics::counter!("checkout_failed_total").increment(1);
            tracing::warn!(error = %e, "checkout failed");
        }
        result
    }

    async fn run_checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        let product = self
            .catalog
            .product_for_checkout(&request.product_id)
            .await?;
        let order = self
            .create_for_product(
                product.clone(),
                request.quantity,
                request.customer,
                request.game_account,
                request.payment_channel,
            )
            .await?;

        let token_request = token_request(&order, &product);
        let token = match self.gateway.issue_payment_token(&token_request).await {
            Ok(token) => token,
            Err(e) => {
                self.fail_unpayable(order.id()).await?;
                return Err(e.into());
            }
        };

        let mut tx = self.store.lock_order(order.id()).await?;
        let now = self.clock.now();
        let code = {
            let mut rng = rand::thread_rng();
            TransactionCode::generate(now, &mut rng)
        };
        let working = tx.aggregate_mut();
        working.attach_payment(self.new_payment(&token), now);
        working.attach_transaction(TransactionStatus::Pending, code, now)?;
        let order = tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number(),
            gateway = self.gateway.name(),
            "checkout ready for payment"
        );
        Ok(CheckoutReceipt {
            order,
            token: token.token,
            redirect_url: token.redirect_url,
        })
    }

    async fn fail_unpayable(&self, order_id: OrderId) -> Result<()> {
        let mut tx = self.store.lock_order(order_id).await?;
        tx.aggregate_mut()
            .transition_order(OrderStatus::Failed, self.clock.now())?;
        tx.commit().await?;
        Ok(())
    }

    fn new_payment(&self, token: &GatewayToken) -> NewPayment {
        NewPayment {
            payment_provider: self.gateway.name().to_string(),
            transaction_id: None,
            payment_url: token.redirect_url.clone(),
            payment_code: token.payment_code.clone(),
            payment_data: token.raw.clone(),
            ttl: self.config.payment_ttl,
        }
    }

    /// Returns the last committed state of an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderAggregate> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_id.to_string()))
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_by_order_number(&self, number: &OrderNumber) -> Result<OrderAggregate> {
        self.store
            .find_by_order_number(number)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(number.to_string()))
    }
}

/// Builds the gateway request. The admin fee goes in as its own line so the
/// item lines add up to the gross amount.
fn token_request(order: &OrderAggregate, product: &CheckoutProduct) -> TokenRequest {
    let mut items: Vec<ItemDetail> = order
        .items()
        .iter()
        .map(|item| ItemDetail {
            id: item.product_id.to_string(),
            name: product.item_description(),
            price: item.price,
            quantity: item.quantity,
        })
        .collect();

    let admin_fee = order.order().admin_fee;
    if admin_fee > Money::zero() {
        items.push(ItemDetail {
            id: ADMIN_FEE_ITEM.to_string(),
            name: "Admin fee".to_string(),
            price: admin_fee,
            quantity: 1,
        });
    }

    let customer = &order.order().customer;
    TokenRequest {
        order_reference: order.order_number().to_string(),
        gross_amount: order.order().total_amount,
        items,
        customer: Some(CustomerDetails {
            name: customer.name().map(str::to_string),
            email: customer.email().map(str::to_string),
            phone: customer.phone().map(str::to_string),
        }),
        channel: order.order().payment_channel,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use domain::GameRef;
    use order_store::{InMemoryCatalogStore, InMemoryOrderStore};

    use super::*;
    use crate::clock::ManualClock;
    use crate::services::{GatewayError, InMemoryPaymentGateway};

    fn product() -> CheckoutProduct {
        CheckoutProduct {
            id: ProductId::new("ml-86"),
            name: "86 Diamonds".to_string(),
            price: Money::new(16000),
            discount_price: Some(Money::new(14000)),
            is_active: true,
            provider_code: "ML86".to_string(),
            game: GameRef {
                slug: "mobile-legends".to_string(),
                name: "Mobile Legends".to_string(),
                code: "mobilelegends".to_string(),
            },
        }
    }

    fn manager(
        gateway: InMemoryPaymentGateway,
    ) -> (
        OrderManager<InMemoryOrderStore, InMemoryCatalogStore, InMemoryPaymentGateway>,
        InMemoryOrderStore,
    ) {
        let store = InMemoryOrderStore::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let manager = OrderManager::new(
            store.clone(),
            InMemoryCatalogStore::with_products([product()]),
            gateway,
            Arc::new(clock),
            SagaConfig::default(),
        );
        (manager, store)
    }

    fn request(channel: PaymentChannel) -> CheckoutRequest {
        CheckoutRequest {
            product_id: ProductId::new("ml-86"),
            quantity: 1,
            customer: CustomerIdentity::Guest {
                email: "buyer@example.com".to_string(),
                name: Some("Buyer".to_string()),
                phone: None,
            },
            game_account: GameAccount::new("12345678", Some("2001".to_string())),
            payment_channel: channel,
        }
    }

    #[tokio::test]
    async fn test_checkout_opens_payment_and_transaction() {
        let gateway = InMemoryPaymentGateway::new();
        let (manager, _) = manager(gateway.clone());

        let receipt = manager.checkout(request(PaymentChannel::BcaVa)).await.unwrap();
        let order = &receipt.order;

        assert_eq!(order.order().total_amount, Money::new(18000));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), Some(domain::PaymentStatus::Pending));
        assert_eq!(order.transaction_status(), Some(TransactionStatus::Pending));
        assert!(order.order_number().as_str().starts_with("TU240501100000"));
        assert_eq!(receipt.token, format!("tok-{}", order.order_number()));

        let payment = order.payment().unwrap();
        assert_eq!(payment.payment_provider, "in-memory");
        assert_eq!(
            payment.expired_at,
            Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_token_request_lines_add_up_to_gross_amount() {
        let gateway = InMemoryPaymentGateway::new();
        let (manager, _) = manager(gateway.clone());

        manager.checkout(request(PaymentChannel::Gopay)).await.unwrap();

        let issued = gateway.issued_requests();
        assert_eq!(issued.len(), 1);
        let sent = &issued[0];
        let lines: Money = sent
            .items
            .iter()
            .map(|item| item.price.checked_mul(item.quantity).unwrap())
            .fold(Money::zero(), |acc, line| acc.checked_add(line).unwrap());
        assert_eq!(lines, sent.gross_amount);
        assert_eq!(sent.gross_amount, Money::new(16000));
        assert_eq!(sent.items[0].name, "Mobile Legends - 86 Diamonds");
        assert_eq!(sent.items[1].id, ADMIN_FEE_ITEM);
    }

    #[tokio::test]
    async fn test_gateway_failure_fails_the_order() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.fail_tokens(Some(GatewayError::Unavailable("down".to_string())));
        let (manager, store) = manager(gateway);

        let result = manager.checkout(request(PaymentChannel::Qris)).await;

        assert!(matches!(result, Err(SagaError::Gateway(_))));
        let orders = store.all_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status(), OrderStatus::Failed);
        assert!(orders[0].payment().is_none());
    }

    #[tokio::test]
    async fn test_validation_has_no_side_effects() {
        let (manager, store) = manager(InMemoryPaymentGateway::new());

        let mut zero = request(PaymentChannel::Any);
        zero.quantity = 0;
        assert!(matches!(
            manager.checkout(zero).await,
            Err(SagaError::InvalidQuantity(0))
        ));

        let mut huge = request(PaymentChannel::Any);
        huge.quantity = 3_000_000_000;
        assert!(matches!(
            manager.checkout(huge).await,
            Err(SagaError::InvalidQuantity(3_000_000_000))
        ));

        let mut unknown = request(PaymentChannel::Any);
        unknown.product_id = ProductId::new("missing");
        assert!(matches!(
            manager.checkout(unknown).await,
            Err(SagaError::ProductUnavailable(_))
        ));

        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_attach_is_idempotent() {
        let (manager, _) = manager(InMemoryPaymentGateway::new());
        let order = manager
            .create_order(
                &ProductId::new("ml-86"),
                2,
                request(PaymentChannel::Any).customer,
                GameAccount::new("12345678", None),
                PaymentChannel::Any,
            )
            .await
            .unwrap();
        assert_eq!(order.order().total_amount, Money::new(28000));

        let token = GatewayToken {
            token: "t".to_string(),
            redirect_url: None,
            payment_code: Some("8808123".to_string()),
            raw: serde_json::json!({"token": "t"}),
        };
        let first = manager.attach_payment(order.id(), &token).await.unwrap();
        let second = manager.attach_payment(order.id(), &token).await.unwrap();
        assert_eq!(first.id, second.id);

        let first = manager
            .attach_transaction(order.id(), TransactionStatus::Pending)
            .await
            .unwrap();
        let second = manager
            .attach_transaction(order.id(), TransactionStatus::Pending)
            .await
            .unwrap();
        assert_eq!(first.transaction_code, second.transaction_code);
    }

    #[tokio::test]
    async fn test_mark_order_status_enforces_transitions() {
        let (manager, _) = manager(InMemoryPaymentGateway::new());
        let receipt = manager.checkout(request(PaymentChannel::Any)).await.unwrap();
        let id = receipt.order.id();

        let cancelled = manager
            .mark_order_status(id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);

        let again = manager
            .mark_order_status(id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(again.status(), OrderStatus::Cancelled);

        let result = manager.mark_order_status(id, OrderStatus::Processing).await;
        assert!(matches!(
            result,
            Err(SagaError::Domain(domain::DomainError::InvalidStateTransition { .. }))
        ));

        let bumped = manager.increment_retry(id).await.unwrap();
        assert_eq!(bumped.order().retry_count, 1);
    }
}
