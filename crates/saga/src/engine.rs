//! Reconciliation of gateway and provider signals into order state.
//!
//! Every operation here is one locked unit of work on one order: lock, expire
//! an overdue payment, evaluate the signal against the current status tuple,
//! commit. Signals whose effect is already present are no-ops, and signals
//! against a terminal record are discarded.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{
    OrderAggregate, OrderNumber, OrderStatus, PaymentStatus, TransactionCode, TransactionStatus,
};
use order_store::{OrderStore, OrderTx};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::services::{
    FulfillmentProvider, GatewayNotification, GatewayStatus, GatewayStatusReport,
    PaymentGateway, PlaceOrderRequest, ProviderStatus, ProviderStatusReport,
};
use crate::state::SagaState;

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The signal changed the order.
    Applied,
    /// The signal's effect was already present.
    AlreadySatisfied,
    /// The signal arrived after the record it targets became terminal.
    Discarded,
    /// The payment was overdue and expired before the signal was looked at.
    Expired,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::AlreadySatisfied => "already_satisfied",
            Outcome::Discarded => "discarded",
            Outcome::Expired => "expired",
        }
    }

    fn changed(&self) -> bool {
        matches!(self, Outcome::Applied | Outcome::Expired)
    }
}

/// Result of a reconciliation: the outcome and the order as committed.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciled {
    pub outcome: Outcome,
    pub order: OrderAggregate,
}

impl Reconciled {
    pub fn state(&self) -> Result<SagaState> {
        SagaState::of(&self.order)
    }
}

fn payment_target(status: GatewayStatus) -> PaymentStatus {
    match status {
        GatewayStatus::Success => PaymentStatus::Success,
        GatewayStatus::Pending => PaymentStatus::Pending,
        GatewayStatus::Failed => PaymentStatus::Failed,
        GatewayStatus::Expired => PaymentStatus::Expired,
    }
}

fn transaction_target(status: ProviderStatus) -> TransactionStatus {
    match status {
        ProviderStatus::Success => TransactionStatus::Success,
        ProviderStatus::Processing => TransactionStatus::Processing,
        ProviderStatus::Pending => TransactionStatus::Pending,
        ProviderStatus::Failed | ProviderStatus::Error => TransactionStatus::Failed,
    }
}

/// Drives orders from payment to delivery.
pub struct ReconciliationEngine<S, G, P> {
    store: S,
    gateway: G,
    provider: P,
    clock: Arc<dyn Clock>,
    config: SagaConfig,
}

impl<S, G, P> ReconciliationEngine<S, G, P>
where
    S: OrderStore,
    G: PaymentGateway,
    P: FulfillmentProvider,
{
    pub fn new(store: S, gateway: G, provider: P, clock: Arc<dyn Clock>, config: SagaConfig) -> Self {
        Self {
            store,
            gateway,
            provider,
            clock,
            config,
        }
    }

    async fn load(&self, order_id: OrderId) -> Result<OrderAggregate> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_id.to_string()))
    }

    /// Resolves an order by its order number.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, number: &OrderNumber) -> Result<OrderAggregate> {
        self.store
            .find_by_order_number(number)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(number.to_string()))
    }

    /// Locks an order and expires its payment if overdue. Returns the handle,
    /// the instant used, and whether expiry fired.
    async fn begin(&self, order_id: OrderId) -> Result<(S::Tx, DateTime<Utc>, bool)> {
        let mut tx = self.store.lock_order(order_id).await?;
        let now = self.clock.now();
        let expired = tx.aggregate_mut().expire_if_overdue(now)?;
        if expired {
            tracing::info!(
                order_number = %tx.aggregate().order_number(),
                "payment expired, order failed"
            );
        }
        Ok((tx, now, expired))
    }

    /// Commits when the outcome changed anything, otherwise releases the lock.
    async fn finish(&self, event: &'static str, outcome: Outcome, tx: S::Tx) -> Result<Reconciled> {
        let order = if outcome.changed() {
            tx.aggregate().check_invariants()?;
            tx.commit().await?
        } else {
            tx.aggregate().clone()
        };
        metrics::counter!(
            "reconciliation_events_total",
            "event" => event,
            "outcome" => outcome.as_str()
        )
        .increment(1);
        Ok(Reconciled { outcome, order })
    }

    fn discard(event: &'static str, order: &OrderAggregate, detail: &str) -> Outcome {
        tracing::warn!(
            event,
            order_number = %order.order_number(),
            order_status = %order.status(),
            detail,
            "late signal discarded"
        );
        Outcome::Discarded
    }

    /// Expires the payment if it is overdue.
    #[tracing::instrument(skip(self))]
    pub async fn check_expiry(&self, order_id: OrderId) -> Result<Reconciled> {
        let (tx, _, expired) = self.begin(order_id).await?;
        let outcome = if expired {
            Outcome::Expired
        } else {
            Outcome::AlreadySatisfied
        };
        self.finish("expiry_check", outcome, tx).await
    }

    /// Applies a normalized gateway status to the order's payment.
    #[tracing::instrument(skip(self, report), fields(status = %report.status))]
    pub async fn apply_gateway_status(
        &self,
        order_id: OrderId,
        report: &GatewayStatusReport,
    ) -> Result<Reconciled> {
        const EVENT: &str = "gateway_status";
        let (mut tx, now, expired) = self.begin(order_id).await?;
        if expired {
            return self.finish(EVENT, Outcome::Expired, tx).await;
        }

        let target = payment_target(report.status);
        let order = tx.aggregate();
        let Some(current) = order.payment_status() else {
            if order.status().is_terminal() {
                let outcome = Self::discard(EVENT, order, "order has no payment");
                return self.finish(EVENT, outcome, tx).await;
            }
            return Err(SagaError::OrderNotReady(format!(
                "order {} has no payment",
                order.order_number()
            )));
        };

        let outcome = if current == target {
            Outcome::AlreadySatisfied
        } else if current.is_terminal() || order.status().is_terminal() {
            Self::discard(EVENT, order, target.as_str())
        } else {
            let working = tx.aggregate_mut();
            working.settle_payment(
                target,
                report.transaction_id.clone(),
                Some(report.raw.clone()),
                now,
            )?;
            if matches!(target, PaymentStatus::Failed | PaymentStatus::Expired) {
                working.transition_order(OrderStatus::Failed, now)?;
                if working.transaction().is_some() {
                    working.fail_transaction(format!("payment {}", target.as_str().to_lowercase()), now)?;
                }
            }
            tracing::info!(
                order_number = %working.order_number(),
                from = %current,
                to = %target,
                "payment status updated"
            );
            Outcome::Applied
        };
        self.finish(EVENT, outcome, tx).await
    }

    /// Polls the gateway for a PENDING payment and applies the answer.
    #[tracing::instrument(skip(self))]
    pub async fn poll_gateway(&self, order_id: OrderId) -> Result<Reconciled> {
        let order = self.load(order_id).await?;
        if order.payment_status() != Some(PaymentStatus::Pending) {
            return Ok(Reconciled {
                outcome: Outcome::AlreadySatisfied,
                order,
            });
        }
        let report = self
            .gateway
            .fetch_status(order.order_number().as_str())
            .await?;
        self.apply_gateway_status(order_id, &report).await
    }

    /// Verifies and applies an inbound gateway notification.
    #[tracing::instrument(skip(self, notification), fields(order_number = %notification.order_id))]
    pub async fn handle_gateway_notification(
        &self,
        notification: &GatewayNotification,
    ) -> Result<Reconciled> {
        self.gateway.verify_notification(notification)?;
        let report = notification.to_report()?;

        let order = self.resolve(&OrderNumber::new(&notification.order_id)).await?;
        if let (Some(payment), Some(actual)) = (order.payment(), report.gross_amount)
            && payment.amount != actual
        {
            tracing::warn!(expected = %payment.amount, %actual, "notification amount mismatch");
            return Err(SagaError::AmountMismatch {
                expected: payment.amount,
                actual,
            });
        }

        self.apply_gateway_status(order.id(), &report).await
    }

    /// Hands a paid order to the fulfillment provider.
    ///
    /// Holds the order lock across the provider call, so the provider is
    /// asked at most once per order. A transient provider failure rolls the
    /// unit of work back and is returned; a rejection fails the order.
    #[tracing::instrument(skip(self))]
    pub async fn process_order(&self, order_id: OrderId) -> Result<Reconciled> {
        const EVENT: &str = "process_order";
        let (mut tx, now, expired) = self.begin(order_id).await?;
        if expired {
            return self.finish(EVENT, Outcome::Expired, tx).await;
        }

        let order = tx.aggregate();
        if order.provider_ref().is_some() {
            return self.finish(EVENT, Outcome::AlreadySatisfied, tx).await;
        }
        if !order.status().can_process() {
            let outcome = Self::discard(EVENT, order, "order is terminal");
            return self.finish(EVENT, outcome, tx).await;
        }
        if order.payment_status() != Some(PaymentStatus::Success) {
            return Err(SagaError::OrderNotReady(format!(
                "order {} is not paid",
                order.order_number()
            )));
        }

        let working = tx.aggregate_mut();
        if working.transaction().is_none() {
            let code = {
                let mut rng = rand::thread_rng();
                TransactionCode::generate(now, &mut rng)
            };
            working.attach_transaction(TransactionStatus::Pending, code, now)?;
        }
        working.transition_order(OrderStatus::Processing, now)?;
        let request = place_request(working)?;

        match self.provider.place_order(&request).await {
            Ok(placed) => {
                metrics::counter!("provider_orders_placed_total").increment(1);
                let working = tx.aggregate_mut();
                working.record_provider_order(&placed.provider_ref, placed.raw, now)?;
                tracing::info!(
                    order_number = %working.order_number(),
                    provider_ref = %placed.provider_ref,
                    status = %placed.status,
                    "provider order placed"
                );
                apply_delivery(working, placed.status, placed.message, now)?;
                self.finish(EVENT, Outcome::Applied, tx).await
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "provider unavailable, placement rolled back");
                Err(e.into())
            }
            Err(e) => {
                metrics::counter!("provider_order_failures_total").increment(1);
                tracing::error!(error = %e, "provider rejected order");
                fail_fulfillment(tx.aggregate_mut(), &e.to_string(), now)?;
                self.finish(EVENT, Outcome::Applied, tx).await
            }
        }
    }

    /// [`Self::process_order`] with backoff on transient adapter failures.
    ///
    /// Once attempts run out the order takes the failure path.
    #[tracing::instrument(skip(self))]
    pub async fn process_order_with_retry(&self, order_id: OrderId) -> Result<Reconciled> {
        let policy = self.config.retry;
        let result = (|| self.process_order(order_id))
            .retry(policy.backoff())
            .when(SagaError::is_transient_upstream)
            .notify(|e: &SagaError, delay: Duration| {
                tracing::warn!(?delay, error = %e, "retrying fulfillment");
            })
            .await;

        match result {
            Err(e) if e.is_transient_upstream() => {
                self.escalate(order_id, policy.max_attempts, &e).await
            }
            other => other,
        }
    }

    async fn escalate(&self, order_id: OrderId, attempts: u32, cause: &SagaError) -> Result<Reconciled> {
        const EVENT: &str = "fulfillment_escalation";
        let (mut tx, now, expired) = self.begin(order_id).await?;
        if expired {
            return self.finish(EVENT, Outcome::Expired, tx).await;
        }
        let order = tx.aggregate();
        if order.provider_ref().is_some() || order.status().is_terminal() {
            return self.finish(EVENT, Outcome::AlreadySatisfied, tx).await;
        }

        metrics::counter!("provider_order_failures_total").increment(1);
        tracing::error!(
            order_number = %order.order_number(),
            attempts,
            error = %cause,
            "fulfillment retries exhausted"
        );
        let reason = format!("provider unavailable after {attempts} attempts: {cause}");
        fail_fulfillment(tx.aggregate_mut(), &reason, now)?;
        self.finish(EVENT, Outcome::Applied, tx).await
    }

    /// Polls the provider for a placed order and applies the answer.
    #[tracing::instrument(skip(self))]
    pub async fn poll_provider(&self, order_id: OrderId) -> Result<Reconciled> {
        let order = self.load(order_id).await?;
        let Some(provider_ref) = order.provider_ref().map(str::to_string) else {
            return Err(SagaError::OrderNotReady(format!(
                "order {} has not been placed with the provider",
                order.order_number()
            )));
        };
        if order
            .transaction_status()
            .is_some_and(|status| status.is_terminal())
        {
            return Ok(Reconciled {
                outcome: Outcome::AlreadySatisfied,
                order,
            });
        }

        let report = self.provider.poll_status(&provider_ref).await?;
        self.apply_provider_status(order_id, &report).await
    }

    /// Applies a provider status to the order's transaction.
    #[tracing::instrument(skip(self, report), fields(status = %report.status))]
    pub async fn apply_provider_status(
        &self,
        order_id: OrderId,
        report: &ProviderStatusReport,
    ) -> Result<Reconciled> {
        const EVENT: &str = "provider_status";
        let (mut tx, now, expired) = self.begin(order_id).await?;
        if expired {
            return self.finish(EVENT, Outcome::Expired, tx).await;
        }

        let order = tx.aggregate();
        let Some(current) = order.transaction_status() else {
            return Err(SagaError::OrderNotReady(format!(
                "order {} has no transaction",
                order.order_number()
            )));
        };
        if order.provider_ref().is_none() {
            return Err(SagaError::OrderNotReady(format!(
                "order {} has not been placed with the provider",
                order.order_number()
            )));
        }
        let target = transaction_target(report.status);

        let outcome = if current == target {
            Outcome::AlreadySatisfied
        } else if current.is_terminal() || order.status().is_terminal() {
            Self::discard(EVENT, order, report.status.as_str())
        } else {
            let working = tx.aggregate_mut();
            working.record_provider_response(report.raw.clone(), now);
            apply_delivery(working, report.status, report.message.clone(), now)?;
            Outcome::Applied
        };
        self.finish(EVENT, outcome, tx).await
    }

    /// Cancels an order on an operator's request.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<Reconciled> {
        const EVENT: &str = "cancel";
        let (mut tx, now, expired) = self.begin(order_id).await?;
        if expired {
            return self.finish(EVENT, Outcome::Expired, tx).await;
        }
        if tx.aggregate().status() == OrderStatus::Cancelled {
            return self.finish(EVENT, Outcome::AlreadySatisfied, tx).await;
        }

        let working = tx.aggregate_mut();
        working.transition_order(OrderStatus::Cancelled, now)?;
        if working.transaction().is_some() {
            working.fail_transaction(format!("cancelled: {reason}"), now)?;
        }
        tracing::info!(order_number = %working.order_number(), reason, "order cancelled");
        self.finish(EVENT, Outcome::Applied, tx).await
    }

    /// One convergence pass driven by a client poll: expiry, then a gateway
    /// poll while awaiting payment, then placement once paid, then a provider
    /// poll while fulfilling.
    ///
    /// Transient adapter failures stop the pass and leave the last committed
    /// state in place.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self, order_id: OrderId) -> Result<Reconciled> {
        let mut current = self.check_expiry(order_id).await?;
        let mut outcome = current.outcome;

        loop {
            let step = match SagaState::of(&current.order)? {
                SagaState::AwaitingPayment => self.poll_gateway(order_id).await,
                SagaState::Paid => self.process_order(order_id).await,
                SagaState::Fulfilling if current.order.provider_ref().is_none() => {
                    self.process_order(order_id).await
                }
                SagaState::Fulfilling => self.poll_provider(order_id).await,
                _ => break,
            };

            match step {
                Ok(next) => {
                    let progressed = next.outcome == Outcome::Applied;
                    if next.outcome.changed() {
                        outcome = next.outcome;
                    }
                    current = next;
                    if !progressed {
                        break;
                    }
                }
                Err(e) if e.is_transient_upstream() => {
                    tracing::warn!(error = %e, "refresh stopped on upstream failure");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Reconciled {
            outcome,
            order: current.order,
        })
    }
}

fn place_request(order: &OrderAggregate) -> Result<PlaceOrderRequest> {
    let transaction = order
        .transaction()
        .ok_or(domain::DomainError::MissingTransaction(order.id()))?;
    let provider_code = order.provider_code().ok_or_else(|| {
        SagaError::OrderNotReady(format!("order {} has no items", order.order_number()))
    })?;

    Ok(PlaceOrderRequest {
        reference: transaction.transaction_code.to_string(),
        provider_code: provider_code.to_string(),
        account: order.game_account()?,
    })
}

/// Mirrors a provider status onto the transaction and order.
fn apply_delivery(
    order: &mut OrderAggregate,
    status: ProviderStatus,
    message: Option<String>,
    now: DateTime<Utc>,
) -> Result<()> {
    match status {
        ProviderStatus::Success => {
            order.update_transaction(TransactionStatus::Success, now)?;
            order.transition_order(OrderStatus::Completed, now)?;
            if let Some(paid_at) = order.payment().and_then(|p| p.paid_at) {
                let elapsed = (now - paid_at).num_milliseconds().max(0) as f64 / 1000.0;
                metrics::histogram!("fulfillment_duration_seconds").record(elapsed);
            }
            tracing::info!(order_number = %order.order_number(), "order delivered");
        }
        ProviderStatus::Processing | ProviderStatus::Pending => {
            order.update_transaction(transaction_target(status), now)?;
        }
        ProviderStatus::Failed | ProviderStatus::Error => {
            metrics::counter!("provider_order_failures_total").increment(1);
            let reason = message.unwrap_or_else(|| format!("provider reported {status}"));
            tracing::error!(order_number = %order.order_number(), %reason, "delivery failed");
            fail_fulfillment(order, &reason, now)?;
        }
    }
    Ok(())
}

/// Failure path: order FAILED, one more retry counted, transaction FAILED.
fn fail_fulfillment(order: &mut OrderAggregate, reason: &str, now: DateTime<Utc>) -> Result<()> {
    order.transition_order(OrderStatus::Failed, now)?;
    order.increment_retry(now);
    order.fail_transaction(reason, now)?;
    Ok(())
}
