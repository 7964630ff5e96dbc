//! The order aggregate: an order with its lines, payment and transaction.
//!
//! Every status field is written through the methods here. Callers load an
//! aggregate under a per-order lock, mutate it, and persist it as one unit.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId, PaymentId, TransactionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    CheckoutProduct, CustomerIdentity, DomainError, GameAccount, Money, NewPayment, Order,
    OrderItem, OrderNumber, OrderStatus, Payment, PaymentChannel, PaymentStatus, Transaction,
    TransactionCode, TransactionKind, TransactionStatus,
};

/// Input for creating an order at checkout.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub customer: CustomerIdentity,
    pub game_account: GameAccount,
    pub product: CheckoutProduct,
    pub quantity: u32,
    pub payment_channel: PaymentChannel,
    pub admin_fee: Money,
}

/// Order root plus the records it exclusively owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
    order: Order,
    items: Vec<OrderItem>,
    payment: Option<Payment>,
    transaction: Option<Transaction>,
}

impl OrderAggregate {
    /// Creates a new PENDING order with a single line.
    ///
    /// The line price is the product's effective price; the order total is the
    /// line total plus the admin fee.
    pub fn create(new: NewOrder, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if new.quantity == 0 || new.quantity > OrderItem::MAX_QUANTITY {
            return Err(DomainError::InvalidQuantity(new.quantity));
        }
        let unit_price = new.product.effective_price();
        if !unit_price.is_positive() {
            return Err(DomainError::InvalidPrice(unit_price.amount()));
        }
        if new.admin_fee.is_negative() {
            return Err(DomainError::InvalidPrice(new.admin_fee.amount()));
        }
        new.customer.validate()?;
        new.game_account.validate()?;

        let order_id = OrderId::new();
        let game_data = new.game_account.to_json();
        let item = OrderItem {
            id: OrderItemId::new(),
            order_id,
            product_id: new.product.id.clone(),
            product_name: new.product.name.clone(),
            provider_code: new.product.provider_code.clone(),
            quantity: new.quantity,
            price: unit_price,
            game_data: game_data.clone(),
        };

        let order = Order {
            id: order_id,
            order_number: new.order_number,
            customer: new.customer,
            total_amount: add_fee(item.line_total()?, new.admin_fee)?,
            admin_fee: new.admin_fee,
            payment_channel: new.payment_channel,
            status: OrderStatus::Pending,
            game_data,
            provider_order_id: None,
            provider_data: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        };

        Ok(Self {
            order,
            items: vec![item],
            payment: None,
            transaction: None,
        })
    }

    /// Reassembles an aggregate read from storage.
    pub fn from_parts(
        order: Order,
        items: Vec<OrderItem>,
        payment: Option<Payment>,
        transaction: Option<Transaction>,
    ) -> Self {
        Self {
            order,
            items,
            payment,
            transaction,
        }
    }

    /// Splits the aggregate into its records for persistence.
    pub fn into_parts(self) -> (Order, Vec<OrderItem>, Option<Payment>, Option<Transaction>) {
        (self.order, self.items, self.payment, self.transaction)
    }
}

// Query methods
impl OrderAggregate {
    pub fn id(&self) -> OrderId {
        self.order.id
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order.order_number
    }

    pub fn status(&self) -> OrderStatus {
        self.order.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    pub fn payment_status(&self) -> Option<PaymentStatus> {
        self.payment.as_ref().map(|p| p.status)
    }

    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction.as_ref().map(|t| t.status)
    }

    /// The provider's reference for the placed delivery order, if any.
    pub fn provider_ref(&self) -> Option<&str> {
        self.transaction
            .as_ref()
            .and_then(|t| t.provider_ref.as_deref())
    }

    /// Provider service code of the (single) purchased line.
    pub fn provider_code(&self) -> Option<&str> {
        self.items.first().map(|i| i.provider_code.as_str())
    }

    /// Sum of line totals, excluding the admin fee.
    pub fn items_total(&self) -> Result<Money, DomainError> {
        self.items.iter().try_fold(Money::zero(), |acc, item| {
            acc.checked_add(item.line_total()?)
                .ok_or_else(|| DomainError::AmountOverflow("order items total".to_string()))
        })
    }

    pub fn game_account(&self) -> Result<GameAccount, DomainError> {
        self.order.game_account()
    }

    /// Checks the cross-record invariants of the aggregate.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        let violation = |reason: String| DomainError::InvariantViolation {
            order_id: self.order.id,
            reason,
        };

        let expected = add_fee(self.items_total()?, self.order.admin_fee)?;
        if self.order.total_amount != expected {
            return Err(violation(format!(
                "total {} does not match items plus fee {}",
                self.order.total_amount, expected
            )));
        }

        if let Some(payment) = &self.payment
            && (payment.status == PaymentStatus::Success) != payment.paid_at.is_some()
        {
            return Err(violation(format!(
                "payment status {} disagrees with paid_at",
                payment.status
            )));
        }

        if self.order.status == OrderStatus::Completed
            && (self.payment_status() != Some(PaymentStatus::Success)
                || self.transaction_status() != Some(TransactionStatus::Success))
        {
            return Err(violation(
                "completed order without settled payment and delivered transaction".to_string(),
            ));
        }

        Ok(())
    }
}

// Mutation methods
impl OrderAggregate {
    /// Opens the payment for this order. Returns the existing payment when one
    /// is already attached.
    pub fn attach_payment(&mut self, new: NewPayment, now: DateTime<Utc>) -> &Payment {
        let order = &self.order;
        self.payment.get_or_insert_with(|| Payment {
            id: PaymentId::new(),
            order_id: order.id,
            amount: order.total_amount,
            status: PaymentStatus::Pending,
            method: order.payment_channel,
            payment_provider: new.payment_provider,
            transaction_id: new.transaction_id,
            payment_url: new.payment_url,
            payment_code: new.payment_code,
            payment_data: new.payment_data,
            expired_at: now + new.ttl,
            paid_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Opens the fulfillment transaction. Returns the existing transaction
    /// when one is already attached, so duplicate calls never create a second
    /// delivery record.
    pub fn attach_transaction(
        &mut self,
        initial: TransactionStatus,
        code: TransactionCode,
        now: DateTime<Utc>,
    ) -> Result<&Transaction, DomainError> {
        if self.transaction.is_none() {
            if initial.is_terminal() {
                return Err(DomainError::transition("transaction", "NEW", initial));
            }
            self.transaction = Some(Transaction {
                id: TransactionId::new(),
                transaction_code: code,
                order_id: self.order.id,
                kind: TransactionKind::Purchase,
                amount: self.order.total_amount,
                status: initial,
                provider_ref: None,
                provider_data: None,
                game_data: self.order.game_data.clone(),
                failed_reason: None,
                created_at: now,
                updated_at: now,
            });
        }
        self.transaction
            .as_ref()
            .ok_or(DomainError::MissingTransaction(self.order.id))
    }

    /// Moves the order to `to`.
    ///
    /// Returns `Ok(false)` when the order already has that status.
    pub fn transition_order(
        &mut self,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let from = self.order.status;
        if from == to {
            return Ok(false);
        }
        if !from.can_transition_to(to) {
            return Err(DomainError::transition("order", from, to));
        }
        match to {
            OrderStatus::Processing if self.payment_status() != Some(PaymentStatus::Success) => {
                return Err(DomainError::InvariantViolation {
                    order_id: self.order.id,
                    reason: "cannot start fulfillment before payment succeeded".to_string(),
                });
            }
            OrderStatus::Completed
                if self.transaction_status() != Some(TransactionStatus::Success) =>
            {
                return Err(DomainError::InvariantViolation {
                    order_id: self.order.id,
                    reason: "cannot complete before delivery succeeded".to_string(),
                });
            }
            _ => {}
        }
        self.order.status = to;
        self.order.updated_at = now;
        Ok(true)
    }

    /// Counts one more failed fulfillment attempt. The count is kept for
    /// operators; retry limits for placement live in the saga's retry policy.
    pub fn increment_retry(&mut self, now: DateTime<Utc>) {
        self.order.retry_count += 1;
        self.order.updated_at = now;
    }

    /// Moves the payment to `to`, recording the gateway's transaction id and
    /// response when given.
    ///
    /// Returns `Ok(false)` when the payment already has that status.
    pub fn settle_payment(
        &mut self,
        to: PaymentStatus,
        gateway_transaction_id: Option<String>,
        raw: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let payment = self
            .payment
            .as_mut()
            .ok_or(DomainError::MissingPayment(self.order.id))?;
        if payment.status == to {
            return Ok(false);
        }
        if !payment.status.can_transition_to(to) {
            return Err(DomainError::transition("payment", payment.status, to));
        }
        payment.status = to;
        if to == PaymentStatus::Success {
            payment.paid_at = Some(now);
        }
        if gateway_transaction_id.is_some() {
            payment.transaction_id = gateway_transaction_id;
        }
        if let Some(raw) = raw {
            payment.payment_data = raw;
        }
        payment.updated_at = now;
        Ok(true)
    }

    /// Moves the transaction to `to`.
    ///
    /// Returns `Ok(false)` when the transaction already has that status.
    pub fn update_transaction(
        &mut self,
        to: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(DomainError::MissingTransaction(self.order.id))?;
        if transaction.status == to {
            return Ok(false);
        }
        if !transaction.status.can_transition_to(to) {
            return Err(DomainError::transition("transaction", transaction.status, to));
        }
        transaction.status = to;
        transaction.updated_at = now;
        Ok(true)
    }

    /// Closes a non-terminal transaction as FAILED with a reason.
    ///
    /// Returns `Ok(false)` when the transaction is already terminal.
    pub fn fail_transaction(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(DomainError::MissingTransaction(self.order.id))?;
        if transaction.status.is_terminal() {
            return Ok(false);
        }
        transaction.status = TransactionStatus::Failed;
        transaction.failed_reason = Some(reason.into());
        transaction.updated_at = now;
        Ok(true)
    }

    /// Records the provider's acceptance of the delivery order.
    pub fn record_provider_order(
        &mut self,
        provider_ref: impl Into<String>,
        raw: Value,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let order_id = self.order.id;
        let transaction = self
            .transaction
            .as_mut()
            .ok_or(DomainError::MissingTransaction(order_id))?;
        if let Some(existing) = &transaction.provider_ref {
            return Err(DomainError::InvariantViolation {
                order_id,
                reason: format!("provider order {existing} already recorded"),
            });
        }
        let provider_ref = provider_ref.into();
        transaction.provider_ref = Some(provider_ref.clone());
        transaction.provider_data = Some(raw.clone());
        transaction.updated_at = now;
        self.order.provider_order_id = Some(provider_ref);
        self.order.provider_data = Some(raw);
        self.order.updated_at = now;
        Ok(())
    }

    /// Stores the latest provider response on the transaction and order.
    pub fn record_provider_response(&mut self, raw: Value, now: DateTime<Utc>) {
        if let Some(transaction) = self.transaction.as_mut() {
            transaction.provider_data = Some(raw.clone());
            transaction.updated_at = now;
        }
        self.order.provider_data = Some(raw);
        self.order.updated_at = now;
    }

    /// Expires a payment that is still pending past its expiry instant.
    ///
    /// The order moves to FAILED (unless already terminal) and a live
    /// transaction is closed. Returns true if anything changed.
    pub fn expire_if_overdue(&mut self, now: DateTime<Utc>) -> Result<bool, DomainError> {
        let overdue = self.payment.as_ref().is_some_and(|p| p.is_overdue(now));
        if !overdue {
            return Ok(false);
        }
        self.settle_payment(PaymentStatus::Expired, None, None, now)?;
        if !self.order.status.is_terminal() {
            self.transition_order(OrderStatus::Failed, now)?;
        }
        if self.transaction.is_some() {
            self.fail_transaction("payment expired", now)?;
        }
        Ok(true)
    }
}

fn add_fee(items_total: Money, admin_fee: Money) -> Result<Money, DomainError> {
    items_total
        .checked_add(admin_fee)
        .ok_or_else(|| DomainError::AmountOverflow(format!("{items_total} plus fee {admin_fee}")))
}
