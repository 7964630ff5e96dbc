//! Saga error types.

use domain::{DomainError, Money, OrderStatus, PaymentStatus, ProductId, TransactionStatus};
use order_store::StoreError;
use thiserror::Error;

use crate::services::{GatewayError, ProviderError};

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The product does not exist or is not for sale.
    #[error("Product unavailable: {0}")]
    ProductUnavailable(ProductId),

    /// Quantity below one or above what an order line can hold.
    #[error(
        "Invalid quantity: {0} (must be between 1 and {max})",
        max = domain::OrderItem::MAX_QUANTITY
    )]
    InvalidQuantity(u32),

    /// The order could not be created (catalog or store failure).
    #[error("Order creation failed: {0}")]
    OrderCreationFailed(String),

    /// Payment gateway error.
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Fulfillment provider error.
    #[error("Fulfillment provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(#[from] StoreError),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Order is not in the expected state for the requested operation.
    #[error("Order not ready: {0}")]
    OrderNotReady(String),

    /// A gateway notification reports a different amount than the payment.
    #[error("Amount mismatch: payment is {expected}, notification reports {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    /// The status tuple matches no saga state.
    #[error(
        "Inconsistent order state: order {order}, payment {payment:?}, transaction {transaction:?}"
    )]
    InconsistentState {
        order: OrderStatus,
        payment: Option<PaymentStatus>,
        transaction: Option<TransactionStatus>,
    },
}

impl SagaError {
    /// Returns true if the caller may retry after re-reading state.
    pub fn is_retryable(&self) -> bool {
        match self {
            SagaError::Gateway(e) => e.is_retryable(),
            SagaError::Provider(e) => e.is_retryable(),
            SagaError::Domain(DomainError::InvalidStateTransition { .. }) => true,
            SagaError::Store(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Returns true for a transient failure of an external adapter.
    pub fn is_transient_upstream(&self) -> bool {
        match self {
            SagaError::Gateway(e) => e.is_retryable(),
            SagaError::Provider(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
