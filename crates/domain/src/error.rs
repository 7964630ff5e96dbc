//! Domain error types.

use common::OrderId;
use thiserror::Error;

/// Errors raised by the order aggregate and its value objects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A status change not allowed by the entity's transition table.
    #[error("Invalid state transition: {entity} cannot move from {from} to {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Invalid quantity.
    #[error(
        "Invalid quantity: {0} (must be between 1 and {max})",
        max = crate::OrderItem::MAX_QUANTITY
    )]
    InvalidQuantity(u32),

    /// An amount computation left the representable range.
    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    /// Invalid unit price.
    #[error("Invalid price: {0} (must be greater than 0)")]
    InvalidPrice(i64),

    /// The game account identifiers are missing or malformed.
    #[error("Invalid game data: {0}")]
    InvalidGameData(String),

    /// The customer identity is incomplete.
    #[error("Invalid customer: {0}")]
    InvalidCustomer(String),

    /// A status or code string read from storage is not recognised.
    #[error("Unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: String },

    /// An order has no payment record yet.
    #[error("Order {0} has no payment")]
    MissingPayment(OrderId),

    /// An order has no fulfillment transaction yet.
    #[error("Order {0} has no transaction")]
    MissingTransaction(OrderId),

    /// The aggregate breaks one of its invariants.
    #[error("Invariant violated for order {order_id}: {reason}")]
    InvariantViolation { order_id: OrderId, reason: String },
}

impl DomainError {
    pub(crate) fn transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        DomainError::InvalidStateTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
