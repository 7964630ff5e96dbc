//! Composite saga state.

use domain::{OrderAggregate, OrderStatus, PaymentStatus, TransactionStatus};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Where an order is in the checkout-to-delivery saga, derived from its
/// (order, payment, transaction) status tuple.
///
/// State transitions:
/// ```text
/// Created ──► AwaitingPayment ──┬──► Paid ──► Fulfilling ──┬──► Completed
///                               │                          └──► FulfillmentFailed
///                               └──► PaymentFailed
/// (any non-terminal) ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaState {
    /// Order persisted, payment not opened yet.
    Created,

    /// Waiting for the customer to pay.
    AwaitingPayment,

    /// Paid, not yet handed to the provider.
    Paid,

    /// Handed to the provider (or being handed), delivery pending.
    Fulfilling,

    /// Paid and delivered (terminal state).
    Completed,

    /// Payment failed or expired, or the order never became payable
    /// (terminal state).
    PaymentFailed,

    /// Paid but delivery failed (terminal state).
    FulfillmentFailed,

    /// Cancelled by an operator (terminal state).
    Cancelled,
}

impl SagaState {
    /// Classifies a status tuple.
    pub fn classify(
        order: OrderStatus,
        payment: Option<PaymentStatus>,
        transaction: Option<TransactionStatus>,
    ) -> Result<Self, SagaError> {
        use OrderStatus as O;
        use PaymentStatus as P;
        use TransactionStatus as T;

        let open = matches!(transaction, None | Some(T::Pending));
        let live = matches!(transaction, Some(T::Pending | T::Processing));
        let delivered = transaction == Some(T::Success);

        let state = match (order, payment) {
            (O::Pending, None) if transaction.is_none() => Some(SagaState::Created),
            (O::Pending, Some(P::Pending)) if open => Some(SagaState::AwaitingPayment),
            (O::Pending, Some(P::Success)) if open => Some(SagaState::Paid),
            (O::Processing, Some(P::Success)) if live => Some(SagaState::Fulfilling),
            (O::Completed, Some(P::Success)) if delivered => Some(SagaState::Completed),
            (O::Failed, None | Some(P::Failed | P::Expired)) if !delivered => {
                Some(SagaState::PaymentFailed)
            }
            (O::Failed, Some(P::Success)) if transaction == Some(T::Failed) => {
                Some(SagaState::FulfillmentFailed)
            }
            (O::Cancelled, _) if !delivered => Some(SagaState::Cancelled),
            _ => None,
        };

        state.ok_or(SagaError::InconsistentState {
            order,
            payment,
            transaction,
        })
    }

    /// Classifies an aggregate.
    pub fn of(order: &OrderAggregate) -> Result<Self, SagaError> {
        Self::classify(
            order.status(),
            order.payment_status(),
            order.transaction_status(),
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed
                | SagaState::PaymentFailed
                | SagaState::FulfillmentFailed
                | SagaState::Cancelled
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Created => "Created",
            SagaState::AwaitingPayment => "AwaitingPayment",
            SagaState::Paid => "Paid",
            SagaState::Fulfilling => "Fulfilling",
            SagaState::Completed => "Completed",
            SagaState::PaymentFailed => "PaymentFailed",
            SagaState::FulfillmentFailed => "FulfillmentFailed",
            SagaState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use OrderStatus as O;
    use PaymentStatus as P;
    use TransactionStatus as T;

    fn classify(o: O, p: Option<P>, t: Option<T>) -> Option<SagaState> {
        SagaState::classify(o, p, t).ok()
    }

    #[test]
    fn test_happy_path_states() {
        assert_eq!(classify(O::Pending, None, None), Some(SagaState::Created));
        assert_eq!(
            classify(O::Pending, Some(P::Pending), Some(T::Pending)),
            Some(SagaState::AwaitingPayment)
        );
        assert_eq!(
            classify(O::Pending, Some(P::Success), Some(T::Pending)),
            Some(SagaState::Paid)
        );
        assert_eq!(
            classify(O::Processing, Some(P::Success), Some(T::Pending)),
            Some(SagaState::Fulfilling)
        );
        assert_eq!(
            classify(O::Processing, Some(P::Success), Some(T::Processing)),
            Some(SagaState::Fulfilling)
        );
        assert_eq!(
            classify(O::Completed, Some(P::Success), Some(T::Success)),
            Some(SagaState::Completed)
        );
    }

    #[test]
    fn test_failure_states() {
        assert_eq!(
            classify(O::Failed, Some(P::Expired), Some(T::Failed)),
            Some(SagaState::PaymentFailed)
        );
        assert_eq!(
            classify(O::Failed, Some(P::Failed), Some(T::Pending)),
            Some(SagaState::PaymentFailed)
        );
        assert_eq!(classify(O::Failed, None, None), Some(SagaState::PaymentFailed));
        assert_eq!(
            classify(O::Failed, Some(P::Success), Some(T::Failed)),
            Some(SagaState::FulfillmentFailed)
        );
        assert_eq!(
            classify(O::Cancelled, Some(P::Pending), Some(T::Failed)),
            Some(SagaState::Cancelled)
        );
    }

    #[test]
    fn test_inconsistent_tuples() {
        // Completed without delivery.
        assert!(classify(O::Completed, Some(P::Success), Some(T::Processing)).is_none());
        // Fulfilling without payment.
        assert!(classify(O::Processing, Some(P::Pending), Some(T::Pending)).is_none());
        // Delivered but cancelled.
        assert!(classify(O::Cancelled, Some(P::Success), Some(T::Success)).is_none());
        // Paid order with a failed transaction that is still pending.
        assert!(classify(O::Pending, Some(P::Success), Some(T::Failed)).is_none());

        let err = SagaState::classify(O::Completed, None, None).unwrap_err();
        assert!(matches!(err, SagaError::InconsistentState { .. }));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaState::Created.is_terminal());
        assert!(!SagaState::AwaitingPayment.is_terminal());
        assert!(!SagaState::Paid.is_terminal());
        assert!(!SagaState::Fulfilling.is_terminal());
        assert!(SagaState::Completed.is_terminal());
        assert!(SagaState::PaymentFailed.is_terminal());
        assert!(SagaState::FulfillmentFailed.is_terminal());
        assert!(SagaState::Cancelled.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaState::AwaitingPayment.to_string(), "AwaitingPayment");
        assert_eq!(SagaState::FulfillmentFailed.to_string(), "FulfillmentFailed");
    }

    #[test]
    fn test_serialization() {
        let state = SagaState::Fulfilling;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
