//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::macros::string_enum;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──┬──► Completed
///    │            │        ├──► Failed
///    │            │        └──► Cancelled
///    ├──► Failed  │
///    └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created at checkout, waiting for payment and fulfillment to start.
    #[default]
    Pending,

    /// Paid and handed over to the fulfillment provider.
    Processing,

    /// Delivered (terminal state).
    Completed,

    /// Payment or fulfillment failed (terminal state).
    Failed,

    /// Cancelled by an administrator (terminal state).
    Cancelled,
}

string_enum!(OrderStatus, "order status", {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

impl OrderStatus {
    /// Returns true if the order may move to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing | Failed | Cancelled)
                | (Processing, Completed | Failed | Cancelled)
        )
    }

    /// Returns true if fulfillment may be started or resumed in this status.
    pub fn can_process(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }
}
