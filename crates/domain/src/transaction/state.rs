//! Fulfillment transaction status state machine.

use serde::{Deserialize, Serialize};

use crate::macros::string_enum;

/// Delivery status of a fulfillment transaction.
///
/// `Pending` and `Processing` mirror the provider and may alternate;
/// `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
}

string_enum!(TransactionStatus, "transaction status", {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Success => "SUCCESS",
    Failed => "FAILED",
});

impl TransactionStatus {
    /// Returns true if the transaction may move to `next`.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        !self.is_terminal() && *self != next
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

/// Kind of fulfillment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    #[default]
    Purchase,
}

string_enum!(TransactionKind, "transaction type", {
    Purchase => "PURCHASE",
});
