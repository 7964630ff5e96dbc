//! Payment status state machine.

use serde::{Deserialize, Serialize};

use crate::macros::string_enum;

/// Settlement status of a payment.
///
/// ```text
/// Pending ──┬──► Success
///           ├──► Failed
///           └──► Expired
/// ```
///
/// `Refunded` is representable for records settled elsewhere; no transition
/// in this crate produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Expired,
    Refunded,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "PENDING",
    Success => "SUCCESS",
    Failed => "FAILED",
    Expired => "EXPIRED",
    Refunded => "REFUNDED",
});

impl PaymentStatus {
    /// Returns true if the payment may move to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (
                PaymentStatus::Pending,
                PaymentStatus::Success | PaymentStatus::Failed | PaymentStatus::Expired
            )
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}
