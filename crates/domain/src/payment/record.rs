//! Payment record.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Money;

use super::{PaymentChannel, PaymentStatus};

/// Monetary settlement record owned by an order.
///
/// `paid_at` is set exactly when `status` is `Success`. `expired_at` is fixed
/// at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub method: PaymentChannel,
    /// Gateway name.
    pub payment_provider: String,
    /// The gateway's own transaction id, once it reports one.
    pub transaction_id: Option<String>,
    pub payment_url: Option<String>,
    /// Channel-specific code such as a virtual account number.
    pub payment_code: Option<String>,
    /// Snapshot of the latest gateway response.
    pub payment_data: Value,
    pub expired_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Returns true if the payment is still pending past its expiry instant.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && now > self.expired_at
    }
}

/// Gateway output needed to open a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub payment_provider: String,
    pub transaction_id: Option<String>,
    pub payment_url: Option<String>,
    pub payment_code: Option<String>,
    pub payment_data: Value,
    /// How long the customer has to pay.
    pub ttl: Duration,
}
