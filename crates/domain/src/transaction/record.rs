//! Fulfillment transaction record.

use chrono::{DateTime, Utc};
use common::{OrderId, TransactionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Money, TransactionCode};

use super::{TransactionKind, TransactionStatus};

/// Delivery record owned by an order.
///
/// `provider_ref` is only ever set once the provider accepted the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub transaction_code: TransactionCode,
    pub order_id: OrderId,
    pub kind: TransactionKind,
    pub amount: Money,
    pub status: TransactionStatus,
    pub provider_ref: Option<String>,
    /// Snapshot of the latest provider response.
    pub provider_data: Option<Value>,
    pub game_data: Value,
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Returns true once the order was handed to the provider.
    pub fn is_placed(&self) -> bool {
        self.provider_ref.is_some()
    }
}
