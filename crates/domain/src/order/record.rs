//! Order and order line records.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DomainError, Money, PaymentChannel};

use super::{CustomerIdentity, GameAccount, OrderNumber, OrderStatus, ProductId};

/// One purchase attempt, the root of the order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer: CustomerIdentity,
    /// Line totals plus the admin fee, fixed at creation.
    pub total_amount: Money,
    pub admin_fee: Money,
    pub payment_channel: PaymentChannel,
    pub status: OrderStatus,
    /// Game account identifiers, stored opaque. Read through [`Order::game_account`].
    pub game_data: Value,
    pub provider_order_id: Option<String>,
    pub provider_data: Option<Value>,
    /// Failed fulfillment attempts. An audit counter: FAILED is terminal, so
    /// nothing re-drives an order based on it.
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the typed view of the stored game data.
    pub fn game_account(&self) -> Result<GameAccount, DomainError> {
        GameAccount::from_json(&self.game_data)
    }
}

/// A line item, snapshotted at checkout and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    /// Provider service code at the time of purchase.
    pub provider_code: String,
    pub quantity: u32,
    /// Unit price snapshot.
    pub price: Money,
    pub game_data: Value,
}

impl OrderItem {
    /// Largest quantity a line can hold; the `quantity` column is a 32-bit int.
    pub const MAX_QUANTITY: u32 = i32::MAX as u32;

    /// Returns the line total (quantity * unit price).
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.price.checked_mul(self.quantity).ok_or_else(|| {
            DomainError::AmountOverflow(format!("{} x {}", self.price, self.quantity))
        })
    }
}
