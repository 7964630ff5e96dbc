//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::UserId;
use domain::{CustomerIdentity, GameAccount, Money, PaymentChannel, ProductId};
use order_store::{CatalogStore, OrderStore};
use saga::{CheckoutRequest as SagaCheckout, SagaState};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Channel name such as `bca_va` or `qris`; defaults to the hosted page.
    #[serde(default)]
    pub payment_channel: Option<String>,
    /// Registered storefront user, if signed in.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub game_user_id: String,
    #[serde(default)]
    pub game_server_id: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl CheckoutRequest {
    fn into_saga(self) -> Result<SagaCheckout, ApiError> {
        let user_id = self
            .user_id
            .as_deref()
            .map(|id| {
                id.parse::<UserId>()
                    .map_err(|e| ApiError::BadRequest(format!("Invalid user_id: {e}")))
            })
            .transpose()?;
        let customer = CustomerIdentity::from_columns(user_id, self.email, self.name, self.phone)?;

        let payment_channel = match self.payment_channel.as_deref() {
            Some(channel) => channel.parse::<PaymentChannel>()?,
            None => PaymentChannel::default(),
        };

        Ok(SagaCheckout {
            product_id: ProductId::new(self.product_id),
            quantity: self.quantity,
            customer,
            game_account: GameAccount::new(self.game_user_id, self.game_server_id),
            payment_channel,
        })
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_number: String,
    pub order_id: String,
    pub status: String,
    pub saga_state: Option<SagaState>,
    pub total_amount: Money,
    pub admin_fee: Money,
    pub payment: CheckoutPayment,
}

#[derive(Serialize)]
pub struct CheckoutPayment {
    pub token: String,
    pub redirect_url: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
}

// -- Handlers --

/// POST /checkout — create an order and open its payment.
#[tracing::instrument(skip(state, req))]
pub async fn create<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError>
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let receipt = state.manager.checkout(req.into_saga()?).await?;

    let order = receipt.order.order();
    let response = CheckoutResponse {
        order_number: order.order_number.to_string(),
        order_id: order.id.to_string(),
        status: order.status.to_string(),
        saga_state: SagaState::of(&receipt.order).ok(),
        total_amount: order.total_amount,
        admin_fee: order.admin_fee,
        payment: CheckoutPayment {
            token: receipt.token,
            redirect_url: receipt.redirect_url,
            expired_at: receipt.order.payment().map(|p| p.expired_at),
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}
