//! Game account lookup endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::GameAccount;
use order_store::{CatalogStore, OrderStore};
use saga::FulfillmentProvider;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct VerifyAccountRequest {
    /// Provider game code, e.g. `mobilelegends`.
    pub game_code: String,
    pub user_id: String,
    #[serde(default)]
    pub server_id: Option<String>,
}

#[derive(Serialize)]
pub struct VerifyAccountResponse {
    pub user_id: String,
    pub server_id: Option<String>,
    pub nickname: String,
}

/// POST /accounts/verify — confirm a player id before checkout.
#[tracing::instrument(skip(state, req))]
pub async fn verify<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<VerifyAccountRequest>,
) -> Result<Json<VerifyAccountResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let account = GameAccount::new(req.user_id, req.server_id);
    account.validate()?;

    let verified = state
        .provider
        .verify_account(&req.game_code, &account)
        .await
        .map_err(saga::SagaError::from)?;

    Ok(Json(VerifyAccountResponse {
        user_id: account.user_id,
        server_id: account.server_id,
        nickname: verified.nickname,
    }))
}
