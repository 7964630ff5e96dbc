//! Payment gateway notification endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use order_store::{CatalogStore, OrderStore};
use saga::GatewayNotification;

use super::AppState;
use super::orders::ReconcileResponse;
use crate::error::ApiError;

/// POST /payments/notification — gateway status callback.
///
/// Duplicate and late notifications answer 200 with outcome `discarded` or
/// `already_satisfied` so the gateway stops redelivering them.
#[tracing::instrument(skip(state, notification))]
pub async fn notify<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(notification): Json<GatewayNotification>,
) -> Result<Json<ReconcileResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let reconciled = state.engine.handle_gateway_notification(&notification).await?;
    tracing::info!(
        outcome = reconciled.outcome.as_str(),
        status = %notification.transaction_status,
        "gateway notification handled"
    );
    Ok(Json(reconciled.into()))
}
