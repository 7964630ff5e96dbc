//! Order status and reconciliation trigger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use domain::{Money, OrderAggregate, OrderNumber};
use order_store::{CatalogStore, OrderStore};
use saga::{Outcome, Reconciled, SagaState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderView {
    pub order_number: String,
    pub order_id: String,
    pub status: String,
    /// Absent when the stored status tuple is inconsistent.
    pub saga_state: Option<SagaState>,
    pub total_amount: Money,
    pub admin_fee: Money,
    pub payment_channel: String,
    pub retry_count: u32,
    pub game_account: Value,
    pub items: Vec<OrderItemView>,
    pub payment: Option<PaymentView>,
    pub transaction: Option<TransactionView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemView {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
}

#[derive(Serialize)]
pub struct PaymentView {
    pub status: String,
    pub amount: Money,
    pub method: String,
    pub payment_provider: String,
    pub payment_url: Option<String>,
    pub payment_code: Option<String>,
    pub expired_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct TransactionView {
    pub transaction_code: String,
    pub status: String,
    pub amount: Money,
    pub provider_ref: Option<String>,
    pub failed_reason: Option<String>,
}

impl From<&OrderAggregate> for OrderView {
    fn from(aggregate: &OrderAggregate) -> Self {
        let order = aggregate.order();
        Self {
            order_number: order.order_number.to_string(),
            order_id: order.id.to_string(),
            status: order.status.to_string(),
            saga_state: SagaState::of(aggregate).ok(),
            total_amount: order.total_amount,
            admin_fee: order.admin_fee,
            payment_channel: order.payment_channel.to_string(),
            retry_count: order.retry_count,
            game_account: order.game_data.clone(),
            items: aggregate
                .items()
                .iter()
                .map(|item| OrderItemView {
                    product_id: item.product_id.to_string(),
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            payment: aggregate.payment().map(|p| PaymentView {
                status: p.status.to_string(),
                amount: p.amount,
                method: p.method.to_string(),
                payment_provider: p.payment_provider.clone(),
                payment_url: p.payment_url.clone(),
                payment_code: p.payment_code.clone(),
                expired_at: p.expired_at,
                paid_at: p.paid_at,
            }),
            transaction: aggregate.transaction().map(|t| TransactionView {
                transaction_code: t.transaction_code.to_string(),
                status: t.status.to_string(),
                amount: t.amount,
                provider_ref: t.provider_ref.clone(),
                failed_reason: t.failed_reason.clone(),
            }),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub outcome: Outcome,
    pub order: OrderView,
}

impl From<Reconciled> for ReconcileResponse {
    fn from(reconciled: Reconciled) -> Self {
        Self {
            outcome: reconciled.outcome,
            order: OrderView::from(&reconciled.order),
        }
    }
}

// -- Handlers --

/// GET /orders/:order_number — last committed state, no side effects.
#[tracing::instrument(skip(state))]
pub async fn get<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderView>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let order = state
        .manager
        .find_by_order_number(&OrderNumber::new(order_number))
        .await?;
    Ok(Json(OrderView::from(&order)))
}

/// POST /orders/:order_number/refresh — converge the order with its upstreams.
#[tracing::instrument(skip(state))]
pub async fn refresh<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(order_number): Path<String>,
) -> Result<Json<ReconcileResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let order = state.engine.resolve(&OrderNumber::new(order_number)).await?;
    let reconciled = state.engine.refresh(order.id()).await?;
    Ok(Json(reconciled.into()))
}

/// POST /orders/:order_number/process — hand a paid order to the provider.
#[tracing::instrument(skip(state))]
pub async fn process<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(order_number): Path<String>,
) -> Result<Json<ReconcileResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let order = state.engine.resolve(&OrderNumber::new(order_number)).await?;
    let reconciled = state.engine.process_order_with_retry(order.id()).await?;
    Ok(Json(reconciled.into()))
}

/// POST /orders/:order_number/provider-status — poll the provider for delivery.
#[tracing::instrument(skip(state))]
pub async fn provider_status<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(order_number): Path<String>,
) -> Result<Json<ReconcileResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let order = state.engine.resolve(&OrderNumber::new(order_number)).await?;
    let reconciled = state.engine.poll_provider(order.id()).await?;
    Ok(Json(reconciled.into()))
}

/// POST /orders/:order_number/cancel — operator cancellation.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(order_number): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<ReconcileResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: CatalogStore + 'static,
{
    let reason = req.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::BadRequest(
            "cancellation reason is required".to_string(),
        ));
    }

    let order = state.engine.resolve(&OrderNumber::new(order_number)).await?;
    let reconciled = state.engine.cancel_order(order.id(), reason).await?;
    Ok(Json(reconciled.into()))
}
