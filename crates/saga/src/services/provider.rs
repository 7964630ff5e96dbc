//! Fulfillment provider trait, status vocabulary and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::GameAccount;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors returned by the fulfillment provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure or 5xx.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider says the game account does not exist.
    #[error("account verification failed: {0}")]
    AccountVerificationFailed(String),

    /// The provider refused the order (unknown product, balance, bad id).
    #[error("provider rejected order: {0}")]
    Rejected(String),

    /// The provider answered with something we cannot read.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient failures worth retrying with the same reference.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_) | ProviderError::InvalidResponse(_)
        )
    }
}

/// Normalized delivery status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    Success,
    Processing,
    Pending,
    Failed,
    Error,
}

impl ProviderStatus {
    /// Maps the provider's status text. Unknown values count as pending.
    pub fn normalize(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" | "sukses" | "completed" => ProviderStatus::Success,
            "processing" | "process" | "proses" => ProviderStatus::Processing,
            "pending" | "waiting" => ProviderStatus::Pending,
            "failed" | "gagal" | "cancelled" | "canceled" | "refund" => ProviderStatus::Failed,
            "error" => ProviderStatus::Error,
            other => {
                tracing::warn!(status = other, "unknown provider status");
                ProviderStatus::Pending
            }
        }
    }

    /// Returns true once delivery succeeded or definitively failed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderStatus::Success | ProviderStatus::Failed | ProviderStatus::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Success => "SUCCESS",
            ProviderStatus::Processing => "PROCESSING",
            ProviderStatus::Pending => "PENDING",
            ProviderStatus::Failed => "FAILED",
            ProviderStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedAccount {
    pub nickname: String,
}

/// A delivery order for the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    /// Our transaction code. The provider sees it as the order reference.
    pub reference: String,
    /// The provider's service code for the product.
    pub provider_code: String,
    pub account: GameAccount,
}

/// The provider's acceptance of a delivery order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub provider_ref: String,
    pub status: ProviderStatus,
    pub message: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStatusReport {
    pub status: ProviderStatus,
    pub message: Option<String>,
    pub raw: Value,
}

/// Trait for game top-up provider operations.
#[async_trait]
pub trait FulfillmentProvider: Send + Sync {
    /// Looks up the in-game nickname of an account.
    async fn verify_account(
        &self,
        game_code: &str,
        account: &GameAccount,
    ) -> Result<VerifiedAccount, ProviderError>;

    /// Places a delivery order. Not idempotent on our side.
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<PlacedOrder, ProviderError>;

    /// Polls the status of a placed order.
    async fn poll_status(&self, provider_ref: &str) -> Result<ProviderStatusReport, ProviderError>;
}

#[async_trait]
impl<T: FulfillmentProvider + ?Sized> FulfillmentProvider for Arc<T> {
    async fn verify_account(
        &self,
        game_code: &str,
        account: &GameAccount,
    ) -> Result<VerifiedAccount, ProviderError> {
        (**self).verify_account(game_code, account).await
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<PlacedOrder, ProviderError> {
        (**self).place_order(request).await
    }

    async fn poll_status(&self, provider_ref: &str) -> Result<ProviderStatusReport, ProviderError> {
        (**self).poll_status(provider_ref).await
    }
}

/// What the in-memory provider does with the next `place_order` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceBehavior {
    /// Accept and report the given status.
    Accept(ProviderStatus),
    Reject(String),
    Unavailable,
}

#[derive(Debug)]
struct InMemoryProviderState {
    behavior: PlaceBehavior,
    /// Fail this many calls as unavailable before applying `behavior`.
    transient_failures: u32,
    next_ref: Option<String>,
    ref_counter: u32,
    placed: Vec<PlaceOrderRequest>,
    place_calls: u32,
    statuses: HashMap<String, ProviderStatus>,
    nicknames: HashMap<String, String>,
    poll_unavailable: bool,
}

impl Default for InMemoryProviderState {
    fn default() -> Self {
        Self {
            behavior: PlaceBehavior::Accept(ProviderStatus::Processing),
            transient_failures: 0,
            next_ref: None,
            ref_counter: 0,
            placed: Vec::new(),
            place_calls: 0,
            statuses: HashMap::new(),
            nicknames: HashMap::new(),
            poll_unavailable: false,
        }
    }
}

/// In-memory fulfillment provider for testing and local runs.
///
/// Accepts orders as `Processing` by default and counts every
/// `place_order` call.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFulfillmentProvider {
    state: Arc<Mutex<InMemoryProviderState>>,
}

impl InMemoryFulfillmentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_place_behavior(&self, behavior: PlaceBehavior) {
        self.state().behavior = behavior;
    }

    /// Makes the next `count` placements fail as unavailable.
    pub fn fail_next_placements(&self, count: u32) {
        self.state().transient_failures = count;
    }

    /// Uses `provider_ref` for the next accepted order.
    pub fn set_next_ref(&self, provider_ref: &str) {
        self.state().next_ref = Some(provider_ref.to_string());
    }

    /// Sets the status reported by polls for a placed order.
    pub fn set_status(&self, provider_ref: &str, status: ProviderStatus) {
        self.state()
            .statuses
            .insert(provider_ref.to_string(), status);
    }

    pub fn set_poll_unavailable(&self, unavailable: bool) {
        self.state().poll_unavailable = unavailable;
    }

    /// Registers a known game account.
    pub fn register_account(&self, user_id: &str, nickname: &str) {
        self.state()
            .nicknames
            .insert(user_id.to_string(), nickname.to_string());
    }

    /// Number of `place_order` calls, failed ones included.
    pub fn place_order_calls(&self) -> u32 {
        self.state().place_calls
    }

    /// Accepted orders, in call order.
    pub fn placed_orders(&self) -> Vec<PlaceOrderRequest> {
        self.state().placed.clone()
    }
}

#[async_trait]
impl FulfillmentProvider for InMemoryFulfillmentProvider {
    async fn verify_account(
        &self,
        _game_code: &str,
        account: &GameAccount,
    ) -> Result<VerifiedAccount, ProviderError> {
        self.state()
            .nicknames
            .get(&account.user_id)
            .map(|nickname| VerifiedAccount {
                nickname: nickname.clone(),
            })
            .ok_or_else(|| {
                ProviderError::AccountVerificationFailed(format!(
                    "unknown player id {}",
                    account.user_id
                ))
            })
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<PlacedOrder, ProviderError> {
        let mut state = self.state();
        state.place_calls += 1;

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(ProviderError::Unavailable("connection reset".to_string()));
        }

        match state.behavior.clone() {
            PlaceBehavior::Unavailable => {
                Err(ProviderError::Unavailable("connection reset".to_string()))
            }
            PlaceBehavior::Reject(reason) => Err(ProviderError::Rejected(reason)),
            PlaceBehavior::Accept(status) => {
                state.ref_counter += 1;
                let counter = state.ref_counter;
                let provider_ref = state
                    .next_ref
                    .take()
                    .unwrap_or_else(|| format!("MEM{counter:05}"));
                state.placed.push(request.clone());
                state.statuses.insert(provider_ref.clone(), status);

                Ok(PlacedOrder {
                    raw: json!({
                        "trxid": provider_ref,
                        "reference": request.reference,
                        "status": status.as_str(),
                    }),
                    provider_ref,
                    status,
                    message: None,
                })
            }
        }
    }

    async fn poll_status(&self, provider_ref: &str) -> Result<ProviderStatusReport, ProviderError> {
        let state = self.state();
        if state.poll_unavailable {
            return Err(ProviderError::Unavailable("connection reset".to_string()));
        }
        let status = state.statuses.get(provider_ref).copied().ok_or_else(|| {
            ProviderError::InvalidResponse(format!("unknown order {provider_ref}"))
        })?;

        Ok(ProviderStatusReport {
            status,
            message: None,
            raw: json!({ "trxid": provider_ref, "status": status.as_str() }),
        })
    }
}
