//! Payment gateway trait, status vocabulary and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::{Money, PaymentChannel};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha512};
use thiserror::Error;

/// Errors returned by a payment gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure or 5xx.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// 4xx: the gateway refused the request.
    #[error("gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A notification failed the authenticity check.
    #[error("invalid notification signature")]
    InvalidSignature,

    /// The gateway answered with something we cannot read.
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// Normalized payment status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    Success,
    Pending,
    Failed,
    Expired,
}

impl GatewayStatus {
    /// Maps the gateway's `transaction_status` / `fraud_status` pair.
    ///
    /// A capture settles only when the fraud check accepted it (or reported
    /// nothing). Unknown values are treated as still pending.
    pub fn normalize(transaction_status: &str, fraud_status: Option<&str>) -> Self {
        match (transaction_status, fraud_status) {
            ("capture", None | Some("accept")) => GatewayStatus::Success,
            ("capture", Some("deny")) => GatewayStatus::Failed,
            ("capture", Some(other)) => {
                if other != "challenge" {
                    tracing::warn!(fraud_status = other, "unknown gateway fraud status");
                }
                GatewayStatus::Pending
            }
            (status, _) => Self::from_transaction_status(status),
        }
    }

    fn from_transaction_status(transaction_status: &str) -> Self {
        match transaction_status {
            "settlement" => GatewayStatus::Success,
            "pending" => GatewayStatus::Pending,
            "deny" | "cancel" | "failure" => GatewayStatus::Failed,
            "expire" => GatewayStatus::Expired,
            other => {
                tracing::warn!(status = other, "unknown gateway transaction status");
                GatewayStatus::Pending
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayStatus::Success => "SUCCESS",
            GatewayStatus::Pending => "PENDING",
            GatewayStatus::Failed => "FAILED",
            GatewayStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of the payment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDetail {
    pub id: String,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomerDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Request for a tokenized checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// The order number; the gateway reports status under this key.
    pub order_reference: String,
    pub gross_amount: Money,
    pub items: Vec<ItemDetail>,
    pub customer: Option<CustomerDetails>,
    pub channel: PaymentChannel,
}

/// A checkout session issued by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayToken {
    pub token: String,
    pub redirect_url: Option<String>,
    /// Channel-specific payment code, e.g. a virtual account number.
    pub payment_code: Option<String>,
    pub raw: Value,
}

/// Payment status for one order, from a poll or a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayStatusReport {
    pub order_reference: String,
    pub status: GatewayStatus,
    /// The gateway's own transaction id.
    pub transaction_id: Option<String>,
    pub gross_amount: Option<Money>,
    pub raw: Value,
}

/// Inbound status callback, in the gateway's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

impl GatewayNotification {
    /// Normalizes the notification into a status report.
    pub fn to_report(&self) -> Result<GatewayStatusReport, GatewayError> {
        let gross_amount = parse_gross_amount(&self.gross_amount).ok_or_else(|| {
            GatewayError::InvalidResponse(format!("bad gross_amount '{}'", self.gross_amount))
        })?;
        let raw = serde_json::to_value(self)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(GatewayStatusReport {
            order_reference: self.order_id.clone(),
            status: GatewayStatus::normalize(
                &self.transaction_status,
                self.fraud_status.as_deref(),
            ),
            transaction_id: self.transaction_id.clone(),
            gross_amount: Some(gross_amount),
            raw,
        })
    }
}

/// Parses the gateway's decimal amount string ("18000.00").
pub fn parse_gross_amount(value: &str) -> Option<Money> {
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if !fraction.chars().all(|c| c == '0') {
        return None;
    }
    whole.parse::<i64>().ok().map(Money::new)
}

/// Formats an amount the way the gateway signs it.
pub fn format_gross_amount(amount: Money) -> String {
    format!("{}.00", amount.amount())
}

/// Signature the gateway puts on notifications:
/// hex(sha512(order_id + status_code + gross_amount + server_key)).
pub fn notification_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Admin fee charged on top of the product price for a payment channel.
pub fn compute_admin_fee(channel: PaymentChannel) -> Money {
    if channel.is_bank_transfer() {
        Money::new(4000)
    } else if channel.is_e_wallet() {
        Money::new(2000)
    } else {
        Money::zero()
    }
}

/// Trait for payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Name stored on payments opened through this gateway.
    fn name(&self) -> &str;

    /// Opens a checkout session for an order.
    async fn issue_payment_token(&self, request: &TokenRequest)
    -> Result<GatewayToken, GatewayError>;

    /// Polls the payment status of an order.
    async fn fetch_status(&self, order_reference: &str)
    -> Result<GatewayStatusReport, GatewayError>;

    /// Checks a notification's signature.
    fn verify_notification(&self, notification: &GatewayNotification) -> Result<(), GatewayError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn issue_payment_token(
        &self,
        request: &TokenRequest,
    ) -> Result<GatewayToken, GatewayError> {
        (**self).issue_payment_token(request).await
    }

    async fn fetch_status(
        &self,
        order_reference: &str,
    ) -> Result<GatewayStatusReport, GatewayError> {
        (**self).fetch_status(order_reference).await
    }

    fn verify_notification(&self, notification: &GatewayNotification) -> Result<(), GatewayError> {
        (**self).verify_notification(notification)
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    issued: Vec<TokenRequest>,
    statuses: HashMap<String, GatewayStatus>,
    token_failure: Option<GatewayError>,
    status_failure: Option<GatewayError>,
}

/// In-memory payment gateway for testing and local runs.
///
/// Orders the gateway has not been told about report `Pending`.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    server_key: String,
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPaymentGateway {
    pub const SERVER_KEY: &'static str = "in-memory-server-key";

    pub fn new() -> Self {
        Self {
            server_key: Self::SERVER_KEY.to_string(),
            state: Arc::new(Mutex::new(InMemoryGatewayState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the status reported for an order.
    pub fn set_status(&self, order_reference: &str, status: GatewayStatus) {
        self.state()
            .statuses
            .insert(order_reference.to_string(), status);
    }

    /// Makes token issuance fail until cleared.
    pub fn fail_tokens(&self, error: Option<GatewayError>) {
        self.state().token_failure = error;
    }

    /// Makes status polls fail until cleared.
    pub fn fail_status(&self, error: Option<GatewayError>) {
        self.state().status_failure = error;
    }

    /// Token requests received so far.
    pub fn issued_requests(&self) -> Vec<TokenRequest> {
        self.state().issued.clone()
    }

    /// Builds a correctly signed notification.
    pub fn notification(
        &self,
        order_reference: &str,
        transaction_status: &str,
        gross_amount: Money,
    ) -> GatewayNotification {
        let status_code = match transaction_status {
            "capture" | "settlement" => "200",
            "pending" => "201",
            _ => "202",
        };
        let gross_amount = format_gross_amount(gross_amount);
        GatewayNotification {
            order_id: order_reference.to_string(),
            transaction_status: transaction_status.to_string(),
            fraud_status: None,
            status_code: status_code.to_string(),
            signature_key: notification_signature(
                order_reference,
                status_code,
                &gross_amount,
                &self.server_key,
            ),
            gross_amount,
            transaction_id: Some(format!("mem-{order_reference}")),
            payment_type: Some("bank_transfer".to_string()),
        }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn issue_payment_token(
        &self,
        request: &TokenRequest,
    ) -> Result<GatewayToken, GatewayError> {
        let mut state = self.state();
        if let Some(error) = state.token_failure.clone() {
            return Err(error);
        }
        state.issued.push(request.clone());

        let token = format!("tok-{}", request.order_reference);
        let redirect_url = format!("https://pay.invalid/{token}");
        Ok(GatewayToken {
            raw: json!({ "token": token, "redirect_url": redirect_url }),
            token,
            redirect_url: Some(redirect_url),
            payment_code: None,
        })
    }

    async fn fetch_status(
        &self,
        order_reference: &str,
    ) -> Result<GatewayStatusReport, GatewayError> {
        let state = self.state();
        if let Some(error) = state.status_failure.clone() {
            return Err(error);
        }
        let status = state
            .statuses
            .get(order_reference)
            .copied()
            .unwrap_or(GatewayStatus::Pending);

        Ok(GatewayStatusReport {
            order_reference: order_reference.to_string(),
            status,
            transaction_id: Some(format!("mem-{order_reference}")),
            gross_amount: None,
            raw: json!({ "order_id": order_reference, "status": status.as_str() }),
        })
    }

    fn verify_notification(&self, notification: &GatewayNotification) -> Result<(), GatewayError> {
        verify_signature(notification, &self.server_key)
    }
}

/// Checks `signature_key` against the server key.
pub(crate) fn verify_signature(
    notification: &GatewayNotification,
    server_key: &str,
) -> Result<(), GatewayError> {
    let expected = notification_signature(
        &notification.order_id,
        &notification.status_code,
        &notification.gross_amount,
        server_key,
    );
    if expected.eq_ignore_ascii_case(&notification.signature_key) {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature)
    }
}
