//! HTTP client for a Snap-style tokenized checkout gateway.

use std::time::Duration;

use async_trait::async_trait;
use domain::PaymentChannel;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::gateway::{
    GatewayError, GatewayNotification, GatewayStatus, GatewayStatusReport, GatewayToken,
    PaymentGateway, TokenRequest, parse_gross_amount, verify_signature,
};

const SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com";
const PRODUCTION_SNAP_URL: &str = "https://app.midtrans.com";
const SANDBOX_API_URL: &str = "https://api.sandbox.midtrans.com";
const PRODUCTION_API_URL: &str = "https://api.midtrans.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct SnapTokenResponse {
    token: String,
    #[serde(default)]
    redirect_url: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    status_code: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    transaction_status: Option<String>,
    #[serde(default)]
    fraud_status: Option<String>,
    #[serde(default)]
    gross_amount: Option<String>,
    #[serde(default)]
    transaction_id: Option<String>,
}

/// Payment gateway client speaking the Snap checkout and v2 status APIs.
///
/// Authenticates with HTTP basic auth, server key as the user name.
#[derive(Debug, Clone)]
pub struct SnapGatewayClient {
    client: Client,
    server_key: String,
    snap_base_url: String,
    api_base_url: String,
}

impl SnapGatewayClient {
    /// Creates a client for the sandbox or production environment.
    pub fn new(server_key: impl Into<String>, production: bool) -> Result<Self, GatewayError> {
        let (snap, api) = if production {
            (PRODUCTION_SNAP_URL, PRODUCTION_API_URL)
        } else {
            (SANDBOX_SNAP_URL, SANDBOX_API_URL)
        };
        Self::with_base_urls(server_key, snap, api)
    }

    /// Creates a client against explicit base URLs.
    pub fn with_base_urls(
        server_key: impl Into<String>,
        snap_base_url: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            server_key: server_key.into(),
            snap_base_url: trim_base(snap_base_url.into()),
            api_base_url: trim_base(api_base_url.into()),
        })
    }

    async fn read_json(response: Response) -> Result<Value, GatewayError> {
        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("gateway returned {status}")));
        }
        if status.is_client_error() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| e.to_string());
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn enabled_payment(channel: PaymentChannel) -> Option<&'static str> {
    match channel {
        PaymentChannel::Qris => Some("other_qris"),
        PaymentChannel::Any => None,
        other => Some(other.as_str()),
    }
}

fn token_body(request: &TokenRequest) -> Value {
    let items: Vec<Value> = request
        .items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "name": item.name,
                "price": item.price.amount(),
                "quantity": item.quantity,
            })
        })
        .collect();

    let mut body = json!({
        "transaction_details": {
            "order_id": request.order_reference,
            "gross_amount": request.gross_amount.amount(),
        },
        "item_details": items,
    });

    if let Some(customer) = &request.customer {
        body["customer_details"] = json!({
            "first_name": customer.name,
            "email": customer.email,
            "phone": customer.phone,
        });
    }
    if let Some(payment) = enabled_payment(request.channel) {
        body["enabled_payments"] = json!([payment]);
    }
    body
}

#[async_trait]
impl PaymentGateway for SnapGatewayClient {
    fn name(&self) -> &str {
        "midtrans"
    }

    #[tracing::instrument(skip(self, request), fields(order = %request.order_reference))]
    async fn issue_payment_token(
        &self,
        request: &TokenRequest,
    ) -> Result<GatewayToken, GatewayError> {
        let response = self
            .client
            .post(format!("{}/snap/v1/transactions", self.snap_base_url))
            .basic_auth(&self.server_key, Some(""))
            .json(&token_body(request))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let raw = Self::read_json(response).await?;
        let parsed: SnapTokenResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        tracing::debug!("snap token issued");
        Ok(GatewayToken {
            token: parsed.token,
            redirect_url: parsed.redirect_url,
            payment_code: None,
            raw,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_status(
        &self,
        order_reference: &str,
    ) -> Result<GatewayStatusReport, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v2/{}/status", self.api_base_url, order_reference))
            .basic_auth(&self.server_key, Some(""))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        // 404: the customer has not picked a channel yet.
        let not_yet_created = |raw: Value| GatewayStatusReport {
            order_reference: order_reference.to_string(),
            status: GatewayStatus::Pending,
            transaction_id: None,
            gross_amount: None,
            raw,
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(not_yet_created(json!({ "status_code": "404" })));
        }
        let raw = Self::read_json(response).await?;
        let parsed: StatusResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        if parsed.status_code == "404" {
            return Ok(not_yet_created(raw));
        }

        let transaction_status = parsed.transaction_status.as_deref().ok_or_else(|| {
            GatewayError::InvalidResponse(format!(
                "status {} without transaction_status: {}",
                parsed.status_code,
                parsed.status_message.as_deref().unwrap_or("")
            ))
        })?;
        let status = GatewayStatus::normalize(transaction_status, parsed.fraud_status.as_deref());

        Ok(GatewayStatusReport {
            order_reference: order_reference.to_string(),
            status,
            transaction_id: parsed.transaction_id.clone(),
            gross_amount: parsed.gross_amount.as_deref().and_then(parse_gross_amount),
            raw,
        })
    }

    fn verify_notification(&self, notification: &GatewayNotification) -> Result<(), GatewayError> {
        verify_signature(notification, &self.server_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::{CustomerDetails, ItemDetail};
    use domain::Money;

    fn request(channel: PaymentChannel) -> TokenRequest {
        TokenRequest {
            order_reference: "TU1".to_string(),
            gross_amount: Money::new(18000),
            items: vec![ItemDetail {
                id: "ml-86".to_string(),
                name: "Mobile Legends - 86 Diamonds".to_string(),
                price: Money::new(14000),
                quantity: 1,
            }],
            customer: Some(CustomerDetails {
                name: Some("Buyer".to_string()),
                email: Some("buyer@example.com".to_string()),
                phone: None,
            }),
            channel,
        }
    }

    #[test]
    fn test_token_body_shape() {
        let body = token_body(&request(PaymentChannel::BcaVa));

        assert_eq!(body["transaction_details"]["order_id"], "TU1");
        assert_eq!(body["transaction_details"]["gross_amount"], 18000);
        assert_eq!(body["item_details"][0]["price"], 14000);
        assert_eq!(body["customer_details"]["email"], "buyer@example.com");
        assert_eq!(body["enabled_payments"], json!(["bca_va"]));
    }

    #[test]
    fn test_any_channel_leaves_choice_to_gateway() {
        let body = token_body(&request(PaymentChannel::Any));
        assert!(body.get("enabled_payments").is_none());

        let body = token_body(&request(PaymentChannel::Qris));
        assert_eq!(body["enabled_payments"], json!(["other_qris"]));
    }

    #[test]
    fn test_environment_urls() {
        let sandbox = SnapGatewayClient::new("key", false).unwrap();
        assert_eq!(sandbox.snap_base_url, SANDBOX_SNAP_URL);
        assert_eq!(sandbox.api_base_url, SANDBOX_API_URL);

        let production = SnapGatewayClient::new("key", true).unwrap();
        assert_eq!(production.snap_base_url, PRODUCTION_SNAP_URL);
        assert_eq!(production.api_base_url, PRODUCTION_API_URL);
    }
}
