//! HTTP client for the game top-up reseller API.

use std::time::Duration;

use async_trait::async_trait;
use domain::GameAccount;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use super::provider::{
    FulfillmentProvider, PlaceOrderRequest, PlacedOrder, ProviderError, ProviderStatus,
    ProviderStatusReport, VerifiedAccount,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response envelope shared by every endpoint.
#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct NicknameData {
    nickname: String,
}

#[derive(Deserialize)]
struct OrderData {
    trxid: String,
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct StatusData {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Request signature: hex(sha256(api_id + api_key + reference)).
pub fn request_signature(api_id: &str, api_key: &str, reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_id.as_bytes());
    hasher.update(api_key.as_bytes());
    hasher.update(reference.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fulfillment provider client for a JSON reseller API.
#[derive(Debug, Clone)]
pub struct TopUpProviderClient {
    client: Client,
    base_url: String,
    api_id: String,
    api_key: String,
}

impl TopUpProviderClient {
    pub fn new(
        base_url: impl Into<String>,
        api_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_id: api_id.into(),
            api_key: api_key.into(),
        })
    }

    fn sign(&self, reference: &str) -> String {
        request_signature(&self.api_id, &self.api_key, reference)
    }

    /// Posts a request and unwraps the envelope. Returns `(data, raw)`.
    async fn call(&self, path: &str, body: Value) -> Result<(Value, Value), ProviderError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!(
                "provider returned {status}"
            )));
        }
        if status.is_client_error() {
            let message = response.text().await.unwrap_or_else(|e| e.to_string());
            return Err(ProviderError::Rejected(format!("{status}: {message}")));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let envelope: Envelope = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if !envelope.success {
            return Err(ProviderError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| "request refused".to_string()),
            ));
        }
        Ok((envelope.data, raw))
    }
}

fn parse<T: for<'de> Deserialize<'de>>(data: Value) -> Result<T, ProviderError> {
    serde_json::from_value(data).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl FulfillmentProvider for TopUpProviderClient {
    #[tracing::instrument(skip(self, account), fields(user_id = %account.user_id))]
    async fn verify_account(
        &self,
        game_code: &str,
        account: &GameAccount,
    ) -> Result<VerifiedAccount, ProviderError> {
        let body = json!({
            "api_id": self.api_id,
            "game_code": game_code,
            "user_id": account.user_id,
            "zone_id": account.server_id,
            "sign": self.sign(&account.user_id),
        });

        let (data, _) = self.call("/v1/nickname", body).await.map_err(|e| match e {
            ProviderError::Rejected(message) => ProviderError::AccountVerificationFailed(message),
            other => other,
        })?;
        let data: NicknameData = parse(data)?;

        Ok(VerifiedAccount {
            nickname: data.nickname,
        })
    }

    #[tracing::instrument(skip(self, request), fields(reference = %request.reference))]
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<PlacedOrder, ProviderError> {
        let body = json!({
            "api_id": self.api_id,
            "reference": request.reference,
            "service_code": request.provider_code,
            "user_id": request.account.user_id,
            "zone_id": request.account.server_id,
            "sign": self.sign(&request.reference),
        });

        let (data, raw) = self.call("/v1/order", body).await?;
        let data: OrderData = parse(data)?;

        Ok(PlacedOrder {
            provider_ref: data.trxid,
            status: ProviderStatus::normalize(&data.status),
            message: data.message,
            raw,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn poll_status(&self, provider_ref: &str) -> Result<ProviderStatusReport, ProviderError> {
        let body = json!({
            "api_id": self.api_id,
            "trxid": provider_ref,
            "sign": self.sign(provider_ref),
        });

        let (data, raw) = self.call("/v1/status", body).await?;
        let data: StatusData = parse(data)?;

        Ok(ProviderStatusReport {
            status: ProviderStatus::normalize(&data.status),
            message: data.message,
            raw,
        })
    }
}
