//! HTTP adapter tests against in-process mock servers.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use domain::{GameAccount, Money, PaymentChannel};
use saga::services::{ItemDetail, TokenRequest, request_signature};
use saga::{
    FulfillmentProvider, GatewayError, GatewayStatus, PaymentGateway, PlaceOrderRequest,
    ProviderError, ProviderStatus, SnapGatewayClient, TopUpProviderClient,
};
use serde_json::{Value, json};

type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn token_request() -> TokenRequest {
    TokenRequest {
        order_reference: "TU240501100000123".to_string(),
        gross_amount: Money::new(18000),
        items: vec![
            ItemDetail {
                id: "ml-86".to_string(),
                name: "Mobile Legends - 86 Diamonds".to_string(),
                price: Money::new(14000),
                quantity: 1,
            },
            ItemDetail {
                id: "ADMIN_FEE".to_string(),
                name: "Admin fee".to_string(),
                price: Money::new(4000),
                quantity: 1,
            },
        ],
        customer: None,
        channel: PaymentChannel::BcaVa,
    }
}

async fn capture(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    captured.lock().unwrap().push((auth, body));
    (
        StatusCode::CREATED,
        Json(json!({ "token": "snap-token", "redirect_url": "https://pay.example/snap-token" })),
    )
}

mod snap {
    use super::*;

    #[tokio::test]
    async fn test_issue_token_posts_transaction() {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route("/snap/v1/transactions", post(capture))
            .with_state(captured.clone());
        let base = serve(router).await;
        let client = SnapGatewayClient::with_base_urls("server-key", &base, &base).unwrap();

        let token = client.issue_payment_token(&token_request()).await.unwrap();

        assert_eq!(token.token, "snap-token");
        assert_eq!(
            token.redirect_url.as_deref(),
            Some("https://pay.example/snap-token")
        );

        let requests = captured.lock().unwrap();
        let (auth, body) = &requests[0];
        assert!(auth.as_deref().unwrap().starts_with("Basic "));
        assert_eq!(body["transaction_details"]["order_id"], "TU240501100000123");
        assert_eq!(body["transaction_details"]["gross_amount"], 18000);
        assert_eq!(body["item_details"].as_array().unwrap().len(), 2);
        assert_eq!(body["enabled_payments"], json!(["bca_va"]));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let router = Router::new().route(
            "/snap/v1/transactions",
            post(|| async { StatusCode::BAD_GATEWAY }),
        );
        let base = serve(router).await;
        let client = SnapGatewayClient::with_base_urls("server-key", &base, &base).unwrap();

        let result = client.issue_payment_token(&token_request()).await;

        let err = result.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_is_rejected() {
        let router = Router::new().route(
            "/snap/v1/transactions",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error_messages": ["gross_amount is not equal to item_details"] })),
                )
            }),
        );
        let base = serve(router).await;
        let client = SnapGatewayClient::with_base_urls("server-key", &base, &base).unwrap();

        let result = client.issue_payment_token(&token_request()).await;

        assert!(matches!(
            result,
            Err(GatewayError::Rejected { status: 400, ref message }) if message.contains("gross_amount")
        ));
    }

    #[tokio::test]
    async fn test_fetch_status_normalizes_settlement() {
        let router = Router::new().route(
            "/v2/{order_id}/status",
            get(|Path(order_id): Path<String>| async move {
                Json(json!({
                    "status_code": "200",
                    "order_id": order_id,
                    "transaction_status": "settlement",
                    "gross_amount": "18000.00",
                    "transaction_id": "gw-1",
                }))
            }),
        );
        let base = serve(router).await;
        let client = SnapGatewayClient::with_base_urls("server-key", &base, &base).unwrap();

        let report = client.fetch_status("TU1").await.unwrap();

        assert_eq!(report.order_reference, "TU1");
        assert_eq!(report.status, GatewayStatus::Success);
        assert_eq!(report.gross_amount, Some(Money::new(18000)));
        assert_eq!(report.transaction_id.as_deref(), Some("gw-1"));
        assert_eq!(report.raw["order_id"], "TU1");
    }

    #[tokio::test]
    async fn test_fetch_status_challenge_stays_pending() {
        let router = Router::new().route(
            "/v2/{order_id}/status",
            get(|| async {
                Json(json!({
                    "status_code": "201",
                    "transaction_status": "capture",
                    "fraud_status": "challenge",
                    "gross_amount": "18000.00",
                }))
            }),
        );
        let base = serve(router).await;
        let client = SnapGatewayClient::with_base_urls("server-key", &base, &base).unwrap();

        let report = client.fetch_status("TU1").await.unwrap();

        assert_eq!(report.status, GatewayStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_pending() {
        let router = Router::new().route(
            "/v2/{order_id}/status",
            get(|| async {
                Json(json!({
                    "status_code": "404",
                    "status_message": "Transaction doesn't exist.",
                }))
            }),
        );
        let base = serve(router).await;
        let client = SnapGatewayClient::with_base_urls("server-key", &base, &base).unwrap();

        let report = client.fetch_status("TU1").await.unwrap();

        assert_eq!(report.status, GatewayStatus::Pending);
        assert!(report.transaction_id.is_none());
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let client = SnapGatewayClient::with_base_urls("server-key", &base, &base).unwrap();

        let result = client.fetch_status("TU1").await;

        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }
}

mod topup {
    use super::*;

    fn place_request() -> PlaceOrderRequest {
        PlaceOrderRequest {
            reference: "TRX240501100000ABC123".to_string(),
            provider_code: "ML86".to_string(),
            account: GameAccount::new("12345678", Some("2001".to_string())),
        }
    }

    async fn record(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        captured.lock().unwrap().push((None, body));
        Json(json!({
            "success": true,
            "data": { "trxid": "DF123", "status": "Processing" },
        }))
    }

    #[tokio::test]
    async fn test_place_order_signs_reference() {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route("/v1/order", post(record))
            .with_state(captured.clone());
        let base = serve(router).await;
        let client = TopUpProviderClient::new(&base, "api-id", "api-key").unwrap();

        let placed = client.place_order(&place_request()).await.unwrap();

        assert_eq!(placed.provider_ref, "DF123");
        assert_eq!(placed.status, ProviderStatus::Processing);
        assert_eq!(placed.raw["data"]["trxid"], "DF123");

        let requests = captured.lock().unwrap();
        let (_, body) = &requests[0];
        assert_eq!(body["reference"], "TRX240501100000ABC123");
        assert_eq!(body["service_code"], "ML86");
        assert_eq!(body["zone_id"], "2001");
        assert_eq!(
            body["sign"],
            request_signature("api-id", "api-key", "TRX240501100000ABC123")
        );
    }

    #[tokio::test]
    async fn test_refused_order_is_rejected() {
        let router = Router::new().route(
            "/v1/order",
            post(|| async { Json(json!({ "success": false, "message": "Saldo tidak cukup" })) }),
        );
        let base = serve(router).await;
        let client = TopUpProviderClient::new(&base, "api-id", "api-key").unwrap();

        let result = client.place_order(&place_request()).await;

        assert_eq!(
            result.unwrap_err(),
            ProviderError::Rejected("Saldo tidak cukup".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let router = Router::new().route(
            "/v1/order",
            post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let base = serve(router).await;
        let client = TopUpProviderClient::new(&base, "api-id", "api-key").unwrap();

        let err = client.place_order(&place_request()).await.unwrap_err();

        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_garbled_response_is_invalid() {
        let router = Router::new().route("/v1/order", post(|| async { "<html>oops</html>" }));
        let base = serve(router).await;
        let client = TopUpProviderClient::new(&base, "api-id", "api-key").unwrap();

        let err = client.place_order(&place_request()).await.unwrap_err();

        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_poll_status_normalizes_vocabulary() {
        let router = Router::new().route(
            "/v1/status",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["trxid"], "DF123");
                Json(json!({
                    "success": true,
                    "data": { "status": "Sukses", "message": "SN 1234" },
                }))
            }),
        );
        let base = serve(router).await;
        let client = TopUpProviderClient::new(&base, "api-id", "api-key").unwrap();

        let report = client.poll_status("DF123").await.unwrap();

        assert_eq!(report.status, ProviderStatus::Success);
        assert_eq!(report.message.as_deref(), Some("SN 1234"));
    }

    #[tokio::test]
    async fn test_nickname_lookup() {
        let router = Router::new().route(
            "/v1/nickname",
            post(|Json(body): Json<Value>| async move {
                if body["user_id"] == "12345678" {
                    Json(json!({ "success": true, "data": { "nickname": "PlayerOne" } }))
                } else {
                    Json(json!({ "success": false, "message": "ID tidak ditemukan" }))
                }
            }),
        );
        let base = serve(router).await;
        let client = TopUpProviderClient::new(&base, "api-id", "api-key").unwrap();

        let known = GameAccount::new("12345678", Some("2001".to_string()));
        let verified = client.verify_account("mobilelegends", &known).await.unwrap();
        assert_eq!(verified.nickname, "PlayerOne");

        let unknown = GameAccount::new("999", None);
        let err = client
            .verify_account("mobilelegends", &unknown)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::AccountVerificationFailed("ID tidak ditemukan".to_string())
        );
        assert!(!err.is_retryable());
    }
}
