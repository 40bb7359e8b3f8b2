use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the hosted payment provider. One instance is shared across
/// handlers; all calls are single-shot with a finite timeout and no retries.
#[derive(Debug, Clone)]
pub struct RazorpayClient {
    key_id: String,
    key_secret: String,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Error)]
pub enum RazorpayError {
    #[error("Razorpay API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QrCode {
    pub id: String,
    pub image_url: String,
    pub status: Option<String>,
    #[serde(default)]
    pub payments_amount_received: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QrNotes {
    pub order_id: String,
    pub machine_id: String,
    pub customer_name: String,
    pub customer_phone: String,
}

/// A QR image URL is only trusted when it points at the provider's own
/// domains; anything else must be treated as a failed QR generation.
pub fn is_provider_qr_url(url: &str) -> bool {
    url.contains("rzp.io") || url.contains("razorpay")
}

impl RazorpayClient {
    pub fn new(key_id: String, key_secret: String, base_url: String) -> Self {
        Self {
            key_id,
            key_secret,
            client: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn create_order(
        &self,
        amount_paise: i64,
        receipt: &str,
    ) -> Result<ProviderOrder, RazorpayError> {
        let body = serde_json::json!({
            "amount": amount_paise,
            "currency": "INR",
            "receipt": receipt,
            "payment_capture": 1,
        });

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| RazorpayError::Network(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Creates a single-use fixed-amount UPI QR code that expires after one
    /// hour. The order id travels in `notes` so webhook events can be mapped
    /// back to the local row.
    pub async fn create_qr_code(
        &self,
        amount_paise: i64,
        label: &str,
        description: &str,
        notes: &QrNotes,
    ) -> Result<QrCode, RazorpayError> {
        let body = serde_json::json!({
            "type": "upi_qr",
            "name": label,
            "usage": "single_use",
            "fixed_amount": true,
            "payment_amount": amount_paise,
            "description": description,
            "close_by": chrono::Utc::now().timestamp() + 3600,
            "notes": notes,
        });

        let response = self
            .client
            .post(format!("{}/payments/qr_codes", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| RazorpayError::Network(e.to_string()))?;

        self.handle_response(response).await
    }

    pub async fn fetch_qr_code(&self, qr_code_id: &str) -> Result<QrCode, RazorpayError> {
        let response = self
            .client
            .get(format!("{}/payments/qr_codes/{}", self.base_url, qr_code_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| RazorpayError::Network(e.to_string()))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RazorpayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RazorpayError::Network(e.to_string()))?;

        if !status.is_success() {
            #[derive(Deserialize)]
            struct ApiError {
                error: ApiErrorDetail,
            }

            #[derive(Deserialize)]
            struct ApiErrorDetail {
                description: String,
            }

            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                return Err(RazorpayError::Api(error.error.description));
            }

            return Err(RazorpayError::Api(format!("HTTP {}: {}", status, body)));
        }

        serde_json::from_str(&body).map_err(|e| RazorpayError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: String) -> RazorpayClient {
        RazorpayClient::new("rzp_test_key".to_string(), "secret".to_string(), base_url)
    }

    #[tokio::test]
    async fn create_order_sends_amount_in_paise() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "amount": 5000,
                "currency": "INR",
                "receipt": "BB1700000000000",
            })))
            .with_status(200)
            .with_body(
                r#"{"id":"order_abc","amount":5000,"currency":"INR","receipt":"BB1700000000000","status":"created"}"#,
            )
            .create_async()
            .await;

        let order = client(server.url())
            .create_order(5000, "BB1700000000000")
            .await
            .unwrap();
        assert_eq!(order.id, "order_abc");
        assert_eq!(order.amount, 5000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_surface_the_provider_description() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/orders")
            .with_status(401)
            .with_body(r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"Authentication failed"}}"#)
            .create_async()
            .await;

        let err = client(server.url()).create_order(100, "BB1").await.unwrap_err();
        match err {
            RazorpayError::Api(msg) => assert_eq!(msg, "Authentication failed"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/payments/qr_codes")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let notes = QrNotes {
            order_id: "BB1".to_string(),
            machine_id: "VM-001".to_string(),
            customer_name: "Unknown".to_string(),
            customer_phone: "Unknown".to_string(),
        };
        let err = client(server.url())
            .create_qr_code(100, "Order", "test", &notes)
            .await
            .unwrap_err();
        assert!(matches!(err, RazorpayError::Parse(_)));
    }

    #[tokio::test]
    async fn fetch_qr_code_reads_received_amount() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/payments/qr_codes/qr_123")
            .with_status(200)
            .with_body(
                r#"{"id":"qr_123","image_url":"https://rzp.io/i/abc","status":"closed","payments_amount_received":2500}"#,
            )
            .create_async()
            .await;

        let qr = client(server.url()).fetch_qr_code("qr_123").await.unwrap();
        assert_eq!(qr.status.as_deref(), Some("closed"));
        assert_eq!(qr.payments_amount_received, 2500);
    }

    #[test]
    fn only_provider_urls_count_as_genuine() {
        assert!(is_provider_qr_url("https://rzp.io/i/abc"));
        assert!(is_provider_qr_url("https://api.razorpay.com/qr/abc.png"));
        assert!(!is_provider_qr_url("https://example.com/fake-qr.png"));
    }
}
