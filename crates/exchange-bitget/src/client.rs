//! Bitget REST client.
//!
//! Thin transport layer: signs requests, enforces the configured timeout,
//! unwraps the `{code, msg, data}` envelope, and classifies business errors
//! into the [`GatewayError`] taxonomy. Endpoint knowledge lives in the
//! gateway, not here.

use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use perp_scalper_core::{ExchangeConfig, GatewayError, GatewayResult};

use crate::signing::{canonical_query, sign_request};

/// Bitget API success code.
const CODE_OK: &str = "00000";

#[derive(Clone)]
pub struct BitgetClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    passphrase: String,
}

impl BitgetClient {
    /// Creates an authenticated client from the exchange configuration.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` if credentials are missing or
    /// the HTTP client cannot be built.
    pub fn new(config: &ExchangeConfig) -> GatewayResult<Self> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(GatewayError::Configuration(
                "exchange.api_key and exchange.api_secret are required".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            passphrase: config.passphrase.clone(),
        })
    }

    /// GET on a public (unauthenticated) endpoint.
    pub async fn get_public(&self, path: &str, params: &[(&str, &str)]) -> GatewayResult<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::unwrap_envelope(response).await
    }

    /// GET on an authenticated endpoint.
    pub async fn get_signed(&self, path: &str, params: &[(&str, &str)]) -> GatewayResult<Value> {
        let query = canonical_query(params);
        let sign_path = if query.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{query}")
        };

        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign_request(&self.api_secret, &timestamp, "GET", &sign_path, "")?;

        let url = format!("{}{sign_path}", self.base_url);
        let response = self
            .auth_headers(self.http.get(&url), &timestamp, &signature)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::unwrap_envelope(response).await
    }

    /// POST on an authenticated endpoint with a JSON body.
    pub async fn post_signed(&self, path: &str, body: &Value) -> GatewayResult<Value> {
        let body_str = serde_json::to_string(body)
            .map_err(|e| GatewayError::Serialization(e.to_string()))?;

        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign_request(&self.api_secret, &timestamp, "POST", path, &body_str)?;

        let url = format!("{}{path}", self.base_url);
        let response = self
            .auth_headers(self.http.post(&url), &timestamp, &signature)
            .header("Content-Type", "application/json")
            .body(body_str)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::unwrap_envelope(response).await
    }

    fn auth_headers(
        &self,
        request: reqwest::RequestBuilder,
        timestamp: &str,
        signature: &str,
    ) -> reqwest::RequestBuilder {
        request
            .header("ACCESS-KEY", &self.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", timestamp)
            .header("ACCESS-PASSPHRASE", &self.passphrase)
    }

    /// Unwraps the `{code, msg, data}` envelope, classifying failures.
    async fn unwrap_envelope(response: reqwest::Response) -> GatewayResult<Value> {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GatewayError::rate_limit(1));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Serialization(format!("invalid response body: {e}")))?;

        let code = body
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if code == CODE_OK {
            return Ok(body.get("data").cloned().unwrap_or(Value::Null));
        }

        let message = body
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();

        Err(classify_api_error(&code, &message))
    }
}

/// Maps reqwest transport failures into the gateway taxonomy.
pub(crate) fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(err.to_string())
    } else if err.is_connect() {
        GatewayError::Network(format!("connection failed: {err}"))
    } else {
        GatewayError::Network(err.to_string())
    }
}

/// Classifies a Bitget business error by code and message.
pub(crate) fn classify_api_error(code: &str, message: &str) -> GatewayError {
    let lower = message.to_lowercase();

    if lower.contains("no position to close") || lower.contains("position does not exist") {
        return GatewayError::NoPositionToClose;
    }
    if lower.contains("insufficient") || lower.contains("exceeds") || lower.contains("balance") {
        return GatewayError::OrderRejected(message.to_string());
    }
    if lower.contains("signature") || lower.contains("apikey") || lower.contains("api key") {
        return GatewayError::Authentication(message.to_string());
    }
    if lower.contains("too many requests") || lower.contains("request rate") {
        return GatewayError::rate_limit(1);
    }

    GatewayError::api(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_no_position() {
        assert!(matches!(
            classify_api_error("22002", "No position to close"),
            GatewayError::NoPositionToClose
        ));
    }

    #[test]
    fn classify_insufficient_balance_as_rejection() {
        assert!(matches!(
            classify_api_error("40754", "Insufficient balance"),
            GatewayError::OrderRejected(_)
        ));
    }

    #[test]
    fn classify_bad_signature_as_auth() {
        assert!(matches!(
            classify_api_error("40009", "signature verification failed"),
            GatewayError::Authentication(_)
        ));
    }

    #[test]
    fn classify_unknown_as_api_error() {
        let err = classify_api_error("40786", "duplicate clientOid");
        assert!(matches!(err, GatewayError::Api { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn client_requires_credentials() {
        let config = ExchangeConfig {
            api_url: "https://api.bitget.com".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            passphrase: String::new(),
            symbol: "BTCUSDT".to_string(),
            product_type: "USDT-FUTURES".to_string(),
            margin_coin: "USDT".to_string(),
            timeout_secs: 5,
        };
        assert!(matches!(
            BitgetClient::new(&config),
            Err(GatewayError::Configuration(_))
        ));
    }
}
