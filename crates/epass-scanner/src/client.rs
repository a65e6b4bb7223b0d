//! HTTP client for the E-Pass ledger API.
//!
//! Wraps the three endpoints the scanner talks to: single-scan verify,
//! batch reconciliation, and cache refresh.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use thiserror::Error;

use epass_core::api::{
    BatchSyncRequest, BatchSyncResponse, CachePayload, ErrorResponse, VerifyRequest,
    VerifyResponse,
};

/// Ledger API client errors.
///
/// `Transport` and `Rejected` drive very different behavior upstream:
/// a transport failure means "fall back to offline / retry later", a
/// rejection is the ledger's final word on the pass.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The ledger answered and denied the scan (`PASS_NOT_FOUND`,
    /// `PASS_INACTIVE`, `REGISTRATION_NOT_PAID`, ...).
    #[error("Ledger rejected the request ({status}): {code}")]
    Rejected { status: u16, code: String },

    #[error("Unexpected ledger response ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the failure is a connectivity problem rather than an
    /// answer from the ledger.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            // 5xx means the ledger did not produce a decision either.
            Self::Api { status, .. } => *status >= 500,
            Self::Rejected { .. } | Self::Config(_) => false,
        }
    }
}

/// Ledger HTTP API client.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl LedgerClient {
    /// Create a client for the given ledger.
    ///
    /// `operator` is sent with every request as `x-operator`, and
    /// `bearer_token` (when configured) as an Authorization header.
    pub fn new(
        base_url: &str,
        operator: &str,
        bearer_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        if base_url.is_empty() {
            return Err(ClientError::Config("ledger_url is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let operator_val = HeaderValue::from_str(operator)
            .map_err(|_| ClientError::Config("Invalid operator id".into()))?;
        headers.insert("x-operator", operator_val);
        if let Some(token) = bearer_token {
            let token_val = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::Config("Invalid bearer token format".into()))?;
            headers.insert(AUTHORIZATION, token_val);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Decode a non-success response into the ledger's rejection code,
    /// falling back to the HTTP reason when the body is not our error
    /// shape.
    async fn decode_error(resp: reqwest::Response) -> ClientError {
        let status = resp.status();
        match resp.json::<ErrorResponse>().await {
            Ok(body) if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN => {
                ClientError::Rejected {
                    status: status.as_u16(),
                    code: body.error,
                }
            }
            Ok(body) => ClientError::Api {
                status: status.as_u16(),
                message: body.error,
            },
            Err(_) => ClientError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            },
        }
    }

    /// `POST /checkin/verify`: online single-scan verification.
    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/checkin/verify"))
            .json(request)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::decode_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// `POST /checkin/batch-sync`: submit queued offline admissions.
    pub async fn batch_sync(
        &self,
        request: &BatchSyncRequest,
    ) -> Result<BatchSyncResponse, ClientError> {
        let resp = self
            .http
            .post(self.url("/checkin/batch-sync"))
            .json(request)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::decode_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// `GET /checkin/epass-cache`: fetch the full replacement snapshot
    /// for one event.
    pub async fn fetch_cache(&self, event_id: &str) -> Result<CachePayload, ClientError> {
        let resp = self
            .http
            .get(self.url("/checkin/epass-cache"))
            .query(&[("eventId", event_id)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::decode_error(resp).await);
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_base_url_is_rejected() {
        let err = LedgerClient::new("", "gate-a", None, Duration::from_secs(5));
        assert!(matches!(err, Err(ClientError::Config(_))));
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let client =
            LedgerClient::new("http://ledger.local:8090/", "gate-a", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.url("/checkin/verify"), "http://ledger.local:8090/checkin/verify");
    }

    #[test]
    fn server_errors_count_as_transport() {
        let err = ClientError::Api { status: 503, message: "unavailable".into() };
        assert!(err.is_transport());

        let err = ClientError::Rejected { status: 404, code: "PASS_NOT_FOUND".into() };
        assert!(!err.is_transport());
    }
}
