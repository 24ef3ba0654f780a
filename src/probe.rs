//! One-shot bearer-key validation against a models listing endpoint.

use serde_json::Value;
use tracing::{info, warn};

use crate::config::ProbeConfig;
use crate::error::{LoopError, Result};

pub const DEFAULT_PROBE_ENDPOINT: &str = "https://api.openai.com/v1/models";

/// What the endpoint's error body told us about a rejected key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    Message(String),
    NoMessage,
    Unparseable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    Valid,
    Invalid { status: u16, detail: ErrorDetail },
    RequestFailed(String),
}

impl KeyCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, KeyCheck::Valid)
    }
}

#[derive(Clone)]
pub struct KeyProber {
    http: reqwest::Client,
    endpoint: String,
}

impl KeyProber {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| LoopError::Protocol(format!("http client error: {err}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(cfg: &ProbeConfig) -> Result<Self> {
        Self::new(cfg.endpoint.clone())
    }

    /// Issue a single GET with `api_key` as bearer token and report the verdict.
    pub async fn check_key(&self, api_key: &str) -> KeyCheck {
        let resp = self
            .http
            .get(&self.endpoint)
            .bearer_auth(api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(err) => {
                warn!(endpoint = %self.endpoint, error = %err, "key check request failed");
                return KeyCheck::RequestFailed(err.to_string());
            }
        };

        let status = resp.status();
        if status == reqwest::StatusCode::OK {
            info!(endpoint = %self.endpoint, "key is valid");
            return KeyCheck::Valid;
        }

        let detail = match resp.text().await {
            Ok(body) => error_detail(&body),
            Err(err) => {
                warn!(error = %err, "could not read error response body");
                ErrorDetail::Unparseable
            }
        };

        match &detail {
            ErrorDetail::Message(message) => {
                warn!(status = status.as_u16(), %message, "key is invalid")
            }
            ErrorDetail::NoMessage => warn!(status = status.as_u16(), "key is invalid"),
            ErrorDetail::Unparseable => warn!(
                status = status.as_u16(),
                "key is invalid; could not parse error response"
            ),
        }

        KeyCheck::Invalid {
            status: status.as_u16(),
            detail,
        }
    }
}

/// Any well-formed JSON body counts as parsed, whatever its shape.
fn error_detail(body: &str) -> ErrorDetail {
    let Ok(body) = serde_json::from_str::<Value>(body) else {
        return ErrorDetail::Unparseable;
    };
    match body.pointer("/error/message").and_then(Value::as_str) {
        Some(message) => ErrorDetail::Message(message.to_string()),
        None => ErrorDetail::NoMessage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_error_message() {
        assert_eq!(
            error_detail(r#"{"error":{"message":"invalid key","type":"auth"}}"#),
            ErrorDetail::Message("invalid key".into())
        );
        assert_eq!(error_detail(r#"{"error":{}}"#), ErrorDetail::NoMessage);
        assert_eq!(error_detail(r#"{"detail":"nope"}"#), ErrorDetail::NoMessage);
        assert_eq!(error_detail("<html>502</html>"), ErrorDetail::Unparseable);
    }

    #[test]
    fn unexpected_json_shapes_have_no_message() {
        assert_eq!(error_detail(r#"{"error":"bad key"}"#), ErrorDetail::NoMessage);
        assert_eq!(error_detail(r#"{"error":{"message":5}}"#), ErrorDetail::NoMessage);
        assert_eq!(error_detail(r#"{"error":null}"#), ErrorDetail::NoMessage);
        assert_eq!(error_detail("[]"), ErrorDetail::NoMessage);
        assert_eq!(error_detail("\"denied\""), ErrorDetail::NoMessage);
    }

    #[tokio::test]
    async fn unreachable_host_is_request_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = KeyProber::new(format!("http://{addr}/v1/models")).unwrap();
        let verdict = prober.check_key("sk-anything").await;
        assert!(matches!(verdict, KeyCheck::RequestFailed(_)), "{verdict:?}");
    }
}
