//! `Transport` implementation backed by a pooled reqwest client.
//!
//! Status classes map onto the request error taxonomy:
//! - 2xx and 3xx: delivered
//! - 408 and 429: `TransientNetwork`
//! - other 4xx: `ClientRejected`
//! - 5xx: `ServerUnavailable`
//!
//! Connection failures and client-side timeouts are `TransientNetwork`.
//! The scheduler enforces its own per-tier timeout on top.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client as ReqwestClient, Method, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::errors::RequestError;
use crate::domain::models::{HttpMethod, ResponsePayload, TargetDescriptor, TransportConfig};
use crate::domain::ports::Transport;

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 512;

pub struct HttpTransport {
    http_client: ReqwestClient,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url)
        } else {
            format!("{}/{endpoint}", self.base_url)
        }
    }
}

const fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Classify a non-success status.
pub fn classify_status(status: StatusCode, body: &str) -> RequestError {
    let message = if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    };

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RequestError::TransientNetwork(format!("{status}: {message}"))
        }
        s if s.is_server_error() => RequestError::ServerUnavailable {
            status: s.as_u16(),
            message,
        },
        s => RequestError::ClientRejected {
            status: s.as_u16(),
            message,
        },
    }
}

fn classify_send_error(err: &reqwest::Error) -> RequestError {
    if err.is_builder() {
        RequestError::InvalidRequest(err.to_string())
    } else {
        RequestError::TransientNetwork(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, target, headers), fields(method = %target.method, endpoint = %target.endpoint))]
    async fn send(
        &self,
        target: &TargetDescriptor,
        headers: &BTreeMap<String, String>,
    ) -> Result<ResponsePayload, RequestError> {
        let mut request = self
            .http_client
            .request(method(target.method), self.url_for(&target.endpoint));

        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(content_type) = &target.content_type {
            request = request.header(header::CONTENT_TYPE, content_type.as_str());
        }
        if let Some(body) = &target.body {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(|e| classify_send_error(&e))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| RequestError::TransientNetwork(format!("failed to read response body: {e}")))?;

        debug!(status = status.as_u16(), bytes = body.len(), "response received");

        if status.is_success() || status.is_redirection() {
            Ok(ResponsePayload {
                status: status.as_u16(),
                content_type,
                body: body.to_vec(),
            })
        } else {
            Err(classify_status(status, &String::from_utf8_lossy(&body)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "busy"),
            RequestError::ServerUnavailable { status: 503, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            RequestError::TransientNetwork(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::REQUEST_TIMEOUT, ""),
            RequestError::TransientNetwork(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad field"),
            RequestError::ClientRejected { status: 422, .. }
        ));
    }

    #[test]
    fn test_long_error_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let RequestError::ServerUnavailable { message, .. } =
            classify_status(StatusCode::BAD_GATEWAY, &body)
        else {
            panic!("expected ServerUnavailable");
        };
        assert_eq!(message.len(), MAX_ERROR_BODY + 3);
    }

    #[test]
    fn test_url_joining() {
        let transport = HttpTransport::new(&TransportConfig {
            base_url: "https://api.example.com/".to_string(),
            ..TransportConfig::default()
        })
        .unwrap();

        assert_eq!(transport.url_for("/crew"), "https://api.example.com/crew");
        assert_eq!(transport.url_for("crew"), "https://api.example.com/crew");
        assert_eq!(transport.url_for("http://other/x"), "http://other/x");
    }
}
