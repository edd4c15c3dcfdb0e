//! Concurrent request forwarding
//!
//! One inbound webhook delivery becomes one outbound request per target.
//! All forwards run concurrently and every one settles into a
//! [`ForwardResult`]; a slow or dead target never delays or fails the
//! others.

use crate::config::ForwardConfig;
use crate::discovery::{Endpoint, TargetSource};
use crate::error::RelayResult;
use axum::body::Bytes;
use axum::http::header::{
    HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST, PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use axum::http::{HeaderMap, Method};
use futures::future::join_all;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of one forward: the target's status code, or a transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardStatus {
    Code(u16),
    Error,
}

impl Serialize for ForwardStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ForwardStatus::Code(code) => serializer.serialize_u16(*code),
            ForwardStatus::Error => serializer.serialize_str("error"),
        }
    }
}

/// Per-target entry of the relay response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardResult {
    pub port: u16,
    pub status: ForwardStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of every relay response
#[derive(Debug, Clone, Serialize)]
pub struct RelayResponse {
    pub fanout: bool,
    pub forwarded_to: Vec<ForwardResult>,
}

impl RelayResponse {
    pub fn new(forwarded_to: Vec<ForwardResult>) -> Self {
        Self {
            fanout: true,
            forwarded_to,
        }
    }
}

/// Connection-scoped headers (RFC 7230 section 6.1) plus the length header,
/// which the client recomputes for the buffered body
static HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    CONTENT_LENGTH,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Not in `http`'s constants
const KEEP_ALIVE: &str = "keep-alive";
const PROXY_CONNECTION: &str = "proxy-connection";

/// Fully buffered inbound request
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path plus query string, e.g. `/webhooks/github?delivery=1`
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Fan-out relay core
pub struct Relay {
    client: reqwest::Client,
    targets: Arc<dyn TargetSource>,
    target_host: String,
}

impl Relay {
    pub fn new(
        targets: Arc<dyn TargetSource>,
        target_host: impl Into<String>,
        forward: &ForwardConfig,
    ) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(forward.request_timeout())
            // Webhook endpoints answer directly; a redirect would re-send the body elsewhere
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            targets,
            target_host: target_host.into(),
        })
    }

    /// Resolve the current target set without blocking the executor
    pub async fn discover(&self) -> BTreeSet<Endpoint> {
        let source = Arc::clone(&self.targets);
        match tokio::task::spawn_blocking(move || source.list_targets()).await {
            Ok(targets) => targets,
            Err(e) => {
                error!("Target discovery task failed: {}", e);
                self.targets.fallback_targets()
            }
        }
    }

    /// Forward `request` to every discovered target and collect the outcomes
    pub async fn relay(&self, request: InboundRequest) -> RelayResponse {
        let targets = self.discover().await;
        let ports: Vec<u16> = targets.iter().map(|endpoint| endpoint.port).collect();
        info!(
            "Fan-out {} {} -> {:?}",
            request.method, request.path_and_query, ports
        );

        let results = join_all(
            targets
                .iter()
                .map(|endpoint| self.forward(*endpoint, &request)),
        )
        .await;

        info!(
            "Fan-out {} {} results: {}",
            request.method,
            request.path_and_query,
            summarize(&results)
        );
        RelayResponse::new(results)
    }

    async fn forward(&self, endpoint: Endpoint, request: &InboundRequest) -> ForwardResult {
        let authority = format!("{}:{}", self.target_host, endpoint.port);
        let url = format!("http://{}{}", authority, request.path_and_query);

        let mut headers = request.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(HOST);
        if let Ok(host) = HeaderValue::from_str(&authority) {
            headers.insert(HOST, host);
        }

        let outcome = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await;

        match outcome {
            Ok(response) => ForwardResult {
                port: endpoint.port,
                status: ForwardStatus::Code(response.status().as_u16()),
                message: None,
            },
            Err(e) => ForwardResult {
                port: endpoint.port,
                status: ForwardStatus::Error,
                message: Some(error_chain(&e)),
            },
        }
    }
}

/// Drop headers that only apply to the inbound connection
///
/// Covers the fixed hop-by-hop set and any header the sender listed in
/// `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(KEEP_ALIVE);
    headers.remove(PROXY_CONNECTION);
}

/// `4001=200, 4011=error` style summary for logs
fn summarize(results: &[ForwardResult]) -> String {
    results
        .iter()
        .map(|result| match result.status {
            ForwardStatus::Code(code) => format!("{}={}", result.port, code),
            ForwardStatus::Error => format!(
                "{}=error ({})",
                result.port,
                result.message.as_deref().unwrap_or("unknown")
            ),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// reqwest's top-level message hides the cause (e.g. "connection refused")
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forward_result_wire_format() {
        let ok = ForwardResult {
            port: 4001,
            status: ForwardStatus::Code(200),
            message: None,
        };
        let failed = ForwardResult {
            port: 4011,
            status: ForwardStatus::Error,
            message: Some("connection refused".to_string()),
        };
        let body = serde_json::to_value(RelayResponse::new(vec![ok, failed])).unwrap();

        assert_eq!(
            body,
            json!({
                "fanout": true,
                "forwarded_to": [
                    {"port": 4001, "status": 200},
                    {"port": 4011, "status": "error", "message": "connection refused"},
                ]
            })
        );
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("connection", "keep-alive, x-hop-token"),
            ("keep-alive", "timeout=5"),
            ("proxy-connection", "keep-alive"),
            ("te", "trailers"),
            ("trailer", "expires"),
            ("transfer-encoding", "chunked"),
            ("upgrade", "websocket"),
            ("proxy-authorization", "Basic Zm9vOmJhcg=="),
            ("content-length", "12"),
            ("x-hop-token", "secret"),
            ("x-github-event", "push"),
            ("x-hub-signature-256", "sha256=abc"),
            ("content-type", "application/json"),
        ] {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        strip_hop_by_hop(&mut headers);

        let mut remaining: Vec<&str> = headers.keys().map(HeaderName::as_str).collect();
        remaining.sort_unstable();
        assert_eq!(
            remaining,
            vec!["content-type", "x-github-event", "x-hub-signature-256"]
        );
    }

    #[test]
    fn test_summarize() {
        let results = vec![
            ForwardResult {
                port: 4001,
                status: ForwardStatus::Code(204),
                message: None,
            },
            ForwardResult {
                port: 4011,
                status: ForwardStatus::Error,
                message: Some("timed out".to_string()),
            },
        ];
        assert_eq!(summarize(&results), "4001=204, 4011=error (timed out)");
        assert_eq!(summarize(&[]), "");
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let outer = std::io::Error::new(std::io::ErrorKind::Other, inner);
        // io::Error with a custom payload reports the payload as its message
        assert!(error_chain(&outer).contains("connection refused"));
    }
}
