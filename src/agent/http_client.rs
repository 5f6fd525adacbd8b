use std::error::Error as StdError;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::interface::{AgentEvaluator, ProxyOutcome};
use crate::config::AgentsConfig;
use crate::error::ConfigError;

/// Forwards idea submissions to the external agent service over HTTP.
///
/// One pooled client is built at startup; the auth header and timeout are
/// baked into it, so every call goes out identically.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpAgentClient {
    pub fn new(config: &AgentsConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .default_headers(outbound_headers(config)?)
            .timeout(config.timeout())
            .build()?;

        let endpoint = config.endpoint();
        info!(
            "Initialized agent client: endpoint={}, auth={}, timeout_ms={}",
            endpoint,
            config.has_access_key(),
            config.timeout_ms
        );

        Ok(Self {
            client,
            endpoint,
            timeout: config.timeout(),
        })
    }

    fn describe_error(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            return format!("timeout of {}ms exceeded", self.timeout.as_millis());
        }

        // reqwest's top-level message is generic; append the underlying causes.
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !message.contains(&cause_text) {
                message.push_str(": ");
                message.push_str(&cause_text);
            }
            source = cause.source();
        }
        message
    }
}

#[async_trait]
impl AgentEvaluator for HttpAgentClient {
    async fn evaluate(&self, body: &Value) -> ProxyOutcome {
        let span = info_span!("agent_call", request_id = %Uuid::new_v4());

        async move {
            let started = Instant::now();
            debug!("Forwarding evaluation to {}", self.endpoint);

            let response = match self.client.post(&self.endpoint).json(body).send().await {
                Ok(response) => response,
                Err(e) => {
                    let message = self.describe_error(&e);
                    warn!("Agent call failed after {:?}: {}", started.elapsed(), message);
                    return ProxyOutcome::Failed {
                        status: None,
                        message,
                    };
                }
            };

            let status = passthrough_status(response.status().as_u16());
            let outcome = match response.bytes().await {
                Ok(bytes) => decode_body(status, &bytes),
                Err(e) => ProxyOutcome::Failed {
                    status: Some(status),
                    message: self.describe_error(&e),
                },
            };

            match &outcome {
                ProxyOutcome::Relayed { status, .. } => {
                    debug!("Agent responded {} in {:?}", status, started.elapsed());
                }
                ProxyOutcome::Failed { message, .. } => {
                    warn!("Agent responded {} with unusable body: {}", status, message);
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

/// Headers applied to every outbound call: JSON content type plus the
/// bearer token under the configured header name, when a key is set.
pub fn outbound_headers(config: &AgentsConfig) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if config.has_access_key() {
        let name = HeaderName::from_bytes(config.auth_header.as_bytes()).map_err(|e| {
            ConfigError::InvalidValue("AGENTS_AUTH_HEADER".to_string(), e.to_string())
        })?;
        let mut value = HeaderValue::from_str(&format!("Bearer {}", config.access_key))
            .map_err(|e| ConfigError::InvalidValue("AGENTS_ACCESS_KEY".to_string(), e.to_string()))?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Turn a downstream body into an outcome. Empty 2xx bodies relay as `null`,
/// empty error bodies get a generic message, and bodies that are not JSON
/// become a failure carrying the body text.
pub fn decode_body(status: StatusCode, bytes: &[u8]) -> ProxyOutcome {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        if status.is_success() {
            return ProxyOutcome::Relayed {
                status,
                body: Value::Null,
            };
        }
        return ProxyOutcome::Failed {
            status: Some(status),
            message: format!("Request failed with status code {}", status.as_u16()),
        };
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(body) => ProxyOutcome::Relayed { status, body },
        Err(e) => {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            ProxyOutcome::Failed {
                status: Some(status),
                message: if text.is_empty() {
                    format!("Agent service returned invalid JSON: {}", e)
                } else {
                    text
                },
            }
        }
    }
}

fn passthrough_status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn agents_config(base_url: String) -> AgentsConfig {
        AgentsConfig {
            base_url,
            evaluate_path: "/evaluate".to_string(),
            timeout_ms: 2_000,
            ..AgentsConfig::default()
        }
    }

    #[test]
    fn headers_without_key_only_set_content_type() {
        let headers = outbound_headers(&AgentsConfig::default()).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn headers_use_configured_auth_header() {
        let config = AgentsConfig {
            access_key: "abc123".to_string(),
            auth_header: "X-Agent-Key".to_string(),
            ..AgentsConfig::default()
        };
        let headers = outbound_headers(&config).unwrap();
        assert_eq!(headers["x-agent-key"], "Bearer abc123");
        assert!(headers["x-agent-key"].is_sensitive());
        assert!(headers.get("authorization").is_none());
    }

    #[test]
    fn decode_body_handles_json_empty_and_text() {
        assert_eq!(
            decode_body(StatusCode::OK, br#"{"score": 7}"#),
            ProxyOutcome::Relayed {
                status: StatusCode::OK,
                body: json!({ "score": 7 })
            }
        );
        assert_eq!(
            decode_body(StatusCode::NO_CONTENT, b""),
            ProxyOutcome::Relayed {
                status: StatusCode::NO_CONTENT,
                body: Value::Null
            }
        );
        assert_eq!(
            decode_body(StatusCode::NOT_FOUND, b" \n"),
            ProxyOutcome::Failed {
                status: Some(StatusCode::NOT_FOUND),
                message: "Request failed with status code 404".to_string()
            }
        );
        assert_eq!(
            decode_body(StatusCode::BAD_GATEWAY, b"  upstream exploded\n"),
            ProxyOutcome::Failed {
                status: Some(StatusCode::BAD_GATEWAY),
                message: "upstream exploded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn forwards_body_unchanged_with_bearer_token() {
        let mock_server = MockServer::start().await;
        let idea = json!({
            "title": "Solar kiosks",
            "description": "Pay-as-you-go charging",
            "market": "East Africa",
            "extra": { "nested": [1, 2, 3] }
        });

        Mock::given(method("POST"))
            .and(path("/evaluate"))
            .and(header("authorization", "Bearer secret"))
            .and(header("content-type", "application/json"))
            .and(body_json(&idea))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "score": 81 })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut config = agents_config(mock_server.uri());
        config.access_key = "secret".to_string();
        let client = HttpAgentClient::new(&config).unwrap();

        let outcome = client.evaluate(&idea).await;
        assert_eq!(
            outcome,
            ProxyOutcome::Relayed {
                status: StatusCode::OK,
                body: json!({ "score": 81 })
            }
        );
    }

    #[tokio::test]
    async fn omits_auth_header_without_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&mock_server)
            .await;

        let client = HttpAgentClient::new(&agents_config(mock_server.uri())).unwrap();
        client.evaluate(&json!({ "title": "x" })).await;

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn passes_through_client_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/evaluate"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "error": "unauthorized" })),
            )
            .mount(&mock_server)
            .await;

        let client = HttpAgentClient::new(&agents_config(mock_server.uri())).unwrap();
        let outcome = client.evaluate(&json!({ "title": "x" })).await;

        assert_eq!(
            outcome.into_parts(),
            (StatusCode::FORBIDDEN, json!({ "error": "unauthorized" }))
        );
    }

    #[tokio::test]
    async fn times_out_with_500() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "score": 1 }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let mut config = agents_config(mock_server.uri());
        config.timeout_ms = 200;
        let client = HttpAgentClient::new(&config).unwrap();

        let started = Instant::now();
        let outcome = client.evaluate(&json!({ "title": "slow" })).await;
        assert!(started.elapsed() < Duration::from_secs(2));

        match outcome {
            ProxyOutcome::Failed { status, message } => {
                assert_eq!(status, None);
                assert_eq!(message, "timeout of 200ms exceeded");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_500() {
        // Nothing listens on port 1.
        let client = HttpAgentClient::new(&agents_config("http://127.0.0.1:1".to_string())).unwrap();
        let outcome = client.evaluate(&json!({ "title": "x" })).await;

        assert_eq!(outcome.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let (_, body) = outcome.into_parts();
        assert!(!body["error"].as_str().unwrap_or_default().is_empty());
    }
}
