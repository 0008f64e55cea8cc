//! Path-level HTTP forwarder for arbitrary upstream provider paths (chat
//! completions, messages, embeddings, images). Resolves a provider,
//! injects its decrypted credentials, and either streams an SSE response
//! line-by-line or copies the body verbatim.

mod provider;
mod registry;
mod stream;

pub use provider::{default_upstream_base, provider_from_model, resolve_provider};
pub use registry::{ProviderRegistry, ProxyError};

#[cfg(test)]
pub use registry::MockProviderRegistry;

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use observability::BatchMetrics;
use serde_json::Value;

/// Upstream timeout for proxied calls, matching task calls.
const PROXY_CALL_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ProxyRequest {
    pub user_id: String,
    /// Path with any leading `/proxy` prefix already stripped.
    pub path: String,
    pub method: axum::http::Method,
    pub header_provider: Option<String>,
    pub query_provider: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub body: bytes::Bytes,
}

pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

pub struct ProxyEngine<R: ProviderRegistry> {
    http: reqwest::Client,
    registry: R,
}

impl<R: ProviderRegistry> ProxyEngine<R> {
    pub fn new(registry: R) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .timeout(PROXY_CALL_TIMEOUT)
            .build()?;
        Ok(Self { http, registry })
    }

    pub async fn forward(&self, req: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let path = req.path.trim_start_matches('/');
        if path.is_empty() {
            return Err(ProxyError::EmptyPath);
        }

        let body_model = extract_model(&req.body);

        let provider = resolve_provider(
            req.header_provider.as_deref(),
            req.query_provider.as_deref(),
            body_model.as_deref(),
        )
        .ok_or(ProxyError::ProviderUnresolved)?;

        if let Some(model) = &body_model {
            if !self.registry.is_model_enabled(&provider, model).await {
                return Err(ProxyError::ModelDisabled {
                    provider: provider.clone(),
                    model: model.clone(),
                });
            }
        } else if !self.registry.is_provider_enabled(&provider).await {
            return Err(ProxyError::ProviderDisabled(provider));
        }

        let credentials = self.registry.credentials(&provider).await?;
        let base = credentials
            .endpoint
            .clone()
            .or_else(|| default_upstream_base(&provider).map(str::to_string))
            .ok_or_else(|| ProxyError::NoEndpoint(provider.clone()))?;

        let url = format!("{}/{path}", base.trim_end_matches('/'));

        let model_or_path = body_model.clone().unwrap_or_else(|| req.path.clone());
        let result = self.send(&url, &req, &credentials.api_key).await;

        match &result {
            Ok(resp) => {
                BatchMetrics::record_proxy_request(&provider, "success");
                tracing::info!(
                    user_id = %req.user_id,
                    provider = %provider,
                    model_or_path = %model_or_path,
                    status = resp.status.as_u16(),
                    "proxy request completed"
                );
            }
            Err(e) => {
                BatchMetrics::record_proxy_request(&provider, "error");
                tracing::warn!(
                    user_id = %req.user_id,
                    provider = %provider,
                    model_or_path = %model_or_path,
                    error = %e,
                    "proxy request failed"
                );
            }
        }

        result
    }

    async fn send(
        &self,
        url: &str,
        req: &ProxyRequest,
        api_key: &str,
    ) -> Result<ProxyResponse, ProxyError> {
        let mut builder = self
            .http
            .request(req.method.clone(), url)
            .header("Authorization", format!("Bearer {api_key}"))
            .body(req.body.clone());

        if let Some(ct) = &req.content_type {
            builder = builder.header("Content-Type", ct);
        }
        if let Some(accept) = &req.accept {
            builder = builder.header("Accept", accept);
        }

        let resp = builder.send().await?;
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

        let mut headers = HeaderMap::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = HeaderValue::from_bytes(value.as_bytes()) {
                headers.insert(name.clone(), v);
            }
        }

        let is_sse = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/event-stream"))
            .unwrap_or(false);

        let body = if is_sse {
            Body::from_stream(stream::line_buffered(resp))
        } else {
            Body::from(resp.bytes().await?)
        };

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

/// Pulls the `model` field out of a JSON request body, if present. Used
/// both for provider inference and the enabled-model gate.
fn extract_model(body: &bytes::Bytes) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("model")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use credential_store::ResolvedCredentials;

    fn req(body: &str) -> ProxyRequest {
        ProxyRequest {
            user_id: "u1".to_string(),
            path: "v1/chat/completions".to_string(),
            method: Method::POST,
            header_provider: None,
            query_provider: None,
            content_type: Some("application/json".to_string()),
            accept: None,
            body: bytes::Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn extract_model_reads_body_field() {
        let body = bytes::Bytes::from_static(br#"{"model":"gpt-4o","messages":[]}"#);
        assert_eq!(extract_model(&body).as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn extract_model_is_none_for_empty_body() {
        assert!(extract_model(&bytes::Bytes::new()).is_none());
    }

    #[tokio::test]
    async fn forward_rejects_empty_path() {
        let registry = MockProviderRegistry::new();
        let engine = ProxyEngine::new(registry).unwrap();
        let mut request = req(r#"{"model":"gpt-4o"}"#);
        request.path = "".to_string();
        let err = engine.forward(request).await.unwrap_err();
        assert!(matches!(err, ProxyError::EmptyPath));
    }

    #[tokio::test]
    async fn forward_rejects_disabled_model() {
        let mut registry = MockProviderRegistry::new();
        registry
            .expect_is_model_enabled()
            .returning(|_, _| Box::pin(async { false }));
        let engine = ProxyEngine::new(registry).unwrap();
        let err = engine.forward(req(r#"{"model":"gpt-4o"}"#)).await.unwrap_err();
        assert!(matches!(err, ProxyError::ModelDisabled { .. }));
    }

    #[tokio::test]
    async fn forward_rejects_unresolvable_provider() {
        let registry = MockProviderRegistry::new();
        let engine = ProxyEngine::new(registry).unwrap();
        let err = engine
            .forward(req(r#"{"model":"some-unknown-model"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::ProviderUnresolved));
    }

    #[tokio::test]
    async fn forward_rejects_no_endpoint_for_unmapped_provider_header() {
        let mut registry = MockProviderRegistry::new();
        registry
            .expect_is_provider_enabled()
            .returning(|_| Box::pin(async { true }));
        registry.expect_credentials().returning(|_| {
            Box::pin(async {
                Ok(ResolvedCredentials {
                    api_key: "sk-test".to_string(),
                    endpoint: None,
                })
            })
        });
        let engine = ProxyEngine::new(registry).unwrap();
        let mut request = req("");
        request.header_provider = Some("mystery-provider".to_string());
        let err = engine.forward(request).await.unwrap_err();
        assert!(matches!(err, ProxyError::NoEndpoint(_)));
    }
}
