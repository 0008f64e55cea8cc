//! `ANY /proxy/{*path}` - forwards to the resolved upstream provider.
//!
//! The caller's identity is expected to already be established upstream of
//! this service (API gateway, session middleware); it is taken verbatim
//! from `X-User-Id` for the proxy's logging and is not otherwise checked
//! here.

use app_errors::AppError;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
};
use proxy_engine::{ProxyError, ProxyRequest};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProxyQuery {
    provider: Option<String>,
}

pub async fn forward(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ProxyQuery>,
    method: Method,
    headers: HeaderMap,
    body: bytes::Bytes,
) -> Result<Response, AppError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let header_provider = headers
        .get("x-gaia-provider")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let accept = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request = ProxyRequest {
        user_id,
        path,
        method,
        header_provider,
        query_provider: query.provider,
        content_type,
        accept,
        body,
    };

    let response = state.proxy.forward(request).await.map_err(map_proxy_error)?;

    let mut builder = axum::http::Response::builder().status(response.status);
    for (name, value) in response.headers.iter() {
        builder = builder.header(name, value);
    }
    builder
        .body(response.body)
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn map_proxy_error(e: ProxyError) -> AppError {
    match e {
        ProxyError::EmptyPath | ProxyError::ProviderUnresolved => AppError::BadRequest(e.to_string()),
        ProxyError::ProviderDisabled(_) | ProxyError::ModelDisabled { .. } => {
            AppError::Validation(e.to_string())
        }
        ProxyError::NoEndpoint(_) | ProxyError::Credentials(_) => AppError::Config(e.to_string()),
        ProxyError::Upstream(_) => AppError::Protocol(e.to_string()),
    }
}
