//! HTTP client for invoking an installed app's workflow or completion
//! endpoint and handing back the raw SSE body for [`sse_parser`] to
//! consume.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Upstream request timeout for task and proxy calls. Provider model-list
/// probes use a much shorter timeout and build their own client.
pub const TASK_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Which endpoint shape the installed app expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Workflow,
    Completion,
}

impl AppMode {
    /// Parses the installed app's `mode` column; any other value is a
    /// configuration error the caller should surface, not silently default.
    pub fn from_str(mode: &str) -> Result<Self, UpstreamError> {
        match mode {
            "workflow" => Ok(AppMode::Workflow),
            "completion" => Ok(AppMode::Completion),
            other => Err(UpstreamError::UnsupportedMode(other.to_string())),
        }
    }

    fn path_suffix(self) -> &'static str {
        match self {
            AppMode::Workflow => "workflows/run",
            AppMode::Completion => "completion-messages",
        }
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("unsupported installed app mode: {0}")]
    UnsupportedMode(String),

    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

#[derive(Serialize)]
struct TaskCallBody<'a> {
    inputs: &'a HashMap<String, String>,
    response_mode: &'static str,
}

/// A fully-read upstream response: status and body, ready for the SSE
/// parser. The body is always read to completion before returning — the
/// upstream does not stream anything workers need to react to mid-flight.
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(TASK_CALL_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Invokes `installed_app_id`'s workflow or completion endpoint with
    /// `inputs` and returns the raw response body for SSE parsing. CSRF
    /// headers are only attached when `csrf_token` is present, mirroring
    /// the upstream's optional CSRF enforcement.
    pub async fn call_task(
        &self,
        installed_app_id: &str,
        mode: AppMode,
        inputs: &HashMap<String, String>,
        user_token: &str,
        csrf_token: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!(
            "{}/console/api/installed-apps/{}/{}",
            self.base_url.trim_end_matches('/'),
            installed_app_id,
            mode.path_suffix()
        );

        let body = TaskCallBody {
            inputs,
            response_mode: "streaming",
        };

        let mut req = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {user_token}"))
            .header("Accept", "text/event-stream")
            .json(&body);

        if let Some(csrf) = csrf_token {
            req = req
                .header("x-csrf-token", csrf)
                .header("Cookie", format!("csrf_token={csrf}"));
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        tracing::debug!(url, status, "upstream task call completed");
        Ok(UpstreamResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_mode_rejects_unknown_values() {
        assert!(AppMode::from_str("workflow").is_ok());
        assert!(AppMode::from_str("completion").is_ok());
        assert!(matches!(
            AppMode::from_str("chat"),
            Err(UpstreamError::UnsupportedMode(m)) if m == "chat"
        ));
    }

    #[test]
    fn path_suffix_matches_mode() {
        assert_eq!(AppMode::Workflow.path_suffix(), "workflows/run");
        assert_eq!(AppMode::Completion.path_suffix(), "completion-messages");
    }

    #[test]
    fn success_range_is_2xx() {
        let resp = UpstreamResponse {
            status: 200,
            body: String::new(),
        };
        assert!(resp.is_success());
        let resp = UpstreamResponse {
            status: 502,
            body: String::new(),
        };
        assert!(!resp.is_success());
    }
}
