//! Thin `reqwest` adapters over the admin/auth service backing
//! [`task_executor`]'s external collaborator traits. All three traits are
//! served by the same base URL, so one client implements all three.

use async_trait::async_trait;
use serde::Deserialize;
use task_executor::{ExecutorError, InstalledAppLookup, MintedToken, TokenMinter, UserGate};
use uuid::Uuid;

pub struct HttpAdminClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAdminClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[derive(Deserialize)]
struct MintTokenResponse {
    user_token: String,
    csrf_token: Option<String>,
}

#[async_trait]
impl TokenMinter for HttpAdminClient {
    async fn mint(&self, user_id: Uuid) -> Result<MintedToken, ExecutorError> {
        let resp = self
            .http
            .post(self.url(&format!("internal/users/{user_id}/tokens")))
            .send()
            .await
            .map_err(|e| ExecutorError::TokenMint(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ExecutorError::TokenMint(format!(
                "admin service returned status {}",
                resp.status()
            )));
        }

        let body: MintTokenResponse = resp
            .json()
            .await
            .map_err(|e| ExecutorError::TokenMint(e.to_string()))?;

        Ok(MintedToken {
            user_token: body.user_token,
            csrf_token: body.csrf_token,
        })
    }
}

#[derive(Deserialize)]
struct UserActiveResponse {
    active: bool,
}

#[async_trait]
impl UserGate for HttpAdminClient {
    async fn is_user_active(&self, user_id: Uuid) -> Result<bool, ExecutorError> {
        let resp = self
            .http
            .get(self.url(&format!("internal/users/{user_id}")))
            .send()
            .await
            .map_err(|_| ExecutorError::UserDisabled(user_id))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !resp.status().is_success() {
            return Err(ExecutorError::UserDisabled(user_id));
        }

        let body: UserActiveResponse = resp.json().await.map_err(|_| ExecutorError::UserDisabled(user_id))?;
        Ok(body.active)
    }
}

#[derive(Deserialize)]
struct InstalledAppResponse {
    mode: String,
}

#[async_trait]
impl InstalledAppLookup for HttpAdminClient {
    async fn mode(&self, installed_app_id: &str) -> Result<upstream_client::AppMode, ExecutorError> {
        let resp = self
            .http
            .get(self.url(&format!("internal/installed-apps/{installed_app_id}")))
            .send()
            .await
            .map_err(|e| ExecutorError::AppLookup(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ExecutorError::AppLookup(format!(
                "admin service returned status {}",
                resp.status()
            )));
        }

        let body: InstalledAppResponse = resp
            .json()
            .await
            .map_err(|e| ExecutorError::AppLookup(e.to_string()))?;

        upstream_client::AppMode::from_str(&body.mode)
            .map_err(|e| ExecutorError::AppLookup(e.to_string()))
    }
}
