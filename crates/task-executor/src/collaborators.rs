//! Narrow interfaces onto concerns the executor depends on but does not
//! own: token issuance, user-enablement checks, and installed-app mode
//! lookup are all admin/auth surfaces that live outside this crate.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ExecutorError;

/// Mints an ephemeral user-auth token (and CSRF token, when the installed
/// app enforces it) for a single task call. Backed by the platform's
/// session/auth layer; mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenMinter: Send + Sync {
    async fn mint(&self, user_id: Uuid) -> Result<MintedToken, ExecutorError>;
}

pub struct MintedToken {
    pub user_token: String,
    pub csrf_token: Option<String>,
}

/// Whether a user account is active. A disabled user's tasks fail without
/// ever reaching the upstream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserGate: Send + Sync {
    async fn is_user_active(&self, user_id: Uuid) -> Result<bool, ExecutorError>;
}

/// Resolves an installed app's upstream call mode.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstalledAppLookup: Send + Sync {
    async fn mode(&self, installed_app_id: &str) -> Result<upstream_client::AppMode, ExecutorError>;
}
