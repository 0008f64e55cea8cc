use core_config::{env_or_default, BatchConfig, Environment, FromEnv, ServerConfig};
use database::postgres::PostgresConfig;

/// Composes the shared config components with this binary's own settings.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: Environment,
    pub batch: BatchConfig,
    pub server: ServerConfig,
    pub database: PostgresConfig,
    /// Base URL of the external admin/auth service backing ephemeral
    /// token minting, user-enablement checks, and installed-app lookup -
    /// these stay outside this platform's persistence boundary.
    pub admin_base_url: String,
    /// Tenant id this deployment serves; fixed at startup since the
    /// proxy's `ProviderRegistry` has no per-call tenant argument.
    pub tenant_id: String,
}

impl AppConfig {
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            batch: BatchConfig::from_env()?,
            server: ServerConfig::from_env()?,
            database: PostgresConfig::from_env()?,
            admin_base_url: env_or_default("ADMIN_BASE_URL", "http://localhost:9000"),
            tenant_id: env_or_default("TENANT_ID", "default"),
        })
    }
}
