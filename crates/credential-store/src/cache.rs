use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::ResolvedCredentials;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

struct Entry {
    credentials: ResolvedCredentials,
    expires_at: Instant,
}

/// Per-provider credential cache. Decrypting a hybrid envelope costs an RSA
/// operation plus a file read; this cache keeps that off the hot path of
/// every proxied request.
pub struct CredentialCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn get(&self, provider: &str) -> Option<ResolvedCredentials> {
        let entries = self.entries.read().await;
        entries.get(provider).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.credentials.clone())
            } else {
                None
            }
        })
    }

    pub async fn put(&self, provider: &str, credentials: ResolvedCredentials) {
        let mut entries = self.entries.write().await;
        entries.insert(
            provider.to_string(),
            Entry {
                credentials,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_returns_cached_value() {
        let cache = CredentialCache::with_ttl(Duration::from_secs(60));
        cache
            .put(
                "openai",
                ResolvedCredentials {
                    api_key: "sk-test".to_string(),
                    endpoint: None,
                },
            )
            .await;
        let cached = cache.get("openai").await.unwrap();
        assert_eq!(cached.api_key, "sk-test");
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let cache = CredentialCache::with_ttl(Duration::from_millis(1));
        cache
            .put(
                "openai",
                ResolvedCredentials {
                    api_key: "sk-test".to_string(),
                    endpoint: None,
                },
            )
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("openai").await.is_none());
    }

    #[tokio::test]
    async fn unknown_provider_returns_none() {
        let cache = CredentialCache::new();
        assert!(cache.get("missing").await.is_none());
    }
}
