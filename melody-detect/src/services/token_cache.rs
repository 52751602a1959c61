//! Process-wide bearer credential cache
//!
//! Starts empty. Each OAuth-gated provider registers its credential exchange
//! once; tokens are then acquired lazily on first use and reused until they
//! come within [`SAFETY_MARGIN`] of expiry. There is no background refresh.
//!
//! Refresh is single-flight per provider: the slot's async mutex is held for
//! the duration of the exchange call, so concurrent callers queue behind the
//! one doing the refresh and then read the token it stored.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::providers::ProviderError;

/// Cached tokens closer than this to expiry are treated as expired
pub const SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// Token returned by a credential exchange
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Provider-declared lifetime, when the response carries one
    pub lifetime: Option<Duration>,
}

/// Provider-specific call that trades static credentials for a bearer token
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self) -> Result<IssuedToken, ProviderError>;
}

/// A cached bearer token
#[derive(Debug, Clone)]
pub struct Credential {
    pub provider_id: String,
    pub token: String,
    pub expires_at: Instant,
}

impl Credential {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now + SAFETY_MARGIN
    }
}

struct Slot {
    exchange: Arc<dyn CredentialExchange>,
    default_lifetime: Duration,
    credential: Mutex<Option<Credential>>,
}

#[derive(Default)]
pub struct TokenCache {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the exchange used for `provider_id`
    ///
    /// `default_lifetime` applies when the exchange response declares none.
    /// Re-registering drops any cached token.
    pub fn register(
        &self,
        provider_id: impl Into<String>,
        exchange: Arc<dyn CredentialExchange>,
        default_lifetime: Duration,
    ) {
        let slot = Arc::new(Slot {
            exchange,
            default_lifetime,
            credential: Mutex::new(None),
        });
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider_id.into(), slot);
    }

    fn slot(&self, provider_id: &str) -> Result<Arc<Slot>, ProviderError> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_id)
            .cloned()
            .ok_or_else(|| ProviderError::auth(provider_id, "no credential exchange registered"))
    }

    /// Current token for `provider_id`, exchanging for a new one if needed
    pub async fn get_token(&self, provider_id: &str) -> Result<String, ProviderError> {
        let slot = self.slot(provider_id)?;
        let mut cached = slot.credential.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh(Instant::now()) {
                return Ok(credential.token.clone());
            }
        }

        tracing::debug!(provider = provider_id, "Acquiring credential");
        let issued = slot.exchange.exchange().await?;
        let lifetime = issued.lifetime.unwrap_or(slot.default_lifetime);

        let credential = Credential {
            provider_id: provider_id.to_string(),
            token: issued.token,
            expires_at: Instant::now() + lifetime,
        };
        let token = credential.token.clone();
        *cached = Some(credential);

        tracing::info!(
            provider = provider_id,
            lifetime_secs = lifetime.as_secs(),
            "Credential acquired"
        );
        Ok(token)
    }

    /// Drop the cached token for `provider_id`
    pub async fn invalidate(&self, provider_id: &str) {
        if let Ok(slot) = self.slot(provider_id) {
            slot.credential.lock().await.take();
        }
    }

    /// Drop the cached token only if it is still `stale`
    ///
    /// A concurrent caller may already have replaced it.
    async fn invalidate_token(&self, provider_id: &str, stale: &str) {
        if let Ok(slot) = self.slot(provider_id) {
            let mut cached = slot.credential.lock().await;
            if cached.as_ref().is_some_and(|c| c.token == stale) {
                cached.take();
            }
        }
    }

    /// Run `call` with a token; on an auth failure invalidate, re-acquire and
    /// retry exactly once
    pub async fn with_credential<T, F, Fut>(
        &self,
        provider_id: &str,
        mut call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let token = self.get_token(provider_id).await?;

        match call(token.clone()).await {
            Err(err) if err.is_auth() => {
                tracing::warn!(
                    provider = provider_id,
                    error = %err,
                    "Credential rejected, refreshing and retrying once"
                );
                self.invalidate_token(provider_id, &token).await;
                let fresh = self.get_token(provider_id).await?;
                call(fresh).await
            }
            result => result,
        }
    }
}
