//! Access tokens for the Firestore REST API.
//!
//! Production uses a service account with a cached, single-flight refreshed
//! token. The local emulator accepts a fixed bearer token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh this long before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Assumed TTL when the provider reports none.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore/Datastore access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Bearer token the Firestore emulator treats as an admin credential.
pub const EMULATOR_TOKEN: &str = "owner";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

enum Inner {
    /// Service account with a refresh cache
    ServiceAccount {
        provider: Arc<dyn TokenProvider>,
        cache: RwLock<Option<CachedToken>>,
    },
    /// Fixed token (emulator, tests)
    Static(String),
}

/// Source of bearer tokens.
pub struct TokenSource {
    inner: Inner,
}

impl TokenSource {
    /// Load the service account named by `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn service_account_from_env() -> FirestoreResult<Self> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Self {
                inner: Inner::ServiceAccount {
                    provider: Arc::new(sa),
                    cache: RwLock::new(None),
                },
            }),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            inner: Inner::Static(token.into()),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        if let Inner::ServiceAccount { cache, .. } = &self.inner {
            *cache.write().await = None;
        }
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn token(&self) -> FirestoreResult<String> {
        let (provider, cache) = match &self.inner {
            Inner::Static(token) => return Ok(token.clone()),
            Inner::ServiceAccount { provider, cache } => (provider, cache),
        };

        if let Some(cached) = cache.read().await.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        let mut guard = cache.write().await;

        // Another task may have refreshed while we waited for the write lock
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        match provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let now = Utc::now();
                let exp = token.expires_at();
                let expires_at = if exp > now {
                    (exp - now)
                        .to_std()
                        .map(|ttl| Instant::now() + ttl)
                        .unwrap_or_else(|_| Instant::now() + TOKEN_DEFAULT_TTL)
                } else {
                    Instant::now()
                };

                let access_token = token.as_str().to_string();
                *guard = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });
                debug!("Refreshed Firestore auth token");
                Ok(access_token)
            }
            Err(e) => match guard.as_ref() {
                Some(cached) if cached.is_usable() => {
                    warn!("Token refresh failed, using existing token: {}", e);
                    Ok(cached.access_token.clone())
                }
                _ => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }
}
