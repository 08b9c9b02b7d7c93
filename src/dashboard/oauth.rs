//! OAuth plumbing shared by the vendor adapters.
//!
//! Contains the PKCE helpers used by the Salesforce web-server flow, the
//! short-lived map of in-flight authorizations, and [`TokenManager`], which
//! resolves a usable access token in a fixed order:
//!
//! 1. the in-memory cache,
//! 2. the token row persisted in the store,
//! 3. a fresh grant from the provider's [`TokenSource`].
//!
//! A token only counts as usable when it expires more than
//! [`EXPIRY_SKEW_SECS`] from now.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::db::DbHandle;
use super::models::{OAuthToken, Provider};
use crate::errors::DashboardError;

pub const EXPIRY_SKEW_SECS: i64 = 60;

/// How long an authorization started with `/authorize` may take to come back.
const PENDING_AUTH_TTL: Duration = Duration::from_secs(600);

// ── PKCE ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

fn random_url_safe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge for a verifier (RFC 7636 §4.2).
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub fn generate_pkce() -> PkcePair {
    // 32 random bytes encode to a 43-character verifier, the RFC minimum.
    let verifier = random_url_safe(32);
    let challenge = pkce_challenge(&verifier);
    PkcePair {
        verifier,
        challenge,
    }
}

pub fn random_state() -> String {
    random_url_safe(24)
}

/// Verifiers of authorizations that have been started but not completed,
/// keyed by the OAuth `state` parameter.
#[derive(Default)]
pub struct PendingAuthorizations {
    inner: Mutex<HashMap<String, (String, Instant)>>,
}

impl PendingAuthorizations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, state: String, verifier: String) {
        if let Ok(mut map) = self.inner.lock() {
            map.retain(|_, (_, started)| started.elapsed() < PENDING_AUTH_TTL);
            map.insert(state, (verifier, Instant::now()));
        }
    }

    /// Remove and return the verifier for `state`. A state can only be
    /// redeemed once.
    pub fn take(&self, state: &str) -> Option<String> {
        let mut map = self.inner.lock().ok()?;
        let (verifier, started) = map.remove(state)?;
        (started.elapsed() < PENDING_AUTH_TTL).then_some(verifier)
    }
}

// ── Token resolution ──────────────────────────────────────────────────

/// A token freshly issued by a provider.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub instance_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Something that can mint a new access token for a provider.
///
/// Salesforce uses the stored refresh token; DocuSign ignores it and signs a
/// new JWT assertion.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenGrant, DashboardError>;
}

pub struct TokenManager {
    provider: Provider,
    cache: Mutex<Option<OAuthToken>>,
}

impl TokenManager {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            cache: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<OAuthToken> {
        self.cache.lock().ok().and_then(|c| c.clone())
    }

    fn remember(&self, token: &OAuthToken) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(token.clone());
        }
    }

    /// Drop the in-memory token, e.g. after the provider rejected it.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    /// Resolve a usable access token: cache, then store, then a new grant.
    pub async fn access_token(
        &self,
        db: &DbHandle,
        source: &dyn TokenSource,
    ) -> Result<OAuthToken, DashboardError> {
        let now = Utc::now();
        if let Some(token) = self.cached().filter(|t| t.is_fresh(now, EXPIRY_SKEW_SECS)) {
            return Ok(token);
        }

        let stored = self.load(db).await?;
        if let Some(token) = stored.as_ref().filter(|t| t.is_fresh(now, EXPIRY_SKEW_SECS)) {
            tracing::debug!(provider = %self.provider, "Using stored access token");
            self.remember(token);
            return Ok(token.clone());
        }

        self.renew(db, source, stored).await
    }

    /// Skip the cache and the stored access token and ask for a new grant.
    pub async fn force_refresh(
        &self,
        db: &DbHandle,
        source: &dyn TokenSource,
    ) -> Result<OAuthToken, DashboardError> {
        self.invalidate();
        let stored = self.load(db).await?;
        self.renew(db, source, stored).await
    }

    /// Persist and cache a grant obtained outside the refresh path (the
    /// authorization-code callback).
    pub async fn store_grant(
        &self,
        db: &DbHandle,
        grant: TokenGrant,
    ) -> Result<OAuthToken, DashboardError> {
        let token = OAuthToken {
            provider: self.provider,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            instance_url: grant.instance_url,
            expires_at: Some(grant.expires_at),
        };
        let row = token.clone();
        db.call(move |db| db.upsert_token(&row))
            .await
            .map_err(DashboardError::Database)?;
        // Re-read so a refresh token kept from the previous row is cached too.
        let merged = self.load(db).await?.unwrap_or(token);
        self.remember(&merged);
        Ok(merged)
    }

    async fn load(&self, db: &DbHandle) -> Result<Option<OAuthToken>, DashboardError> {
        let provider = self.provider;
        db.call(move |db| db.get_token(provider))
            .await
            .map_err(DashboardError::Database)
    }

    async fn renew(
        &self,
        db: &DbHandle,
        source: &dyn TokenSource,
        stored: Option<OAuthToken>,
    ) -> Result<OAuthToken, DashboardError> {
        let refresh_token = stored.as_ref().and_then(|t| t.refresh_token.clone());
        let grant = match source.refresh(refresh_token.as_deref()).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "Token refresh failed");
                self.invalidate();
                return Err(e);
            }
        };
        tracing::info!(provider = %self.provider, "Access token refreshed");

        let grant = TokenGrant {
            refresh_token: grant.refresh_token.or(refresh_token),
            instance_url: grant
                .instance_url
                .or_else(|| stored.and_then(|t| t.instance_url)),
            ..grant
        };
        self.store_grant(db, grant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::db::DashboardDb;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Token source that counts calls and either succeeds or demands reauth.
    struct MockSource {
        calls: AtomicUsize,
        succeed: bool,
        seen_refresh_token: Mutex<Option<String>>,
    }

    impl MockSource {
        fn new(succeed: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                succeed,
                seen_refresh_token: Mutex::new(None),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for MockSource {
        async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenGrant, DashboardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_refresh_token.lock().unwrap() = refresh_token.map(str::to_string);
            if self.succeed && refresh_token.is_some() {
                Ok(TokenGrant {
                    access_token: "refreshed".into(),
                    refresh_token: None,
                    instance_url: None,
                    expires_at: Utc::now() + chrono::Duration::hours(2),
                })
            } else {
                Err(DashboardError::ReauthRequired {
                    provider: Provider::Salesforce,
                    authorize_url: "/api/salesforce/authorize".into(),
                })
            }
        }
    }

    fn handle() -> DbHandle {
        DbHandle::new(DashboardDb::new_in_memory().unwrap())
    }

    fn stored(db: &DbHandle, access: &str, expires_in_secs: i64, refresh: Option<&str>) {
        db.lock_sync()
            .unwrap()
            .upsert_token(&OAuthToken {
                provider: Provider::Salesforce,
                access_token: access.into(),
                refresh_token: refresh.map(str::to_string),
                instance_url: Some("https://acme.my.salesforce.com".into()),
                expires_at: Some(Utc::now() + chrono::Duration::seconds(expires_in_secs)),
            })
            .unwrap();
    }

    #[test]
    fn pkce_challenge_matches_rfc_example() {
        // Appendix B of RFC 7636.
        let challenge = pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn generated_pkce_pair_is_consistent() {
        let pair = generate_pkce();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pkce_challenge(&pair.verifier), pair.challenge);
        assert_ne!(generate_pkce().verifier, pair.verifier);
    }

    #[test]
    fn pending_state_is_single_use() {
        let pending = PendingAuthorizations::new();
        pending.insert("state-1".into(), "verifier-1".into());
        assert_eq!(pending.take("state-1").as_deref(), Some("verifier-1"));
        assert!(pending.take("state-1").is_none());
        assert!(pending.take("unknown").is_none());
    }

    #[tokio::test]
    async fn stored_fresh_token_is_used_without_refresh() {
        let db = handle();
        stored(&db, "stored", 3600, Some("rt"));
        let manager = TokenManager::new(Provider::Salesforce);
        let source = MockSource::new(true);

        let token = manager.access_token(&db, &source).await.unwrap();
        assert_eq!(token.access_token, "stored");
        assert_eq!(source.calls(), 0);

        // Second call is served from the cache even if the row disappears.
        db.lock_sync().unwrap().delete_token(Provider::Salesforce).unwrap();
        let token = manager.access_token(&db, &source).await.unwrap();
        assert_eq!(token.access_token, "stored");
    }

    #[tokio::test]
    async fn token_inside_skew_window_is_refreshed() {
        let db = handle();
        stored(&db, "almost-expired", 30, Some("rt"));
        let manager = TokenManager::new(Provider::Salesforce);
        let source = MockSource::new(true);

        let token = manager.access_token(&db, &source).await.unwrap();
        assert_eq!(token.access_token, "refreshed");
        assert_eq!(source.calls(), 1);
        assert_eq!(source.seen_refresh_token.lock().unwrap().as_deref(), Some("rt"));
        // The refresh token and instance URL survive a grant that omits them.
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert_eq!(token.instance_url.as_deref(), Some("https://acme.my.salesforce.com"));

        let persisted = db
            .lock_sync()
            .unwrap()
            .get_token(Provider::Salesforce)
            .unwrap()
            .unwrap();
        assert_eq!(persisted.access_token, "refreshed");
    }

    #[tokio::test]
    async fn missing_token_requires_reauth() {
        let db = handle();
        let manager = TokenManager::new(Provider::Salesforce);
        let source = MockSource::new(true);
        let err = manager.access_token(&db, &source).await.unwrap_err();
        assert!(err.is_reauth());
    }

    #[tokio::test]
    async fn failed_refresh_requires_reauth() {
        let db = handle();
        stored(&db, "expired", -10, Some("revoked"));
        let manager = TokenManager::new(Provider::Salesforce);
        let source = MockSource::new(false);
        let err = manager.access_token(&db, &source).await.unwrap_err();
        assert!(err.is_reauth());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_fresh_tokens() {
        let db = handle();
        stored(&db, "stored", 3600, Some("rt"));
        let manager = TokenManager::new(Provider::Salesforce);
        let source = MockSource::new(true);
        manager.access_token(&db, &source).await.unwrap();

        let token = manager.force_refresh(&db, &source).await.unwrap();
        assert_eq!(token.access_token, "refreshed");
        assert_eq!(source.calls(), 1);
    }
}
