use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::RelayError;

const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);
/// Unknown `kid`s refetch the key set at most this often.
const JWKS_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub subject: String,
}

pub type VerifyFuture<'a> =
    Pin<Box<dyn Future<Output = Result<VerifiedClaims, RelayError>> + Send + 'a>>;

/// Validates a bearer token against an identity provider.
pub trait TokenVerifier: Send + Sync {
    fn verify<'a>(&'a self, token: &'a str) -> VerifyFuture<'a>;
}

pub type TokenVerifierRef = Arc<dyn TokenVerifier>;

/// Decides whether a request may proceed.
///
/// Outside development mode a missing or rejected token is an
/// `Authentication` error. In development mode the failure is logged and the
/// request continues without claims.
pub async fn authorize(
    headers: &HeaderMap,
    verifier: Option<&dyn TokenVerifier>,
    development: bool,
) -> Result<Option<VerifiedClaims>, RelayError> {
    let outcome = match bearer_token(headers) {
        None => Err(RelayError::authentication("missing bearer token")),
        Some(token) => match verifier {
            Some(verifier) => verifier.verify(token).await,
            None => Err(RelayError::authentication(
                "token verification is not configured",
            )),
        },
    };

    match outcome {
        Ok(claims) => {
            debug!(subject = %claims.subject, "request authenticated");
            Ok(Some(claims))
        }
        Err(error) if development => {
            warn!("development mode, ignoring authentication failure: {error}");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(Debug, Deserialize)]
struct SubjectClaims {
    sub: String,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

/// RS256 verification against a remote JWKS document, cached in memory.
pub struct JwksVerifier {
    jwks_url: String,
    client: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
}

impl JwksVerifier {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self::with_fetch_timeout(jwks_url, JWKS_FETCH_TIMEOUT)
    }

    pub fn with_fetch_timeout(jwks_url: impl Into<String>, fetch_timeout: Duration) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            client: reqwest::Client::builder()
                .timeout(fetch_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            cache: RwLock::new(None),
        }
    }

    async fn key_set(&self, force_refresh: bool) -> Result<JwkSet, RelayError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            let max_age = if force_refresh {
                JWKS_MIN_REFRESH_INTERVAL
            } else {
                JWKS_CACHE_TTL
            };
            if cached.fetched_at.elapsed() < max_age {
                return Ok(cached.keys.clone());
            }
        }

        let keys = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| RelayError::authentication(format!("fetch JWKS failed: {error}")))?
            .json::<JwkSet>()
            .await
            .map_err(|error| RelayError::authentication(format!("decode JWKS failed: {error}")))?;
        *self.cache.write().await = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    async fn verify_token(&self, token: &str) -> Result<VerifiedClaims, RelayError> {
        let header = decode_header(token)
            .map_err(|error| RelayError::authentication(format!("invalid token header: {error}")))?;
        let kid = header
            .kid
            .ok_or_else(|| RelayError::authentication("token header has no kid"))?;

        let mut keys = self.key_set(false).await?;
        if keys.find(&kid).is_none() {
            debug!(kid = %kid, "unknown signing key, refreshing JWKS");
            keys = self.key_set(true).await?;
        }
        let jwk = keys
            .find(&kid)
            .ok_or_else(|| RelayError::authentication(format!("no signing key for kid '{kid}'")))?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|error| RelayError::authentication(format!("unusable signing key: {error}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        let data = decode::<SubjectClaims>(token, &key, &validation)
            .map_err(|error| RelayError::authentication(error.to_string()))?;
        Ok(VerifiedClaims {
            subject: data.claims.sub,
        })
    }
}

impl TokenVerifier for JwksVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> VerifyFuture<'a> {
        Box::pin(self.verify_token(token))
    }
}
