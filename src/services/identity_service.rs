//! Resolution of request credentials into a typed [`Caller`].

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::http::{HeaderMap, header::AUTHORIZATION};
use futures::future::BoxFuture;
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    jwk::{Jwk, JwkSet},
};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{config::AppConfig, error::ServiceError, state::SharedState, state::game::UserId};

const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Authenticated principal attached to a request or connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity provider is not configured")]
    NotConfigured,
    #[error("malformed identity token")]
    Malformed(#[source] jsonwebtoken::errors::Error),
    #[error("identity token has no key id")]
    MissingKeyId,
    #[error("identity token signed by unknown key `{kid}`")]
    UnknownKey { kid: String },
    #[error("identity token rejected")]
    Rejected(#[source] jsonwebtoken::errors::Error),
    #[error("identity token has an empty subject")]
    EmptySubject,
    #[error("failed to fetch identity provider keys")]
    Keys(#[source] reqwest::Error),
}

impl From<IdentityError> for ServiceError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Keys(source) => {
                warn!(error = %source, "identity provider keys unavailable");
                ServiceError::Internal("identity provider unavailable".into())
            }
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

/// Turns a bearer credential into a [`Caller`].
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> BoxFuture<'static, Result<Caller, IdentityError>>;
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

struct FirebaseInner {
    client: Client,
    jwks_url: String,
    refresh: Duration,
    validation: Option<Validation>,
    cache: RwLock<Option<CachedKeys>>,
}

/// Verifies Firebase ID tokens against Google's published signing keys.
#[derive(Clone)]
pub struct FirebaseVerifier {
    inner: Arc<FirebaseInner>,
}

impl FirebaseVerifier {
    pub fn new(config: &AppConfig) -> Self {
        let project_id = config.firebase_project_id.trim();
        let validation = (!project_id.is_empty()).then(|| {
            let mut validation = Validation::new(Algorithm::RS256);
            validation.set_audience(&[project_id]);
            validation.set_issuer(&[format!("{FIREBASE_ISSUER_PREFIX}{project_id}")]);
            validation
        });

        Self {
            inner: Arc::new(FirebaseInner {
                client: Client::new(),
                jwks_url: config.jwks_url.clone(),
                refresh: config.jwks_refresh(),
                validation,
                cache: RwLock::new(None),
            }),
        }
    }

    /// Key `kid` from the cache, refetching once when stale or unknown.
    async fn key(&self, kid: &str) -> Result<Jwk, IdentityError> {
        {
            let guard = self.inner.cache.read().await;
            let fresh = guard
                .as_ref()
                .filter(|cached| cached.fetched_at.elapsed() < self.inner.refresh);
            if let Some(jwk) = fresh.and_then(|cached| cached.keys.find(kid)) {
                return Ok(jwk.clone());
            }
        }

        let keys = self.fetch_keys().await?;
        let found = keys.find(kid).cloned();
        *self.inner.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        found.ok_or_else(|| IdentityError::UnknownKey {
            kid: kid.to_owned(),
        })
    }

    async fn fetch_keys(&self) -> Result<JwkSet, IdentityError> {
        debug!(url = %self.inner.jwks_url, "fetching identity provider keys");
        self.inner
            .client
            .get(&self.inner.jwks_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(IdentityError::Keys)?
            .json::<JwkSet>()
            .await
            .map_err(IdentityError::Keys)
    }

    async fn verify_token(&self, token: &str) -> Result<Caller, IdentityError> {
        let validation = self
            .inner
            .validation
            .as_ref()
            .ok_or(IdentityError::NotConfigured)?;

        let header = decode_header(token).map_err(IdentityError::Malformed)?;
        let kid = header.kid.ok_or(IdentityError::MissingKeyId)?;
        let jwk = self.key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(IdentityError::Malformed)?;

        let claims = decode::<FirebaseClaims>(token, &key, validation)
            .map_err(IdentityError::Rejected)?
            .claims;
        caller_from_claims(claims)
    }
}

impl IdentityVerifier for FirebaseVerifier {
    fn verify(&self, token: &str) -> BoxFuture<'static, Result<Caller, IdentityError>> {
        let verifier = self.clone();
        let token = token.to_owned();
        Box::pin(async move { verifier.verify_token(&token).await })
    }
}

fn caller_from_claims(claims: FirebaseClaims) -> Result<Caller, IdentityError> {
    if claims.sub.trim().is_empty() {
        return Err(IdentityError::EmptySubject);
    }
    Ok(Caller {
        user_id: UserId::from_subject(&claims.sub),
        email: claims.email,
    })
}

/// Extract the credential from an `Authorization` value, accepting both a
/// raw token and the `Bearer <token>` form.
pub fn bearer_token(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let token = match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => raw,
    };
    (!token.is_empty()).then_some(token)
}

async fn resolve(state: &SharedState, credential: Option<&str>) -> Result<Option<Caller>, ServiceError> {
    let Some(token) = credential.and_then(bearer_token) else {
        return Ok(None);
    };
    let caller = state.identity().verify(token).await?;
    debug!(user_id = %caller.user_id, "caller resolved");
    Ok(Some(caller))
}

/// Caller of an HTTP request; `None` when no credential was sent.
pub async fn caller_from_headers(
    state: &SharedState,
    headers: &HeaderMap,
) -> Result<Option<Caller>, ServiceError> {
    let credential = match headers.get(AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ServiceError::Unauthorized("malformed authorization header".into()))?,
        ),
        None => None,
    };
    resolve(state, credential).await
}

/// Caller of a WebSocket connection, read from its `connection_init` payload.
pub async fn caller_from_init_payload(
    state: &SharedState,
    payload: &serde_json::Value,
) -> Result<Option<Caller>, ServiceError> {
    let credential = ["Authorization", "authorization", "authToken"]
        .iter()
        .find_map(|key| payload.get(key).and_then(|value| value.as_str()));
    resolve(state, credential).await
}

/// The caller, or an authentication error for anonymous requests.
pub fn require_caller(caller: Option<&Caller>) -> Result<&Caller, ServiceError> {
    caller.ok_or_else(|| ServiceError::Unauthorized("authentication required".into()))
}
