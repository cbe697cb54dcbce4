//! Caller identification.
//!
//! Every request resolves to a [`Caller`]: the access map used by the query
//! engine plus the `Authorization` header to forward to peers. How the bearer
//! token is read depends on the configured mode:
//! - `none`: no token; the caller holds the top tier on every local dataset.
//! - `gateway`: an upstream gateway already verified the token, so the
//!   payload segment is only decoded.
//! - `jwt`: the token is verified here with a shared HS256 secret.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cohort_config::{AuthConfig, AuthMode};
use cohort_query::QueryError;
use cohort_rbac::WatchedAccessList;
use cohort_store::Repository;
use cohort_types::{AccessMap, Tier};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};

/// Claims that select a row of the access list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub preferred_username: String,
}

/// The identity behind one request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub access: AccessMap,
    /// Forwarded verbatim to peers.
    pub authorization: Option<String>,
    pub claims: Option<Claims>,
}

enum Scheme {
    Open,
    Gateway,
    Jwt {
        key: DecodingKey,
        validation: Validation,
    },
}

/// Resolves callers from the `Authorization` header.
pub struct AuthService {
    scheme: Scheme,
    access_list: Option<WatchedAccessList>,
}

impl AuthService {
    /// Development mode: full access, nothing forwarded.
    pub fn open() -> Self {
        Self {
            scheme: Scheme::Open,
            access_list: None,
        }
    }

    /// Tokens verified upstream; claims are decoded without verification.
    pub fn gateway(access_list: WatchedAccessList) -> Self {
        Self {
            scheme: Scheme::Gateway,
            access_list: Some(access_list),
        }
    }

    /// Tokens verified locally against `secret`.
    pub fn jwt(access_list: WatchedAccessList, secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self {
            scheme: Scheme::Jwt {
                key: DecodingKey::from_secret(secret.as_bytes()),
                validation,
            },
            access_list: Some(access_list),
        }
    }

    pub fn from_config(config: &AuthConfig) -> ServerResult<Self> {
        let access_list = || {
            config
                .access_list
                .as_ref()
                .ok_or_else(|| missing("auth.access_list"))
                .and_then(|path| Ok(WatchedAccessList::open(path)?))
        };
        match config.mode {
            AuthMode::None => Ok(Self::open()),
            AuthMode::Gateway => Ok(Self::gateway(access_list()?)),
            AuthMode::Jwt => {
                let secret = config
                    .jwt_secret
                    .as_deref()
                    .ok_or_else(|| missing("auth.jwt_secret"))?;
                Ok(Self::jwt(access_list()?, secret))
            }
        }
    }

    /// Identifies the caller of one request.
    pub fn authenticate(&self, authorization: Option<&str>, repo: &Repository) -> Result<Caller, QueryError> {
        let claims = match &self.scheme {
            Scheme::Open => {
                let access = AccessMap::uniform(repo.datasets().iter().map(|d| d.name.clone()), Tier::MAX);
                return Ok(Caller {
                    access,
                    authorization: None,
                    claims: None,
                });
            }
            Scheme::Gateway => decode_payload(bearer(authorization)?)?,
            Scheme::Jwt { key, validation } => decode::<Claims>(bearer(authorization)?, key, validation)
                .map_err(|e| {
                    warn!(error = %e, "Rejected bearer token");
                    QueryError::NotAuthenticated(format!("invalid token: {e}"))
                })?
                .claims,
        };

        let access = self
            .access_list
            .as_ref()
            .map(|list| list.access_map(&claims.iss, &claims.preferred_username))
            .unwrap_or_default();
        debug!(
            issuer = %claims.iss,
            username = %claims.preferred_username,
            datasets = access.len(),
            "Caller authenticated"
        );
        Ok(Caller {
            access,
            authorization: authorization.map(str::to_string),
            claims: Some(claims),
        })
    }
}

fn missing(key: &str) -> ServerError {
    ServerError::Config(cohort_config::ConfigError::ValidationError(format!("{key} is required")))
}

fn bearer(authorization: Option<&str>) -> Result<&str, QueryError> {
    let header = authorization.ok_or_else(|| QueryError::NotAuthenticated("missing Authorization header".into()))?;
    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| QueryError::NotAuthenticated("malformed Authorization header".into()))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(QueryError::NotAuthenticated("expected a bearer token".into()));
    }
    Ok(token.trim())
}

fn decode_payload(token: &str) -> Result<Claims, QueryError> {
    let invalid = |reason: &str| QueryError::NotAuthenticated(format!("invalid token: {reason}"));
    let payload = token.split('.').nth(1).ok_or_else(|| invalid("no payload segment"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| invalid("payload is not base64"))?;
    serde_json::from_slice(&bytes).map_err(|_| invalid("payload lacks iss or preferred_username"))
}
