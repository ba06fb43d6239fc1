//! Credential validation and the process-wide token cache.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::credential::Credential;
use crate::error::{MigrationError, Result};
use crate::gateway::Gateway;

/// Identity returned by the who-am-i endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Identity(Value);

impl Identity {
    /// Wrap the raw who-am-i payload.
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// Raw payload.
    pub fn raw(&self) -> &Value {
        &self.0
    }

    /// User id, if the payload carries one.
    pub fn user_id(&self) -> Option<String> {
        ["userId", "id"]
            .iter()
            .find_map(|k| self.0.get(*k))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }

    /// Best display name available.
    pub fn display_name(&self) -> Option<&str> {
        ["userName", "nickname", "name"]
            .iter()
            .find_map(|k| self.0.get(*k).and_then(Value::as_str))
    }
}

/// Outcome of validating one token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenValidation {
    /// Whether the platform accepted the token.
    pub valid: bool,
    /// Identity behind the token.
    pub identity: Option<Identity>,
    /// Why the token was rejected.
    pub reason: Option<String>,
}

impl TokenValidation {
    fn accepted(identity: Identity) -> Self {
        Self {
            valid: true,
            identity: Some(identity),
            reason: None,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            identity: None,
            reason: Some(reason.into()),
        }
    }
}

/// A cached successful validation.
#[derive(Debug, Clone)]
pub struct TokenCacheEntry {
    /// Identity the token resolved to.
    pub identity: Identity,
    /// When the validation happened.
    pub validated_at: DateTime<Utc>,
}

/// Every place a token's validation state lives.
///
/// Shared by the [`Gateway`], which reports expiry signals seen on any
/// response, and the [`TokenValidator`], which fills the cache.
#[derive(Debug)]
pub struct TokenStore {
    cache: TtlCache<String, TokenCacheEntry>,
    expired: TtlCache<String, ()>,
}

impl TokenStore {
    /// Create a store whose validations and expiry marks live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
            expired: TtlCache::new(ttl),
        }
    }

    /// Cached validation for `token`, if still within its TTL.
    pub fn cached(&self, token: &str) -> Option<TokenCacheEntry> {
        self.cache.get(&token.to_string())
    }

    /// Record a successful validation and clear any expiry mark.
    pub fn remember(&self, token: &str, identity: Identity) {
        self.expired.invalidate(&token.to_string());
        self.cache.set(
            token.to_string(),
            TokenCacheEntry {
                identity,
                validated_at: Utc::now(),
            },
        );
    }

    /// Drop every trace of `token` and mark it expired.
    pub fn invalidate(&self, token: &str) {
        let key = token.to_string();
        let was_cached = self.cache.invalidate(&key);
        let newly_expired = self.expired.get(&key).is_none();
        self.expired.purge_expired();
        self.expired.set(key, ());
        if newly_expired {
            warn!(was_cached, "Credential expired, dropped from token cache");
        }
    }

    /// Whether an expiry signal has been seen for `token` within the TTL.
    pub fn is_expired(&self, token: &str) -> bool {
        self.expired.get(&token.to_string()).is_some()
    }

    /// Number of cached validations.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

/// Validates tenant credentials against the who-am-i endpoint.
pub struct TokenValidator {
    gateway: Arc<Gateway>,
}

impl TokenValidator {
    /// Create a validator that dispatches through `gateway`.
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Validate `credential`.
    ///
    /// Without `force`, a cached validation is returned if present, and a
    /// credential seen expiring within the TTL is rejected without a network
    /// call.
    pub async fn validate(&self, credential: &Credential, force: bool) -> Result<TokenValidation> {
        let store = self.gateway.tokens();
        let token = credential.token();

        if credential.is_blank() {
            return Ok(TokenValidation::rejected("empty token"));
        }

        if !force {
            if let Some(entry) = store.cached(token) {
                debug!(credential = %credential.fingerprint(), "Token validation served from cache");
                return Ok(TokenValidation::accepted(entry.identity));
            }
            if store.is_expired(token) {
                return Ok(TokenValidation::rejected("credential expired"));
            }
        }

        match self.gateway.who_am_i(credential).await {
            Ok(raw) => {
                let identity = Identity::new(raw);
                store.remember(token, identity.clone());
                info!(
                    credential = %credential.fingerprint(),
                    user = identity.display_name().unwrap_or("unknown"),
                    "Credential validated"
                );
                Ok(TokenValidation::accepted(identity))
            }
            Err(MigrationError::AuthExpired(reason)) => {
                Ok(TokenValidation::rejected(reason))
            }
            Err(MigrationError::Server { code, message }) => {
                warn!(code, message = %message, "Identity endpoint rejected credential");
                Ok(TokenValidation::rejected(format!("code {code}: {message}")))
            }
            Err(e) => Err(e),
        }
    }

    /// Drop `credential` from every cache.
    pub fn invalidate(&self, credential: &Credential) {
        self.gateway.tokens().invalidate(credential.token());
    }
}
