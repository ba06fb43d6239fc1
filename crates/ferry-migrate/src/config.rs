//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{MigrationError, Result};
use crate::kind::ResourceKind;
use crate::retry::RetryPolicy;

/// Default envelope code the platform uses for "name already exists".
pub const DEFAULT_DUPLICATE_CODE: i64 = 10001;

/// Default lifetime of a validated token.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 900;

/// Ceiling and window for one endpoint key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    /// Maximum calls per window.
    pub ceiling: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl WindowLimit {
    /// Create a new limit.
    pub fn new(ceiling: u32, window: Duration) -> Self {
        Self {
            ceiling,
            window_ms: window.as_millis() as u64,
        }
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for WindowLimit {
    fn default() -> Self {
        Self {
            ceiling: 10,
            window_ms: 1000,
        }
    }
}

/// Rate limit configuration, keyed by logical endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Limit applied to keys without an override.
    pub default: WindowLimit,
    /// Per-key overrides (`listGroups`, `createGroup`, `listItems`, `createItem`, `whoAmI`).
    pub endpoints: HashMap<String, WindowLimit>,
}

impl RateLimitConfig {
    /// Limit for an endpoint key.
    pub fn limit_for(&self, key: &str) -> WindowLimit {
        self.endpoints.get(key).copied().unwrap_or(self.default)
    }

    /// Override the limit for one endpoint key.
    pub fn with_endpoint(mut self, key: impl Into<String>, limit: WindowLimit) -> Self {
        self.endpoints.insert(key.into(), limit);
        self
    }
}

/// Retry settings, in serialisable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on any delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Add up to 25% random jitter.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }
}

/// Configuration for a migration engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the remote platform API.
    pub base_url: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Rate limits.
    pub rate_limit: RateLimitConfig,

    /// In-flight entries older than this are evicted from the deduplicator.
    pub dedup_timeout_secs: u64,

    /// Lifetime of a cached token validation.
    pub token_ttl_secs: u64,

    /// Retry policy for transient failures.
    pub retry: RetryConfig,

    /// Items requested per page.
    pub page_size: u32,

    /// Delay before re-listing groups after a failed create.
    pub relist_delay_ms: u64,

    /// Envelope code meaning "duplicate name".
    pub duplicate_code: i64,

    /// Envelope codes meaning "credential expired".
    pub expiry_codes: Vec<i64>,

    /// Case-insensitive message fragments meaning "credential expired".
    pub expiry_messages: Vec<String>,

    /// `system_id` overrides per resource kind.
    pub system_ids: HashMap<ResourceKind, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
            rate_limit: RateLimitConfig::default(),
            dedup_timeout_secs: 60,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            retry: RetryConfig::default(),
            page_size: 100,
            relist_delay_ms: 500,
            duplicate_code: DEFAULT_DUPLICATE_CODE,
            expiry_codes: vec![401, 403],
            expiry_messages: vec![
                "token expired".to_string(),
                "token invalid".to_string(),
                "invalid token".to_string(),
                "login expired".to_string(),
                "not logged in".to_string(),
                "unauthorized".to_string(),
            ],
            system_ids: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration pointing at the given API.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the rate limits.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the retry settings.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the token validation lifetime.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the re-list delay.
    pub fn with_relist_delay(mut self, delay: Duration) -> Self {
        self.relist_delay_ms = delay.as_millis() as u64;
        self
    }

    /// `system_id` for a resource kind.
    pub fn system_id(&self, kind: ResourceKind) -> &str {
        self.system_ids
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_system_id())
    }

    /// Request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Token validation lifetime.
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Deduplicator eviction timeout.
    pub fn dedup_timeout(&self) -> Duration {
        Duration::from_secs(self.dedup_timeout_secs)
    }

    /// Re-list delay.
    pub fn relist_delay(&self) -> Duration {
        Duration::from_millis(self.relist_delay_ms)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(MigrationError::InvalidConfig(
                "base_url must not be empty".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(MigrationError::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }

        let limits = std::iter::once(("default", &self.rate_limit.default)).chain(
            self.rate_limit
                .endpoints
                .iter()
                .map(|(k, v)| (k.as_str(), v)),
        );
        for (key, limit) in limits {
            if limit.ceiling == 0 || limit.window_ms == 0 {
                return Err(MigrationError::InvalidConfig(format!(
                    "rate limit '{key}' needs a non-zero ceiling and window"
                )));
            }
        }

        Ok(())
    }
}
