//! Process-wide engine wiring.

use std::sync::Arc;
use tracing::debug;

use crate::client::ApiClient;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::gateway::{CallDeduplicator, Gateway};
use crate::orchestrator::MigrationOrchestrator;
use crate::rate_limit::RateLimiter;
use crate::token::{TokenStore, TokenValidator};
use crate::types::{MigrationJob, MigrationOutcome};

/// Owns the shared rate limiter, in-flight map and token cache.
///
/// Every orchestrator and validator handed out by one engine shares the same
/// instances, so concurrent jobs for different resource kinds are throttled
/// and deduplicated together.
pub struct MigrationEngine {
    config: Arc<EngineConfig>,
    gateway: Arc<Gateway>,
}

impl MigrationEngine {
    /// Build an engine from configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(ApiClient::new(&config)?);
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let dedup = Arc::new(CallDeduplicator::new(config.dedup_timeout()));
        let tokens = Arc::new(TokenStore::new(config.token_ttl()));
        let config = Arc::new(config);

        debug!(base_url = %client.base_url(), "Migration engine ready");
        let gateway = Arc::new(Gateway::new(
            client,
            limiter,
            dedup,
            tokens,
            Arc::clone(&config),
        ));

        Ok(Self { config, gateway })
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared gateway.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Shared rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.gateway.limiter()
    }

    /// Validator backed by the shared token cache.
    pub fn validator(&self) -> TokenValidator {
        TokenValidator::new(Arc::clone(&self.gateway))
    }

    /// Orchestrator for one job.
    pub fn orchestrator(&self) -> MigrationOrchestrator {
        MigrationOrchestrator::new(Arc::clone(&self.gateway))
    }

    /// Run a job with default progress and no cancellation.
    pub async fn run(&self, job: &MigrationJob) -> Result<MigrationOutcome> {
        self.orchestrator().run(job).await
    }
}
