//! # Ferry Migration Engine
//!
//! Copies labeled resource groups (tag groups, FAQ groups, voice categories)
//! and their items from one tenant of a remote platform to another, through
//! the platform's HTTP API.
//!
//! ## Features
//!
//! - **Idempotent group resolution**: target groups are looked up before they
//!   are created, and "duplicate name" replies resolve by re-listing
//! - **Prefix transform**: deterministic rename of groups and items
//! - **Rate limiting**: fixed-window limits per endpoint, enforced by requiring
//!   a limiter permit for every dispatch
//! - **Request deduplication**: concurrent identical reads share one round trip
//! - **Token validation**: who-am-i results cached with a TTL and dropped on
//!   any expiry signal
//! - **Partial failure**: item and group failures are recorded, never fatal
//!
//! ## Example
//!
//! ```rust,ignore
//! use ferry_migrate::{Credential, EngineConfig, MigrationEngine, MigrationJob, ResourceKind, TransformOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = MigrationEngine::new(EngineConfig::new("https://api.example.com"))?;
//!
//!     let job = MigrationJob::new(ResourceKind::Tag)
//!         .with_group(12i64)
//!         .with_group(13i64)
//!         .with_source(Credential::new("source-token"))
//!         .with_target(Credential::new("target-token"))
//!         .with_transform(TransformOptions::new().with_remove_prefix("OLD_").with_add_prefix("A_"));
//!
//!     let outcome = engine.run(&job).await?;
//!     outcome.print_summary();
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod cache;
pub mod client;
pub mod config;
pub mod credential;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod gateway;
pub mod group;
pub mod kind;
pub mod orchestrator;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod token;
pub mod transform;
pub mod types;
pub mod write;

// Re-export main types
pub use aggregate::ResultAggregator;
pub use cache::TtlCache;
pub use client::{ApiClient, ApiReply};
pub use config::{EngineConfig, RateLimitConfig, RetryConfig, WindowLimit};
pub use credential::{Credential, CredentialPair};
pub use dedup::RequestDeduplicator;
pub use engine::MigrationEngine;
pub use error::{MigrationError, Result};
pub use gateway::{CreateOutcome, Gateway};
pub use group::{GroupResolver, Resolution};
pub use kind::ResourceKind;
pub use orchestrator::{MigrationOrchestrator, OrchestratorState};
pub use progress::{ConsoleProgressReporter, MigrationPhase, MigrationProgress, ProgressCallback};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use token::{Identity, TokenValidation, TokenValidator};
pub use types::*;

/// Version of the migration engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
