//! Job execution: credential checks, group resolution, item migration.

use futures::{pin_mut, TryStreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::aggregate::ResultAggregator;
use crate::credential::{Credential, CredentialPair};
use crate::error::{MigrationError, Result};
use crate::fetch::ItemFetcher;
use crate::gateway::{Gateway, RemoteGroup};
use crate::group::GroupResolver;
use crate::progress::{MigrationPhase, MigrationProgress};
use crate::token::TokenValidator;
use crate::transform::{transform, transform_name, validate_item};
use crate::types::{
    JobStatus, MigrationJob, MigrationOutcome, RemoteId, ResourceGroup, ResourceItem,
};
use crate::write::ItemWriter;

/// Lifecycle of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Nothing submitted yet.
    Idle,
    /// Ensuring every selected group exists on the target.
    ResolvingGroups,
    /// Copying items of resolved groups.
    MigratingItems,
    /// Every item and group succeeded.
    Completed,
    /// Ran to the end with at least one recorded failure.
    PartiallyFailed,
    /// Stopped early on request.
    Cancelled,
    /// A credential was missing or invalid; nothing was migrated.
    Fatal,
}

impl OrchestratorState {
    /// Whether the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyFailed | Self::Cancelled | Self::Fatal
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Source,
    Target,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

/// Executes [`MigrationJob`]s against a shared [`Gateway`].
pub struct MigrationOrchestrator {
    gateway: Arc<Gateway>,
    validator: TokenValidator,
    progress: Arc<MigrationProgress>,
    cancel: CancellationToken,
    state: OrchestratorState,
}

impl MigrationOrchestrator {
    /// Create an orchestrator.
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            validator: TokenValidator::new(Arc::clone(&gateway)),
            gateway,
            progress: Arc::new(MigrationProgress::new()),
            cancel: CancellationToken::new(),
            state: OrchestratorState::Idle,
        }
    }

    /// Report progress through `progress`.
    pub fn with_progress(mut self, progress: Arc<MigrationProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop between item operations once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels the running job.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Run a job to completion.
    ///
    /// Returns an outcome for every job that got past its credential checks,
    /// even when some groups or items failed. Returns `Err` only when a
    /// credential is missing or rejected.
    pub async fn run(&mut self, job: &MigrationJob) -> Result<MigrationOutcome> {
        let span = info_span!("migration", job_id = %job.id, kind = %job.kind);
        async move {
            info!(groups = job.selected_group_ids.len(), direction = ?job.direction, "Starting migration");

            let credentials = match self.admit(job).await {
                Ok(credentials) => credentials,
                Err(e) => {
                    error!(error = %e, "Migration aborted before any work");
                    self.state = OrchestratorState::Fatal;
                    return Err(e);
                }
            };

            let mut results = ResultAggregator::new(job.id, job.kind);

            self.state = OrchestratorState::ResolvingGroups;
            let resolved = self.resolve_groups(job, &credentials, &mut results).await;

            self.state = OrchestratorState::MigratingItems;
            self.migrate_items(job, &credentials, &resolved, &mut results).await;

            let outcome = results.finish();
            self.state = match outcome.status {
                JobStatus::Completed => OrchestratorState::Completed,
                JobStatus::PartiallyFailed => OrchestratorState::PartiallyFailed,
                JobStatus::Cancelled => OrchestratorState::Cancelled,
            };
            self.progress.set_phase(MigrationPhase::Complete, 0);

            info!(
                status = %outcome.status,
                succeeded = outcome.succeeded.len(),
                failed = outcome.failed.len(),
                group_failures = outcome.group_failures.len(),
                "Migration finished"
            );
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    /// `Idle -> ResolvingGroups`: both credentials present and accepted.
    async fn admit(&self, job: &MigrationJob) -> Result<CredentialPair> {
        let credentials = CredentialPair::resolve(job)?;

        self.progress
            .set_phase(MigrationPhase::ValidatingCredentials, 2);
        for (role, credential) in [
            (Role::Source, &credentials.from),
            (Role::Target, &credentials.to),
        ] {
            let validation = self.validator.validate(credential, false).await?;
            if !validation.valid {
                return Err(MigrationError::InvalidCredential(format!(
                    "{} credential {} rejected: {}",
                    role.as_str(),
                    credential.fingerprint(),
                    validation.reason.unwrap_or_else(|| "unknown reason".to_string())
                )));
            }
            self.progress.increment(Some(role.as_str()));
        }

        Ok(credentials)
    }

    async fn resolve_groups(
        &self,
        job: &MigrationJob,
        credentials: &CredentialPair,
        results: &mut ResultAggregator,
    ) -> Vec<ResourceGroup> {
        self.progress.set_phase(
            MigrationPhase::ResolvingGroups,
            job.selected_group_ids.len() as u64,
        );

        let source_groups = match self
            .gateway
            .list_groups(job.kind, &credentials.from, None)
            .await
        {
            Ok(groups) => groups
                .into_iter()
                .map(|group| (group.id.clone(), group))
                .collect::<HashMap<RemoteId, RemoteGroup>>(),
            Err(e) => {
                warn!(error = %e, "Could not list source groups");
                note_auth_expiry(results, Role::Source, &credentials.from, &e);
                for id in &job.selected_group_ids {
                    results.record_group_failure(id.clone(), None, &e);
                }
                return Vec::new();
            }
        };

        let mut resolver = GroupResolver::new(Arc::clone(&self.gateway), job.kind);
        let mut resolved = Vec::with_capacity(job.selected_group_ids.len());

        let mut seen = HashSet::new();

        for source_id in &job.selected_group_ids {
            if self.cancel.is_cancelled() {
                results.mark_cancelled();
                break;
            }
            if !seen.insert(source_id) {
                debug!(group = %source_id, "Group selected twice, ignoring repeat");
                continue;
            }

            let Some(source) = source_groups.get(source_id) else {
                let e = MigrationError::NotFound(format!("source group {source_id}"));
                warn!(group = %source_id, "Selected group does not exist on the source");
                results.record_group_failure(source_id.clone(), None, &e);
                self.progress.increment(Some(&source_id.to_string()));
                continue;
            };

            let target_name = transform_name(&source.name, job.transform.as_ref());
            let context = source.language.as_deref();

            match resolver.resolve(&target_name, context, &credentials.to).await {
                Ok(resolution) => {
                    let group = ResourceGroup {
                        source_id: source.id.clone(),
                        target_id: Some(resolution.id().clone()),
                        source_name: source.name.clone(),
                        target_name,
                        context: source.language.clone(),
                        item_count: source.item_count,
                    };
                    if results.record_group(group.clone()) {
                        resolved.push(group);
                    }
                }
                Err(e) => {
                    warn!(group = %source.name, error = %e, "Group resolution failed, skipping its items");
                    note_auth_expiry(results, Role::Target, &credentials.to, &e);
                    results.record_group_failure(source.id.clone(), Some(source.name.clone()), &e);
                }
            }
            self.progress.increment(Some(&source.name));
        }

        resolved
    }

    async fn migrate_items(
        &self,
        job: &MigrationJob,
        credentials: &CredentialPair,
        groups: &[ResourceGroup],
        results: &mut ResultAggregator,
    ) {
        let total = groups.iter().filter_map(|g| g.item_count).sum();
        self.progress.set_phase(MigrationPhase::MigratingItems, total);

        let fetcher = ItemFetcher::new(Arc::clone(&self.gateway), job.kind, credentials.from.clone());
        let writer = ItemWriter::new(Arc::clone(&self.gateway), job.kind, credentials.to.clone());
        let counts_known = groups.iter().all(|g| g.item_count.is_some());

        for group in groups {
            if self.cancel.is_cancelled() {
                results.mark_cancelled();
                return;
            }
            let Some(target) = group.target_id.as_ref() else {
                continue;
            };

            debug!(group = %group.source_name, target = %target, "Migrating group items");
            let pages = fetcher.pages(&group.source_id);
            pin_mut!(pages);

            loop {
                let page = match pages.try_next().await {
                    Ok(Some(page)) => page,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(group = %group.source_name, error = %e, "Item fetch failed, abandoning group");
                        note_auth_expiry(results, Role::Source, &credentials.from, &e);
                        results.record_group_failure(
                            group.source_id.clone(),
                            Some(group.source_name.clone()),
                            &e,
                        );
                        break;
                    }
                };

                if !counts_known {
                    self.progress.add_total(page.len() as u64);
                }

                for item in page {
                    if self.cancel.is_cancelled() {
                        results.mark_cancelled();
                        return;
                    }
                    self.migrate_item(job, credentials, &writer, item, target, results)
                        .await;
                }
            }
        }
    }

    async fn migrate_item(
        &self,
        job: &MigrationJob,
        credentials: &CredentialPair,
        writer: &ItemWriter,
        mut item: ResourceItem,
        target: &RemoteId,
        results: &mut ResultAggregator,
    ) {
        let label = item.label(job.kind);

        let prepared = validate_item(job.kind, &item.source_payload).and_then(|()| {
            let payload = transform(job.kind, &item.source_payload, job.transform.as_ref());
            validate_item(job.kind, &payload).map(|()| payload)
        });
        let written = match prepared {
            Ok(payload) => {
                item.target_payload = Some(payload);
                writer.write(&mut item, target).await
            }
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                debug!(item = %label, "Item migrated");
                results.record_success(item);
            }
            Err(e) => {
                warn!(item = %label, error = %e, "Item failed");
                note_auth_expiry(results, Role::Target, &credentials.to, &e);
                results.record_failure(item, &e);
            }
        }
        self.progress.increment(Some(&label));
    }
}

fn note_auth_expiry(
    results: &mut ResultAggregator,
    role: Role,
    credential: &Credential,
    error: &MigrationError,
) {
    if error.is_auth_expired() {
        results.warn_once(
            role.as_str(),
            format!(
                "{} credential {} expired during the job; later calls with it failed fast",
                role.as_str(),
                credential.fingerprint()
            ),
        );
    }
}
