//! Accumulates per-item and per-group results into a [`MigrationOutcome`].

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use crate::error::MigrationError;
use crate::kind::ResourceKind;
use crate::types::{
    GroupFailure, ItemFailure, ItemStatus, JobStatus, MigrationOutcome, RemoteId, ResourceGroup,
    ResourceItem,
};

/// Builds the outcome of one job.
#[derive(Debug)]
pub struct ResultAggregator {
    job_id: Uuid,
    kind: ResourceKind,
    started_at: DateTime<Utc>,
    succeeded: Vec<ResourceItem>,
    failed: Vec<ItemFailure>,
    group_map: BTreeMap<RemoteId, RemoteId>,
    groups: Vec<ResourceGroup>,
    group_failures: Vec<GroupFailure>,
    warnings: Vec<String>,
    warned: HashSet<String>,
    cancelled: bool,
}

impl ResultAggregator {
    /// Start aggregating for a job.
    pub fn new(job_id: Uuid, kind: ResourceKind) -> Self {
        Self {
            job_id,
            kind,
            started_at: Utc::now(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            group_map: BTreeMap::new(),
            groups: Vec::new(),
            group_failures: Vec::new(),
            warnings: Vec::new(),
            warned: HashSet::new(),
            cancelled: false,
        }
    }

    /// Record a migrated item.
    pub fn record_success(&mut self, item: ResourceItem) {
        self.succeeded.push(item);
    }

    /// Record a failed item.
    pub fn record_failure(&mut self, mut item: ResourceItem, error: &MigrationError) {
        item.status = ItemStatus::Failed;
        self.failed.push(ItemFailure {
            item,
            category: error.category().to_string(),
            reason: error.to_string(),
        });
    }

    /// Record a resolved group.
    ///
    /// Returns `false` and keeps the first mapping if the source group was
    /// already mapped to a different target.
    pub fn record_group(&mut self, group: ResourceGroup) -> bool {
        if let Some(target) = &group.target_id {
            match self.group_map.get(&group.source_id) {
                Some(existing) if existing != target => {
                    warn!(
                        source = %group.source_id,
                        existing = %existing,
                        rejected = %target,
                        "Source group already mapped, keeping first mapping"
                    );
                    return false;
                }
                Some(_) => return true,
                None => {
                    self.group_map
                        .insert(group.source_id.clone(), target.clone());
                }
            }
        }
        self.groups.push(group);
        true
    }

    /// Record a group whose items will not be attempted.
    pub fn record_group_failure(
        &mut self,
        source_id: RemoteId,
        source_name: Option<String>,
        error: &MigrationError,
    ) {
        self.group_failures.push(GroupFailure {
            source_id,
            source_name,
            category: error.category().to_string(),
            reason: error.to_string(),
        });
    }

    /// Add a job-level warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Add a warning unless one was already recorded under `key`.
    pub fn warn_once(&mut self, key: &str, message: impl Into<String>) -> bool {
        if !self.warned.insert(key.to_string()) {
            return false;
        }
        self.warn(message);
        true
    }

    /// Mark the job as cancelled.
    pub fn mark_cancelled(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.warn("job cancelled; remaining items were not attempted");
        }
    }

    /// Target id recorded for a source group.
    pub fn target_for(&self, source_id: &RemoteId) -> Option<&RemoteId> {
        self.group_map.get(source_id)
    }

    /// Whether any item or group failure has been recorded.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.group_failures.is_empty()
    }

    /// Items processed so far.
    pub fn processed(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Status the job would finish with now.
    pub fn status(&self) -> JobStatus {
        if self.cancelled {
            JobStatus::Cancelled
        } else if self.has_failures() {
            JobStatus::PartiallyFailed
        } else {
            JobStatus::Completed
        }
    }

    /// Seal the outcome.
    pub fn finish(self) -> MigrationOutcome {
        MigrationOutcome {
            job_id: self.job_id,
            kind: self.kind,
            status: self.status(),
            succeeded: self.succeeded,
            failed: self.failed,
            group_map: self.group_map,
            groups: self.groups,
            group_failures: self.group_failures,
            warnings: self.warnings,
            started_at: self.started_at,
            completed_at: Utc::now(),
        }
    }
}
