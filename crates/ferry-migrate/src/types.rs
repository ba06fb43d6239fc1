//! Common types for migration operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::credential::Credential;
use crate::kind::ResourceKind;

/// Identifier assigned by the remote platform.
///
/// Some subsystems hand out numeric ids, others strings; both are carried
/// through untouched so they can be echoed back in the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    /// Numeric id.
    Num(i64),
    /// String id.
    Str(String),
}

impl RemoteId {
    /// JSON representation, used when the id goes back into a payload.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Num(n) => Value::from(*n),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }

    /// Read an id out of a JSON value, if it is a number or non-empty string.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Num),
            Value::String(s) if !s.is_empty() => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for RemoteId {
    fn from(n: i64) -> Self {
        Self::Num(n)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl FromStr for RemoteId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<i64>()
            .map(Self::Num)
            .unwrap_or_else(|_| Self::Str(s.to_string())))
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Optional rename applied to group and item names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Literal prefix prepended to the name-bearing field.
    pub add_prefix: Option<String>,

    /// Literal text stripped from every text field before the prefix is added.
    pub remove_prefix: Option<String>,
}

impl TransformOptions {
    /// Create empty transform options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the prefix to add.
    pub fn with_add_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.add_prefix = Some(prefix.into());
        self
    }

    /// Set the prefix to remove.
    pub fn with_remove_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.remove_prefix = Some(prefix.into());
        self
    }

    /// Whether these options would change anything.
    pub fn is_noop(&self) -> bool {
        self.add_prefix.as_deref().map_or(true, str::is_empty)
            && self.remove_prefix.as_deref().map_or(true, str::is_empty)
    }
}

/// Which way the job copies resources between the two supplied credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    /// Read with the source credential, write with the target credential.
    #[default]
    SourceToTarget,
    /// Read with the target credential, write with the source credential.
    TargetToSource,
}

/// A migration request submitted by a caller.
#[derive(Debug, Clone)]
pub struct MigrationJob {
    /// Job identifier, used in logs and outcome records.
    pub id: Uuid,

    /// Resource family the selected groups belong to.
    pub kind: ResourceKind,

    /// Source group ids, migrated in this order.
    pub selected_group_ids: Vec<RemoteId>,

    /// Credential of the source tenant.
    pub source_credential: Option<Credential>,

    /// Credential of the target tenant.
    pub target_credential: Option<Credential>,

    /// Optional rename.
    pub transform: Option<TransformOptions>,

    /// Copy direction.
    pub direction: MigrationDirection,
}

impl MigrationJob {
    /// Create a job for the given kind with no groups and no credentials.
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            selected_group_ids: Vec::new(),
            source_credential: None,
            target_credential: None,
            transform: None,
            direction: MigrationDirection::SourceToTarget,
        }
    }

    /// Add a source group to migrate.
    pub fn with_group(mut self, id: impl Into<RemoteId>) -> Self {
        self.selected_group_ids.push(id.into());
        self
    }

    /// Replace the selected groups.
    pub fn with_groups(mut self, ids: impl IntoIterator<Item = RemoteId>) -> Self {
        self.selected_group_ids = ids.into_iter().collect();
        self
    }

    /// Set the source credential.
    pub fn with_source(mut self, credential: Credential) -> Self {
        self.source_credential = Some(credential);
        self
    }

    /// Set the target credential.
    pub fn with_target(mut self, credential: Credential) -> Self {
        self.target_credential = Some(credential);
        self
    }

    /// Set the rename applied to migrated names.
    pub fn with_transform(mut self, transform: TransformOptions) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Set the copy direction.
    pub fn with_direction(mut self, direction: MigrationDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// A group as seen on both sides of a migration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceGroup {
    /// Id on the source tenant.
    pub source_id: RemoteId,

    /// Id on the target tenant, once resolved.
    pub target_id: Option<RemoteId>,

    /// Name on the source tenant.
    pub source_name: String,

    /// Name after the transform.
    pub target_name: String,

    /// Language or other context the group is scoped to.
    pub context: Option<String>,

    /// Item count reported by the source.
    pub item_count: Option<u64>,
}

/// Lifecycle of a single item within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Fetched, not yet written.
    Pending,
    /// Written to the target.
    Migrated,
    /// Recorded as failed.
    Failed,
}

/// A single resource moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceItem {
    /// Id on the source tenant, if the source row carried one.
    pub source_id: Option<RemoteId>,

    /// Source group the item was fetched from.
    pub source_group_id: RemoteId,

    /// Row as returned by the source.
    pub source_payload: Value,

    /// Payload sent to the target, once transformed.
    pub target_payload: Option<Value>,

    /// Target group the item was written into.
    pub target_group_id: Option<RemoteId>,

    /// Id on the target tenant, when the create call returned one.
    pub target_id: Option<RemoteId>,

    /// Current status.
    pub status: ItemStatus,
}

impl ResourceItem {
    /// Wrap a freshly fetched source row.
    pub fn pending(source_group_id: RemoteId, source_payload: Value) -> Self {
        Self {
            source_id: source_payload.get("id").and_then(RemoteId::from_json),
            source_group_id,
            source_payload,
            target_payload: None,
            target_group_id: None,
            target_id: None,
            status: ItemStatus::Pending,
        }
    }

    /// Human-readable label for logs and progress output.
    pub fn label(&self, kind: ResourceKind) -> String {
        let name = self
            .source_payload
            .get(kind.name_field())
            .and_then(Value::as_str);
        match (name, &self.source_id) {
            (Some(name), _) => name.to_string(),
            (None, Some(id)) => format!("#{id}"),
            (None, None) => "<unnamed>".to_string(),
        }
    }
}

/// An item that could not be migrated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    /// The item, with status [`ItemStatus::Failed`].
    pub item: ResourceItem,

    /// Error category (see [`crate::MigrationError::category`]).
    pub category: String,

    /// Human-readable reason.
    pub reason: String,
}

/// A group whose items were not attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupFailure {
    /// Id on the source tenant.
    pub source_id: RemoteId,

    /// Source name, if the group was found.
    pub source_name: Option<String>,

    /// Error category.
    pub category: String,

    /// Human-readable reason.
    pub reason: String,
}

/// Final state of a job that ran to the end of its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Every item and group succeeded.
    Completed,
    /// At least one item or group failure was recorded.
    PartiallyFailed,
    /// The caller cancelled the job between two item operations.
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "COMPLETED"),
            Self::PartiallyFailed => write!(f, "PARTIALLY FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Result of a migration job, returned once and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    /// Job identifier.
    pub job_id: Uuid,

    /// Resource family migrated.
    pub kind: ResourceKind,

    /// Final status.
    pub status: JobStatus,

    /// Items written to the target, in migration order.
    pub succeeded: Vec<ResourceItem>,

    /// Items that failed, in migration order.
    pub failed: Vec<ItemFailure>,

    /// Source group id to target group id.
    pub group_map: BTreeMap<RemoteId, RemoteId>,

    /// Resolved groups in job order.
    pub groups: Vec<ResourceGroup>,

    /// Groups whose items were skipped.
    pub group_failures: Vec<GroupFailure>,

    /// Job-level warnings (expired credentials, cancellation).
    pub warnings: Vec<String>,

    /// Start time of the job.
    pub started_at: DateTime<Utc>,

    /// End time of the job.
    pub completed_at: DateTime<Utc>,
}

impl MigrationOutcome {
    /// Whether every group and item succeeded.
    pub fn is_successful(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// Number of items processed (succeeded plus failed).
    pub fn total_items(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Get the duration of the job.
    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }

    /// Print a summary of the job.
    pub fn print_summary(&self) {
        println!("\n=== Migration Summary ({}) ===\n", self.kind);
        println!("Job:              {}", self.job_id);
        println!("Groups resolved:  {}", self.group_map.len());
        println!("Groups failed:    {}", self.group_failures.len());
        println!("Items migrated:   {}", self.succeeded.len());
        println!("Items failed:     {}", self.failed.len());

        if !self.groups.is_empty() {
            println!("\nGroups:");
            for group in &self.groups {
                let target = group
                    .target_id
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {} ({}) -> {} ({target})",
                    group.source_name, group.source_id, group.target_name
                );
            }
        }

        if !self.group_failures.is_empty() {
            println!("\nGroup failures ({}):", self.group_failures.len());
            for failure in &self.group_failures {
                println!(
                    "  [{}] {}: {}",
                    failure.category, failure.source_id, failure.reason
                );
            }
        }

        if !self.failed.is_empty() {
            println!("\nItem failures ({}):", self.failed.len());
            for failure in &self.failed {
                println!(
                    "  [{}] {}: {}",
                    failure.category,
                    failure.item.label(self.kind),
                    failure.reason
                );
            }
        }

        if !self.warnings.is_empty() {
            println!("\nWarnings ({}):", self.warnings.len());
            for warning in &self.warnings {
                println!("  - {warning}");
            }
        }

        println!(
            "\nCompleted in {} seconds",
            self.duration().num_seconds()
        );
        println!("Overall Status: {}", self.status);
    }
}
