//! Target-side group resolution.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::credential::Credential;
use crate::error::{MigrationError, Result};
use crate::gateway::{CreateOutcome, Gateway, RemoteGroup};
use crate::kind::ResourceKind;
use crate::types::RemoteId;

/// How a target group id was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Already resolved earlier in this job.
    Cached(RemoteId),
    /// Found by listing the target.
    Existing(RemoteId),
    /// Created by this call.
    Created(RemoteId),
    /// The create call lost a race or hit lag; found by re-listing.
    AlreadyExists(RemoteId),
}

impl Resolution {
    /// The resolved target id.
    pub fn id(&self) -> &RemoteId {
        match self {
            Self::Cached(id) | Self::Existing(id) | Self::Created(id) | Self::AlreadyExists(id) => {
                id
            }
        }
    }

    /// Whether this resolution issued a successful create call.
    pub fn created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

type GroupKey = (Option<String>, String);

/// Ensures target groups exist, creating them at most once per job.
///
/// The resolver is the only writer of group identity; one instance lives
/// for one job, and its cache is dropped with it.
pub struct GroupResolver {
    gateway: Arc<Gateway>,
    kind: ResourceKind,
    resolved: HashMap<GroupKey, RemoteId>,
}

impl GroupResolver {
    /// Create a resolver for one job.
    pub fn new(gateway: Arc<Gateway>, kind: ResourceKind) -> Self {
        Self {
            gateway,
            kind,
            resolved: HashMap::new(),
        }
    }

    /// Number of groups resolved so far.
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    /// Return the target id of the group named `target_name` in `context`,
    /// creating the group if it does not exist.
    pub async fn resolve(
        &mut self,
        target_name: &str,
        context: Option<&str>,
        credential: &Credential,
    ) -> Result<Resolution> {
        let key = (context.map(str::to_string), target_name.to_string());
        if let Some(id) = self.resolved.get(&key) {
            return Ok(Resolution::Cached(id.clone()));
        }

        let resolution = self.lookup_or_create(target_name, context, credential).await?;
        info!(
            kind = %self.kind,
            group = target_name,
            target_id = %resolution.id(),
            created = resolution.created(),
            "Resolved target group"
        );
        self.resolved.insert(key, resolution.id().clone());
        Ok(resolution)
    }

    async fn lookup_or_create(
        &self,
        name: &str,
        context: Option<&str>,
        credential: &Credential,
    ) -> Result<Resolution> {
        if let Some(id) = self.find(name, context, credential).await? {
            return Ok(Resolution::Existing(id));
        }

        match self
            .gateway
            .create_group(self.kind, credential, name, context)
            .await
        {
            CreateOutcome::Created(Some(id)) => Ok(Resolution::Created(id)),
            CreateOutcome::Created(None) => {
                debug!(group = name, "Create returned no id, re-listing");
                self.find(name, context, credential)
                    .await?
                    .map(Resolution::Created)
                    .ok_or_else(|| {
                        MigrationError::UnknownServer(format!(
                            "group '{name}' was created but does not appear in the listing"
                        ))
                    })
            }
            CreateOutcome::AlreadyExists(Some(id)) => Ok(Resolution::AlreadyExists(id)),
            CreateOutcome::AlreadyExists(None) => {
                debug!(group = name, "Group already exists, re-listing");
                self.find(name, context, credential)
                    .await?
                    .map(Resolution::AlreadyExists)
                    .ok_or_else(|| {
                        MigrationError::UnknownServer(format!(
                            "group '{name}' reported as duplicate but not found on re-list"
                        ))
                    })
            }
            CreateOutcome::Failed(e) if e.is_auth_expired() => Err(e),
            CreateOutcome::Failed(e) => {
                let delay = self.gateway.config().relist_delay();
                warn!(
                    group = name,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Group create failed, re-listing once"
                );
                tokio::time::sleep(delay).await;
                match self.find(name, context, credential).await {
                    Ok(Some(id)) => Ok(Resolution::AlreadyExists(id)),
                    Ok(None) => Err(e),
                    Err(relist) if relist.is_auth_expired() => Err(relist),
                    Err(relist) => {
                        debug!(group = name, error = %relist, "Re-list after failed create failed");
                        Err(e)
                    }
                }
            }
        }
    }

    async fn find(
        &self,
        name: &str,
        context: Option<&str>,
        credential: &Credential,
    ) -> Result<Option<RemoteId>> {
        let groups = self
            .gateway
            .list_groups(self.kind, credential, context)
            .await?;
        Ok(find_group(&groups, name, context).map(|group| group.id.clone()))
    }
}

/// First group named `name` whose context is compatible with `context`.
pub fn find_group<'a>(
    groups: &'a [RemoteGroup],
    name: &str,
    context: Option<&str>,
) -> Option<&'a RemoteGroup> {
    groups.iter().find(|group| {
        group.name == name
            && match (context, group.language.as_deref()) {
                (Some(wanted), Some(actual)) => wanted == actual,
                _ => true,
            }
    })
}
