//! Item creation on the target tenant.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::credential::Credential;
use crate::error::{MigrationError, Result};
use crate::gateway::{CreateOutcome, Gateway};
use crate::kind::ResourceKind;
use crate::types::{ItemStatus, RemoteId, ResourceItem};

/// Fields that only make sense on the tenant a row was read from.
const SOURCE_ONLY_FIELDS: &[&str] = &[
    "id",
    "groupId",
    "tenantId",
    "createTime",
    "updateTime",
    "createdAt",
    "updatedAt",
];

/// Build the create-call body for an item going into `target_group`.
pub fn wire_payload(target_payload: &Value, target_group: &RemoteId) -> Result<Value> {
    let Value::Object(fields) = target_payload else {
        return Err(MigrationError::Validation(
            "target payload is not an object".to_string(),
        ));
    };

    let mut body = fields.clone();
    for field in SOURCE_ONLY_FIELDS {
        body.remove(*field);
    }
    body.insert("groupId".to_string(), target_group.to_json());
    Ok(Value::Object(body))
}

/// Writes items to the target. The only writer of item identity.
pub struct ItemWriter {
    gateway: Arc<Gateway>,
    kind: ResourceKind,
    credential: Credential,
}

impl ItemWriter {
    /// Create a writer authenticated with `credential`.
    pub fn new(gateway: Arc<Gateway>, kind: ResourceKind, credential: Credential) -> Self {
        Self {
            gateway,
            kind,
            credential,
        }
    }

    /// Write `item` into `target_group`.
    ///
    /// The item must already carry its transformed payload. A duplicate
    /// reply counts as success: the item exists on the target.
    pub async fn write(&self, item: &mut ResourceItem, target_group: &RemoteId) -> Result<()> {
        let result = self.create(item, target_group).await;
        item.target_group_id = Some(target_group.clone());
        match result {
            Ok(target_id) => {
                item.target_id = target_id;
                item.status = ItemStatus::Migrated;
                Ok(())
            }
            Err(e) => {
                item.status = ItemStatus::Failed;
                Err(e)
            }
        }
    }

    async fn create(&self, item: &ResourceItem, target_group: &RemoteId) -> Result<Option<RemoteId>> {
        let payload = item.target_payload.as_ref().ok_or_else(|| {
            MigrationError::Validation("item has no target payload".to_string())
        })?;
        let body = wire_payload(payload, target_group)?;

        match self.gateway.create_item(self.kind, &self.credential, body).await {
            CreateOutcome::Created(id) => Ok(id),
            CreateOutcome::AlreadyExists(id) => {
                debug!(item = %item.label(self.kind), "Item already exists on target");
                Ok(id)
            }
            CreateOutcome::Failed(e) => Err(e),
        }
    }
}
