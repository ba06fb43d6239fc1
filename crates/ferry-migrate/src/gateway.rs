//! Single route from engine components to the remote platform.
//!
//! Group resolution, item fetching, item writing and token validation all
//! hold an `Arc<Gateway>` rather than an [`ApiClient`]. Each call goes
//! through the expired-credential check, request deduplication, the retry
//! policy and the rate limiter, in that order.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::{ApiCall, ApiClient, ApiReply, CallMethod};
use crate::config::EngineConfig;
use crate::credential::Credential;
use crate::dedup::{request_key, RequestDeduplicator};
use crate::error::{MigrationError, Result};
use crate::kind::ResourceKind;
use crate::rate_limit::{endpoint, RateLimiter};
use crate::retry::RetryPolicy;
use crate::token::TokenStore;
use crate::types::RemoteId;

/// Path of the who-am-i endpoint.
pub const WHO_AM_I_PATH: &str = "/api/auth/whoami";

/// `system_id` sent with identity calls.
pub const IDENTITY_SYSTEM_ID: &str = "auth";

/// Process-wide map of in-flight calls, shared across jobs.
pub type CallDeduplicator = RequestDeduplicator<Result<ApiReply>>;

/// A group as listed by the platform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGroup {
    /// Group id.
    pub id: RemoteId,
    /// Group name.
    pub name: String,
    /// Language or other scoping context.
    #[serde(default)]
    pub language: Option<String>,
    /// Number of items, when reported.
    #[serde(default)]
    pub item_count: Option<u64>,
}

/// One page of items.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItemPage {
    /// Raw item rows.
    #[serde(default)]
    pub list: Vec<Value>,
    /// Total item count, when reported.
    #[serde(default)]
    pub total: Option<u64>,
}

/// Result of a create call.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// Created; the id is present when the platform returned one.
    Created(Option<RemoteId>),
    /// The platform reported a duplicate name.
    AlreadyExists(Option<RemoteId>),
    /// The call failed.
    Failed(MigrationError),
}

/// Everything a dispatch needs, cheap to clone into a `'static` future.
#[derive(Clone)]
struct Dispatcher {
    client: Arc<ApiClient>,
    limiter: Arc<RateLimiter>,
    tokens: Arc<TokenStore>,
    retry: RetryPolicy,
}

impl Dispatcher {
    async fn dispatch(&self, call: &ApiCall) -> Result<ApiReply> {
        let token = call.credential.token();
        if self.tokens.is_expired(token) {
            return Err(MigrationError::AuthExpired(format!(
                "credential {} expired earlier in this session",
                call.credential.fingerprint()
            )));
        }

        let client = &self.client;
        let limiter = &self.limiter;
        let result = self
            .retry
            .execute(call.endpoint, move || async move {
                let permit = limiter.acquire(call.endpoint).await;
                client.send(permit, call).await
            })
            .await;

        if let Err(e) = &result {
            if e.is_auth_expired() {
                self.tokens.invalidate(token);
            }
        }
        result
    }
}

/// Rate-limited, deduplicating, retrying access to the remote platform.
pub struct Gateway {
    dispatcher: Dispatcher,
    dedup: Arc<CallDeduplicator>,
    config: Arc<EngineConfig>,
}

impl Gateway {
    /// Assemble a gateway from its shared parts.
    pub fn new(
        client: Arc<ApiClient>,
        limiter: Arc<RateLimiter>,
        dedup: Arc<CallDeduplicator>,
        tokens: Arc<TokenStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        Self {
            dispatcher: Dispatcher {
                client,
                limiter,
                tokens,
                retry,
            },
            dedup,
            config,
        }
    }

    /// Token store shared with the validator.
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.dispatcher.tokens
    }

    /// Shared rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.dispatcher.limiter
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn call(&self, call: ApiCall) -> Result<ApiReply> {
        self.dispatcher.dispatch(&call).await
    }

    async fn call_deduped(&self, call: ApiCall) -> Result<ApiReply> {
        let key = request_key(call.endpoint, &call.dedup_params());
        let dispatcher = self.dispatcher.clone();
        self.dedup
            .dedupe(key, move || async move { dispatcher.dispatch(&call).await })
            .await
    }

    fn kind_call(
        &self,
        endpoint: &'static str,
        method: CallMethod,
        kind: ResourceKind,
        resource: &str,
        credential: &Credential,
    ) -> ApiCall {
        ApiCall::new(
            endpoint,
            method,
            format!("/api/{}/{resource}", kind.path_segment()),
            self.config.system_id(kind),
            credential,
        )
    }

    /// List groups of `kind`, optionally filtered by context.
    pub async fn list_groups(
        &self,
        kind: ResourceKind,
        credential: &Credential,
        context: Option<&str>,
    ) -> Result<Vec<RemoteGroup>> {
        let mut call = self.kind_call(endpoint::LIST_GROUPS, CallMethod::Get, kind, "groups", credential);
        if let Some(context) = context {
            call = call.with_query("language", context);
        }

        let data = expect_ok(self.call_deduped(call).await?, "list groups")?;
        let groups = match data {
            Value::Null => Vec::new(),
            Value::Object(ref map) if map.contains_key("list") => {
                serde_json::from_value(map["list"].clone())?
            }
            other => serde_json::from_value(other)?,
        };
        Ok(groups)
    }

    /// Create a group of `kind`.
    pub async fn create_group(
        &self,
        kind: ResourceKind,
        credential: &Credential,
        name: &str,
        context: Option<&str>,
    ) -> CreateOutcome {
        let mut body = serde_json::json!({ "name": name });
        if let Some(context) = context {
            body["language"] = Value::from(context);
        }
        let call = self
            .kind_call(endpoint::CREATE_GROUP, CallMethod::Post, kind, "groups", credential)
            .with_body(body);

        create_outcome(self.call_deduped(call).await)
    }

    /// Fetch one page (1-based) of a group's items.
    pub async fn list_items(
        &self,
        kind: ResourceKind,
        credential: &Credential,
        group_id: &RemoteId,
        page: u32,
        page_size: u32,
    ) -> Result<ItemPage> {
        let call = self
            .kind_call(endpoint::LIST_ITEMS, CallMethod::Get, kind, "items", credential)
            .with_query("groupId", group_id)
            .with_query("page", page)
            .with_query("pageSize", page_size);

        let data = expect_ok(self.call_deduped(call).await?, "list items")?;
        let page = match data {
            Value::Null => ItemPage::default(),
            Value::Array(list) => ItemPage { list, total: None },
            other => serde_json::from_value(other)?,
        };
        debug!(group = %group_id, items = page.list.len(), "Fetched item page");
        Ok(page)
    }

    /// Create an item of `kind`. Item writes are never collapsed.
    pub async fn create_item(
        &self,
        kind: ResourceKind,
        credential: &Credential,
        payload: Value,
    ) -> CreateOutcome {
        let call = self
            .kind_call(endpoint::CREATE_ITEM, CallMethod::Post, kind, "items", credential)
            .with_body(payload);

        create_outcome(self.call(call).await)
    }

    /// Call the who-am-i endpoint with an empty body.
    pub async fn who_am_i(&self, credential: &Credential) -> Result<Value> {
        let call = ApiCall::new(
            endpoint::WHO_AM_I,
            CallMethod::PostEmpty,
            WHO_AM_I_PATH,
            IDENTITY_SYSTEM_ID,
            credential,
        );
        expect_ok(self.call_deduped(call).await?, "who am i")
    }
}

fn expect_ok(reply: ApiReply, operation: &str) -> Result<Value> {
    match reply {
        ApiReply::Ok(data) => Ok(data),
        ApiReply::Duplicate(message) => Err(MigrationError::UnknownServer(format!(
            "{operation} returned a duplicate-name reply: {message}"
        ))),
    }
}

fn create_outcome(reply: Result<ApiReply>) -> CreateOutcome {
    match reply {
        Ok(ApiReply::Ok(data)) => CreateOutcome::Created(extract_id(&data)),
        Ok(ApiReply::Duplicate(message)) => {
            debug!(message = %message, "Create reported duplicate");
            CreateOutcome::AlreadyExists(None)
        }
        Err(e) => {
            if !e.is_auth_expired() {
                warn!(error = %e, "Create call failed");
            }
            CreateOutcome::Failed(e)
        }
    }
}

/// Pull an id out of a create response: `{id}`, `{data: {id}}` or a bare id.
fn extract_id(data: &Value) -> Option<RemoteId> {
    RemoteId::from_json(data)
        .or_else(|| data.get("id").and_then(RemoteId::from_json))
        .or_else(|| data.get("data").and_then(extract_id))
}
