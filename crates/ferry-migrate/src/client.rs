//! HTTP client for the remote platform API.

use crate::config::EngineConfig;
use crate::credential::Credential;
use crate::error::{MigrationError, Result};
use crate::rate_limit::Permit;

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Envelope wrapping every platform response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Zero on success.
    pub code: i64,
    /// Optional human-readable message.
    #[serde(default)]
    pub message: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: Value,
}

/// A successfully interpreted reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply {
    /// `code == 0`, with the envelope's `data`.
    Ok(Value),
    /// The platform reported a duplicate name.
    Duplicate(String),
}

/// HTTP method of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMethod {
    /// Query-string read.
    Get,
    /// JSON body write.
    Post,
    /// Write with an empty body and `Content-Length: 0`.
    PostEmpty,
}

/// Everything needed to issue one call.
#[derive(Debug, Clone)]
pub struct ApiCall {
    /// Logical endpoint key, used for rate limiting.
    pub endpoint: &'static str,
    /// HTTP method.
    pub method: CallMethod,
    /// Path relative to the base URL.
    pub path: String,
    /// `system_id` header value.
    pub system_id: String,
    /// Credential sent in the `authorization` header.
    pub credential: Credential,
    /// Query parameters, ordered.
    pub query: BTreeMap<&'static str, String>,
    /// JSON body for [`CallMethod::Post`].
    pub body: Option<Value>,
}

impl ApiCall {
    /// Start a call description.
    pub fn new(
        endpoint: &'static str,
        method: CallMethod,
        path: impl Into<String>,
        system_id: impl Into<String>,
        credential: &Credential,
    ) -> Self {
        Self {
            endpoint,
            method,
            path: path.into(),
            system_id: system_id.into(),
            credential: credential.clone(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    /// Add a query parameter.
    pub fn with_query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.insert(key, value.to_string());
        self
    }

    /// Set the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Parameters identifying this call, for request deduplication.
    ///
    /// Includes the credential and `system_id` so calls on behalf of
    /// different tenants never collapse into one.
    pub fn dedup_params(&self) -> Value {
        serde_json::json!({
            "path": self.path,
            "system_id": self.system_id,
            "authorization": self.credential.token(),
            "query": self.query,
            "body": self.body,
        })
    }
}

/// Maps envelopes to replies and errors.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    duplicate_code: i64,
    expiry_codes: Vec<i64>,
    expiry_messages: Vec<String>,
}

impl ResponseClassifier {
    /// Build a classifier from engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            duplicate_code: config.duplicate_code,
            expiry_codes: config.expiry_codes.clone(),
            expiry_messages: config
                .expiry_messages
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    /// Whether a message belongs to the expiry vocabulary.
    pub fn is_expiry_message(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.expiry_messages
            .iter()
            .any(|fragment| !fragment.is_empty() && message.contains(fragment.as_str()))
    }

    /// Classify an HTTP status that carries no usable envelope.
    pub fn classify_status(&self, status: StatusCode, body: &str) -> Option<MigrationError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Some(MigrationError::AuthExpired(format!("HTTP {status}")));
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Some(MigrationError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Some(MigrationError::Server {
                code: i64::from(status.as_u16()),
                message: body.to_string(),
            });
        }
        None
    }

    /// Classify a decoded envelope.
    pub fn classify(&self, envelope: Envelope) -> Result<ApiReply> {
        let message = envelope.message.unwrap_or_default();

        if envelope.code == 0 {
            return Ok(ApiReply::Ok(envelope.data));
        }
        if envelope.code == self.duplicate_code {
            return Ok(ApiReply::Duplicate(message));
        }
        if self.expiry_codes.contains(&envelope.code) || self.is_expiry_message(&message) {
            return Err(MigrationError::AuthExpired(format!(
                "code {}: {message}",
                envelope.code
            )));
        }

        Err(MigrationError::Server {
            code: envelope.code,
            message,
        })
    }
}

/// Client for the remote platform.
///
/// Every dispatch consumes a [`Permit`], so calls can only be made by code
/// that went through the rate limiter first.
pub struct ApiClient {
    client: Client,
    base_url: String,
    classifier: ResponseClassifier,
}

impl ApiClient {
    /// Create a new client.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("ferry-migrate")
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| MigrationError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            classifier: ResponseClassifier::new(config),
        })
    }

    /// Base URL calls are made against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one call.
    pub async fn send(&self, permit: Permit, call: &ApiCall) -> Result<ApiReply> {
        debug_assert_eq!(permit.endpoint_key(), call.endpoint);

        let url = format!("{}{}", self.base_url, call.path);
        let request = match call.method {
            CallMethod::Get => self.client.get(&url).query(&call.query),
            CallMethod::Post => self
                .client
                .post(&url)
                .query(&call.query)
                .json(call.body.as_ref().unwrap_or(&Value::Null)),
            CallMethod::PostEmpty => self
                .client
                .post(&url)
                .query(&call.query)
                .header(reqwest::header::CONTENT_LENGTH, 0),
        };

        debug!(
            endpoint = call.endpoint,
            path = %call.path,
            system_id = %call.system_id,
            "Dispatching request"
        );

        let response = request
            .header(reqwest::header::AUTHORIZATION, call.credential.token())
            .header("system_id", &call.system_id)
            .send()
            .await?;

        self.interpret(response).await
    }

    async fn interpret(&self, response: Response) -> Result<ApiReply> {
        let status = response.status();
        let body = response.text().await?;

        if let Some(err) = self.classifier.classify_status(status, &body) {
            return Err(err);
        }

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| {
            MigrationError::UnknownServer(format!("undecodable response envelope: {e}"))
        })?;

        self.classifier.classify(envelope)
    }
}
