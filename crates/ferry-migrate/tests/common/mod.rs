//! Shared fixtures for ferry-migrate integration tests.

#![allow(dead_code)]

use ferry_migrate::{EngineConfig, RateLimitConfig, RetryConfig, WindowLimit};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SOURCE_TOKEN: &str = "source-token-0001";
pub const TARGET_TOKEN: &str = "target-token-0002";

/// Engine configuration pointing at `server`, with fast retries and delays.
pub fn test_config(server: &MockServer) -> EngineConfig {
    EngineConfig::new(server.uri())
        .with_retry(RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter: false,
        })
        .with_relist_delay(Duration::from_millis(10))
        .with_rate_limit(RateLimitConfig {
            default: WindowLimit::new(1_000, Duration::from_secs(1)),
            endpoints: Default::default(),
        })
}

/// Success envelope around `data`.
pub fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 0,
        "message": null,
        "data": data
    }))
}

/// Error envelope with a domain code.
pub fn envelope_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": code,
        "message": message,
        "data": null
    }))
}

/// A group row as the platform lists it.
pub fn group(id: i64, name: &str) -> Value {
    json!({ "id": id, "name": name })
}

/// A tag row.
pub fn tag(id: i64, name: &str, group_id: i64) -> Value {
    json!({ "id": id, "name": name, "groupId": group_id, "weight": 1 })
}

/// Accept every token at the identity endpoint.
pub async fn mount_whoami(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/whoami"))
        .respond_with(ok(json!({ "userId": 1, "userName": "ops" })))
        .mount(server)
        .await;
}
