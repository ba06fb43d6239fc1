//! Group resolution, deduplication and token validation against a mocked platform.

mod common;

use common::*;
use ferry_migrate::group::{GroupResolver, Resolution};
use ferry_migrate::{Credential, MigrationEngine, RemoteId, ResourceKind};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target() -> Credential {
    Credential::new(TARGET_TOKEN)
}

#[tokio::test]
async fn test_resolution_is_idempotent_across_runs() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/faq/groups"))
        .respond_with(ok(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/faq/groups"))
        .respond_with(ok(json!([group(5, "New")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/faq/groups"))
        .respond_with(ok(json!({ "id": 5 })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();

    let mut first = GroupResolver::new(Arc::clone(engine.gateway()), ResourceKind::Faq);
    let created = first.resolve("New", None, &target()).await.unwrap();
    assert_eq!(created, Resolution::Created(RemoteId::Num(5)));

    let again = first.resolve("New", None, &target()).await.unwrap();
    assert_eq!(again, Resolution::Cached(RemoteId::Num(5)));

    let mut second = GroupResolver::new(Arc::clone(engine.gateway()), ResourceKind::Faq);
    let found = second.resolve("New", None, &target()).await.unwrap();
    assert_eq!(found, Resolution::Existing(RemoteId::Num(5)));
}

#[tokio::test]
async fn test_duplicate_reply_resolves_by_relisting() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .and(query_param("language", "en"))
        .respond_with(ok(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .and(query_param("language", "en"))
        .respond_with(ok(json!([
            { "id": 7, "name": "Dup", "language": "en" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tag/groups"))
        .respond_with(envelope_error(10001, "name already exists"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let mut resolver = GroupResolver::new(Arc::clone(engine.gateway()), ResourceKind::Tag);

    let resolution = resolver.resolve("Dup", Some("en"), &target()).await.unwrap();
    assert_eq!(resolution, Resolution::AlreadyExists(RemoteId::Num(7)));
}

#[tokio::test]
async fn test_failed_create_relists_once_after_delay() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/voice/groups"))
        .respond_with(ok(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/voice/groups"))
        .respond_with(ok(json!([group(3, "Lagging")])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/voice/groups"))
        .respond_with(envelope_error(5003, "write conflict"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let mut resolver = GroupResolver::new(Arc::clone(engine.gateway()), ResourceKind::Voice);

    let resolution = resolver.resolve("Lagging", None, &target()).await.unwrap();
    assert_eq!(resolution, Resolution::AlreadyExists(RemoteId::Num(3)));
}

#[tokio::test]
async fn test_failed_create_surfaces_error_when_relist_misses() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .respond_with(ok(json!([])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tag/groups"))
        .respond_with(envelope_error(5003, "write conflict"))
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let mut resolver = GroupResolver::new(Arc::clone(engine.gateway()), ResourceKind::Tag);

    let err = resolver.resolve("Nope", None, &target()).await.unwrap_err();
    assert_eq!(err.category(), "server");
}

#[tokio::test]
async fn test_failed_create_keeps_its_error_when_relist_fails() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .respond_with(ok(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tag/groups"))
        .respond_with(envelope_error(5003, "write conflict"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let mut resolver = GroupResolver::new(Arc::clone(engine.gateway()), ResourceKind::Tag);

    let err = resolver.resolve("Nope", None, &target()).await.unwrap_err();
    assert_eq!(err.category(), "server");
    assert!(err.to_string().contains("write conflict"));
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .respond_with(ok(json!([group(1, "G1")])))
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let groups = engine
        .gateway()
        .list_groups(ResourceKind::Tag, &target(), None)
        .await
        .unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "G1");
}

#[tokio::test]
async fn test_concurrent_identical_reads_share_one_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .respond_with(ok(json!([group(1, "G1")])).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let gateway = engine.gateway();
    let credential = target();

    let (a, b) = tokio::join!(
        gateway.list_groups(ResourceKind::Tag, &credential, None),
        gateway.list_groups(ResourceKind::Tag, &credential, None),
    );

    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn test_item_pages_are_read_until_total() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tag/items"))
        .and(query_param("page", "1"))
        .respond_with(ok(json!({ "list": [tag(1, "a", 9), tag(2, "b", 9)], "total": 3 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tag/items"))
        .and(query_param("page", "2"))
        .respond_with(ok(json!({ "list": [tag(3, "c", 9)], "total": 3 })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tag/items"))
        .and(query_param("page", "3"))
        .respond_with(ok(json!({ "list": [], "total": 3 })))
        .expect(0)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let fetcher = ferry_migrate::fetch::ItemFetcher::new(
        Arc::clone(engine.gateway()),
        ResourceKind::Tag,
        Credential::new(SOURCE_TOKEN),
    )
    .with_page_size(2);

    let items = fetcher.fetch_all(&RemoteId::Num(9)).await.unwrap();
    let ids: Vec<_> = items.iter().filter_map(|i| i.source_id.clone()).collect();
    assert_eq!(ids, vec![RemoteId::Num(1), RemoteId::Num(2), RemoteId::Num(3)]);
}

#[tokio::test]
async fn test_short_pages_are_followed_while_total_remains() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tag/items"))
        .and(query_param("page", "1"))
        .respond_with(ok(json!({ "list": [tag(1, "a", 9), tag(2, "b", 9)], "total": 3 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tag/items"))
        .and(query_param("page", "2"))
        .respond_with(ok(json!({ "list": [tag(3, "c", 9)], "total": 3 })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let fetcher = ferry_migrate::fetch::ItemFetcher::new(
        Arc::clone(engine.gateway()),
        ResourceKind::Tag,
        Credential::new(SOURCE_TOKEN),
    )
    .with_page_size(100);

    let items = fetcher.fetch_all(&RemoteId::Num(9)).await.unwrap();
    let ids: Vec<_> = items.iter().filter_map(|i| i.source_id.clone()).collect();
    assert_eq!(ids, vec![RemoteId::Num(1), RemoteId::Num(2), RemoteId::Num(3)]);
}

#[tokio::test]
async fn test_repeated_page_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tag/items"))
        .respond_with(ok(json!({ "list": [tag(1, "a", 9), tag(2, "b", 9)] })))
        .expect(2)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let fetcher = ferry_migrate::fetch::ItemFetcher::new(
        Arc::clone(engine.gateway()),
        ResourceKind::Tag,
        Credential::new(SOURCE_TOKEN),
    )
    .with_page_size(2);

    let err = fetcher.fetch_all(&RemoteId::Num(9)).await.unwrap_err();
    assert_eq!(err.category(), "unknown_server");
}

#[tokio::test]
async fn test_token_validation_is_cached_until_ttl() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/whoami"))
        .and(header("authorization", SOURCE_TOKEN))
        .and(header("system_id", "auth"))
        .respond_with(ok(json!({ "userId": 42, "userName": "ops" })))
        .expect(2)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server).with_token_ttl(Duration::from_secs(1)))
        .unwrap();
    let validator = engine.validator();
    let credential = Credential::new(SOURCE_TOKEN);

    let first = validator.validate(&credential, false).await.unwrap();
    assert!(first.valid);
    assert_eq!(
        first.identity.as_ref().and_then(|i| i.user_id()).as_deref(),
        Some("42")
    );

    let cached = validator.validate(&credential, false).await.unwrap();
    assert!(cached.valid);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let fresh = validator.validate(&credential, false).await.unwrap();
    assert!(fresh.valid);
}

#[tokio::test]
async fn test_forced_validation_bypasses_cache() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/whoami"))
        .respond_with(ok(json!({ "id": "u-1" })))
        .expect(2)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let validator = engine.validator();
    let credential = Credential::new(SOURCE_TOKEN);

    validator.validate(&credential, false).await.unwrap();
    validator.validate(&credential, true).await.unwrap();
}

#[tokio::test]
async fn test_expired_token_is_dropped_and_fails_fast() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/whoami"))
        .respond_with(ok(json!({ "id": 1 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server)).unwrap();
    let validator = engine.validator();
    let credential = target();

    assert!(validator.validate(&credential, false).await.unwrap().valid);
    assert_eq!(engine.gateway().tokens().cached_len(), 1);

    let err = engine
        .gateway()
        .list_groups(ResourceKind::Tag, &credential, None)
        .await
        .unwrap_err();
    assert!(err.is_auth_expired());
    assert_eq!(engine.gateway().tokens().cached_len(), 0);

    let again = engine
        .gateway()
        .list_groups(ResourceKind::Tag, &credential, Some("en"))
        .await
        .unwrap_err();
    assert!(again.is_auth_expired());

    let validation = validator.validate(&credential, false).await.unwrap();
    assert!(!validation.valid);
}

#[tokio::test]
async fn test_expiry_mark_lapses_and_validation_calls_remote_again() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/whoami"))
        .respond_with(ok(json!({ "id": 1 })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tag/groups"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let engine = MigrationEngine::new(test_config(&server).with_token_ttl(Duration::from_secs(1)))
        .unwrap();
    let validator = engine.validator();
    let credential = target();

    assert!(validator.validate(&credential, false).await.unwrap().valid);
    engine
        .gateway()
        .list_groups(ResourceKind::Tag, &credential, None)
        .await
        .unwrap_err();
    assert!(!validator.validate(&credential, false).await.unwrap().valid);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(validator.validate(&credential, false).await.unwrap().valid);
    assert!(!engine.gateway().tokens().is_expired(TARGET_TOKEN));
}
