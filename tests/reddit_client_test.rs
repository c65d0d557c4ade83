//! Integration tests for the Reddit client against a mock API.

use std::time::Duration;

use ereddicator::config::Config;
use ereddicator::source::{
    ContentSource, ItemKind, ItemStatus, PermanentKind, RedditClient, SourceError,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_config(server: &MockServer) -> Config {
    Config {
        reddit_auth_url: server.uri(),
        reddit_api_url: server.uri(),
        page_size: 2,
        ..Config::for_testing()
    }
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-1",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/me"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "test_user"})))
        .mount(server)
        .await;
}

async fn login(server: &MockServer) -> RedditClient {
    mount_login(server).await;
    RedditClient::login(&create_test_config(server))
        .await
        .expect("Login failed")
}

#[tokio::test]
async fn test_login_resolves_username() {
    let server = MockServer::start().await;
    let client = login(&server).await;
    assert_eq!(client.username(), "test_user");
}

#[tokio::test]
async fn test_login_sends_two_factor_code_with_password() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .and(body_string_contains("password=hunter2%3A123456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "token-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "test_user"})))
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.credentials.two_factor_code = Some("123456".to_string());

    RedditClient::login(&config).await.expect("Login failed");
}

#[tokio::test]
async fn test_login_rejected_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let result = RedditClient::login(&create_test_config(&server)).await;
    assert!(matches!(result, Err(SourceError::Fatal(_))));
}

#[tokio::test]
async fn test_list_comments_paginates() {
    let server = MockServer::start().await;
    let client = login(&server).await;

    Mock::given(method("GET"))
        .and(path("/user/test_user/comments"))
        .and(query_param("limit", "2"))
        .and(query_param("after", "t1_b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Listing",
            "data": {
                "after": null,
                "children": [
                    {"kind": "t1", "data": {
                        "name": "t1_c", "body": "[deleted]", "subreddit": "rust",
                        "created_utc": 1_700_000_200.0, "author": "[deleted]"
                    }}
                ]
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/user/test_user/comments"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Listing",
            "data": {
                "after": "t1_b",
                "children": [
                    {"kind": "t1", "data": {
                        "name": "t1_a", "body": "first", "subreddit": "rust",
                        "created_utc": 1_700_000_000.0, "author": "test_user"
                    }},
                    {"kind": "t1", "data": {
                        "name": "t1_b", "body": "second", "subreddit": "golang",
                        "created_utc": 1_700_000_100.0, "author": "test_user", "locked": true
                    }}
                ]
            }
        })))
        .mount(&server)
        .await;

    let first = client.list_comments(None).await.expect("First page failed");
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.next.as_deref(), Some("t1_b"));
    assert!(!first.done);
    assert_eq!(first.items[0].id, "t1_a");
    assert_eq!(first.items[0].kind, ItemKind::Comment);
    assert_eq!(first.items[0].body, "first");
    assert!(first.items[1].locked);
    assert_eq!(first.items[1].container, "golang");

    let second = client
        .list_comments(Some("t1_b"))
        .await
        .expect("Second page failed");
    assert!(second.done);
    assert_eq!(second.items[0].status, ItemStatus::Deleted);
}

#[tokio::test]
async fn test_list_posts_marks_link_posts_not_editable() {
    let server = MockServer::start().await;
    let client = login(&server).await;

    Mock::given(method("GET"))
        .and(path("/user/test_user/submitted"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Listing",
            "data": {
                "after": null,
                "children": [
                    {"kind": "t3", "data": {
                        "name": "t3_self", "selftext": "hello", "subreddit": "rust",
                        "created_utc": 1_700_000_000.0, "is_self": true
                    }},
                    {"kind": "t3", "data": {
                        "name": "t3_link", "selftext": "", "subreddit": "rust",
                        "created_utc": 1_700_000_000.0, "is_self": false, "archived": true
                    }}
                ]
            }
        })))
        .mount(&server)
        .await;

    let page = client.list_posts(None).await.expect("Listing failed");
    assert_eq!(page.items.len(), 2);
    assert!(page.items[0].editable);
    assert_eq!(page.items[0].body, "hello");
    assert!(!page.items[1].editable);
    assert!(page.items[1].locked);
}

#[tokio::test]
async fn test_edit_returns_echoed_body() {
    let server = MockServer::start().await;
    let client = login(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/editusertext"))
        .and(body_string_contains("thing_id=t1_a"))
        .and(body_string_contains("api_type=json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "json": {"errors": [], "data": {"things": [
                {"kind": "t1", "data": {"body": "Replacement Text"}}
            ]}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = client
        .edit_item("t1_a", "Replacement Text")
        .await
        .expect("Edit failed");
    assert_eq!(receipt.body.as_deref(), Some("Replacement Text"));
}

#[tokio::test]
async fn test_edit_api_errors_are_classified() {
    let server = MockServer::start().await;
    let client = login(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/editusertext"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "json": {"errors": [["TOO_OLD", "that's a piece of history now", "parent"]]}
        })))
        .mount(&server)
        .await;

    let err = client.edit_item("t1_old", "text").await.unwrap_err();
    assert!(matches!(
        err,
        SourceError::Permanent {
            kind: PermanentKind::Archived,
            ..
        }
    ));
}

#[tokio::test]
async fn test_delete_posts_fullname() {
    let server = MockServer::start().await;
    let client = login(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/del"))
        .and(body_string_contains("id=t3_self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.delete_item("t3_self").await.expect("Delete failed");
}

#[tokio::test]
async fn test_http_status_classification() {
    let server = MockServer::start().await;
    let client = login(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/del"))
        .and(body_string_contains("id=t1_gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/del"))
        .and(body_string_contains("id=t1_denied"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/del"))
        .and(body_string_contains("id=t1_busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(matches!(
        client.delete_item("t1_gone").await,
        Err(SourceError::Permanent {
            kind: PermanentKind::NotFound,
            ..
        })
    ));
    assert!(matches!(
        client.delete_item("t1_denied").await,
        Err(SourceError::Permanent {
            kind: PermanentKind::Forbidden,
            ..
        })
    ));
    assert!(client
        .delete_item("t1_busy")
        .await
        .is_err_and(|e| e.is_transient()));
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let server = MockServer::start().await;
    let client = login(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/del"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/del"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let first = client.delete_item("t1_a").await;
    assert!(first.is_err_and(|e| e.is_transient()));

    client
        .delete_item("t1_a")
        .await
        .expect("Retry with refreshed token failed");

    let token_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/v1/access_token")
        .count();
    assert_eq!(token_requests, 2);
}

#[tokio::test]
async fn test_concurrent_expiry_refreshes_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "token-1"})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "token-2"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "test_user"})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/del"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(50)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/del"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = RedditClient::login(&create_test_config(&server))
        .await
        .expect("Login failed");

    let (a, b) = tokio::join!(client.delete_item("t1_a"), client.delete_item("t1_b"));
    assert!(a.is_err_and(|e| e.is_transient()));
    assert!(b.is_err_and(|e| e.is_transient()));

    let (a, b) = tokio::join!(client.delete_item("t1_a"), client.delete_item("t1_b"));
    a.expect("Retry with refreshed token failed");
    b.expect("Retry with refreshed token failed");

    let token_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/v1/access_token")
        .count();
    assert_eq!(token_requests, 2);
}
