//! Redirect integration tests
//!
//! These tests drive the redirect router: shortlink resolution, the legacy
//! `/track` endpoint, attribution cookies and the background click writes.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;
use tradinta::config::RedirectConfig;
use tradinta::dispatch::BackgroundDispatcher;
use tradinta::models::Shortlink;
use tradinta::redirect::{self, RedirectState};
use tradinta::storage::{SqliteStorage, Storage, UnavailableStorage};

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn create_router(storage: Arc<dyn Storage>) -> (Router, Arc<BackgroundDispatcher>) {
    let dispatcher = Arc::new(BackgroundDispatcher::new(Arc::clone(&storage), 1000));
    let router = redirect::create_redirect_router(Arc::new(RedirectState {
        storage,
        dispatcher: Arc::clone(&dispatcher),
        config: RedirectConfig::default(),
    }));
    (router, dispatcher)
}

async fn create_link(storage: &Arc<dyn Storage>, id: &str, destination: Option<&str>, partner: Option<&str>) {
    storage
        .create_shortlink(&Shortlink {
            id: id.to_string(),
            destination_url: destination.map(str::to_string),
            partner_id: partner.map(str::to_string),
            campaign: Some("spring".to_string()),
            click_count: 0,
            created_at: 1_700_000_000,
        })
        .await
        .unwrap();
}

async fn get(router: &Router, uri: &str) -> Response {
    router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::HOST, "shop.example")
                .header(header::USER_AGENT, "redirect-test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
}

fn cookie(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap())
}

#[tokio::test]
async fn test_redirect_to_absolute_destination() {
    let storage = create_test_storage().await;
    create_link(&storage, "abc1234", Some("https://partner.example/deal?x=1"), None).await;
    let (router, _) = create_router(Arc::clone(&storage));

    let response = get(&router, "/l/abc1234").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "https://partner.example/deal?x=1");
    assert!(cookie(&response).is_none());
}

#[tokio::test]
async fn test_relative_destination_uses_request_origin() {
    let storage = create_test_storage().await;
    create_link(&storage, "rel", Some("/products/desk-lamp"), None).await;
    let (router, _) = create_router(Arc::clone(&storage));

    let response = get(&router, "/l/rel").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "http://shop.example/products/desk-lamp");
}

#[tokio::test]
async fn test_unknown_link_goes_to_not_found() {
    let (router, _) = create_router(create_test_storage().await);

    let response = get(&router, "/l/nope").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/not-found");
}

#[tokio::test]
async fn test_missing_link_id_is_bad_request() {
    let (router, _) = create_router(create_test_storage().await);

    for uri in ["/l", "/l/", "/l/%20"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {uri}");
    }
}

#[tokio::test]
async fn test_bad_destination_goes_to_root() {
    let storage = create_test_storage().await;
    create_link(&storage, "none", None, Some("partner-1")).await;
    create_link(&storage, "js", Some("javascript:alert(1)"), None).await;
    create_link(&storage, "proto", Some("//evil.example/path"), None).await;
    let (router, dispatcher) = create_router(Arc::clone(&storage));

    for uri in ["/l/none", "/l/js", "/l/proto"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/");
        assert!(cookie(&response).is_none());
    }

    dispatcher.flush().await;
    assert!(storage.list_click_events(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_failure_never_surfaces() {
    let (router, _) = create_router(Arc::new(UnavailableStorage));

    let response = get(&router, "/l/abc1234").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_repeat_resolution_counts_every_click() {
    let storage = create_test_storage().await;
    create_link(&storage, "twice", Some("https://partner.example/"), Some("partner-7")).await;
    let (router, dispatcher) = create_router(Arc::clone(&storage));

    let first = get(&router, "/l/twice").await;
    let second = get(&router, "/l/twice").await;
    assert_eq!(location(&first), location(&second));
    assert_eq!(cookie(&first), cookie(&second));

    dispatcher.flush().await;

    let link = storage.get_shortlink("twice").await.unwrap().unwrap();
    assert_eq!(link.click_count, 2);

    let events = storage.list_click_events(Some("twice"), 10).await.unwrap();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(event.partner_id.as_deref(), Some("partner-7"));
        assert_eq!(event.target_url, "https://partner.example/");
        assert_eq!(event.campaign.as_deref(), Some("spring"));
        assert_eq!(event.user_agent.as_deref(), Some("redirect-test"));
    }
}

#[tokio::test]
async fn test_partner_link_sets_referral_cookie() {
    let storage = create_test_storage().await;
    create_link(&storage, "ref", Some("https://partner.example/"), Some("partner-7")).await;
    let (router, _) = create_router(Arc::clone(&storage));

    let response = get(&router, "/l/ref").await;
    let cookie = cookie(&response).expect("referral cookie");
    assert_eq!(
        cookie,
        "referralCode=partner-7; Path=/; Max-Age=2592000; SameSite=Lax"
    );
    assert!(!cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_concurrent_redirects() {
    let storage = create_test_storage().await;
    create_link(&storage, "busy", Some("https://partner.example/"), None).await;
    let (router, dispatcher) = create_router(Arc::clone(&storage));

    let mut handles = Vec::new();
    for _ in 0..25 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            get(&router, "/l/busy").await.status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::TEMPORARY_REDIRECT);
    }

    dispatcher.flush().await;
    let link = storage.get_shortlink("busy").await.unwrap().unwrap();
    assert_eq!(link.click_count, 25);
}

#[tokio::test]
async fn test_track_appends_ref_and_sets_cookie() {
    let storage = create_test_storage().await;
    let (router, dispatcher) = create_router(Arc::clone(&storage));

    let response = get(&router, "/track?ref=partner-3&url=%2Fproducts%3Fcolor%3Dred").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "http://shop.example/products?color=red&ref=partner-3"
    );
    assert_eq!(
        cookie(&response),
        Some("referralCode=partner-3; Path=/; Max-Age=2592000; SameSite=Lax")
    );

    dispatcher.flush().await;
    let events = storage.list_click_events(None, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].shortlink_id, None);
    assert_eq!(events[0].partner_id.as_deref(), Some("partner-3"));
}

#[tokio::test]
async fn test_track_keeps_existing_ref() {
    let (router, _) = create_router(create_test_storage().await);

    let response = get(&router, "/track?ref=partner-3&url=%2Fshop%3Fref%3Dother").await;
    assert_eq!(location(&response), "http://shop.example/shop?ref=other");
}

#[tokio::test]
async fn test_track_falls_back_to_root() {
    let storage = create_test_storage().await;
    let (router, dispatcher) = create_router(Arc::clone(&storage));

    for uri in [
        "/track",
        "/track?ref=partner-3",
        "/track?url=%2Fshop",
        "/track?ref=partner-3&url=https%3A%2F%2Fevil.example%2F",
        "/track?ref=partner-3&url=%2F%2Fevil.example",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "uri {uri}");
        assert_eq!(location(&response), "/", "uri {uri}");
        assert!(cookie(&response).is_none(), "uri {uri}");
    }

    dispatcher.flush().await;
    assert!(storage.list_click_events(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_health_check() {
    let (router, _) = create_router(create_test_storage().await);

    let response = get(&router, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
}
