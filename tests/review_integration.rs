//! Review submission integration tests
//!
//! Drives `POST /api/reviews` through the API router and checks the stored
//! aggregate and the five-star bonus written to the points ledger.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use tradinta::api::{self, AppState};
use tradinta::auth::ApiKeyGuard;
use tradinta::cursor::CursorSigner;
use tradinta::discovery::{CatalogRanker, DiscoveryService};
use tradinta::dispatch::BackgroundDispatcher;
use tradinta::ledger::{reasons, verify_event_hash, Ledger};
use tradinta::lookup::EntityLookup;
use tradinta::models::{Product, ProductStatus};
use tradinta::reviews::{RatingAggregator, FIVE_STAR_POINTS_SETTING};
use tradinta::storage::{SqliteStorage, Storage, UnavailableStorage};

struct TestApp {
    router: Router,
    storage: Arc<dyn Storage>,
    dispatcher: Arc<BackgroundDispatcher>,
}

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    // One connection so every query sees the same in-memory database
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn create_test_app(storage: Arc<dyn Storage>) -> TestApp {
    let dispatcher = Arc::new(BackgroundDispatcher::new(Arc::clone(&storage), 1000));
    let ledger = Arc::new(Ledger::new(Arc::clone(&dispatcher)));
    let discovery = Arc::new(DiscoveryService::new(Arc::new(CatalogRanker::new(
        Arc::clone(&storage),
    ))));

    let state = Arc::new(AppState {
        storage: Arc::clone(&storage),
        ledger: Arc::clone(&ledger),
        ratings: Arc::new(RatingAggregator::new(Arc::clone(&storage), ledger)),
        lookup: Arc::new(EntityLookup::new(Arc::clone(&storage), Arc::clone(&discovery))),
        discovery,
        cursor_signer: Arc::new(CursorSigner::new(Some("test-secret"))),
    });

    TestApp {
        router: api::create_api_router(state, Arc::new(ApiKeyGuard::new(vec![]))),
        storage,
        dispatcher,
    }
}

fn product(id: &str, manufacturer_id: &str) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {id}"),
        slug: id.to_string(),
        description: String::new(),
        price: 100.0,
        stock: 10,
        category: Some("home".to_string()),
        subcategory: None,
        manufacturer_id: manufacturer_id.to_string(),
        image_url: None,
        rating: 0.0,
        review_count: 0,
        status: ProductStatus::Published,
        is_sponsored: false,
        is_boosted: false,
        created_at: 1_700_000_000,
    }
}

async fn post_review(router: &Router, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/reviews")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn review(review_id: &str, product_id: &str, rating: i64) -> Value {
    json!({
        "reviewId": review_id,
        "productId": product_id,
        "manufacturerId": "mfr-1",
        "rating": rating,
    })
}

#[tokio::test]
async fn test_review_updates_product_rating() {
    let app = create_test_app(create_test_storage().await);
    app.storage.upsert_product(&product("p1", "mfr-1")).await.unwrap();

    let (status, body) = post_review(&app.router, review("r1", "p1", 4)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, _) = post_review(&app.router, review("r2", "p1", 2)).await;
    assert_eq!(status, StatusCode::OK);

    let stored = app.storage.get_product("p1").await.unwrap().unwrap();
    assert_eq!(stored.review_count, 2);
    assert!((stored.rating - 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_missing_fields_have_no_side_effects() {
    let app = create_test_app(create_test_storage().await);
    app.storage.upsert_product(&product("p1", "mfr-1")).await.unwrap();

    let bodies = [
        json!({"reviewId": "r1", "productId": "p1", "manufacturerId": "mfr-1"}),
        json!({"reviewId": "r1", "productId": "p1", "manufacturerId": "mfr-1", "rating": null}),
        json!({"productId": "p1", "manufacturerId": "mfr-1", "rating": 5}),
        json!({"reviewId": "r1", "productId": "", "manufacturerId": "mfr-1", "rating": 5}),
        json!({"reviewId": "r1", "productId": "p1", "rating": 5}),
    ];

    for body in bodies {
        let (status, response) = post_review(&app.router, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response, json!({"error": "Missing required fields"}));
    }

    app.dispatcher.flush().await;

    let stored = app.storage.get_product("p1").await.unwrap().unwrap();
    assert_eq!(stored.review_count, 0);
    let events = app
        .storage
        .list_ledger_events(Some("mfr-1"), None, 10)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_invalid_rating_rejected() {
    let app = create_test_app(create_test_storage().await);
    app.storage.upsert_product(&product("p1", "mfr-1")).await.unwrap();

    for rating in [json!(0), json!(6), json!(4.5), json!("5")] {
        let (status, body) = post_review(
            &app.router,
            json!({"reviewId": "r1", "productId": "p1", "manufacturerId": "mfr-1", "rating": rating}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid rating");
    }

    let stored = app.storage.get_product("p1").await.unwrap().unwrap();
    assert_eq!(stored.review_count, 0);
}

#[tokio::test]
async fn test_unknown_product_returns_404() {
    let app = create_test_app(create_test_storage().await);

    let (status, body) = post_review(&app.router, review("r1", "missing", 5)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Product not found");
    assert!(body["details"].is_string());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reviews_are_all_counted() {
    // File-backed with several connections so writers really overlap
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("reviews.db").display());
    let sqlite = SqliteStorage::new(&url, 5).await.unwrap();
    sqlite.init().await.unwrap();
    let app = create_test_app(Arc::new(sqlite));
    app.storage.upsert_product(&product("p1", "mfr-1")).await.unwrap();

    let ratings: Vec<i64> = (0..64).map(|i| i % 5 + 1).collect();
    let mut handles = Vec::new();
    for (i, rating) in ratings.iter().copied().enumerate() {
        let router = app.router.clone();
        handles.push(tokio::spawn(async move {
            post_review(&router, review(&format!("r{i}"), "p1", rating)).await
        }));
    }

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let stored = app.storage.get_product("p1").await.unwrap().unwrap();
    assert_eq!(stored.review_count, ratings.len() as i64);

    let expected = ratings.iter().sum::<i64>() as f64 / ratings.len() as f64;
    assert!(
        (stored.rating - expected).abs() < 1e-9,
        "rating {} != {}",
        stored.rating,
        expected
    );

    app.dispatcher.flush().await;
    let bonuses = app
        .storage
        .list_ledger_events(Some("mfr-1"), None, 100)
        .await
        .unwrap();
    let fives = ratings.iter().filter(|r| **r == 5).count();
    assert_eq!(bonuses.len(), fives);
}

#[tokio::test]
async fn test_five_star_review_awards_default_bonus() {
    let app = create_test_app(create_test_storage().await);
    app.storage.upsert_product(&product("p1", "mfr-1")).await.unwrap();

    let (status, _) = post_review(&app.router, review("r1", "p1", 5)).await;
    assert_eq!(status, StatusCode::OK);
    app.dispatcher.flush().await;

    let events = app
        .storage
        .list_ledger_events(Some("mfr-1"), None, 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    let event = events[0].to_event().unwrap();
    assert_eq!(event.points, 10);
    assert_eq!(event.action, "award");
    assert_eq!(event.reason_code, reasons::FIVE_STAR_REVIEW_RECEIVED);
    assert_eq!(event.metadata["productId"], "p1");
    assert_eq!(event.metadata["reviewId"], "r1");
    assert_eq!(event.issued_by, "system");
    assert!(verify_event_hash(&event));

    assert_eq!(app.storage.points_balance("mfr-1").await.unwrap(), 10);
}

#[tokio::test]
async fn test_five_star_bonus_follows_setting() {
    let app = create_test_app(create_test_storage().await);
    app.storage.upsert_product(&product("p1", "mfr-1")).await.unwrap();

    app.storage
        .put_setting(FIVE_STAR_POINTS_SETTING, "25")
        .await
        .unwrap();
    post_review(&app.router, review("r1", "p1", 5)).await;
    app.dispatcher.flush().await;
    assert_eq!(app.storage.points_balance("mfr-1").await.unwrap(), 25);

    // Zero switches the bonus off; the rating still counts
    app.storage
        .put_setting(FIVE_STAR_POINTS_SETTING, "0")
        .await
        .unwrap();
    let (status, _) = post_review(&app.router, review("r2", "p1", 5)).await;
    assert_eq!(status, StatusCode::OK);
    app.dispatcher.flush().await;

    let events = app
        .storage
        .list_ledger_events(Some("mfr-1"), None, 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        app.storage.get_product("p1").await.unwrap().unwrap().review_count,
        2
    );
}

#[tokio::test]
async fn test_lower_ratings_award_nothing() {
    let app = create_test_app(create_test_storage().await);
    app.storage.upsert_product(&product("p1", "mfr-1")).await.unwrap();

    for (i, rating) in [1, 2, 3, 4].into_iter().enumerate() {
        post_review(&app.router, review(&format!("r{i}"), "p1", rating)).await;
    }
    app.dispatcher.flush().await;

    assert_eq!(app.storage.points_balance("mfr-1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_bonus_goes_to_product_owner() {
    let app = create_test_app(create_test_storage().await);
    app.storage.upsert_product(&product("p1", "owner")).await.unwrap();

    // Body names a different manufacturer
    let (status, _) = post_review(&app.router, review("r1", "p1", 5)).await;
    assert_eq!(status, StatusCode::OK);
    app.dispatcher.flush().await;

    assert_eq!(app.storage.points_balance("owner").await.unwrap(), 10);
    assert_eq!(app.storage.points_balance("mfr-1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_unavailable_store_reports_failure() {
    let app = create_test_app(Arc::new(UnavailableStorage));

    let (status, body) = post_review(&app.router, review("r1", "p1", 5)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to update product rating");
    assert!(body["details"].is_string());
}
