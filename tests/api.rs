use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use marvel_metadata::catalog::Catalog;
use marvel_metadata::config::Config;
use marvel_metadata::db;
use marvel_metadata::ingest::build_database;
use marvel_metadata::server::{build_router, AppState};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;
use tower::ServiceExt;

async fn setup(config: Config) -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let lines = [
        json!({
            "id": 1,
            "title": "Avengers (2012) #1",
            "detail_url": "https://www.marvel.com/comics/issue/1",
            "series_id": 100,
            "series_name": "Avengers (2012 - 2015)",
            "on_sale_date": "2012-12-05",
            "year_page": 2012,
            "creators": [{"creator_id": 200, "creator_name": "Jonathan Hickman", "role": "writer"}]
        }),
        json!({
            "id": 2,
            "title": "Avengers (2012) #2",
            "detail_url": "https://www.marvel.com/comics/issue/2",
            "series_id": 100,
            "series_name": "Avengers (2012 - 2015)",
            "on_sale_date": "2012-12-19",
            "year_page": 2012
        }),
        json!({
            "id": 3,
            "title": "Hulk (2008) #1",
            "detail_url": "https://www.marvel.com/comics/issue/3",
            "year_page": 2008
        }),
    ];
    let body: Vec<String> = lines.iter().map(|v| v.to_string()).collect();
    let input = tmp.path().join("issues.jsonl");
    fs::write(&input, body.join("\n")).unwrap();

    let target = tmp.path().join("marvel.db");
    build_database(&input, &target, 100).await.unwrap();

    let pool = db::connect_read_only(&target, 2).await.unwrap();
    let app = build_router(AppState::new(Catalog::new(pool), &config));
    (tmp, app)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn request(forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .uri("/health")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())
        .unwrap()
}

fn header(headers: &axum::http::HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_health_ok() {
    let (_tmp, app) = setup(Config::default()).await;
    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["issueCount"], 3);
}

#[tokio::test]
async fn test_get_issue_and_not_found_envelope() {
    let (_tmp, app) = setup(Config::default()).await;

    let (status, _, body) = get(&app, "/v1/issues/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Avengers (2012) #1");
    assert_eq!(body["series"]["id"], 100);
    assert_eq!(body["creators"][0]["role"], "writer");

    let (status, _, body) = get(&app, "/v1/issues/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _, body) = get(&app, "/v1/issues/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_issue_listing_pages() {
    let (_tmp, app) = setup(Config::default()).await;

    let (status, _, body) = get(&app, "/v1/issues?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_next"], true);

    let (_, _, body) = get(&app, "/v1/issues?limit=2&offset=2").await;
    assert_eq!(body["items"][0]["id"], 3);
    assert_eq!(body["has_next"], false);

    let (_, _, body) = get(&app, "/v1/issues?year=2008").await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, _, _) = get(&app, "/v1/issues?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _, _) = get(&app, "/v1/issues?limit=5000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_route() {
    let (_tmp, app) = setup(Config::default()).await;

    let (status, _, body) = get(&app, "/v1/search/issues?q=hulk").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["id"], 3);

    let (status, _, body) = get(&app, "/v1/search/issues?q=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_series_and_creator_routes() {
    let (_tmp, app) = setup(Config::default()).await;

    let (_, _, body) = get(&app, "/v1/series/100/issues").await;
    let ids: Vec<i64> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);

    let (_, _, body) = get(&app, "/v1/series/100").await;
    assert_eq!(body["issueCount"], 2);

    let (_, _, body) = get(&app, "/v1/creators?role=writer").await;
    assert_eq!(body["items"][0]["id"], 200);

    let (_, _, body) = get(&app, "/v1/creators/200/issues").await;
    assert_eq!(body["items"][0]["id"], 1);
    assert_eq!(body["items"][0]["roles"], json!(["writer"]));

    let (status, _, _) = get(&app, "/v1/creators/1/issues").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit_headers_and_rejection() {
    let mut config = Config::default();
    config.rate_limit.burst = 3;
    let (_tmp, app) = setup(config).await;

    for expected in ["2", "1", "0"] {
        let (status, headers, _) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(header(&headers, "x-ratelimit-limit"), "60");
        assert_eq!(header(&headers, "x-ratelimit-remaining"), expected);
    }

    let (status, headers, body) = get(&app, "/v1/issues/1").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limited");
    assert_eq!(header(&headers, "x-ratelimit-remaining"), "0");
    assert_eq!(header(&headers, "retry-after"), "1");
}

#[tokio::test]
async fn test_trusted_forwarded_clients_have_separate_budgets() {
    let mut config = Config::default();
    config.rate_limit.burst = 1;
    config.server.trust_forwarded_for = true;
    let (_tmp, app) = setup(config).await;

    let first = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let again = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
    assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
    let other = app.clone().oneshot(request("198.51.100.2")).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_untrusted_forwarded_header_does_not_reset_budget() {
    let mut config = Config::default();
    config.rate_limit.burst = 1;
    let (_tmp, app) = setup(config).await;

    let first = app.clone().oneshot(request("198.51.100.1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let rotated = app.clone().oneshot(request("198.51.100.2")).await.unwrap();
    assert_eq!(rotated.status(), StatusCode::TOO_MANY_REQUESTS);
}
