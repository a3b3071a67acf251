//! Read-only HTTP API over a built database.
//!
//! Every route sits behind the per-client [`RateLimiter`]; a rejected
//! request never reaches the query layer.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Database reachability, schema version, issue count |
//! | `GET`  | `/v1/issues` | Issues by id (`year`, `series_id`, `available`, `limit`, `offset`) |
//! | `GET`  | `/v1/issues/{id}` | Full issue with series, cover and creators |
//! | `GET`  | `/v1/search/issues` | Title search (`q`, `limit`) |
//! | `GET`  | `/v1/series` | Series by name with issue counts |
//! | `GET`  | `/v1/series/{id}` | Series summary |
//! | `GET`  | `/v1/series/{id}/issues` | Issues in on-sale order |
//! | `GET`  | `/v1/creators` | Creators by name (`role`) |
//! | `GET`  | `/v1/creators/{id}` | Creator with per-role counts |
//! | `GET`  | `/v1/creators/{id}/issues` | Issues credited to the creator |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "issue not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `rate_limited` (429),
//! `internal` (500), `unavailable` (503).
//!
//! # Rate limit headers
//!
//! Every response carries `X-RateLimit-Limit` (requests per minute),
//! `X-RateLimit-Remaining` and `X-RateLimit-Reset` (seconds, rounded up, of
//! one refill interval; on a 429, of the wait until the next token). A 429
//! also carries `Retry-After`.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        ConnectInfo, Path, Query, Request, State,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::catalog::{Catalog, Health};
use crate::config::Config;
use crate::db;
use crate::error::Error;
use crate::models::{IssueFilter, Page};
use crate::ratelimit::{RateDecision, RateLimiter};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    catalog: Catalog,
    limiter: Arc<RateLimiter>,
    default_page_size: i64,
    max_page_size: i64,
    trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(catalog: Catalog, config: &Config) -> Self {
        Self {
            catalog,
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            default_page_size: config.server.default_page_size,
            max_page_size: config.server.max_page_size,
            trust_forwarded_for: config.server.trust_forwarded_for,
        }
    }

    /// Caller window, validated against the configured page sizes.
    fn page(&self, limit: Option<i64>, offset: Option<i64>) -> Result<Page, AppError> {
        let limit = limit.unwrap_or(self.default_page_size);
        if limit > self.max_page_size {
            return Err(bad_request(format!(
                "limit must be <= {}",
                self.max_page_size
            )));
        }
        Ok(Page::new(limit, offset.unwrap_or(0))?)
    }
}

/// Assembles the router with rate limiting and CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/issues", get(handle_list_issues))
        .route("/v1/issues/{id}", get(handle_get_issue))
        .route("/v1/search/issues", get(handle_search))
        .route("/v1/series", get(handle_list_series))
        .route("/v1/series/{id}", get(handle_get_series))
        .route("/v1/series/{id}/issues", get(handle_series_issues))
        .route("/v1/creators", get(handle_list_creators))
        .route("/v1/creators/{id}", get(handle_get_creator))
        .route("/v1/creators/{id}/issues", get(handle_creator_issues))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` over a read-only pool.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    if !config.db.path.exists() {
        anyhow::bail!(
            "database not found at {}; run `marvel build` first",
            config.db.path.display()
        );
    }
    let pool = db::connect_read_only(&config.db.path, config.server.max_connections).await?;
    let state = AppState::new(Catalog::new(pool), config);
    let app = build_router(state);

    let bind_addr = config.server.bind.clone();
    info!(
        bind = %bind_addr,
        db = %config.db.path.display(),
        requests_per_minute = config.rate_limit.requests_per_minute,
        burst = config.rate_limit.burst,
        "starting server"
    );
    println!("Marvel metadata API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// ============ Rate limiting ============

/// Peer address, else `unknown`. With `trust_forwarded_for` the first
/// `X-Forwarded-For` entry wins over both.
fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn whole_seconds(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

fn apply_rate_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(whole_seconds(decision.reset_after)),
    );
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request, state.trust_forwarded_for);
    let decision = state.limiter.check(&key);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        debug!(client = %key, path = %request.uri().path(), "rate limited");
        let mut response = AppError {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "rate_limited".to_string(),
            message: "too many requests; slow down".to_string(),
        }
        .into_response();
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(whole_seconds(decision.reset_after).max(1)),
        );
        response
    };
    apply_rate_headers(response.headers_mut(), &decision);
    response
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { .. } => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found".to_string(),
                message: err.to_string(),
            },
            Error::InvalidInput(_) => bad_request(err.to_string()),
            Error::Database(_) => {
                error!(error = %err, "database unavailable");
                AppError {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    code: "unavailable".to_string(),
                    message: "database unavailable".to_string(),
                }
            }
            other => {
                error!(error = %other, "query failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ Response shapes ============

/// One page of a listing. `has_next` is exact: the query fetches one row
/// past the window to decide it.
#[derive(Serialize)]
struct Listing<T> {
    items: Vec<T>,
    limit: i64,
    offset: i64,
    has_next: bool,
}

impl<T> Listing<T> {
    fn from_probe(mut items: Vec<T>, page: Page) -> Self {
        let has_next = items.len() as i64 > page.limit;
        items.truncate(page.limit as usize);
        Self {
            items,
            limit: page.limit,
            offset: page.offset,
            has_next,
        }
    }
}

/// Window one row larger than `page`.
fn probe(page: Page) -> Page {
    Page {
        limit: page.limit + 1,
        offset: page.offset,
    }
}

#[derive(Serialize)]
struct Items<T> {
    items: Vec<T>,
}

#[derive(Deserialize)]
struct PageParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
struct IssueParams {
    year: Option<i64>,
    series_id: Option<i64>,
    available: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
struct CreatorParams {
    role: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct HealthResponse {
    #[serde(flatten)]
    health: Health,
    version: &'static str,
}

// ============ Handlers ============

async fn handle_health(State(state): State<AppState>) -> Response {
    let health = state.catalog.health().await;
    let status = if health.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        health,
        version: env!("CARGO_PKG_VERSION"),
    };
    (status, Json(body)).into_response()
}

async fn handle_list_issues(
    State(state): State<AppState>,
    params: Result<Query<IssueParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let page = state.page(params.limit, params.offset)?;
    let filter = IssueFilter {
        year: params.year,
        series_id: params.series_id,
        available: params.available,
    };
    let rows = state.catalog.list_issues(&filter, probe(page)).await?;
    Ok(Json(Listing::from_probe(rows, page)).into_response())
}

async fn handle_get_issue(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let issue = state.catalog.get_issue(id).await?;
    Ok(Json(issue).into_response())
}

async fn handle_search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let query = params.q.unwrap_or_default();
    let limit = state.page(params.limit, None)?.limit;
    let hits = state.catalog.search_issues(&query, limit).await?;
    Ok(Json(Items { items: hits }).into_response())
}

async fn handle_list_series(
    State(state): State<AppState>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let page = state.page(params.limit, params.offset)?;
    let rows = state.catalog.list_series(probe(page)).await?;
    Ok(Json(Listing::from_probe(rows, page)).into_response())
}

async fn handle_get_series(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let series = state.catalog.get_series(id).await?;
    Ok(Json(series).into_response())
}

async fn handle_series_issues(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let issues = state.catalog.get_series_issues(id).await?;
    Ok(Json(Items { items: issues }).into_response())
}

async fn handle_list_creators(
    State(state): State<AppState>,
    params: Result<Query<CreatorParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = params?;
    let page = state.page(params.limit, params.offset)?;
    let role = params.role.as_deref().filter(|r| !r.trim().is_empty());
    let rows = state.catalog.list_creators(role, probe(page)).await?;
    Ok(Json(Listing::from_probe(rows, page)).into_response())
}

async fn handle_get_creator(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let creator = state.catalog.get_creator(id).await?;
    Ok(Json(creator).into_response())
}

async fn handle_creator_issues(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let issues = state.catalog.get_creator_issues(id).await?;
    Ok(Json(Items { items: issues }).into_response())
}
