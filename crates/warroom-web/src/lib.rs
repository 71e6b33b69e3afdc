//! JSON API for the dashboard: ad listings, stats, briefs, and the
//! fetch/reseed controls.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use warroom_core::{MediaType, THEME_CATALOG};
use warroom_ingest::{IngestError, IngestService};
use warroom_storage::{AdFilter, StoreError};

pub const CRATE_NAME: &str = "warroom-web";

/// Hard cap on page size for ad listings.
const MAX_LIST_LIMIT: i64 = 500;
const DEFAULT_LIST_LIMIT: i64 = 100;
const DEFAULT_TOP_LIMIT: i64 = 10;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestService>,
}

pub fn app(service: Arc<IngestService>) -> Router {
    let state = AppState { service };
    Router::new()
        .route("/api/health", get(health))
        .route("/api/brands", get(brands))
        .route("/api/stats", get(stats))
        .route("/api/insights", get(insights))
        .route("/api/ads", get(list_ads))
        .route("/api/ads/top-performers", get(top_performers))
        .route("/api/brief/{brand_key}", get(latest_brief))
        .route("/api/brief/{brand_key}/generate", post(generate_brief))
        .route("/api/fetch", post(fetch))
        .route("/api/reseed", post(reseed))
        .route("/api/themes", get(themes))
        .with_state(state)
}

pub async fn serve(service: Arc<IngestService>, port: u16) -> anyhow::Result<()> {
    let router = app(service);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// API failure with a `{"detail": ...}` body.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::InvalidCredential => StatusCode::UNAUTHORIZED,
            IngestError::UnknownBrand(_) => StatusCode::NOT_FOUND,
            IngestError::Source(_) | IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "warroom" }))
}

async fn brands(State(state): State<AppState>) -> Json<serde_json::Value> {
    let brands: Vec<_> = state
        .service
        .brands()
        .brands
        .iter()
        .map(|brand| {
            json!({
                "key": brand.key,
                "display_name": brand.display_name,
                "category": brand.category,
                "target_audience": brand.target_audience,
                "competitors": brand
                    .competitors
                    .iter()
                    .map(|c| c.name.clone())
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    Json(json!({ "brands": brands }))
}

#[derive(Debug, Deserialize)]
struct BrandScopeQuery {
    brand_key: Option<String>,
}

async fn stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let overall = state.service.store().stats(None).await?;
    let mut by_brand = serde_json::Map::new();
    for brand in &state.service.brands().brands {
        let stats = state.service.store().stats(Some(&brand.key)).await?;
        by_brand.insert(brand.key.clone(), json!(stats));
    }
    Ok(Json(json!({ "overall": overall, "by_brand": by_brand })).into_response())
}

async fn insights(
    State(state): State<AppState>,
    Query(query): Query<BrandScopeQuery>,
) -> Result<Response, ApiError> {
    let keys: Vec<String> = match query.brand_key {
        Some(key) => vec![key],
        None => state
            .service
            .brands()
            .brands
            .iter()
            .map(|b| b.key.clone())
            .collect(),
    };
    let mut insights = serde_json::Map::new();
    for key in keys {
        let brand_insights = state.service.brand_insights(&key).await?;
        insights.insert(key, json!(brand_insights));
    }
    Ok(Json(json!({ "insights": insights })).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct AdsQuery {
    brand_key: Option<String>,
    competitor_name: Option<String>,
    media_type: Option<String>,
    theme: Option<String>,
    is_active: Option<bool>,
    days_back: Option<i64>,
    limit: Option<i64>,
}

async fn list_ads(
    State(state): State<AppState>,
    Query(query): Query<AdsQuery>,
) -> Result<Response, ApiError> {
    let media_type = match query.media_type.as_deref() {
        None => None,
        Some(raw) => Some(parse_media_type(raw).ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                format!("unknown media type '{raw}'"),
            )
        })?),
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let filter = AdFilter {
        brand_key: query.brand_key,
        competitor_name: query.competitor_name,
        media_type,
        theme: query.theme,
        is_active: query.is_active,
        days_back: query.days_back,
        limit,
    };
    let ads = state.service.store().list_ads(&filter).await?;
    Ok(Json(json!({ "total": ads.len(), "ads": ads })).into_response())
}

#[derive(Debug, Deserialize)]
struct TopPerformersQuery {
    brand_key: Option<String>,
    limit: Option<i64>,
}

async fn top_performers(
    State(state): State<AppState>,
    Query(query): Query<TopPerformersQuery>,
) -> Result<Response, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, 50);
    let ads = state
        .service
        .store()
        .top_performers(query.brand_key.as_deref(), limit)
        .await?;
    Ok(Json(json!({ "total": ads.len(), "top_performers": ads })).into_response())
}

async fn latest_brief(
    State(state): State<AppState>,
    Path(brand_key): Path<String>,
) -> Result<Response, ApiError> {
    if state.service.brands().get(&brand_key).is_none() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("unknown brand '{brand_key}'"),
        ));
    }
    let body = match state.service.store().latest_brief(&brand_key).await? {
        Some(brief) => json!({ "brand_key": brand_key, "brief": brief }),
        None => json!({
            "brand_key": brand_key,
            "brief": null,
            "message": "No brief generated yet. Run a refresh first.",
        }),
    };
    Ok(Json(body).into_response())
}

async fn generate_brief(
    State(state): State<AppState>,
    Path(brand_key): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state.service.generate_brief(&brand_key).await?;
    Ok(Json(outcome).into_response())
}

async fn fetch(
    State(state): State<AppState>,
    Query(query): Query<BrandScopeQuery>,
) -> Result<Response, ApiError> {
    let outcome = state.service.fetch(query.brand_key.as_deref()).await?;
    Ok(Json(outcome).into_response())
}

async fn reseed(State(state): State<AppState>) -> Result<Response, ApiError> {
    let outcome = state.service.reseed().await?;
    Ok(Json(json!({ "status": "ok", "ads_seeded": outcome.ads_seeded })).into_response())
}

async fn themes() -> Json<serde_json::Value> {
    Json(json!({ "themes": THEME_CATALOG }))
}

/// Strict parse for the media type filter. `MediaType::from_raw` folds
/// unknown strings into IMAGE, which would silently mis-filter here.
fn parse_media_type(raw: &str) -> Option<MediaType> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "IMAGE" => Some(MediaType::Image),
        "VIDEO" => Some(MediaType::Video),
        "CAROUSEL" => Some(MediaType::Carousel),
        _ => None,
    }
}
