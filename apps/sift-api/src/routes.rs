use axum::{
	Json, Router,
	extract::{Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::state::AppState;
use sift_domain::types::{PopularQuery, SearchLogEntry, SearchRequest, SearchResponse, SearchStats};
use sift_service::{
	BottleneckReport, CacheAdvice, Error as ServiceError, HealthReport, MetricsSummary,
};

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.route("/v1/search/history", get(search_history))
		.route("/v1/search/popular", get(popular))
		.route("/v1/stats", get(stats))
		.route("/v1/metrics", get(metrics))
		.route("/v1/metrics/suggestions", get(metrics_suggestions))
		.with_state(state)
}

// Always 200; the status field carries healthy/degraded.
async fn health(State(state): State<AppState>) -> Json<HealthReport> {
	Json(state.service.health().await)
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state.service.search(&payload).await?;

	Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
	user_id: Option<String>,
	limit: Option<i64>,
	offset: Option<i64>,
}

async fn search_history(
	State(state): State<AppState>,
	Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<SearchLogEntry>>, ApiError> {
	let limit = params.limit.unwrap_or(20).clamp(1, 100);
	let offset = params.offset.unwrap_or(0).max(0);
	let entries = state.service.search_history(params.user_id.as_deref(), limit, offset).await?;

	Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct PopularParams {
	limit: Option<i64>,
}

async fn popular(
	State(state): State<AppState>,
	Query(params): Query<PopularParams>,
) -> Result<Json<Vec<PopularQuery>>, ApiError> {
	let limit = params.limit.unwrap_or(10).clamp(1, 100);
	let queries = state.service.popular_queries(limit).await?;

	Ok(Json(queries))
}

#[derive(Debug, Deserialize)]
struct StatsParams {
	period_hours: Option<i64>,
}

async fn stats(
	State(state): State<AppState>,
	Query(params): Query<StatsParams>,
) -> Result<Json<SearchStats>, ApiError> {
	let period_hours = params.period_hours.unwrap_or(24).clamp(1, 24 * 30);
	let stats = state.service.stats(period_hours, OffsetDateTime::now_utc()).await?;

	Ok(Json(stats))
}

#[derive(Debug, Serialize)]
struct MetricsBody {
	summary: MetricsSummary,
	bottlenecks: Vec<BottleneckReport>,
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsBody> {
	Json(MetricsBody {
		summary: state.service.monitor.metrics_summary(),
		bottlenecks: state.service.monitor.identify_bottlenecks(),
	})
}

async fn metrics_suggestions(State(state): State<AppState>) -> Json<CacheAdvice> {
	Json(state.service.cache_advice())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: &'static str,
	message: String,
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, error_code) = match &err {
			ServiceError::InvalidQuery { .. } => (StatusCode::BAD_REQUEST, "invalid_query"),
			ServiceError::EmbeddingUnavailable { .. } =>
				(StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable"),
			ServiceError::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
			ServiceError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
			ServiceError::VectorStore { .. } =>
				(StatusCode::INTERNAL_SERVER_ERROR, "vector_store_error"),
		};

		Self { status, error_code, message: err.to_string() }
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code.to_string(), message: self.message };

		(self.status, Json(body)).into_response()
	}
}

impl ApiError {
	pub fn status(&self) -> StatusCode {
		self.status
	}

	pub fn error_code(&self) -> &'static str {
		self.error_code
	}
}
