use axum::{
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::Map;
use tower::util::ServiceExt;

use sift_api::{routes, state::AppState};
use sift_config::{
	CollectionConfig, Config, EmbeddingProviderConfig, Postgres, Providers, Qdrant, Retry, Search,
	Service, Storage,
};
use sift_testkit::TestDatabase;

fn test_config(dsn: String, qdrant_url: String, collection: String) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
			bind_localhost_only: true,
		},
		storage: Storage {
			postgres: Postgres { dsn, pool_max_conns: 1 },
			qdrant: Qdrant {
				url: qdrant_url,
				default_collection: collection.clone(),
				collections: vec![CollectionConfig {
					name: collection,
					weight: 1.0,
					vector_name: None,
				}],
			},
		},
		providers: Providers { embedding: dummy_embedding_provider() },
		search: Search { cache_enabled: true, max_embed_chars: 8_000 },
	}
}

fn dummy_embedding_provider() -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/v1/embeddings".to_string(),
		model: "test".to_string(),
		dimensions: 4,
		timeout_ms: 1_000,
		default_headers: Map::new(),
		retry: Retry { max_attempts: 1, rate_limit_backoff_ms: 1, timeout_backoff_base_ms: 1 },
	}
}

async fn test_env() -> Option<(TestDatabase, String, String)> {
	let base_dsn = match sift_testkit::env_dsn() {
		Some(value) => value,
		None => {
			eprintln!("Skipping HTTP tests; set SIFT_PG_DSN to run this test.");

			return None;
		},
	};
	let qdrant_url = match sift_testkit::env_qdrant_url() {
		Some(value) => value,
		None => {
			eprintln!("Skipping HTTP tests; set SIFT_QDRANT_URL to run this test.");

			return None;
		},
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let collection = test_db.collection_name("sift_http");

	Some((test_db, qdrant_url, collection))
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set SIFT_PG_DSN and SIFT_QDRANT_URL to run."]
async fn health_reports_component_status() {
	let Some((test_db, qdrant_url, collection)) = test_env().await else {
		return;
	};
	let config = test_config(test_db.dsn().to_string(), qdrant_url, collection);
	let state = AppState::new(config).await.expect("Failed to initialize app state.");
	let app = routes::router(state);
	let response = app
		.oneshot(
			Request::builder()
				.uri("/health")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);

	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json: serde_json::Value = serde_json::from_slice(&body).expect("Failed to parse response.");

	assert_eq!(json["components"]["postgres"], "up");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set SIFT_PG_DSN and SIFT_QDRANT_URL to run."]
async fn rejects_blank_queries() {
	let Some((test_db, qdrant_url, collection)) = test_env().await else {
		return;
	};
	let config = test_config(test_db.dsn().to_string(), qdrant_url, collection);
	let state = AppState::new(config).await.expect("Failed to initialize app state.");
	let app = routes::router(state);
	let payload = serde_json::json!({ "query_text": "   " });
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/search")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /v1/search.");

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let body = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json: serde_json::Value = serde_json::from_slice(&body).expect("Failed to parse response.");

	assert_eq!(json["error_code"], "invalid_query");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set SIFT_PG_DSN and SIFT_QDRANT_URL to run."]
async fn metrics_endpoints_respond() {
	let Some((test_db, qdrant_url, collection)) = test_env().await else {
		return;
	};
	let config = test_config(test_db.dsn().to_string(), qdrant_url, collection);
	let state = AppState::new(config).await.expect("Failed to initialize app state.");

	for uri in ["/v1/metrics", "/v1/metrics/suggestions", "/v1/search/popular", "/v1/stats"] {
		let app = routes::router(state.clone());
		let response = app
			.oneshot(
				Request::builder()
					.uri(uri)
					.body(Body::empty())
					.expect("Failed to build request."),
			)
			.await
			.expect("Failed to call endpoint.");

		assert_eq!(response.status(), StatusCode::OK, "unexpected status for {uri}");
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
