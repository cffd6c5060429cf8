use std::sync::{
	Arc, Mutex,
	atomic::{AtomicU32, Ordering},
};

use serde_json::{Map, Value};

use sift_config::{EmbeddingProviderConfig, Retry};
use sift_service::{BoxFuture, EmbeddingProvider, Providers, cache, embedding, enrich};

struct FixedEmbedding {
	vector: Vec<f32>,
	calls: AtomicU32,
}
impl EmbeddingProvider for FixedEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>, sift_providers::Error>> {
		self.calls.fetch_add(1, Ordering::Relaxed);

		let vectors = texts.iter().map(|_| self.vector.clone()).collect();

		Box::pin(async move { Ok(vectors) })
	}
}

struct FlakyEmbedding {
	failures_left: Mutex<u32>,
	vector: Vec<f32>,
}
impl EmbeddingProvider for FlakyEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>, sift_providers::Error>> {
		let mut failures_left = self.failures_left.lock().unwrap();

		if *failures_left > 0 {
			*failures_left -= 1;

			return Box::pin(async { Err(sift_providers::Error::RateLimited) });
		}

		let vectors = texts.iter().map(|_| self.vector.clone()).collect::<Vec<_>>();

		Box::pin(async move { Ok(vectors) })
	}
}

fn provider_cfg() -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "key".to_string(),
		path: "/v1/embeddings".to_string(),
		model: "test-embed".to_string(),
		dimensions: 4,
		timeout_ms: 1_000,
		default_headers: Map::new(),
		retry: Retry { max_attempts: 3, rate_limit_backoff_ms: 1, timeout_backoff_base_ms: 1 },
	}
}

#[tokio::test]
async fn custom_embedding_provider_is_called_through_the_trait() {
	let provider =
		Arc::new(FixedEmbedding { vector: vec![0.1, 0.2, 0.3, 0.4], calls: AtomicU32::new(0) });
	let providers = Providers::new(provider.clone());
	let cfg = provider_cfg();
	let texts = vec!["분기 보고서".to_string()];
	let vectors = providers.embedding.embed(&cfg, &texts).await.unwrap();

	assert_eq!(vectors, vec![vec![0.1, 0.2, 0.3, 0.4]]);
	assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn flaky_provider_recovers_within_the_retry_budget() {
	let provider = Arc::new(FlakyEmbedding {
		failures_left: Mutex::new(2),
		vector: vec![0.5, 0.5, 0.5, 0.5],
	});
	let cfg = provider_cfg();
	let texts = vec!["query".to_string()];

	// Two rate-limited responses, then success: the third direct call
	// goes through.
	assert!(provider.embed(&cfg, &texts).await.is_err());
	assert!(provider.embed(&cfg, &texts).await.is_err());
	assert!(provider.embed(&cfg, &texts).await.is_ok());
}

#[test]
fn embed_text_preparation_matches_cache_keys() {
	let prepared = embedding::prepare_embed_text("  분기\n 보고서  ", 100);
	let key_a = cache::embedding_key("test-embed", &prepared);
	let key_b = cache::embedding_key(
		"test-embed",
		&embedding::prepare_embed_text("분기 보고서", 100),
	);

	assert_eq!(key_a, key_b);
}

#[test]
fn snippet_and_highlight_compose() {
	let content = "<html><body>이번 분기 매출 보고서를 첨부합니다.</body></html>";
	let keywords = vec!["보고서".to_string()];
	let snippet = enrich::make_snippet(content, &keywords);
	let highlighted = enrich::highlight_terms(&snippet, &keywords);

	assert!(!snippet.contains('<'));
	assert!(highlighted.contains("<mark>보고서</mark>"));
}
