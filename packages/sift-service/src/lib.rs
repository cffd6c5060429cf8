pub mod cache;
pub mod embedding;
pub mod enrich;
pub mod monitor;
pub mod query;
pub mod repository;
pub mod retrieval;
pub mod search;

mod error;
pub use error::{Error, Result};

use std::{
	future::Future,
	pin::Pin,
	sync::{
		Arc, Mutex,
		atomic::{AtomicU64, Ordering},
	},
};

use sift_config::{Config, EmbeddingProviderConfig};
use sift_providers::embedding as embedding_api;
use sift_storage::{cache::CacheStore, db::Db, qdrant::QdrantStore};

pub use cache::CacheFacade;
pub use monitor::{BottleneckReport, CacheAdvice, MetricsSummary, Monitor, OperationStats};
pub use search::HealthReport;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Embedding backend seam. The default implementation calls the
/// configured HTTP provider; tests substitute their own.
pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>, sift_providers::Error>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>, sift_providers::Error>> {
		Box::pin(embedding_api::embed(cfg, texts))
	}
}

/// Running totals for the search pipeline. The response-time average is
/// an exponential moving average so a single slow search cannot skew it
/// forever.
pub struct PipelineCounters {
	pub searches_total: AtomicU64,
	pub searches_failed: AtomicU64,
	pub embeddings_generated: AtomicU64,
	pub embedding_failures: AtomicU64,
	avg_response_ms: Mutex<Option<f64>>,
}
impl PipelineCounters {
	const EWMA_ALPHA: f64 = 0.1;

	fn new() -> Self {
		Self {
			searches_total: AtomicU64::new(0),
			searches_failed: AtomicU64::new(0),
			embeddings_generated: AtomicU64::new(0),
			embedding_failures: AtomicU64::new(0),
			avg_response_ms: Mutex::new(None),
		}
	}

	pub fn record_response_time(&self, elapsed_ms: f64) {
		let mut avg = self.avg_response_ms.lock().unwrap_or_else(|err| err.into_inner());

		*avg = Some(match *avg {
			Some(previous) => previous * (1.0 - Self::EWMA_ALPHA) + elapsed_ms * Self::EWMA_ALPHA,
			None => elapsed_ms,
		});
	}

	pub fn average_response_ms(&self) -> Option<f64> {
		*self.avg_response_ms.lock().unwrap_or_else(|err| err.into_inner())
	}

	pub fn error_rate(&self) -> f64 {
		let total = self.searches_total.load(Ordering::Relaxed);

		if total == 0 {
			return 0.;
		}

		self.searches_failed.load(Ordering::Relaxed) as f64 / total as f64
	}
}

pub struct SiftService {
	pub cfg: Config,
	pub db: Db,
	pub qdrant: Arc<QdrantStore>,
	pub providers: Providers,
	pub cache: CacheFacade,
	pub monitor: Monitor,
	pub counters: PipelineCounters,
}
impl SiftService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		Self::with_providers(cfg, db, qdrant, Providers::default())
	}

	pub fn with_providers(cfg: Config, db: Db, qdrant: QdrantStore, providers: Providers) -> Self {
		let cache = CacheFacade::new(CacheStore::new(db.pool.clone()), cfg.search.cache_enabled);

		Self {
			cfg,
			db,
			qdrant: Arc::new(qdrant),
			providers,
			cache,
			monitor: Monitor::new(),
			counters: PipelineCounters::new(),
		}
	}
}
